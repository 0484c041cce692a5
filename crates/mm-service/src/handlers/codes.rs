//! Code provisioning handlers for the operator API.

use crate::codes::normalize_code;
use crate::errors::MmError;
use crate::models::{CheckCodeResponse, GenerateCodeResponse};
use crate::repositories::DevicesRepository;
use crate::routes::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use tracing::instrument;

const MIN_CODE_LENGTH: usize = 4;
const MAX_CODE_LENGTH: usize = 12;

#[derive(Debug, Deserialize)]
pub struct GenerateCodeQuery {
    pub length: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CheckCodeQuery {
    pub code: Option<String>,
}

/// GET /api/generate-code?length=
///
/// Hands out a code currently free in both the session store and the
/// device registry. The caller is expected to register it promptly; there
/// is no reservation.
#[instrument(skip_all)]
pub async fn generate_code(
    State(state): State<AppState>,
    Query(query): Query<GenerateCodeQuery>,
) -> Result<Json<GenerateCodeResponse>, MmError> {
    let length = query.length.unwrap_or(state.config.code_length);
    if !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&length) {
        return Err(MmError::Validation(format!(
            "length must be between {MIN_CODE_LENGTH} and {MAX_CODE_LENGTH}"
        )));
    }

    let code = state.matchmaker.generate_available_code(length).await?;

    tracing::debug!(target: "mm.handlers.codes", code = %code, "Generated code");
    Ok(Json(GenerateCodeResponse {
        code,
        available: true,
    }))
}

/// GET /api/check-code?code=
///
/// Reports availability; when a device owns the code, the owning account is
/// included so the operator can see who holds it.
#[instrument(skip_all)]
pub async fn check_code(
    State(state): State<AppState>,
    Query(query): Query<CheckCodeQuery>,
) -> Result<Json<CheckCodeResponse>, MmError> {
    let code = query
        .code
        .as_deref()
        .map(normalize_code)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| MmError::Validation("Missing code".to_string()))?;

    let owner = DevicesRepository::find_by_code(&state.pool, &code)
        .await?
        .map(|device| device.account_ref);
    let available = owner.is_none() && !state.store.contains(&code)?;

    Ok(Json(CheckCodeResponse {
        code,
        available,
        owner,
    }))
}
