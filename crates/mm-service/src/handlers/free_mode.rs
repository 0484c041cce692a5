//! Free-mode admission handlers.
//!
//! Cooldown rejections are a 200 with `allowed: false`, not an error
//! status. The deployed clients key off the body, and a denied trial is an
//! expected outcome, not a fault.

use crate::errors::MmError;
use crate::models::{
    EndFreeSessionRequest, SuccessResponse, ValidateAccountRequest, ValidateAccountResponse,
};
use crate::routes::AppState;
use axum::{body::Bytes, extract::State, Json};
use chrono::Utc;
use tracing::instrument;

fn require_fingerprint(disk_serial: Option<&str>) -> Result<&str, MmError> {
    disk_serial
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| MmError::Validation("Missing diskSerial".to_string()))
}

/// POST /api/validate-account
///
/// Admission check for a viewer starting a session. The gate opens the
/// trial for admitted unpaid callers (the wire surface has an
/// end-free-session call but no separate start call), and a cooldown
/// denial comes back as `RateLimited`, which this endpoint presents as a
/// 200 with `allowed: false` per the deployed client contract.
#[instrument(skip_all)]
pub async fn validate_account(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ValidateAccountResponse>, MmError> {
    let request: ValidateAccountRequest = serde_json::from_slice(&body)
        .map_err(|e| MmError::Validation(format!("Invalid request body: {e}")))?;

    let fingerprint = require_fingerprint(request.disk_serial.as_deref())?.to_string();
    let now = Utc::now();

    let trial_minutes = state.config.free_trial_duration.as_secs() / 60;
    let response = match state
        .gatekeeper
        .admit(&fingerprint, request.company_code.as_deref(), now)
        .await
    {
        Ok(decision) if decision.is_paid => ValidateAccountResponse {
            allowed: true,
            is_paid: true,
            mode: "paid",
            wait_minutes: 0,
            message: "Account verified".to_string(),
        },
        Ok(_) => ValidateAccountResponse {
            allowed: true,
            is_paid: false,
            mode: "free",
            wait_minutes: 0,
            message: format!("Free mode: {trial_minutes} minute session"),
        },
        Err(MmError::RateLimited { wait_minutes }) => {
            tracing::info!(
                target: "mm.handlers.free_mode",
                wait_minutes = wait_minutes,
                "Free session denied"
            );
            ValidateAccountResponse {
                allowed: false,
                is_paid: false,
                mode: "free",
                wait_minutes,
                message: format!("Free mode is available again in {wait_minutes} minute(s)"),
            }
        }
        Err(e) => return Err(e),
    };

    Ok(Json(response))
}

/// POST /api/end-free-session
///
/// Closes the open trial and starts the cooldown. Idempotent.
#[instrument(skip_all)]
pub async fn end_free_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, MmError> {
    let request: EndFreeSessionRequest = serde_json::from_slice(&body)
        .map_err(|e| MmError::Validation(format!("Invalid request body: {e}")))?;

    let fingerprint = require_fingerprint(request.disk_serial.as_deref())?;
    state.gatekeeper.end_trial(fingerprint, Utc::now()).await?;

    Ok(Json(SuccessResponse { success: true }))
}
