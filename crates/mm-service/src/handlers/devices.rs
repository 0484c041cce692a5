//! Device liveness handlers.

use crate::errors::MmError;
use crate::models::{CodeRequest, SuccessResponse};
use crate::routes::AppState;
use axum::{body::Bytes, extract::State, Json};
use tracing::instrument;

fn parse_code_request(body: &Bytes) -> Result<String, MmError> {
    let request: CodeRequest = serde_json::from_slice(body)
        .map_err(|e| MmError::Validation(format!("Invalid request body: {e}")))?;

    request
        .code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .ok_or_else(|| MmError::Validation("Missing code".to_string()))
}

/// POST /heartbeat
///
/// Refreshes the device's `lastSeenAt` and keeps any live session warm.
/// Unknown codes still get `{success: true}`: hosts heartbeat through
/// restarts and expiries, and the wire contract has no 404 here.
#[instrument(skip_all)]
pub async fn heartbeat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, MmError> {
    let code = parse_code_request(&body)?;
    state.matchmaker.heartbeat(&code).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /disconnect
///
/// Graceful shutdown signal: the device goes offline immediately instead of
/// waiting for the offline sweep.
#[instrument(skip_all)]
pub async fn disconnect(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, MmError> {
    let code = parse_code_request(&body)?;
    state.matchmaker.disconnect(&code).await?;

    tracing::info!(target: "mm.handlers.devices", code = %code, "Device disconnected");
    Ok(Json(SuccessResponse { success: true }))
}
