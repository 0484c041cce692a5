//! Offer/answer relay handlers.
//!
//! Request bodies are read as raw bytes and deserialized manually so that a
//! malformed body yields a 400 with a useful message instead of axum's
//! default 422.

use crate::errors::MmError;
use crate::models::{
    AnswerResponse, HandshakePayload, RegisterRequest, RegisterResponse, ResolveResponse,
    SubmitAnswerRequest, SuccessResponse,
};
use crate::routes::AppState;
use crate::services::RegisterInput;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct CodeQuery {
    pub code: Option<String>,
}

fn require_code(code: Option<&str>) -> Result<&str, MmError> {
    code.map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| MmError::Validation("Missing code".to_string()))
}

/// Client IP as reported by a fronting proxy, if any.
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// POST /register
///
/// Publishes a host offer under an access code. `isService: true` claims a
/// fixed device code owned by `clientId`; otherwise the session is dynamic
/// and expires after the configured TTL.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<RegisterResponse>), MmError> {
    let request: RegisterRequest = serde_json::from_slice(&body)
        .map_err(|e| MmError::Validation(format!("Invalid request body: {e}")))?;

    let offer = request
        .offer
        .and_then(|payload| payload.into_description("offer"))
        .ok_or_else(|| MmError::Validation("Missing offer.sdp".to_string()))?;

    let registration = state
        .matchmaker
        .register(RegisterInput {
            code: request.code,
            account_ref: request.client_id,
            device_name: request.device_name,
            ip_address: forwarded_ip(&headers),
            fixed: request.is_service,
            handshake: HandshakePayload {
                offer,
                ice_candidates: request.ice_candidates,
                ice_servers: request.ice_servers,
            },
        })
        .await?;

    tracing::info!(
        target: "mm.handlers.sessions",
        code = %registration.code,
        fixed = registration.is_fixed,
        "Session registered"
    );

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            code: registration.code,
            is_fixed_code: registration.is_fixed,
            success: true,
            expires_in_millis: registration.expires_in.map(|d| d.as_millis() as u64),
        }),
    ))
}

/// GET /resolve?code=
#[instrument(skip_all)]
pub async fn resolve(
    State(state): State<AppState>,
    Query(query): Query<CodeQuery>,
) -> Result<Json<ResolveResponse>, MmError> {
    let code = require_code(query.code.as_deref())?;
    let resolved = state.matchmaker.resolve(code).await?;

    Ok(Json(ResolveResponse {
        code: resolved.code,
        offer: resolved.offer,
        ice_candidates: resolved.ice_candidates,
        ice_servers: resolved.ice_servers,
    }))
}

/// POST /answer
#[instrument(skip_all)]
pub async fn submit_answer(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, MmError> {
    let request: SubmitAnswerRequest = serde_json::from_slice(&body)
        .map_err(|e| MmError::Validation(format!("Invalid request body: {e}")))?;

    let code = require_code(request.code.as_deref())?.to_string();
    let answer = request
        .answer
        .and_then(|payload| payload.into_description("answer"))
        .ok_or_else(|| MmError::Validation("Missing answer.sdp".to_string()))?;

    state
        .matchmaker
        .submit_answer(&code, answer, request.ice_candidates)
        .await?;

    Ok(Json(SuccessResponse { success: true }))
}

/// GET /answer?code=
#[instrument(skip_all)]
pub async fn fetch_answer(
    State(state): State<AppState>,
    Query(query): Query<CodeQuery>,
) -> Result<Json<AnswerResponse>, MmError> {
    let code = require_code(query.code.as_deref())?;
    let fetched = state.matchmaker.fetch_answer(code).await?;

    Ok(Json(AnswerResponse {
        answer: fetched.answer,
        ice_candidates: fetched.ice_candidates,
    }))
}

/// DELETE /register/:code
///
/// Removal is idempotent, so the response is 204 whether or not a session
/// existed.
#[instrument(skip_all)]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<StatusCode, MmError> {
    state.matchmaker.delete(&code).await?;
    Ok(StatusCode::NO_CONTENT)
}
