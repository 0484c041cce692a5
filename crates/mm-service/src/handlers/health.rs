//! Health and debug introspection handlers.

use crate::errors::MmError;
use crate::models::{HealthResponse, SessionListResponse, SessionSummary};
use crate::routes::AppState;
use axum::{extract::State, Json};

/// GET /health
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, MmError> {
    Ok(Json(HealthResponse {
        status: "ok",
        active_sessions: state.store.len()?,
        ttl_ms: state.config.session_ttl.as_millis() as u64,
        uptime: state.started_at.elapsed().as_secs(),
    }))
}

/// GET /sessions
///
/// Debug listing of live sessions. Payload bodies (SDP, candidates) are
/// summarized, not echoed.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<SessionListResponse>, MmError> {
    let mut sessions: Vec<SessionSummary> = state
        .store
        .snapshot()?
        .into_iter()
        .map(|record| SessionSummary {
            code: record.code,
            has_offer: !record.offer.sdp.is_empty(),
            has_answer: record.answer.is_some(),
            is_fixed: record.is_fixed,
            created_at: record.created_at,
            last_access_at: record.last_access_at,
            candidate_count: record.ice_candidates.len() + record.answer_ice_candidates.len(),
        })
        .collect();
    sessions.sort_by(|a, b| a.code.cmp(&b.code));

    Ok(Json(SessionListResponse {
        count: sessions.len(),
        sessions,
    }))
}
