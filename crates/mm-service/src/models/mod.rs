//! Matchmaker data models.
//!
//! Domain types for the handshake relay plus the wire DTOs used by the HTTP
//! handlers. Wire field names are camelCase to match the deployed client
//! protocol; codes are case-insensitive on input and upper-case on output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One half of a media-session negotiation (an SDP offer or answer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// "offer" or "answer".
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
}

/// A connectivity option proposed by one side for the direct connection.
///
/// Treated as opaque by the relay; only `candidate` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u32>,
}

/// A STUN/TURN server advertised by the host for the viewer to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay: Option<String>,
}

/// The host-published half of a handshake: offer plus ICE data.
///
/// Stored verbatim in a session record and, for fixed codes, persisted as
/// the device's last-known handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakePayload {
    pub offer: SessionDescription,
    pub ice_candidates: Vec<IceCandidate>,
    pub ice_servers: Vec<IceServer>,
}

// ============================================================================
// Request DTOs
// ============================================================================

/// SDP payload as it arrives on the wire: `type` may be omitted and `sdp`
/// must be validated by the handler (missing sdp is a 400, not a 422).
#[derive(Debug, Clone, Deserialize)]
pub struct SdpPayload {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub sdp: Option<String>,
}

impl SdpPayload {
    /// Convert into a domain description, defaulting the type field.
    /// Returns `None` when the sdp body is missing or empty.
    pub fn into_description(self, default_kind: &str) -> Option<SessionDescription> {
        let sdp = self.sdp.filter(|s| !s.is_empty())?;
        Some(SessionDescription {
            kind: self.kind.unwrap_or_else(|| default_kind.to_string()),
            sdp,
        })
    }
}

/// `POST /register` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub code: Option<String>,
    /// Owning account / company code. Optional for dynamic sessions,
    /// required when registering a fixed service code.
    pub client_id: Option<String>,
    pub offer: Option<SdpPayload>,
    #[serde(default)]
    pub ice_candidates: Vec<IceCandidate>,
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,
    /// True for service-mode hosts registering a fixed device code.
    #[serde(default)]
    pub is_service: bool,
    pub device_name: Option<String>,
}

/// `POST /answer` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    pub code: Option<String>,
    pub answer: Option<SdpPayload>,
    #[serde(default)]
    pub ice_candidates: Vec<IceCandidate>,
}

/// `POST /heartbeat` and `POST /disconnect` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRequest {
    pub code: Option<String>,
    #[allow(dead_code)] // Accepted for wire compatibility, not used by the core
    pub client_id: Option<String>,
}

/// `POST /api/validate-account` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateAccountRequest {
    pub company_code: Option<String>,
    pub disk_serial: Option<String>,
}

/// `POST /api/end-free-session` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndFreeSessionRequest {
    pub disk_serial: Option<String>,
}

// ============================================================================
// Response DTOs
// ============================================================================

/// `POST /register` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub code: String,
    pub is_fixed_code: bool,
    pub success: bool,
    /// TTL for dynamic codes; `null` for fixed codes, which do not expire.
    pub expires_in_millis: Option<u64>,
}

/// `GET /resolve` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub code: String,
    pub offer: SessionDescription,
    pub ice_candidates: Vec<IceCandidate>,
    pub ice_servers: Vec<IceServer>,
}

/// `GET /answer` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    pub answer: SessionDescription,
    pub ice_candidates: Vec<IceCandidate>,
}

/// Generic `{success: true}` response body.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// `GET /api/generate-code` response.
#[derive(Debug, Serialize)]
pub struct GenerateCodeResponse {
    pub code: String,
    pub available: bool,
}

/// `GET /api/check-code` response.
#[derive(Debug, Serialize)]
pub struct CheckCodeResponse {
    pub code: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// `POST /api/validate-account` response.
///
/// Cooldown rejections are a 200 with `allowed: false` per the deployed
/// client contract, which also reads the legacy `mode` field.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateAccountResponse {
    pub allowed: bool,
    pub is_paid: bool,
    /// "paid" or "free".
    pub mode: &'static str,
    pub wait_minutes: i64,
    pub message: String,
}

/// `GET /health` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_sessions: usize,
    pub ttl_ms: u64,
    /// Seconds since process start.
    pub uptime: u64,
}

/// One entry in the `GET /sessions` debug listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub code: String,
    pub has_offer: bool,
    pub has_answer: bool,
    pub is_fixed: bool,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
    pub candidate_count: usize,
}

/// `GET /sessions` debug listing response.
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub count: usize,
    pub sessions: Vec<SessionSummary>,
}
