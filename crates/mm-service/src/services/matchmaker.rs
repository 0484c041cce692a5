//! Matchmaker façade.
//!
//! The operation set web handlers call: register, resolve, answer,
//! heartbeat, disconnect, delete. Composes the in-memory session store
//! with the durable device registry and publishes a lifecycle event after
//! each state transition.
//!
//! Codes are normalized (trimmed, upper-cased) at every entry point so
//! case variance never creates a split-brain duplicate.

use crate::codes::{self, normalize_code};
use crate::errors::MmError;
use crate::events::{EventPublisher, SessionEventKind};
use crate::models::{HandshakePayload, IceCandidate, SessionDescription};
use crate::repositories::DevicesRepository;
use crate::store::{SessionRecord, SessionStore};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Register call input, already validated by the handler.
#[derive(Debug)]
pub struct RegisterInput {
    pub code: Option<String>,
    /// Owning account reference; required for fixed registrations.
    pub account_ref: Option<String>,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    /// Claim a fixed device code instead of a short-lived dynamic one.
    pub fixed: bool,
    pub handshake: HandshakePayload,
}

/// Outcome of a successful registration.
#[derive(Debug)]
pub struct Registration {
    pub code: String,
    pub is_fixed: bool,
    /// TTL for dynamic codes; fixed codes do not expire.
    pub expires_in: Option<Duration>,
}

/// The resolved host half of a handshake.
#[derive(Debug)]
pub struct ResolvedOffer {
    pub code: String,
    pub offer: SessionDescription,
    pub ice_candidates: Vec<IceCandidate>,
    pub ice_servers: Vec<crate::models::IceServer>,
}

/// The viewer half of a handshake, once submitted.
#[derive(Debug)]
pub struct FetchedAnswer {
    pub answer: SessionDescription,
    pub ice_candidates: Vec<IceCandidate>,
}

/// Session relay façade.
pub struct Matchmaker {
    pool: SqlitePool,
    store: Arc<SessionStore>,
    events: EventPublisher,
    session_ttl: Duration,
    code_length: usize,
}

impl Matchmaker {
    pub fn new(
        pool: SqlitePool,
        store: Arc<SessionStore>,
        events: EventPublisher,
        session_ttl: Duration,
        code_length: usize,
    ) -> Self {
        Matchmaker {
            pool,
            store,
            events,
            session_ttl,
            code_length,
        }
    }

    /// True when the code is live in either tier (session store or device
    /// registry). Used for collision checks before handing out a code.
    pub async fn is_code_taken(&self, code: &str) -> Result<bool, MmError> {
        if self.store.contains(code)? {
            return Ok(true);
        }
        Ok(DevicesRepository::find_by_code(&self.pool, code)
            .await?
            .is_some())
    }

    /// Register a host's offer under an access code.
    ///
    /// Fixed path: the device registry enforces the ownership rule (first
    /// account to claim a code owns it permanently; re-registration by the
    /// owner overwrites the handshake), then the store mirrors the record.
    /// Dynamic path: an explicit code replaces any previous session under
    /// it (host restart), a missing code is generated collision-free.
    #[instrument(skip_all, fields(fixed = input.fixed))]
    pub async fn register(&self, input: RegisterInput) -> Result<Registration, MmError> {
        let now = Utc::now();

        if input.fixed {
            let account_ref = input
                .account_ref
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    MmError::Validation("clientId is required for a fixed code".to_string())
                })?;

            let code = match input.code.as_deref().map(normalize_code) {
                Some(code) if !code.is_empty() => {
                    DevicesRepository::upsert(
                        &self.pool,
                        &code,
                        account_ref,
                        input.device_name.as_deref(),
                        input.ip_address.as_deref(),
                        &input.handshake,
                        now,
                    )
                    .await?;

                    self.store.insert_or_replace(SessionRecord::new(
                        code.clone(),
                        input.handshake,
                        Some(account_ref.to_string()),
                        true,
                        now,
                    ))?;
                    code
                }
                _ => {
                    let code = self
                        .claim_generated_code(self.code_length, |code| {
                            SessionRecord::new(
                                code.to_string(),
                                input.handshake.clone(),
                                Some(account_ref.to_string()),
                                true,
                                now,
                            )
                        })
                        .await?;

                    // The store claim is released again if the registry
                    // write fails, so a failed registration holds nothing.
                    if let Err(e) = DevicesRepository::upsert(
                        &self.pool,
                        &code,
                        account_ref,
                        input.device_name.as_deref(),
                        input.ip_address.as_deref(),
                        &input.handshake,
                        now,
                    )
                    .await
                    {
                        self.store.remove(&code)?;
                        return Err(e);
                    }
                    code
                }
            };

            self.events.publish(SessionEventKind::Registered, &code);
            tracing::info!(target: "mm.matchmaker", code = %code, "Fixed code registered");

            return Ok(Registration {
                code,
                is_fixed: true,
                expires_in: None,
            });
        }

        let code = match input.code.as_deref().map(normalize_code) {
            Some(code) if !code.is_empty() => {
                // An explicit dynamic code must not collide with a fixed
                // device code owned by someone else.
                if let Some(device) = DevicesRepository::find_by_code(&self.pool, &code).await? {
                    if input.account_ref.as_deref() != Some(device.account_ref.as_str()) {
                        return Err(MmError::CodeInUse(code));
                    }
                }

                // Re-registration under an explicit code replaces the
                // previous session (host restart).
                self.store.insert_or_replace(SessionRecord::new(
                    code.clone(),
                    input.handshake,
                    input.account_ref,
                    false,
                    now,
                ))?;
                code
            }
            _ => {
                self.claim_generated_code(self.code_length, |code| {
                    SessionRecord::new(
                        code.to_string(),
                        input.handshake.clone(),
                        input.account_ref.clone(),
                        false,
                        now,
                    )
                })
                .await?
            }
        };

        self.events.publish(SessionEventKind::Registered, &code);
        tracing::info!(target: "mm.matchmaker", code = %code, "Host registered");

        Ok(Registration {
            code,
            is_fixed: false,
            expires_in: Some(self.session_ttl),
        })
    }

    /// Generate a code and claim it in the session store in one step.
    ///
    /// Each candidate is inserted with `insert_new`, so the availability
    /// check and the insert share one lock acquisition; a concurrent claim
    /// of the same candidate surfaces as `CodeInUse` and costs one retry
    /// instead of clobbering the other registration's record. Codes held
    /// by the device registry are skipped up front.
    async fn claim_generated_code(
        &self,
        length: usize,
        build_record: impl Fn(&str) -> SessionRecord,
    ) -> Result<String, MmError> {
        for _ in 0..codes::MAX_CODE_ATTEMPTS {
            let candidate = codes::generate_code(length)?;
            if DevicesRepository::find_by_code(&self.pool, &candidate)
                .await?
                .is_some()
            {
                continue;
            }
            match self.store.insert_new(build_record(&candidate)) {
                Ok(()) => return Ok(candidate),
                Err(MmError::CodeInUse(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        tracing::error!(
            target: "mm.matchmaker",
            attempts = codes::MAX_CODE_ATTEMPTS,
            length = length,
            "Code space exhausted"
        );
        Err(MmError::ExhaustedCodeSpace(codes::MAX_CODE_ATTEMPTS))
    }

    /// Look up the host offer for a code.
    ///
    /// Two-tier lookup: session store first; on miss, an *online* fixed
    /// device rehydrates a session record from its last handshake, and the
    /// record is written back so subsequent reads stay in-memory.
    #[instrument(skip_all)]
    pub async fn resolve(&self, raw_code: &str) -> Result<ResolvedOffer, MmError> {
        let code = normalize_code(raw_code);
        let now = Utc::now();

        let record = match self.store.touch_and_get(&code, now)? {
            Some(record) => record,
            None => {
                let device = DevicesRepository::find_by_code(&self.pool, &code)
                    .await?
                    .filter(|d| d.is_online)
                    .ok_or_else(|| MmError::CodeNotFound(code.clone()))?;

                if device.last_handshake.offer.sdp.is_empty() {
                    return Err(MmError::OfferNotReady(code));
                }

                let record = SessionRecord::new(
                    code.clone(),
                    device.last_handshake,
                    Some(device.account_ref),
                    true,
                    now,
                );
                self.store.insert_or_replace(record.clone())?;
                tracing::debug!(
                    target: "mm.matchmaker",
                    code = %code,
                    "Session rehydrated from device registry"
                );
                record
            }
        };

        self.events.publish(SessionEventKind::Resolved, &code);
        tracing::info!(target: "mm.matchmaker", code = %code, "Viewer resolved code");

        Ok(ResolvedOffer {
            code: record.code,
            offer: record.offer,
            ice_candidates: record.ice_candidates,
            ice_servers: record.ice_servers,
        })
    }

    /// Attach a viewer's answer to a live session. Last write wins.
    #[instrument(skip_all)]
    pub async fn submit_answer(
        &self,
        raw_code: &str,
        answer: SessionDescription,
        ice_candidates: Vec<IceCandidate>,
    ) -> Result<(), MmError> {
        let code = normalize_code(raw_code);

        if !self
            .store
            .submit_answer(&code, answer, ice_candidates, Utc::now())?
        {
            return Err(MmError::CodeNotFound(code));
        }

        self.events.publish(SessionEventKind::Answered, &code);
        tracing::info!(target: "mm.matchmaker", code = %code, "Viewer submitted answer");
        Ok(())
    }

    /// Fetch the viewer answer for a code.
    ///
    /// `AnswerNotReady` is the expected state while the host polls; callers
    /// retry rather than treat it as fatal.
    #[instrument(skip_all)]
    pub async fn fetch_answer(&self, raw_code: &str) -> Result<FetchedAnswer, MmError> {
        let code = normalize_code(raw_code);

        let record = self
            .store
            .touch_and_get(&code, Utc::now())?
            .ok_or_else(|| MmError::CodeNotFound(code.clone()))?;

        match record.answer {
            Some(answer) => Ok(FetchedAnswer {
                answer,
                ice_candidates: record.answer_ice_candidates,
            }),
            None => Err(MmError::AnswerNotReady(code)),
        }
    }

    /// Remove a session from the store. Idempotent; never touches the
    /// device registry.
    #[instrument(skip_all)]
    pub async fn delete(&self, raw_code: &str) -> Result<(), MmError> {
        let code = normalize_code(raw_code);

        if self.store.remove(&code)? {
            self.events.publish(SessionEventKind::Removed, &code);
            tracing::info!(target: "mm.matchmaker", code = %code, "Session removed");
        }
        Ok(())
    }

    /// Liveness signal for a code.
    ///
    /// Refreshes the live session's access time and, when the code names a
    /// registered device, its heartbeat. Unknown codes are not an error:
    /// hosts heartbeat through restarts and expiries.
    #[instrument(skip_all)]
    pub async fn heartbeat(&self, raw_code: &str) -> Result<(), MmError> {
        let code = normalize_code(raw_code);
        let now = Utc::now();

        let session_live = self.store.touch(&code, now)?;
        let device_known = DevicesRepository::heartbeat(&self.pool, &code, now).await?;

        tracing::debug!(
            target: "mm.matchmaker",
            code = %code,
            session_live = session_live,
            device_known = device_known,
            "Heartbeat"
        );
        Ok(())
    }

    /// Graceful shutdown signal from a host.
    ///
    /// Flips the device offline immediately and purges the cached fixed
    /// session record, so a stale offer is never served between the
    /// disconnect and the next offline sweep.
    #[instrument(skip_all)]
    pub async fn disconnect(&self, raw_code: &str) -> Result<(), MmError> {
        let code = normalize_code(raw_code);
        let now = Utc::now();

        DevicesRepository::disconnect(&self.pool, &code, now).await?;

        if self.store.remove_fixed(&code)? {
            self.events.publish(SessionEventKind::Removed, &code);
        }

        tracing::info!(target: "mm.matchmaker", code = %code, "Host disconnected");
        Ok(())
    }

    /// Generate a code currently free in both tiers, without claiming it.
    pub async fn generate_available_code(&self, length: usize) -> Result<String, MmError> {
        codes::generate_unique(length, |candidate| async move {
            self.is_code_taken(&candidate).await
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::repositories::init_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_matchmaker_with_length(code_length: usize) -> Matchmaker {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();

        Matchmaker::new(
            pool,
            Arc::new(SessionStore::new()),
            EventPublisher::new(256),
            Duration::from_millis(300_000),
            code_length,
        )
    }

    async fn test_matchmaker() -> Matchmaker {
        test_matchmaker_with_length(6).await
    }

    fn handshake(sdp: &str) -> HandshakePayload {
        HandshakePayload {
            offer: SessionDescription {
                kind: "offer".to_string(),
                sdp: sdp.to_string(),
            },
            ice_candidates: Vec::new(),
            ice_servers: Vec::new(),
        }
    }

    fn dynamic_input(code: Option<&str>, sdp: &str) -> RegisterInput {
        RegisterInput {
            code: code.map(str::to_string),
            account_ref: None,
            device_name: None,
            ip_address: None,
            fixed: false,
            handshake: handshake(sdp),
        }
    }

    fn fixed_input(code: &str, account: &str, sdp: &str) -> RegisterInput {
        RegisterInput {
            code: Some(code.to_string()),
            account_ref: Some(account.to_string()),
            device_name: None,
            ip_address: None,
            fixed: true,
            handshake: handshake(sdp),
        }
    }

    #[tokio::test]
    async fn test_register_resolve_answer_cycle_case_insensitive() {
        let mm = test_matchmaker().await;

        let registration = mm
            .register(dynamic_input(Some("ABC123"), "O1"))
            .await
            .unwrap();
        assert_eq!(registration.code, "ABC123");
        assert!(!registration.is_fixed);
        assert_eq!(registration.expires_in, Some(Duration::from_millis(300_000)));

        let resolved = mm.resolve("abc123").await.unwrap();
        assert_eq!(resolved.code, "ABC123");
        assert_eq!(resolved.offer.sdp, "O1");

        mm.submit_answer(
            "ABC123",
            SessionDescription {
                kind: "answer".to_string(),
                sdp: "A1".to_string(),
            },
            Vec::new(),
        )
        .await
        .unwrap();

        let fetched = mm.fetch_answer("ABC123").await.unwrap();
        assert_eq!(fetched.answer.sdp, "A1");
    }

    #[tokio::test]
    async fn test_register_generates_code_when_absent() {
        let mm = test_matchmaker().await;

        let registration = mm.register(dynamic_input(None, "O1")).await.unwrap();
        assert_eq!(registration.code.len(), 6);
        assert!(mm.resolve(&registration.code).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_generated_registrations_claim_distinct_codes() {
        // 40 concurrent registrations against a 32-code space: every
        // success must hold a distinct code backed by its own record, and
        // the losers fail with exhaustion instead of sharing a code.
        let mm = Arc::new(test_matchmaker_with_length(1).await);

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..40 {
            let mm = Arc::clone(&mm);
            tasks.spawn(async move { mm.register(dynamic_input(None, &format!("O{i}"))).await });
        }

        let mut claimed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined.unwrap() {
                Ok(registration) => claimed.push(registration.code),
                Err(MmError::ExhaustedCodeSpace(_)) => {}
                Err(e) => panic!("unexpected registration error: {e}"),
            }
        }

        let mut unique = claimed.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), claimed.len());
        assert_eq!(mm.store.len().unwrap(), claimed.len());
    }

    #[tokio::test]
    async fn test_generated_code_exhaustion_never_replaces_live_sessions() {
        let mm = test_matchmaker_with_length(1).await;

        // Fill the entire single-symbol code space.
        for &symbol in codes::CODE_ALPHABET {
            mm.store
                .insert_or_replace(SessionRecord::new(
                    (symbol as char).to_string(),
                    handshake("orig"),
                    None,
                    false,
                    Utc::now(),
                ))
                .unwrap();
        }

        let result = mm.register(dynamic_input(None, "clobber")).await;
        assert!(matches!(result, Err(MmError::ExhaustedCodeSpace(_))));

        // Every live record survived with its original offer.
        for &symbol in codes::CODE_ALPHABET {
            let record = mm
                .store
                .touch_and_get(&(symbol as char).to_string(), Utc::now())
                .unwrap()
                .unwrap();
            assert_eq!(record.offer.sdp, "orig");
        }
    }

    #[tokio::test]
    async fn test_fixed_registration_generates_code_when_absent() {
        let mm = test_matchmaker().await;

        let registration = mm
            .register(RegisterInput {
                code: None,
                account_ref: Some("acct-a".to_string()),
                device_name: None,
                ip_address: None,
                fixed: true,
                handshake: handshake("O1"),
            })
            .await
            .unwrap();
        assert!(registration.is_fixed);
        assert_eq!(registration.code.len(), 6);

        let device = DevicesRepository::find_by_code(&mm.pool, &registration.code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(device.account_ref, "acct-a");
    }

    #[tokio::test]
    async fn test_register_normalizes_requested_code() {
        let mm = test_matchmaker().await;

        let registration = mm
            .register(dynamic_input(Some("  abc123 "), "O1"))
            .await
            .unwrap();
        assert_eq!(registration.code, "ABC123");
    }

    #[tokio::test]
    async fn test_reregister_same_dynamic_code_overwrites() {
        let mm = test_matchmaker().await;

        mm.register(dynamic_input(Some("ABC123"), "O1"))
            .await
            .unwrap();
        mm.register(dynamic_input(Some("ABC123"), "O2"))
            .await
            .unwrap();

        let resolved = mm.resolve("ABC123").await.unwrap();
        assert_eq!(resolved.offer.sdp, "O2");
    }

    #[tokio::test]
    async fn test_fetch_answer_before_submit_is_not_ready() {
        let mm = test_matchmaker().await;
        mm.register(dynamic_input(Some("ABC123"), "O1"))
            .await
            .unwrap();

        let result = mm.fetch_answer("ABC123").await;
        assert!(matches!(result, Err(MmError::AnswerNotReady(_))));
    }

    #[tokio::test]
    async fn test_resolve_unknown_code() {
        let mm = test_matchmaker().await;
        let result = mm.resolve("NOPE99").await;
        assert!(matches!(result, Err(MmError::CodeNotFound(_))));
    }

    #[tokio::test]
    async fn test_fixed_registration_conflict_and_idempotence() {
        let mm = test_matchmaker().await;

        let registration = mm
            .register(fixed_input("FIX01", "acct-a", "O1"))
            .await
            .unwrap();
        assert!(registration.is_fixed);
        assert_eq!(registration.expires_in, None);

        let result = mm.register(fixed_input("FIX01", "acct-b", "O2")).await;
        assert!(matches!(result, Err(MmError::CodeInUse(_))));

        // Owner re-registration updates the payload in place.
        mm.register(fixed_input("FIX01", "acct-a", "O3"))
            .await
            .unwrap();
        let resolved = mm.resolve("FIX01").await.unwrap();
        assert_eq!(resolved.offer.sdp, "O3");
    }

    #[tokio::test]
    async fn test_fixed_registration_requires_account() {
        let mm = test_matchmaker().await;

        let input = RegisterInput {
            code: Some("FIX01".to_string()),
            account_ref: None,
            device_name: None,
            ip_address: None,
            fixed: true,
            handshake: handshake("O1"),
        };
        let result = mm.register(input).await;
        assert!(matches!(result, Err(MmError::Validation(_))));
    }

    #[tokio::test]
    async fn test_dynamic_code_cannot_shadow_foreign_device() {
        let mm = test_matchmaker().await;

        mm.register(fixed_input("FIX01", "acct-a", "O1"))
            .await
            .unwrap();

        let result = mm.register(dynamic_input(Some("FIX01"), "O2")).await;
        assert!(matches!(result, Err(MmError::CodeInUse(_))));
    }

    #[tokio::test]
    async fn test_resolve_rehydrates_evicted_fixed_session() {
        let mm = test_matchmaker().await;

        mm.register(fixed_input("FIX01", "acct-a", "O1"))
            .await
            .unwrap();

        // Simulate eviction of the cached record.
        mm.store.remove("FIX01").unwrap();
        assert!(!mm.store.contains("FIX01").unwrap());

        let resolved = mm.resolve("fix01").await.unwrap();
        assert_eq!(resolved.offer.sdp, "O1");

        // Rehydration wrote the record back for O(1) reads.
        assert!(mm.store.contains("FIX01").unwrap());
    }

    #[tokio::test]
    async fn test_resolve_offline_device_is_not_found() {
        let mm = test_matchmaker().await;

        mm.register(fixed_input("FIX01", "acct-a", "O1"))
            .await
            .unwrap();
        mm.disconnect("FIX01").await.unwrap();

        let result = mm.resolve("FIX01").await;
        assert!(matches!(result, Err(MmError::CodeNotFound(_))));
    }

    #[tokio::test]
    async fn test_disconnect_purges_cached_fixed_session() {
        let mm = test_matchmaker().await;

        mm.register(fixed_input("FIX01", "acct-a", "O1"))
            .await
            .unwrap();
        assert!(mm.store.contains("FIX01").unwrap());

        mm.disconnect("FIX01").await.unwrap();
        assert!(!mm.store.contains("FIX01").unwrap());
    }

    #[tokio::test]
    async fn test_heartbeat_revives_offline_device() {
        let mm = test_matchmaker().await;

        mm.register(fixed_input("FIX01", "acct-a", "O1"))
            .await
            .unwrap();
        mm.disconnect("FIX01").await.unwrap();

        mm.heartbeat("FIX01").await.unwrap();
        let device = DevicesRepository::find_by_code(&mm.pool, "FIX01")
            .await
            .unwrap()
            .unwrap();
        assert!(device.is_online);
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_code_is_ok() {
        let mm = test_matchmaker().await;
        mm.heartbeat("NOPE99").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_spares_registry() {
        let mm = test_matchmaker().await;

        mm.register(fixed_input("FIX01", "acct-a", "O1"))
            .await
            .unwrap();

        mm.delete("FIX01").await.unwrap();
        mm.delete("FIX01").await.unwrap();

        // The registry entry survives; the device is still online, so the
        // code still resolves via rehydration.
        assert!(mm.resolve("FIX01").await.is_ok());
    }

    #[tokio::test]
    async fn test_events_published_through_lifecycle() {
        let mm = test_matchmaker().await;
        let mut rx = mm.events.subscribe();

        mm.register(dynamic_input(Some("ABC123"), "O1"))
            .await
            .unwrap();
        mm.resolve("ABC123").await.unwrap();
        mm.delete("ABC123").await.unwrap();

        use crate::events::SessionEventKind::*;
        assert_eq!(rx.recv().await.unwrap().kind, Registered);
        assert_eq!(rx.recv().await.unwrap().kind, Resolved);
        assert_eq!(rx.recv().await.unwrap().kind, Removed);
    }
}
