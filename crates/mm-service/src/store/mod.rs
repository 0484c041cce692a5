//! In-memory session store.
//!
//! Maps a normalized access code to the current handshake state for that
//! code. The whole map sits behind a single mutex: every mutation holds the
//! lock for the full check-then-set sequence, so two concurrent
//! registrations can never claim the same code and a reader never observes
//! a partially written record. Callers pass codes already normalized via
//! [`crate::codes::normalize_code`].

use crate::errors::MmError;
use crate::models::{HandshakePayload, IceCandidate, SessionDescription};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// One live handshake session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub code: String,
    pub offer: SessionDescription,
    pub ice_candidates: Vec<crate::models::IceCandidate>,
    pub ice_servers: Vec<crate::models::IceServer>,
    pub answer: Option<SessionDescription>,
    pub answer_ice_candidates: Vec<IceCandidate>,
    pub owner_account_ref: Option<String>,
    /// Mirrors a device-registry entry; fixed records are never TTL-evicted.
    pub is_fixed: bool,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Build a fresh, unanswered record from a host handshake.
    pub fn new(
        code: String,
        handshake: HandshakePayload,
        owner_account_ref: Option<String>,
        is_fixed: bool,
        now: DateTime<Utc>,
    ) -> Self {
        SessionRecord {
            code,
            offer: handshake.offer,
            ice_candidates: handshake.ice_candidates,
            ice_servers: handshake.ice_servers,
            answer: None,
            answer_ice_candidates: Vec::new(),
            owner_account_ref,
            is_fixed,
            created_at: now,
            last_access_at: now,
        }
    }
}

/// Code-keyed session map behind a single mutation lock.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<String, SessionRecord>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, SessionRecord>>, MmError> {
        self.inner
            .lock()
            .map_err(|_| MmError::Internal("Session store lock poisoned".to_string()))
    }

    /// True if a live record holds this code.
    pub fn contains(&self, code: &str) -> Result<bool, MmError> {
        Ok(self.lock()?.contains_key(code))
    }

    /// Insert a new record, failing with `CodeInUse` if the code is live.
    ///
    /// Check and insert happen under one lock acquisition.
    pub fn insert_new(&self, record: SessionRecord) -> Result<(), MmError> {
        let mut map = self.lock()?;
        if map.contains_key(&record.code) {
            return Err(MmError::CodeInUse(record.code));
        }
        map.insert(record.code.clone(), record);
        Ok(())
    }

    /// Insert or replace a record unconditionally.
    ///
    /// Used for host re-registration (same code, fresh handshake) and for
    /// write-back after registry rehydration.
    pub fn insert_or_replace(&self, record: SessionRecord) -> Result<(), MmError> {
        self.lock()?.insert(record.code.clone(), record);
        Ok(())
    }

    /// Fetch a record, refreshing its `last_access_at`.
    pub fn touch_and_get(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, MmError> {
        let mut map = self.lock()?;
        Ok(map.get_mut(code).map(|record| {
            record.last_access_at = now;
            record.clone()
        }))
    }

    /// Refresh `last_access_at` without reading the record.
    pub fn touch(&self, code: &str, now: DateTime<Utc>) -> Result<bool, MmError> {
        let mut map = self.lock()?;
        match map.get_mut(code) {
            Some(record) => {
                record.last_access_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Attach an answer to a live session. Last write wins: a second answer
    /// replaces the first, matching the deployed relay behavior.
    ///
    /// Returns false when no live session holds the code.
    pub fn submit_answer(
        &self,
        code: &str,
        answer: SessionDescription,
        ice_candidates: Vec<IceCandidate>,
        now: DateTime<Utc>,
    ) -> Result<bool, MmError> {
        let mut map = self.lock()?;
        match map.get_mut(code) {
            Some(record) => {
                record.answer = Some(answer);
                record.answer_ice_candidates = ice_candidates;
                record.last_access_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove a record. Idempotent; reports whether one existed.
    pub fn remove(&self, code: &str) -> Result<bool, MmError> {
        Ok(self.lock()?.remove(code).is_some())
    }

    /// Remove a record only if it mirrors a fixed device code.
    ///
    /// Used on device disconnect so a stale offer is never served between
    /// the disconnect and the next offline sweep.
    pub fn remove_fixed(&self, code: &str) -> Result<bool, MmError> {
        let mut map = self.lock()?;
        if map.get(code).is_some_and(|r| r.is_fixed) {
            map.remove(code);
            return Ok(true);
        }
        Ok(false)
    }

    /// Evict every non-fixed record whose `last_access_at` is older than the
    /// TTL. Returns the evicted codes so the caller can publish events.
    pub fn evict_expired(&self, ttl: Duration, now: DateTime<Utc>) -> Result<Vec<String>, MmError> {
        let threshold = now
            - ChronoDuration::milliseconds(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));

        let mut map = self.lock()?;
        let expired: Vec<String> = map
            .values()
            .filter(|r| !r.is_fixed && r.last_access_at < threshold)
            .map(|r| r.code.clone())
            .collect();

        for code in &expired {
            map.remove(code);
        }

        Ok(expired)
    }

    /// Number of live sessions.
    pub fn len(&self) -> Result<usize, MmError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, MmError> {
        Ok(self.lock()?.is_empty())
    }

    /// Cloned view of every live record, for the debug listing.
    pub fn snapshot(&self) -> Result<Vec<SessionRecord>, MmError> {
        Ok(self.lock()?.values().cloned().collect())
    }
}
