//! Free-mode admission control.
//!
//! Decides whether an unpaid caller may start a short trial session, based
//! on a per-device cooldown keyed by hardware fingerprint. Paid accounts
//! (resolved through the [`AccountDirectory`] collaborator) bypass the
//! gate entirely.

use crate::errors::MmError;
use crate::repositories::{AccountDirectory, AccountStatus, FreeSessionsRepository};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub allowed: bool,
    pub is_paid: bool,
    /// Minutes until the cooldown ends, rounded up for display.
    /// Zero when `allowed`.
    pub wait_minutes: i64,
}

/// Free-mode gatekeeper.
pub struct Gatekeeper {
    pool: SqlitePool,
    directory: Arc<dyn AccountDirectory>,
    cooldown: Duration,
}

impl Gatekeeper {
    pub fn new(pool: SqlitePool, directory: Arc<dyn AccountDirectory>, cooldown: Duration) -> Self {
        Gatekeeper {
            pool,
            directory,
            cooldown,
        }
    }

    /// Decide whether this fingerprint may start a trial right now.
    ///
    /// An active paying account always passes regardless of fingerprint
    /// history. Otherwise the most recently *ended* trial for the
    /// fingerprint drives the cooldown.
    #[instrument(skip_all, fields(fingerprint = %fingerprint))]
    pub async fn evaluate(
        &self,
        fingerprint: &str,
        account_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<GateDecision, MmError> {
        if let Some(code) = account_code.map(str::trim).filter(|c| !c.is_empty()) {
            if self.directory.lookup(code).await? == Some(AccountStatus::Paid) {
                tracing::debug!(target: "mm.gatekeeper", account = %code, "Paid account bypasses gate");
                return Ok(GateDecision {
                    allowed: true,
                    is_paid: true,
                    wait_minutes: 0,
                });
            }
        }

        let last_ended = FreeSessionsRepository::latest_ended_at(&self.pool, fingerprint).await?;

        let decision = match last_ended {
            Some(ended_at) => {
                let elapsed_ms = now.timestamp_millis() - ended_at.timestamp_millis();
                let cooldown_ms = self.cooldown.as_millis() as i64;
                if elapsed_ms >= cooldown_ms {
                    GateDecision {
                        allowed: true,
                        is_paid: false,
                        wait_minutes: 0,
                    }
                } else {
                    GateDecision {
                        allowed: false,
                        is_paid: false,
                        wait_minutes: ceil_minutes(cooldown_ms - elapsed_ms),
                    }
                }
            }
            None => GateDecision {
                allowed: true,
                is_paid: false,
                wait_minutes: 0,
            },
        };

        if !decision.allowed {
            tracing::info!(
                target: "mm.gatekeeper",
                fingerprint = %fingerprint,
                wait_minutes = decision.wait_minutes,
                "Trial denied: cooldown active"
            );
        }
        Ok(decision)
    }

    /// Evaluate and, for admitted unpaid callers, open the trial in one
    /// step. A denial surfaces as [`MmError::RateLimited`] carrying the
    /// wait time; the boundary decides how to present it.
    ///
    /// An already-open trial is not an error here: clients re-validate
    /// after transient failures without having ended their session.
    #[instrument(skip_all, fields(fingerprint = %fingerprint))]
    pub async fn admit(
        &self,
        fingerprint: &str,
        account_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<GateDecision, MmError> {
        let decision = self.evaluate(fingerprint, account_code, now).await?;
        if !decision.allowed {
            return Err(MmError::RateLimited {
                wait_minutes: decision.wait_minutes,
            });
        }

        if !decision.is_paid {
            match self.start_trial(fingerprint, now).await {
                Ok(()) | Err(MmError::TrialAlreadyActive) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(decision)
    }

    /// Open a trial for this fingerprint.
    ///
    /// Fails with `TrialAlreadyActive` when one is open; the partial
    /// unique index backstops a race past the pre-check.
    #[instrument(skip_all, fields(fingerprint = %fingerprint))]
    pub async fn start_trial(&self, fingerprint: &str, now: DateTime<Utc>) -> Result<(), MmError> {
        if FreeSessionsRepository::find_open(&self.pool, fingerprint)
            .await?
            .is_some()
        {
            return Err(MmError::TrialAlreadyActive);
        }
        FreeSessionsRepository::open_trial(&self.pool, fingerprint, now).await
    }

    /// Close the open trial for this fingerprint, starting its cooldown.
    /// Idempotent no-op when none is open.
    #[instrument(skip_all, fields(fingerprint = %fingerprint))]
    pub async fn end_trial(&self, fingerprint: &str, now: DateTime<Utc>) -> Result<(), MmError> {
        FreeSessionsRepository::close_trial(&self.pool, fingerprint, now).await?;
        Ok(())
    }
}

/// Round a millisecond interval up to whole minutes for display.
fn ceil_minutes(ms: i64) -> i64 {
    (ms + 59_999) / 60_000
}
