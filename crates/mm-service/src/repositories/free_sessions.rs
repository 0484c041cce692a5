//! Free-mode trial session repository.
//!
//! Tracks trial sessions per hardware fingerprint. The partial unique
//! index on open sessions (`ended_at_ms IS NULL`) enforces the invariant
//! that at most one trial per fingerprint is active at a time, so races on
//! `open_trial` surface as a unique violation rather than double-counting.

use crate::errors::MmError;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

/// Repository for free-mode session tracking.
pub struct FreeSessionsRepository;

impl FreeSessionsRepository {
    /// Start time of the open trial for this fingerprint, if any.
    pub async fn find_open(
        pool: &SqlitePool,
        fingerprint: &str,
    ) -> Result<Option<DateTime<Utc>>, MmError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT started_at_ms FROM free_sessions
            WHERE fingerprint = ?1 AND ended_at_ms IS NULL
            "#,
        )
        .bind(fingerprint)
        .fetch_optional(pool)
        .await?;

        Ok(row.and_then(|(ms,)| DateTime::from_timestamp_millis(ms)))
    }

    /// End time of the most recently ended trial for this fingerprint.
    pub async fn latest_ended_at(
        pool: &SqlitePool,
        fingerprint: &str,
    ) -> Result<Option<DateTime<Utc>>, MmError> {
        let row: Option<(Option<i64>,)> = sqlx::query_as(
            r#"
            SELECT MAX(ended_at_ms) FROM free_sessions
            WHERE fingerprint = ?1 AND ended_at_ms IS NOT NULL
            "#,
        )
        .bind(fingerprint)
        .fetch_optional(pool)
        .await?;

        Ok(row
            .and_then(|(ms,)| ms)
            .and_then(DateTime::from_timestamp_millis))
    }

    /// Open a new trial session.
    ///
    /// Fails with `TrialAlreadyActive` if one is already open for this
    /// fingerprint; the unique index backstops concurrent opens.
    #[instrument(skip_all, fields(fingerprint = %fingerprint))]
    pub async fn open_trial(
        pool: &SqlitePool,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<(), MmError> {
        let result = sqlx::query(
            r#"
            INSERT INTO free_sessions (fingerprint, started_at_ms, ended_at_ms)
            VALUES (?1, ?2, NULL)
            "#,
        )
        .bind(fingerprint)
        .bind(now.timestamp_millis())
        .execute(pool)
        .await;

        match result {
            Ok(_) => {
                tracing::info!(
                    target: "mm.repository.free_sessions",
                    fingerprint = %fingerprint,
                    "Trial session opened"
                );
                Ok(())
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(MmError::TrialAlreadyActive)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Close the open trial session, if any. Idempotent no-op when none is
    /// open.
    #[instrument(skip_all, fields(fingerprint = %fingerprint))]
    pub async fn close_trial(
        pool: &SqlitePool,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, MmError> {
        let result = sqlx::query(
            r#"
            UPDATE free_sessions
            SET ended_at_ms = ?2
            WHERE fingerprint = ?1 AND ended_at_ms IS NULL
            "#,
        )
        .bind(fingerprint)
        .bind(now.timestamp_millis())
        .execute(pool)
        .await?;

        let closed = result.rows_affected() > 0;
        if closed {
            tracing::info!(
                target: "mm.repository.free_sessions",
                fingerprint = %fingerprint,
                "Trial session closed"
            );
        }
        Ok(closed)
    }
}
