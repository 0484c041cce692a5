//! Repository layer.
//!
//! Durable state (device registry, free-mode sessions, account directory)
//! lives in SQLite via sqlx. All queries are parameterized; timestamps are
//! stored as epoch milliseconds and compared monotonically.

pub mod accounts;
pub mod devices;
pub mod free_sessions;

pub use accounts::{AccountDirectory, AccountStatus, SqlAccountDirectory};
pub use devices::{DeviceRecord, DevicesRepository};
pub use free_sessions::FreeSessionsRepository;

use crate::errors::MmError;
use sqlx::SqlitePool;

/// Create the durable schema if it does not exist.
///
/// The PRIMARY KEY on `device_code` is the storage-level uniqueness
/// guarantee behind the fixed-code conflict rule; the partial unique index
/// on `free_sessions` enforces at most one open trial per fingerprint.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), MmError> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            device_code TEXT PRIMARY KEY,
            account_ref TEXT NOT NULL,
            display_name TEXT,
            ip_address TEXT,
            is_online INTEGER NOT NULL DEFAULT 0,
            last_seen_at_ms INTEGER NOT NULL,
            offer_type TEXT NOT NULL,
            offer_sdp TEXT NOT NULL,
            ice_candidates TEXT NOT NULL,
            ice_servers TEXT NOT NULL,
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_devices_account_ref ON devices(account_ref)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS free_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fingerprint TEXT NOT NULL,
            started_at_ms INTEGER NOT NULL,
            ended_at_ms INTEGER
        )
        "#,
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_free_sessions_open
            ON free_sessions(fingerprint) WHERE ended_at_ms IS NULL
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_free_sessions_fingerprint
            ON free_sessions(fingerprint)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            account_code TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            display_name TEXT
        )
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!(target: "mm.repository", "Storage schema initialized");
    Ok(())
}
