//! Device registry repository.
//!
//! Durable mapping from a fixed access code to its owning account, its
//! online/offline status and the last handshake the device published.
//! Survives process restarts; entries leave only through explicit
//! administrative removal, never TTL.

use crate::errors::MmError;
use crate::models::{HandshakePayload, IceCandidate, IceServer, SessionDescription};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

/// A registered device.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub device_code: String,
    pub account_ref: String,
    pub display_name: Option<String>,
    pub is_online: bool,
    pub last_seen_at: DateTime<Utc>,
    /// Most recent handshake the device published; seeds a session record
    /// on resolve when no in-memory entry exists.
    pub last_handshake: HandshakePayload,
}

/// Database row shape for devices.
#[derive(sqlx::FromRow)]
struct DeviceRow {
    device_code: String,
    account_ref: String,
    display_name: Option<String>,
    is_online: i64,
    last_seen_at_ms: i64,
    offer_type: String,
    offer_sdp: String,
    ice_candidates: String,
    ice_servers: String,
}

impl DeviceRow {
    fn into_record(self) -> Result<DeviceRecord, MmError> {
        let ice_candidates: Vec<IceCandidate> = serde_json::from_str(&self.ice_candidates)
            .map_err(|e| MmError::Internal(format!("Corrupt ICE candidate payload: {e}")))?;
        let ice_servers: Vec<IceServer> = serde_json::from_str(&self.ice_servers)
            .map_err(|e| MmError::Internal(format!("Corrupt ICE server payload: {e}")))?;

        Ok(DeviceRecord {
            device_code: self.device_code,
            account_ref: self.account_ref,
            display_name: self.display_name,
            is_online: self.is_online != 0,
            last_seen_at: DateTime::from_timestamp_millis(self.last_seen_at_ms)
                .unwrap_or_default(),
            last_handshake: HandshakePayload {
                offer: SessionDescription {
                    kind: self.offer_type,
                    sdp: self.offer_sdp,
                },
                ice_candidates,
                ice_servers,
            },
        })
    }
}

/// Repository for device registry operations.
pub struct DevicesRepository;

impl DevicesRepository {
    /// Register or update a device (UPSERT).
    ///
    /// The first registering account owns the code permanently: an upsert
    /// under a different account fails with `CodeInUse` and changes
    /// nothing. Re-registration by the owner overwrites the stored
    /// handshake and flips the device online.
    ///
    /// Returns `true` when a new device row was created.
    #[instrument(skip_all, fields(device_code = %device_code, account_ref = %account_ref))]
    pub async fn upsert(
        pool: &SqlitePool,
        device_code: &str,
        account_ref: &str,
        display_name: Option<&str>,
        ip_address: Option<&str>,
        handshake: &HandshakePayload,
        now: DateTime<Utc>,
    ) -> Result<bool, MmError> {
        let ice_candidates = serde_json::to_string(&handshake.ice_candidates)
            .map_err(|e| MmError::Internal(format!("Failed to encode ICE candidates: {e}")))?;
        let ice_servers = serde_json::to_string(&handshake.ice_servers)
            .map_err(|e| MmError::Internal(format!("Failed to encode ICE servers: {e}")))?;
        let now_ms = now.timestamp_millis();

        // Conflict check and write share one transaction so a concurrent
        // claim of the same code serializes on the storage layer.
        let mut tx = pool.begin().await?;

        let existing_owner: Option<(String,)> =
            sqlx::query_as("SELECT account_ref FROM devices WHERE device_code = ?1")
                .bind(device_code)
                .fetch_optional(&mut *tx)
                .await?;

        let created = match existing_owner {
            Some((owner,)) if owner != account_ref => {
                tracing::warn!(
                    target: "mm.repository.devices",
                    device_code = %device_code,
                    "Fixed code claimed by another account"
                );
                return Err(MmError::CodeInUse(device_code.to_string()));
            }
            Some(_) => {
                sqlx::query(
                    r#"
                    UPDATE devices
                    SET
                        display_name = COALESCE(?2, display_name),
                        ip_address = COALESCE(?3, ip_address),
                        is_online = 1,
                        last_seen_at_ms = ?4,
                        offer_type = ?5,
                        offer_sdp = ?6,
                        ice_candidates = ?7,
                        ice_servers = ?8,
                        updated_at_ms = ?4
                    WHERE device_code = ?1
                    "#,
                )
                .bind(device_code)
                .bind(display_name)
                .bind(ip_address)
                .bind(now_ms)
                .bind(&handshake.offer.kind)
                .bind(&handshake.offer.sdp)
                .bind(&ice_candidates)
                .bind(&ice_servers)
                .execute(&mut *tx)
                .await?;
                false
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO devices (
                        device_code, account_ref, display_name, ip_address,
                        is_online, last_seen_at_ms,
                        offer_type, offer_sdp, ice_candidates, ice_servers,
                        created_at_ms, updated_at_ms
                    )
                    VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?7, ?8, ?9, ?5, ?5)
                    "#,
                )
                .bind(device_code)
                .bind(account_ref)
                .bind(display_name)
                .bind(ip_address)
                .bind(now_ms)
                .bind(&handshake.offer.kind)
                .bind(&handshake.offer.sdp)
                .bind(&ice_candidates)
                .bind(&ice_servers)
                .execute(&mut *tx)
                .await?;
                true
            }
        };

        tx.commit().await?;

        tracing::info!(
            target: "mm.repository.devices",
            device_code = %device_code,
            created = created,
            "Device registered/updated"
        );

        Ok(created)
    }

    /// Record a heartbeat: refresh `last_seen_at` and mark the device
    /// online. Cheap and idempotent; returns false if the code is not
    /// registered.
    #[instrument(skip_all, fields(device_code = %device_code))]
    pub async fn heartbeat(
        pool: &SqlitePool,
        device_code: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, MmError> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET is_online = 1, last_seen_at_ms = ?2, updated_at_ms = ?2
            WHERE device_code = ?1
            "#,
        )
        .bind(device_code)
        .bind(now.timestamp_millis())
        .execute(pool)
        .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            tracing::debug!(
                target: "mm.repository.devices",
                device_code = %device_code,
                "Heartbeat recorded"
            );
        }
        Ok(updated)
    }

    /// Graceful shutdown signal: flip the device offline immediately
    /// instead of waiting for the sweeper timeout.
    #[instrument(skip_all, fields(device_code = %device_code))]
    pub async fn disconnect(
        pool: &SqlitePool,
        device_code: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, MmError> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET is_online = 0, updated_at_ms = ?2
            WHERE device_code = ?1
            "#,
        )
        .bind(device_code)
        .bind(now.timestamp_millis())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark every online device whose last heartbeat is older than the
    /// threshold as offline. Called periodically by the sweeper.
    ///
    /// Returns the number of devices flipped offline.
    #[instrument(skip_all, fields(threshold_ms = threshold_ms))]
    pub async fn mark_offline_if_stale(
        pool: &SqlitePool,
        now: DateTime<Utc>,
        threshold_ms: i64,
    ) -> Result<u64, MmError> {
        let cutoff_ms = now.timestamp_millis().saturating_sub(threshold_ms);

        let result = sqlx::query(
            r#"
            UPDATE devices
            SET is_online = 0, updated_at_ms = ?2
            WHERE is_online != 0 AND last_seen_at_ms < ?1
            "#,
        )
        .bind(cutoff_ms)
        .bind(now.timestamp_millis())
        .execute(pool)
        .await?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::warn!(
                target: "mm.repository.devices",
                count = count,
                threshold_ms = threshold_ms,
                "Marked stale devices offline"
            );
        }
        Ok(count)
    }

    /// Look up a device by its code.
    #[instrument(skip_all, fields(device_code = %device_code))]
    pub async fn find_by_code(
        pool: &SqlitePool,
        device_code: &str,
    ) -> Result<Option<DeviceRecord>, MmError> {
        let row: Option<DeviceRow> = sqlx::query_as(
            r#"
            SELECT
                device_code, account_ref, display_name,
                is_online, last_seen_at_ms,
                offer_type, offer_sdp, ice_candidates, ice_servers
            FROM devices
            WHERE device_code = ?1
            "#,
        )
        .bind(device_code)
        .fetch_optional(pool)
        .await?;

        row.map(DeviceRow::into_record).transpose()
    }

    /// Administrative deletion. External trigger only; idempotent.
    #[instrument(skip_all, fields(device_code = %device_code))]
    pub async fn remove(pool: &SqlitePool, device_code: &str) -> Result<bool, MmError> {
        let result = sqlx::query("DELETE FROM devices WHERE device_code = ?1")
            .bind(device_code)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Number of currently online devices.
    pub async fn count_online(pool: &SqlitePool) -> Result<i64, MmError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM devices WHERE is_online != 0")
                .fetch_one(pool)
                .await?;
        Ok(count)
    }
}
