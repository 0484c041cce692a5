//! Liveness sweepers.
//!
//! Two independent periodic duties, each idempotent and safe to run
//! alongside request handlers:
//!
//! 1. Session expiry: evict non-fixed session records whose
//!    `last_access_at` is older than the TTL and publish an `expired`
//!    event per removal.
//! 2. Device offline detection: flip `is_online` off for devices whose
//!    last heartbeat is older than the staleness threshold.
//!
//! Both compare monotonic timestamps only, so a delayed or skipped tick
//! never causes incorrect evictions.

use crate::events::{EventPublisher, SessionEventKind};
use crate::repositories::DevicesRepository;
use crate::store::SessionStore;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawn the session-expiry sweeper. Runs until the token is cancelled.
pub fn start_session_sweeper(
    store: Arc<SessionStore>,
    events: EventPublisher,
    session_ttl: Duration,
    interval: Duration,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            target: "mm.tasks.sweeper",
            interval_ms = interval.as_millis() as u64,
            ttl_ms = session_ttl.as_millis() as u64,
            "Session sweeper started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh store is not
        // swept at startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep_sessions(&store, &events, session_ttl);
                }
                _ = cancellation_token.cancelled() => {
                    tracing::info!(target: "mm.tasks.sweeper", "Session sweeper stopping");
                    break;
                }
            }
        }
    })
}

fn sweep_sessions(store: &SessionStore, events: &EventPublisher, session_ttl: Duration) {
    match store.evict_expired(session_ttl, Utc::now()) {
        Ok(evicted) => {
            for code in &evicted {
                events.publish(SessionEventKind::Expired, code);
                tracing::info!(target: "mm.tasks.sweeper", code = %code, "Session expired");
            }
            if !evicted.is_empty() {
                tracing::debug!(
                    target: "mm.tasks.sweeper",
                    count = evicted.len(),
                    "Expired sessions evicted"
                );
            }
        }
        Err(e) => {
            tracing::error!(target: "mm.tasks.sweeper", error = %e, "Session sweep failed");
        }
    }
}

/// Spawn the device offline sweeper. Runs until the token is cancelled.
pub fn start_offline_sweeper(
    pool: SqlitePool,
    offline_threshold: Duration,
    interval: Duration,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            target: "mm.tasks.sweeper",
            interval_ms = interval.as_millis() as u64,
            threshold_ms = offline_threshold.as_millis() as u64,
            "Offline sweeper started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep_devices(&pool, offline_threshold).await;
                }
                _ = cancellation_token.cancelled() => {
                    tracing::info!(target: "mm.tasks.sweeper", "Offline sweeper stopping");
                    break;
                }
            }
        }
    })
}

async fn sweep_devices(pool: &SqlitePool, offline_threshold: Duration) {
    let threshold_ms = offline_threshold.as_millis() as i64;
    match DevicesRepository::mark_offline_if_stale(pool, Utc::now(), threshold_ms).await {
        Ok(0) => {}
        Ok(count) => {
            tracing::info!(target: "mm.tasks.sweeper", count = count, "Devices marked offline");
        }
        Err(e) => {
            tracing::error!(target: "mm.tasks.sweeper", error = %e, "Offline sweep failed");
        }
    }
}
