//! Router assembly and shared application state.

use crate::config::Config;
use crate::events::EventPublisher;
use crate::handlers::{codes, devices, free_mode, health, sessions};
use crate::repositories::SqlAccountDirectory;
use crate::services::{Gatekeeper, Matchmaker};
use crate::store::SessionStore;
use axum::{
    routing::{delete, get, post},
    Router,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub store: Arc<SessionStore>,
    pub events: EventPublisher,
    pub matchmaker: Arc<Matchmaker>,
    pub gatekeeper: Arc<Gatekeeper>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(SessionStore::new());
        let events = EventPublisher::default();

        let matchmaker = Arc::new(Matchmaker::new(
            pool.clone(),
            Arc::clone(&store),
            events.clone(),
            config.session_ttl,
            config.code_length,
        ));
        let gatekeeper = Arc::new(Gatekeeper::new(
            pool.clone(),
            Arc::new(SqlAccountDirectory::new(pool.clone())),
            config.free_cooldown,
        ));

        AppState {
            pool,
            config,
            store,
            events,
            matchmaker,
            gatekeeper,
            started_at: Instant::now(),
        }
    }
}

/// Build the full application router.
pub fn build_routes(state: AppState) -> Router {
    Router::new()
        .route("/register", post(sessions::register))
        .route("/register/:code", delete(sessions::delete_session))
        .route("/resolve", get(sessions::resolve))
        .route(
            "/answer",
            post(sessions::submit_answer).get(sessions::fetch_answer),
        )
        .route("/heartbeat", post(devices::heartbeat))
        .route("/disconnect", post(devices::disconnect))
        .route("/api/generate-code", get(codes::generate_code))
        .route("/api/check-code", get(codes::check_code))
        .route("/api/validate-account", post(free_mode::validate_account))
        .route("/api/end-free-session", post(free_mode::end_free_session))
        .route("/health", get(health::health))
        .route("/sessions", get(health::list_sessions))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}
