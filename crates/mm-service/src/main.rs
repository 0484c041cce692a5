use mm_service::config::Config;
use mm_service::repositories::init_schema;
use mm_service::routes::{build_routes, AppState};
use mm_service::tasks::{start_offline_sweeper, start_session_sweeper};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mm_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Matchmaker");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Configuration loaded successfully");

    info!("Connecting to database...");
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    init_schema(&pool).await.map_err(|e| {
        error!("Failed to initialize schema: {}", e);
        e
    })?;

    info!("Database ready");

    let bind_address = config.bind_address.clone();
    let state = AppState::new(pool.clone(), config);

    // Background sweepers, cancelled on shutdown.
    let cancellation_token = CancellationToken::new();
    let session_sweeper = start_session_sweeper(
        Arc::clone(&state.store),
        state.events.clone(),
        state.config.session_ttl,
        state.config.cleanup_interval,
        cancellation_token.clone(),
    );
    let offline_sweeper = start_offline_sweeper(
        pool,
        state.config.offline_threshold,
        state.config.offline_sweep_interval,
        cancellation_token.clone(),
    );

    let app = build_routes(state);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Matchmaker listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    cancellation_token.cancel();
    let _ = session_sweeper.await;
    let _ = offline_sweeper.await;

    info!("Matchmaker stopped");
    Ok(())
}
