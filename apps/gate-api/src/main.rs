use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use gatekeeper_common::SnowflakeGenerator;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gate_api::config::Config;
use gate_api::db::channels::{ChannelRegistry, PgChannelRegistry};
use gate_api::db::requests::{PgRequestStore, RequestStore};
use gate_api::lifecycle::sweeper;
use gate_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let db = gate_api::db::pool::connect(&config.database_url, config.db_pool_size).await;
    let ids = Arc::new(SnowflakeGenerator::new(config.worker_id));

    let requests: Arc<dyn RequestStore> = Arc::new(PgRequestStore::new(db.clone(), ids));
    let registry: Arc<dyn ChannelRegistry> = Arc::new(PgChannelRegistry::new(db));

    tracing::info!(
        worker_id = config.worker_id,
        default_timeout_hours = config.defaults.timeout_hours,
        "gate-api configured"
    );

    let state = AppState::new(requests, registry, config.defaults.clone());

    let sweeper = match config.sweep_interval {
        Some(period) => Some(sweeper::spawn(
            state.controller.clone(),
            state.outbox.clone(),
            period,
        )),
        None => {
            tracing::warn!("SWEEP_INTERVAL_SECS=0, expired requests are only swept on demand");
            None
        }
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(gate_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "gate-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    if let Some(handle) = sweeper {
        handle.abort();
    }
    tracing::info!("gate-api stopped");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
