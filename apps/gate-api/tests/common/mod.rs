use std::sync::{Arc, OnceLock};

use axum::Router;
use chrono::Utc;
use gatekeeper_common::SnowflakeGenerator;
use http::HeaderName;

use gate_api::db::channels::{ChannelRegistry, PgChannelRegistry};
use gate_api::db::memory::{MemoryChannelRegistry, MemoryRequestStore};
use gate_api::db::migrate::with_test_db_suffix;
use gate_api::db::requests::{PgRequestStore, RequestStore};
use gate_api::templates::DefaultTemplates;
use gate_api::AppState;

pub const ADMIN: &str = "1000";

pub fn admin_header() -> HeaderName {
    HeaderName::from_static(gate_api::admin::ADMIN_ID_HEADER)
}

/// In-memory store and registry sharing one snowflake generator.
pub fn memory_backends() -> (Arc<MemoryRequestStore>, Arc<MemoryChannelRegistry>) {
    let registry = Arc::new(MemoryChannelRegistry::new());
    let ids = Arc::new(SnowflakeGenerator::new(1));
    let requests = Arc::new(MemoryRequestStore::new(registry.clone(), ids));
    (requests, registry)
}

/// Build a test AppState backed by the in-memory store and registry.
pub fn test_state() -> AppState {
    let (requests, registry) = memory_backends();
    AppState::new(requests, registry, DefaultTemplates::default())
}

/// Build the full application router wired to the test state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = gate_api::routes::router().with_state(state.clone());
    (app, state)
}

/// Bootstrap `ADMIN` and register a channel managed by it.
pub async fn setup_channel(state: &AppState, channel_id: &str, title: &str) {
    state
        .registry
        .bootstrap_if_empty(ADMIN, Utc::now())
        .await
        .expect("bootstrap admin");
    state
        .registry
        .register_channel(channel_id, title, ADMIN, Utc::now())
        .await
        .expect("register channel");
}

/// Ids that stay unique across tests sharing one database.
pub fn unique_id(prefix: &str) -> String {
    static IDS: OnceLock<SnowflakeGenerator> = OnceLock::new();
    let id = IDS.get_or_init(|| SnowflakeGenerator::new(900)).generate();
    format!("{prefix}-{id}")
}

/// PostgreSQL-backed store and registry on the `_test` database. `None` when
/// `DATABASE_URL` is not configured. Run `gate-migrate -- --test` first.
pub async fn pg_backends() -> Option<(Arc<dyn RequestStore>, Arc<dyn ChannelRegistry>)> {
    let env_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(env_path);

    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping PostgreSQL test");
        return None;
    };
    let database_url = with_test_db_suffix(&database_url);

    let db = gate_api::db::pool::connect(&database_url, 4).await;
    let ids = Arc::new(SnowflakeGenerator::new(2));

    let requests: Arc<dyn RequestStore> = Arc::new(PgRequestStore::new(db.clone(), ids));
    let registry: Arc<dyn ChannelRegistry> = Arc::new(PgChannelRegistry::new(db));
    Some((requests, registry))
}
