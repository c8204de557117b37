//! Standalone migration runner for gate-api.
//!
//! Usage:
//!   cargo run -p gate-api --bin gate-migrate
//!   cargo run -p gate-api --bin gate-migrate -- --test
//!
//! Reads DATABASE_URL from the environment (or .env via dotenvy).

use std::path::Path;

use gate_api::db::migrate::{run_pending, with_test_db_suffix};

fn main() {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    let mut database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL env var is required");

    if std::env::args().any(|arg| arg == "--test") {
        database_url = with_test_db_suffix(&database_url);
    }

    println!("Running pending migrations...");
    let applied = run_pending(&database_url).unwrap_or_else(|err| panic!("{err}"));

    if applied.is_empty() {
        println!("No pending migrations.");
    } else {
        for migration in &applied {
            println!("  Applied: {migration}");
        }
        println!("{} migration(s) applied.", applied.len());
    }
}
