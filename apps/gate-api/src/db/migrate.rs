//! Embedded schema migrations.

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::GateError;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

/// Apply pending migrations over a blocking connection. Returns the names of
/// the migrations that ran.
pub fn run_pending(database_url: &str) -> Result<Vec<String>, GateError> {
    let mut conn = PgConnection::establish(database_url)
        .map_err(|err| GateError::Storage(format!("failed to connect: {err}")))?;

    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| GateError::Storage(format!("failed to run migrations: {err}")))?;

    Ok(applied.iter().map(|m| m.to_string()).collect())
}

/// Point a database URL at its `_test` sibling database.
pub fn with_test_db_suffix(database_url: &str) -> String {
    let (base, query) = match database_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (database_url, None),
    };

    let Some((prefix, db_name)) = base.rsplit_once('/') else {
        return database_url.to_string();
    };

    if db_name.is_empty() || db_name.ends_with("_test") {
        return database_url.to_string();
    }

    let mut updated = format!("{prefix}/{db_name}_test");
    if let Some(query) = query {
        updated.push('?');
        updated.push_str(query);
    }
    updated
}
