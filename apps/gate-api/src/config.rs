use std::str::FromStr;
use std::time::Duration;

use crate::templates::{
    DefaultTemplates, DEFAULT_APPROVAL_TEMPLATE, DEFAULT_APPROVAL_TIMEOUT_HOURS,
    DEFAULT_WELCOME_TEMPLATE,
};

/// Gate API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Upper bound on pooled database connections.
    pub db_pool_size: usize,
    /// Snowflake worker id for request ids. Distinct per running instance.
    pub worker_id: u16,
    /// Seconds between background sweeps. `None` disables the sweeper.
    pub sweep_interval: Option<Duration>,
    /// Templates and timeout for channels without their own settings.
    pub defaults: DefaultTemplates,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing
    /// or a numeric variable does not parse.
    pub fn from_env() -> Self {
        let sweep_secs: u64 = parsed_var("SWEEP_INTERVAL_SECS", 60);
        let timeout_hours: i32 =
            parsed_var("DEFAULT_APPROVAL_TIMEOUT_HOURS", DEFAULT_APPROVAL_TIMEOUT_HOURS);
        if timeout_hours <= 0 {
            panic!("DEFAULT_APPROVAL_TIMEOUT_HOURS must be a positive number of hours");
        }

        Self {
            database_url: required_var("DATABASE_URL"),
            port: parsed_var("PORT", 4010),
            db_pool_size: parsed_var("DB_POOL_SIZE", 10),
            worker_id: parsed_var("WORKER_ID", 0),
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            defaults: DefaultTemplates {
                welcome: text_var("DEFAULT_WELCOME_TEMPLATE", DEFAULT_WELCOME_TEMPLATE),
                approval: text_var("DEFAULT_APPROVAL_TEMPLATE", DEFAULT_APPROVAL_TEMPLATE),
                timeout_hours,
            },
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{name} env var is not a valid number: {raw}")),
        _ => default,
    }
}

fn text_var(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
