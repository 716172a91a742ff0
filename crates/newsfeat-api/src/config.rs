//! Process configuration assembled from the environment.

use std::str::FromStr;

use newsfeat_core::defaults;
use newsfeat_core::{Error, Result};
use newsfeat_db::{PgConnectOptions, PoolConfig};
use newsfeat_inference::GrokConfig;
use newsfeat_jobs::QueueConfig;

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: PgConnectOptions,
    pub pool: PoolConfig,
    pub grok: GrokConfig,
    pub queue: QueueConfig,
    /// Tag stored with every extraction record.
    pub model_version: String,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DATABASE_URL` | built from `DATABASE_HOST/PORT/NAME/USER/PASSWORD` |
    /// | `XAI_API_KEY` | required |
    /// | `RABBITMQ_URL` | required |
    /// | `MODEL_VERSION` | `grok-beta` |
    /// | `HOST` | `0.0.0.0` |
    /// | `PORT` | 8000 |
    ///
    /// Every missing required variable is reported in a single error.
    pub fn from_env() -> Result<Self> {
        let lookup = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let missing = missing_required(lookup);
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            database: database_options(lookup)?,
            pool: PoolConfig::from_env(),
            grok: GrokConfig::from_env()?,
            queue: QueueConfig::from_env()?,
            model_version: lookup("MODEL_VERSION")
                .unwrap_or_else(|| defaults::MODEL_VERSION.to_string()),
            host: lookup("HOST").unwrap_or_else(|| defaults::SERVER_HOST.to_string()),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults::SERVER_PORT),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

const DATABASE_PARTS: [&str; 4] = [
    "DATABASE_HOST",
    "DATABASE_NAME",
    "DATABASE_USER",
    "DATABASE_PASSWORD",
];

/// Names of required variables that are not set.
pub fn missing_required<F>(lookup: F) -> Vec<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = Vec::new();
    if lookup("DATABASE_URL").is_none() {
        missing.extend(DATABASE_PARTS.iter().filter(|name| lookup(**name).is_none()));
    }
    for name in ["XAI_API_KEY", "RABBITMQ_URL"] {
        if lookup(name).is_none() {
            missing.push(name);
        }
    }
    missing
}

/// `DATABASE_URL`, or connect options assembled from its parts.
///
/// Parts are set field by field, so reserved URL characters in the password
/// or user name need no escaping.
pub fn database_options<F>(lookup: F) -> Result<PgConnectOptions>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("DATABASE_URL") {
        return PgConnectOptions::from_str(&url)
            .map_err(|e| Error::Config(format!("invalid DATABASE_URL: {}", e)));
    }

    let part = |name: &'static str| {
        lookup(name).ok_or_else(|| Error::Config(format!("{} is not set", name)))
    };
    let port = match lookup("DATABASE_PORT") {
        Some(p) => p
            .parse::<u16>()
            .map_err(|_| Error::Config(format!("DATABASE_PORT is not a port: {}", p)))?,
        None => defaults::DATABASE_PORT,
    };

    Ok(PgConnectOptions::new()
        .host(&part("DATABASE_HOST")?)
        .port(port)
        .username(&part("DATABASE_USER")?)
        .password(&part("DATABASE_PASSWORD")?)
        .database(&part("DATABASE_NAME")?))
}
