use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use tracing::{debug, info};

use crate::error::ConfigError;

pub struct Config {
    pub generation_timeout: Duration,
    pub notice_ttl: Duration,
    pub session_file: PathBuf,
    pub auth_url: Option<String>,
    pub database_url: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            generation_timeout: Duration::from_secs(try_load(
                "GRADREQ_GENERATION_TIMEOUT_SECS",
                30u64,
            )?),
            notice_ttl: Duration::from_secs(try_load("GRADREQ_NOTICE_TTL_SECS", 5u64)?),
            session_file: optional("GRADREQ_SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".gradreq-session.json")),
            auth_url: optional("GRADREQ_AUTH_URL"),
            database_url: optional("DATABASE_URL"),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_secs(30),
            notice_ttl: Duration::from_secs(5),
            session_file: PathBuf::from(".gradreq-session.json"),
            auth_url: None,
            database_url: None,
        }
    }
}

fn optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            debug!("{key} not set");
            None
        }
    }
}

fn try_load<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
