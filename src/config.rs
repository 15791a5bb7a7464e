//! Process configuration, read from the environment (and `.env` via dotenvy in the binary).

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("{name} is not valid: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Without it the worker applies migrations and exits.
    pub nats_url: Option<String>,
    pub subject_prefix: String,
    pub event_subject: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let database_max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw.parse::<u32>().ok().filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid { name: "DATABASE_MAX_CONNECTIONS", value: raw })?,
            None => 10,
        };
        Ok(Self {
            database_url,
            database_max_connections,
            nats_url: get("NATS_URL"),
            subject_prefix: get("ECONOMICS_SUBJECT_PREFIX").unwrap_or_else(|| "economics".into()),
            event_subject: get("ECONOMICS_EVENT_SUBJECT").unwrap_or_else(|| "economics.events".into()),
        })
    }

    /// Full command subject, e.g. `economics.coupons.validate`.
    pub fn subject(&self, command: &str) -> String { format!("{}.{}", self.subject_prefix, command) }
}
