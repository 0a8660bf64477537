//! Service configuration loaded from environment variables.
//!
//! All settings have defaults so the services can start with zero
//! configuration for local development.

use std::path::PathBuf;
use std::time::Duration;

use tutorlink_shared::constants::{DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_MAX_CONFLICT_RETRIES};

/// Marketplace configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// SQLite database file.
    /// Env: `TUTORLINK_DB_PATH`
    /// Default: `None`, meaning the platform data directory.
    pub database_path: Option<PathBuf>,

    /// JSON rule catalogue replacing the built-in one.
    /// Env: `TUTORLINK_RULES_PATH`
    /// Default: `None` (built-in catalogue).
    pub rules_path: Option<PathBuf>,

    /// How often a write that keeps meeting a busy database, or a lost chat
    /// pair race, is attempted before it is reported as a conflict.
    /// Env: `TUTORLINK_MAX_RETRIES`
    /// Default: `3`
    pub max_conflict_retries: u32,

    /// How long SQLite waits for another connection's write lock.
    /// Env: `TUTORLINK_BUSY_TIMEOUT_MS`
    /// Default: `5000`
    pub busy_timeout_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            rules_path: None,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl CoreConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`CoreConfig::from_env`] with the variables supplied by `var`.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = var("TUTORLINK_DB_PATH").filter(|p| !p.is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Some(path) = var("TUTORLINK_RULES_PATH").filter(|p| !p.is_empty()) {
            config.rules_path = Some(PathBuf::from(path));
        }

        if let Some(val) = var("TUTORLINK_MAX_RETRIES") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.max_conflict_retries = n,
                _ => tracing::warn!(value = %val, "Invalid TUTORLINK_MAX_RETRIES, using default"),
            }
        }

        if let Some(val) = var("TUTORLINK_BUSY_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.busy_timeout_ms = ms,
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid TUTORLINK_BUSY_TIMEOUT_MS, using default")
                }
            }
        }

        config
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
