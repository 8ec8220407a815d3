//! Tunables for opening a payment database.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DbError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbConfig {
    /// How long a writer waits on another connection's lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Pending batch calls that force an immediate flush.
    #[serde(default = "default_batch_max_size")]
    pub batch_max_size: usize,

    /// How long the first call of a batch waits for company.
    #[serde(default = "default_batch_max_delay_ms")]
    pub batch_max_delay_ms: u64,

    /// Run pending migrations and roll them back instead of committing.
    #[serde(default)]
    pub dry_run_migrations: bool,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_batch_max_size() -> usize {
    1_000
}

fn default_batch_max_delay_ms() -> u64 {
    10
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
            batch_max_size: default_batch_max_size(),
            batch_max_delay_ms: default_batch_max_delay_ms(),
            dry_run_migrations: false,
        }
    }
}

impl DbConfig {
    /// Load config from a TOML file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|err| DbError::Config(format!("failed to read {}: {err}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, DbError> {
        toml::from_str(content).map_err(|err| DbError::Config(err.to_string()))
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    #[must_use]
    pub fn batch_max_delay(&self) -> Duration {
        Duration::from_millis(self.batch_max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must<T>(result: Result<T, DbError>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    #[test]
    fn empty_file_yields_defaults() {
        assert_eq!(must(DbConfig::from_toml("")), DbConfig::default());
    }

    #[test]
    fn partial_file_overrides_named_fields_only() {
        let config = must(DbConfig::from_toml(
            "batch_max_size = 4\ndry_run_migrations = true\n",
        ));
        assert_eq!(config.batch_max_size, 4);
        assert!(config.dry_run_migrations);
        assert_eq!(config.busy_timeout(), Duration::from_millis(5_000));
        assert_eq!(config.batch_max_delay(), Duration::from_millis(10));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        assert!(matches!(
            DbConfig::from_toml("batch_max_size = \"many\""),
            Err(DbError::Config(_))
        ));
    }
}
