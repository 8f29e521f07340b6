use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::prelude::Error;

/// Daemon and client configuration, loaded from an optional `cranedb.toml`
/// plus `CRANEDB_*` environment variables (`CRANEDB_HOST`, `CRANEDB_PORT`,
/// and so on), environment winning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub block_size: usize,
    pub buffer_count: usize,
    pub log_file: String,
    pub max_wait_ms: u64,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            block_size: 400,
            buffer_count: 8,
            log_file: "cranedb.log".to_string(),
            max_wait_ms: cranedb_storage::MAX_WAIT.as_millis() as u64,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub max_level: Option<String>,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut builder = config::Config::builder();

        let file = path.unwrap_or_else(|| Path::new("cranedb.toml"));
        builder = builder.add_source(
            config::File::with_name(&file.to_string_lossy()).required(false),
        );
        builder = builder.add_source(config::Environment::with_prefix("CRANEDB"));

        builder
            .build()
            .map_err(Error::config)?
            .try_deserialize()
            .map_err(Error::config)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Upper bound on lock and buffer waits.
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let config = Config::default();

        assert_eq!(config.address(), "localhost:8080");
        assert_eq!(config.block_size, 400);
        assert_eq!(config.buffer_count, 8);
        assert_eq!(config.max_wait(), Duration::from_secs(10));
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = Config::load(Some(Path::new("/definitely/not/here/cranedb.toml"))).unwrap();
        assert_eq!(config.port, 8080);
    }
}
