//! Server configuration
//!
//! Tunables for the listener, the admission gate, the interval reporters and
//! the unique-value log. The line format itself is fixed and lives in
//! [`crate::protocol`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{TallyError, TallyResult};

// ----------------------------------------------------------------------------
// Defaults
// ----------------------------------------------------------------------------

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3280;
pub const DEFAULT_CONNECTION_LIMIT: usize = 6;
pub const DEFAULT_OUTPUT_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_LOG_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_UNIQUE_LOG_PATH: &str = "numbers.log";

// ----------------------------------------------------------------------------
// Server Configuration
// ----------------------------------------------------------------------------

/// Configuration for one tally server instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// TCP port; 0 lets the OS pick one
    pub port: u16,
    /// Maximum number of connections handled at once
    pub connection_limit: usize,
    /// Cadence of the delta report on stdout
    pub output_interval_secs: u64,
    /// Cadence of the cumulative report on the log stream
    pub log_interval_secs: u64,
    /// File receiving one line per newly unique value
    pub unique_log_path: PathBuf,
    /// Close a connection that sends nothing for this long
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connection_limit: DEFAULT_CONNECTION_LIMIT,
            output_interval_secs: DEFAULT_OUTPUT_INTERVAL_SECS,
            log_interval_secs: DEFAULT_LOG_INTERVAL_SECS,
            unique_log_path: PathBuf::from(DEFAULT_UNIQUE_LOG_PATH),
            read_timeout_secs: None,
        }
    }
}

impl ServerConfig {
    /// Loopback config on an OS-assigned port, for tests
    pub fn for_testing() -> Self {
        Self {
            port: 0,
            ..Self::default()
        }
    }

    /// `host:port` as passed to the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn output_interval(&self) -> Duration {
        Duration::from_secs(self.output_interval_secs)
    }

    pub fn log_interval(&self) -> Duration {
        Duration::from_secs(self.log_interval_secs)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }

    /// Check the configuration for values the server cannot run with
    pub fn validate(&self) -> TallyResult<()> {
        if self.host.trim().is_empty() {
            return Err(TallyError::config("host must not be empty"));
        }

        if self.connection_limit == 0 {
            return Err(TallyError::config(
                "connection limit must be greater than 0",
            ));
        }

        if self.output_interval_secs == 0 {
            return Err(TallyError::config(
                "output interval must be greater than 0",
            ));
        }

        if self.log_interval_secs == 0 {
            return Err(TallyError::config("log interval must be greater than 0"));
        }

        if self.unique_log_path.as_os_str().is_empty() {
            return Err(TallyError::config("unique log path must not be empty"));
        }

        if self.read_timeout_secs == Some(0) {
            return Err(TallyError::config(
                "read timeout must be greater than 0 when set",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_service_constants() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address(), "127.0.0.1:3280");
        assert_eq!(config.connection_limit, 6);
        assert_eq!(config.output_interval(), Duration::from_secs(5));
        assert_eq!(config.log_interval(), Duration::from_secs(10));
        assert_eq!(config.read_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = ServerConfig::default();

        let mut invalid = config.clone();
        invalid.connection_limit = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.output_interval_secs = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.log_interval_secs = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.unique_log_path = PathBuf::new();
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.read_timeout_secs = Some(0);
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: ServerConfig = toml::from_str("port = 4000\nconnection_limit = 2\n").unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.connection_limit, 2);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.log_interval_secs, DEFAULT_LOG_INTERVAL_SECS);
    }
}
