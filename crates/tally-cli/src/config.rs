//! Tally CLI Configuration Management
//!
//! Configuration is layered: defaults, then an optional TOML file, then
//! command-line flags. The server section maps directly onto
//! [`ServerConfig`].
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3280
//! connection_limit = 6
//!
//! [logging]
//! verbose = false
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tally_core::ServerConfig;

use crate::cli::Cli;
use crate::error::Result;

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the `tallyd` binary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listener, admission and reporting settings
    pub server: ServerConfig,

    /// Log output settings
    pub logging: LoggingConfig,
}

/// Log output settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log at DEBUG instead of INFO
    pub verbose: bool,
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from a TOML file, filling gaps with defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the effective configuration for a parsed command line
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };

        config.apply_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    /// Apply flags given on the command line
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(limit) = cli.limit {
            self.server.connection_limit = limit;
        }
        if let Some(log_file) = &cli.log_file {
            self.server.unique_log_path = log_file.clone();
        }
        if cli.verbose {
            self.logging.verbose = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        Ok(())
    }

    /// Example configuration file content
    pub fn example_config() -> Result<String> {
        Ok(toml::to_string_pretty(&Self::default())?)
    }
}
