//! Tally CLI library
//!
//! Flag parsing, configuration loading and signal wiring for the `tallyd`
//! binary.

pub mod cli;
pub mod config;
pub mod error;
pub mod signal;

pub use cli::Cli;
pub use config::AppConfig;
pub use error::{CliError, Result};
