//! tallyd - connection-limited number tally server

use clap::Parser;
use tracing::{error, info};

use tally_cli::{cli::Cli, config::AppConfig, error::Result, signal::shutdown_signal};
use tally_runtime::RuntimeBuilder;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", AppConfig::example_config()?);
        return Ok(());
    }

    // Load configuration
    let config = match AppConfig::resolve(&cli) {
        Ok(config) => config,
        Err(e) => {
            setup_logging(cli.verbose);
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    // Initialize logging
    setup_logging(config.logging.verbose);

    let runtime = match RuntimeBuilder::new(config.server).build().await {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Error starting server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.run_until(shutdown_signal()).await {
        // Internal faults halt the process right after logging
        error!("Fatal: {}", e);
        std::process::exit(1);
    }

    info!("tallyd exited successfully");
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
