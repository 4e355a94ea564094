//! Binary entry point for privacy-proxy.
//!
//! Loads the configuration, sets up logging and metrics, and serves until
//! interrupted.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::Parser;
use privacy_proxy::ProxyConfig;
use privacy_proxy::ProxyServer;
use privacy_proxy::observability::{self, InitOptions, LogFormat};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Privacy proxy - a reverse proxy that redacts request data by default.
#[derive(Parser)]
#[command(name = "privacy-proxy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(env = "PRIVACY_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port, overriding the configuration.
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// Log format, overriding the configuration.
    #[arg(long, value_parser = ["pretty", "json"])]
    log_format: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    if cli.check {
        println!(
            "Configuration OK: {} match clause(s), forwarding to {}",
            config.clauses.len(),
            config.proxy_pass
        );
        return ExitCode::SUCCESS;
    }

    if let Err(e) = observability::init_from_config(
        &config.observability,
        InitOptions {
            verbose: cli.verbose,
            log_format: cli.log_format.as_deref().map(LogFormat::parse),
        },
    ) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Privacy proxy stopped");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Loads the configuration named on the command line, or the default one.
fn load_config(cli: &Cli) -> anyhow::Result<ProxyConfig> {
    let config = match &cli.config {
        Some(path) => ProxyConfig::load(Some(path.as_path()))
            .with_context(|| format!("loading {}", path.display()))?,
        None => ProxyConfig::load_default().context("loading the default configuration")?,
    };
    Ok(match cli.port {
        Some(port) => config.with_port(port),
        None => config,
    })
}

/// Serves until Ctrl-C.
async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    let server = ProxyServer::new(Arc::new(config)).context("creating the proxy server")?;
    server.serve().await.context("serving requests")?;
    Ok(())
}
