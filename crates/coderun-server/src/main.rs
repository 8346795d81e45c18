//! coderun-server binary
//!
//! Loads the YAML configuration, connects to the local Docker daemon and
//! serves `/languages` and `/run` until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use coderun_core::{CodeRunner, ConfigLoader, DockerBackend};
use coderun_server::{shutdown_signal, CodeRunServer, ServerConfig};
use log::LevelFilter;
use std::path::PathBuf;
use std::sync::Arc;

/// Command line arguments for the code runner server.
#[derive(Parser, Debug)]
#[command(name = "coderun-server")]
#[command(about = "Runs untrusted code submissions inside Docker sandboxes")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to ./coderun.yaml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server bind address, overrides the configuration file
    #[arg(short, long)]
    bind_addr: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    let log_level_filter = args.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    let mut config = ConfigLoader::load(args.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    if let Some(bind_addr) = args.bind_addr {
        config.server.bind_addr = bind_addr;
    }

    let backend = DockerBackend::connect_local().context("Failed to connect to Docker")?;
    if !backend.is_available().await {
        log::warn!("Docker daemon is not responding; /run requests will fail until it is");
    }

    let runner = CodeRunner::from_config(&config, Arc::new(backend))?;
    let server_config = ServerConfig::from_settings(&config.server, &config.execution)?;

    log::info!("Configuration:");
    log::info!("  Bind address: {}", server_config.bind_addr);
    log::info!("  Sandbox image: {}", config.sandbox.image);
    log::info!(
        "  Sandbox runtime: {}",
        config.sandbox.runtime.as_deref().unwrap_or("default")
    );
    log::info!("  Memory limit: {}", config.sandbox.memory_limit);
    log::info!("  CPU shares: {}", config.sandbox.cpu_shares);
    log::info!("  Networking enabled: {}", config.sandbox.networking_enabled);
    log::info!("  Run policy: {:?}", config.execution.run_policy);
    match server_config.execution_timeout {
        Some(timeout) => log::info!("  Execution timeout: {:?}", timeout),
        None => log::info!("  Execution timeout: none"),
    }

    let server = CodeRunServer::with_config(runner, server_config);
    server.serve_with_shutdown(shutdown_signal()).await?;

    Ok(())
}
