// ABOUTME: crew-mcp entry point - MCP stdio server for parallel claude workers.
// ABOUTME: Provides the server (default) and an init subcommand.

use anyhow::Result;
use clap::{Parser, Subcommand};
use crew_core::{Config, WorkerRegistry};
use crew_mcp::{McpServer, WorkerTools};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::signal;

#[derive(Parser)]
#[command(name = "crew-mcp")]
#[command(about = "MCP server that runs parallel claude worker sessions", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, env = "CREW_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Worker program to launch instead of the configured one
    #[arg(long, env = "CREW_WORKER_BINARY")]
    binary: Option<String>,

    /// Log to a file under the config directory instead of stderr
    #[arg(long)]
    log_file: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init) => run_init(cli.config),
        None => run_server(cli).await,
    }
}

fn run_init(config_path: Option<PathBuf>) -> Result<()> {
    let path = match config_path {
        Some(path) => Config::init_at(&path)?,
        None => Config::init()?,
    };
    println!("{}", path.display());
    Ok(())
}

async fn run_server(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(binary) = cli.binary {
        config.worker.binary = binary;
    }

    if cli.log_file || config.log.file {
        crew_log::init_file("crew-mcp");
    } else {
        crew_log::init();
    }

    tracing::info!(
        binary = %config.worker.binary,
        version = env!("CARGO_PKG_VERSION"),
        "Starting crew-mcp"
    );

    let registry = Arc::new(WorkerRegistry::new(&config.worker));
    let server = McpServer::new(WorkerTools::new(registry.clone()));

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    let result = tokio::select! {
        result = server.serve(stdin, stdout) => result,
        _ = shutdown_signal() => Ok(()),
    };

    let stopped = registry.shutdown();
    tracing::info!(workers = stopped, "Shut down");
    result
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}
