//! CLI entry point for actionbus

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use actionbus_bridge::{Connector, ConnectorOptions};
use actionbus_core::bus::ActionBus;
use actionbus_core::config::ConfigLoader;
use actionbus_core::logging::init_logging;
use actionbus_modules::ModuleCatalog;

mod runtime;

use runtime::Runtime;

#[derive(Parser)]
#[command(name = "actionbus")]
#[command(about = "A pluggable action bus with a client-server bridge")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bus process: modules, storage, and the bridge
    Serve,
    /// Connect to a running bus process as a headless client
    Connect {
        /// Bridge server host
        #[arg(long, default_value = "localhost")]
        host: String,
        /// Bridge server port, overriding the configured one
        #[arg(short, long)]
        port: Option<u16>,
        /// Stable client id to register as
        #[arg(long)]
        client_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };
    let config = loader.load()?;
    let _log_guard = init_logging(&config.logging);

    match cli.command {
        Commands::Serve => {
            run_serve(&config).await?;
        }
        Commands::Connect {
            host,
            port,
            client_id,
        } => {
            run_connect(host, port.unwrap_or(config.bridge_port), client_id).await?;
        }
    }

    Ok(())
}

async fn run_serve(config: &actionbus_core::config::ServerConfig) -> Result<()> {
    let mut runtime = Runtime::new(ModuleCatalog::with_builtins());
    runtime.start(config).await?;
    println!(
        "actionbus is running with {} modules on port {}. Press Ctrl+C to stop.",
        runtime.module_count(),
        config.bridge_port
    );

    tokio::signal::ctrl_c().await?;
    println!("Shutting down...");
    runtime.shutdown().await;
    Ok(())
}

async fn run_connect(host: String, port: u16, client_id: Option<String>) -> Result<()> {
    let bus = ActionBus::new();
    let connector = Connector::connect(
        bus,
        ConnectorOptions {
            host,
            port,
            client_id,
        },
    )
    .await?;
    println!(
        "Connected as client id {}. Press Ctrl+C to disconnect.",
        connector.client_id()
    );

    let stop = connector.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Disconnecting");
            stop.cancel();
        }
    });

    connector.wait().await?;
    println!("Disconnected.");
    Ok(())
}
