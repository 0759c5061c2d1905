use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

use memento_rewrite_proxy::commands;
use memento_rewrite_proxy::config;
use memento_rewrite_proxy::logging;
use memento_rewrite_proxy::proxy::ProxyServer;
use memento_rewrite_proxy::state::AppState;
use memento_rewrite_proxy::web;

#[derive(Parser, Debug)]
#[command(name = "memento-rewrite-proxy")]
#[command(about = "Reroutes archived-page subresources to a local Memento replay endpoint", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (YAML/JSON/TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Run the proxy (default)
    Run,
    /// Validate the configuration and print a summary
    Check {
        /// Also check that the replay endpoint is reachable
        #[arg(long)]
        ping: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => config::load_from_path(path)
            .await
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => config::load_from_env_or_file()
            .await
            .context("Failed to load configuration")?,
    };

    let _log_guard = logging::init(&config.logging, args.debug).context("Failed to set up logging")?;

    match args.command.unwrap_or(Command::Run) {
        Command::Check { ping } => {
            commands::run_config_check(config, ping).await?;
            return Ok(());
        }
        Command::Run => {
            info!("Starting Memento rewrite proxy");
            info!(
                "Rerouting subresources to {}",
                config.replay_endpoint().base_url()
            );
        }
    }

    let admin_enabled = config.admin.enabled;
    let (state, _shutdown_rx) = AppState::new(config).context("Failed to initialize state")?;

    state
        .start()
        .await
        .context("Failed to activate the interceptor")?;

    let _sweeper = state.spawn_context_sweeper();

    let proxy_server = ProxyServer::new(state.clone());
    let proxy_handle = tokio::spawn(async move {
        if let Err(e) = proxy_server.run().await {
            error!("Proxy server error: {}", e);
        }
    });

    let admin_handle = if admin_enabled {
        let admin_state = state.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = web::start_server(admin_state).await {
                error!("Admin server error: {}", e);
            }
        }))
    } else {
        None
    };

    shutdown_signal().await;

    info!("Shutting down Memento rewrite proxy");

    let shutdown_timeout = tokio::time::timeout(tokio::time::Duration::from_secs(30), async {
        state.shutdown();

        if let Some(admin_handle) = admin_handle {
            let _ = tokio::join!(proxy_handle, admin_handle);
        } else {
            let _ = proxy_handle.await;
        }
    })
    .await;

    match shutdown_timeout {
        Ok(_) => info!("Graceful shutdown completed"),
        Err(_) => {
            error!("Shutdown timeout exceeded, forcing exit");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
