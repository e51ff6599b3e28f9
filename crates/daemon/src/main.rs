//! crgate daemon entry point.
//!
//! Loads configuration, builds the credential source, starts the web server
//! and the session sweeper, and handles graceful shutdown.

mod signals;
mod sweeper;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crgate_core::config::AppConfig;
use crgate_web::{AppState, WebServer};

/// How often expired sessions are dropped from memory.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// crgate change-request gateway.
#[derive(Parser, Debug)]
#[command(
    name = "crgate-daemon",
    version,
    about = "Change-request gateway with directory-backed login"
)]
struct Args {
    /// Path to the TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address from the config file (e.g. 127.0.0.1:8000).
    #[arg(short, long)]
    listen: Option<String>,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match args.config {
        Some(ref path) => {
            AppConfig::load_from_file(path).context("failed to load configuration file")?
        }
        None => AppConfig::default(),
    };
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables in config")?;

    if let Some(ref listen) = args.listen {
        config.server.listen = listen.clone();
    }
    if let Some(ref level) = args.log_level {
        config.server.log_level = level.clone();
    }

    config
        .validate()
        .context("configuration validation failed")?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    // Initialize tracing
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();

    let config_label = args
        .config
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(built-in defaults)".to_string());

    // Startup banner
    info!("========================================");
    info!("  crgate v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Config file   : {}", config_label);
    info!("Web listen    : {}", config.server.listen);
    info!("Credentials   : {:?}", config.directory.source);
    info!("Session TTL   : {}s", config.session.ttl_secs);
    info!("Require login : {}", config.web.require_session);
    info!("Log level     : {}", config.server.log_level);
    info!("========================================");

    if args.config.is_none() {
        warn!("no configuration file given; serving the built-in demo users");
    }

    let listen_addr = config.server.listen.clone();
    let state = AppState::from_config(config).context("failed to initialize credential source")?;
    info!(source = state.verifier.source_kind(), "credential source ready");

    let web_server = WebServer::new(state);

    // Cooperative shutdown: the signal listener wakes both the server and
    // the sweeper.
    let shutdown = Arc::new(tokio::sync::Notify::new());
    let sweeper_shutdown = Arc::new(tokio::sync::Notify::new());

    let sweeper = sweeper::SessionSweeper::new(web_server.state(), SWEEP_INTERVAL);
    let sweeper_handle = tokio::spawn(sweeper.run(sweeper_shutdown.clone()));

    let server_shutdown = shutdown.clone();
    let web_handle = tokio::spawn(async move {
        web_server
            .start(&listen_addr, async move { server_shutdown.notified().await })
            .await
    });

    // Whichever comes first: a signal, or the server exiting on its own
    // (e.g. the address is already in use).
    let mut web_handle = web_handle;
    let early_exit = tokio::select! {
        _ = signals::wait_for_shutdown() => {
            info!("Shutdown signal received, stopping...");
            None
        }
        joined = &mut web_handle => Some(joined),
    };

    sweeper_shutdown.notify_one();
    match tokio::time::timeout(Duration::from_secs(5), sweeper_handle).await {
        Ok(Ok(())) => info!("session sweeper stopped"),
        Ok(Err(e)) => warn!("session sweeper task error: {}", e),
        Err(_) => warn!("session sweeper did not stop within 5s"),
    }

    let served = match early_exit {
        Some(joined) => joined,
        None => {
            shutdown.notify_one();
            match tokio::time::timeout(Duration::from_secs(10), &mut web_handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("web server did not drain within 10s, forcing shutdown");
                    web_handle.abort();
                    Ok(Ok(()))
                }
            }
        }
    };

    served
        .context("web server task panicked")?
        .context("web server error")?;

    info!("crgate stopped.");
    Ok(())
}
