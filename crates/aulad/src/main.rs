#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

//! aulad - academic-management API daemon
//!
//! This daemon provides:
//! - Session login and token authentication
//! - Role and per-module permission gates
//! - Permission administration backed by SQLite

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aulad::api;
use aulad::auth::hash_secret;
use aulad::config::Config;
use aulad::control_db::ControlDb;
use aulad::permissions::{PermissionStore, SqlitePermissionStore};
use aulad::state::AppState;

fn normalize_host_for_listen(host: &str) -> String {
    host.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string()
}

fn parse_listen_host_port(listen: &str) -> anyhow::Result<(String, u16)> {
    let listen = listen.trim();

    if let Ok(addr) = listen.parse::<SocketAddr>() {
        return Ok((addr.ip().to_string(), addr.port()));
    }

    let idx = listen
        .rfind(':')
        .ok_or_else(|| anyhow::anyhow!("Invalid listen address {listen:?}: expected HOST:PORT"))?;
    let host = &listen[..idx];
    let port: u16 = listen[idx + 1..]
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address {listen:?}: invalid port: {e}"))?;
    Ok((normalize_host_for_listen(host), port))
}

fn format_listen(host: &str, port: u16) -> String {
    let host = normalize_host_for_listen(host);
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

#[derive(Parser)]
#[command(name = "aulad")]
#[command(about = "Academic-management API daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (default)
    Start {
        /// Listen address (HOST:PORT)
        #[arg(short, long)]
        listen: Option<String>,

        /// Port (keeps the configured host)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show daemon status
    Status {
        /// Daemon URL
        #[arg(default_value = "http://127.0.0.1:8090")]
        url: String,
    },

    /// Show effective configuration (secrets redacted)
    ShowConfig,

    /// Restore the baseline permission set in the configured database
    ResetPermissions,

    /// Print an argon2 hash for a secret
    HashSecret {
        secret: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(ref path) = cli.config {
        Config::from_file(path)?
    } else {
        Config::load_default()?
    };

    // Override log level from CLI
    let log_level = match cli.verbose {
        0 => config.tracing_level(),
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    match cli.command {
        None | Some(Commands::Start { .. }) => {
            // Apply CLI overrides
            if let Some(Commands::Start { listen, port }) = cli.command {
                if let Some(listen) = listen {
                    config.listen = listen;
                }
                if let Some(port) = port {
                    let host = parse_listen_host_port(&config.listen)?.0;
                    config.listen = format_listen(&host, port);
                }
            }

            config.validate()?;
            run_daemon(config).await
        }

        Some(Commands::Status { url }) => check_status(&url).await,

        Some(Commands::ShowConfig) => {
            let yaml = serde_yaml::to_string(&config.redacted())?;
            println!("{}", yaml);
            Ok(())
        }

        Some(Commands::ResetPermissions) => reset_permissions(&config).await,

        Some(Commands::HashSecret { secret }) => {
            println!("{}", hash_secret(&secret)?);
            Ok(())
        }
    }
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        listen = %config.listen,
        control_db = %config.control_db.display(),
        permission_cache = config.permission_cache.enabled,
        "Starting aulad"
    );

    // Create application state
    let state = AppState::new(config.clone()).await?;

    // Create router
    let app = api::create_router(state.clone());

    // Parse listen address
    let addr: SocketAddr = config.listen.parse()?;

    // Create listener
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Listening");

    // Setup signal handlers for graceful shutdown
    let shutdown_signal = async move {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(err) => {
                    tracing::error!(error = %err, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        tracing::info!("Shutdown signal received");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    tracing::info!(uptime_secs = state.uptime_secs(), "Daemon stopped");

    Ok(())
}

async fn reset_permissions(config: &Config) -> anyhow::Result<()> {
    let db = Arc::new(ControlDb::new(&config.control_db)?);
    let store = SqlitePermissionStore::new(db);
    let rows = store.reset_to_defaults().await?;
    println!(
        "Restored {} default permissions in {}",
        rows.len(),
        config.control_db.display()
    );
    println!("A running daemon serves cached decisions until its cache TTL elapses.");
    Ok(())
}

async fn check_status(url: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let resp = client.get(format!("{}/health", url)).send().await?;

    if resp.status().is_success() {
        let health: api::HealthResponse = resp.json().await?;
        println!("Status: {}", health.status);
        println!("Version: {}", health.version);
        println!("Uptime: {}s", health.uptime_secs);
        println!("Instance: {}", health.instance_id);
    } else {
        println!("Error: {} {}", resp.status(), resp.text().await?);
    }

    Ok(())
}
