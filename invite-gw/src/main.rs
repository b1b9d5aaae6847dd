//! invite-gw - guest workflow service
//!
//! Serves the guestbook/contribution submission flow for invitation pages:
//! phone verification over SMS, duplicate handling, and entry storage.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use chrono::Duration as ChronoDuration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use invite_common::config::{load_toml_config_or_default, RootFolderInitializer};
use invite_common::db::{init_database, SqliteEntryStore};
use invite_common::sms::{HttpSmsTransport, LogSmsTransport, SmsTransport};
use invite_common::time::SystemClock;
use invite_common::verification::SqliteVerificationService;
use invite_common::EventBus;
use invite_gw::config::{CliOverrides, GwConfig, SmsSettings};
use invite_gw::workflow::WorkflowDeps;
use invite_gw::{build_router, notify, AppState};

/// Command-line arguments for invite-gw
#[derive(Parser, Debug)]
#[command(name = "invite-gw")]
#[command(about = "Guest workflow service for invitation pages")]
#[command(version)]
struct Args {
    /// Root folder holding invite.db
    #[arg(short, long, env = "INVITE_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "INVITE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "INVITE_PORT")]
    port: Option<u16>,

    /// SMS transport: log or http
    #[arg(long, env = "INVITE_SMS_TRANSPORT")]
    sms_transport: Option<String>,

    /// Explicit config file
    #[arg(short, long, env = "INVITE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml = load_toml_config_or_default(args.config.as_deref());

    let default_filter = toml
        .logging
        .level
        .clone()
        .unwrap_or_else(|| "invite_gw=debug,invite_common=info,tower_http=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build identification first, before any slow startup work
    info!(
        "Starting invite-gw v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config = GwConfig::resolve(
        CliOverrides {
            root_folder: args.root_folder,
            host: args.host,
            port: args.port,
            sms_transport: args.sms_transport,
        },
        &toml,
    )
    .context("Invalid configuration")?;

    let initializer = RootFolderInitializer::new(config.root_folder.clone());
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let sms: Arc<dyn SmsTransport> = match &config.sms {
        SmsSettings::Log => {
            warn!("SMS transport is 'log': verification codes are written to the log");
            Arc::new(LogSmsTransport)
        }
        SmsSettings::Http {
            endpoint,
            sender,
            api_key,
        } => {
            info!("SMS transport: http ({})", endpoint);
            Arc::new(HttpSmsTransport::new(endpoint.clone(), sender.clone(), api_key.clone())?)
        }
    };

    let events = EventBus::new(100);
    let clock = Arc::new(SystemClock);
    let code_ttl = ChronoDuration::from_std(config.workflow.code_ttl).context("Code TTL out of range")?;
    let codes = SqliteVerificationService::new(pool.clone(), sms, clock.clone(), events.clone()).with_ttl(code_ttl);
    let store = SqliteEntryStore::new(pool.clone(), clock);

    let _notifier = notify::spawn_host_notifier(&events);

    let deps = WorkflowDeps {
        codes: Arc::new(codes),
        store: Arc::new(store),
        events,
        settings: config.workflow,
    };
    let state = AppState::with_session_settings(pool, deps, config.sessions);
    let sweep_every = config.sessions.idle_ttl.min(Duration::from_secs(60));
    let _sweeper = state.sessions.spawn_sweeper(sweep_every);
    info!(
        "Sessions: idle limit {}s, at most {} open",
        config.sessions.idle_ttl.as_secs(),
        config.sessions.max_open
    );
    let app = build_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {}", address))?;
    info!("invite-gw listening on http://{}", address);
    info!("Health check: http://{}/health", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}
