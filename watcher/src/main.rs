//! HOPR Watcher - Main entry point
//!
//! Polls a node's balances and reports received funds and low balances.

use clap::{value_parser, Arg, ArgAction, Command};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hopr_watcher::{BalanceWatcher, NotificationStore, Result, WatcherConfig, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let matches = Command::new("hopr-watcher")
        .version(VERSION)
        .about("HOPR Watcher - node and Safe balance notifications")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (defaults to config/ lookup)"),
        )
        .arg(
            Arg::new("endpoint")
                .short('e')
                .long("endpoint")
                .value_name("URL")
                .help("Node API endpoint, overrides node.api_endpoint"),
        )
        .arg(
            Arg::new("token")
                .short('t')
                .long("token")
                .value_name("TOKEN")
                .help("Node API token, overrides node.api_token"),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("SECONDS")
                .value_parser(value_parser!(u64))
                .help("Seconds between polls, overrides polling.interval_seconds"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .default_value("info"),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Poll a single time and exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    // Initialize logging
    let log_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");
    init_logging(log_level)?;

    info!(version = VERSION, "Starting HOPR Watcher");

    // Load configuration
    let mut config = WatcherConfig::load(matches.get_one::<String>("config").map(String::as_str))?;
    if let Some(endpoint) = matches.get_one::<String>("endpoint") {
        config.node.api_endpoint = Some(endpoint.clone());
    }
    if let Some(token) = matches.get_one::<String>("token") {
        config.node.api_token = Some(token.clone());
    }
    if let Some(interval) = matches.get_one::<u64>("interval") {
        config.polling.interval_seconds = *interval;
    }
    config.validate()?;
    info!("Configuration loaded successfully");

    if config.node.api_endpoint.is_none() {
        warn!("No node API endpoint configured, polling stays idle");
    }

    let store = NotificationStore::new(
        config.notifications.max_history,
        config.notifications.channel_capacity,
    );
    let watcher = BalanceWatcher::from_config(&config, Arc::new(store.clone()))?;

    if matches.get_flag("once") {
        let snapshot = watcher.fetch_once().await.map_err(|e| {
            error!(category = e.category(), error = %e, "Single poll failed");
            e
        })?;
        info!(
            native = %snapshot.native.formatted(),
            hopr = %snapshot.hopr.formatted(),
            safe_native = %snapshot.safe_native.formatted(),
            safe_hopr = %snapshot.safe_hopr.formatted(),
            "Balances fetched"
        );
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping watcher...");
        signal_token.cancel();
    });

    watcher.run(shutdown).await;

    info!(
        notifications = store.len().await,
        unseen = store.unseen_count().await,
        "HOPR Watcher stopped"
    );
    Ok(())
}

/// Initialize logging with the specified level
fn init_logging(log_level: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => {
            eprintln!("Invalid log level: {}. Using 'info'", log_level);
            tracing::Level::INFO
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("hopr_watcher={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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
}
