//! launchsync server binary.
//!
//! Starts the background reconciliation, countdown and retention tasks plus
//! the read-only operator API, with structured logging, database
//! initialization and graceful shutdown on SIGTERM/SIGINT.

use launchsync_server::adapters::{
    build_http_client, HttpCalendarService, HttpFeedSource, WebhookTransport,
};
use launchsync_server::config::{self, Config};
use launchsync_server::{
    app, background, retention, AppState, Capabilities, CountdownScanner, DestinationStore,
    Notifier, Reconciler, SqliteDestinationStore, StartupError,
};
use launchsync_db::DbPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("LAUNCHSYNC_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)?;

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let pool =
        launchsync_db::open_database(&config.database.path, config.database.pool_settings())?;

    spawn_engine(&config, &pool);

    tokio::spawn(retention::start_sent_retention_task(
        pool.clone(),
        config.schedule.retention_interval_seconds,
        config.schedule.sent_retention_days,
    ));

    let app = app(AppState { pool });
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting launchsync operator api");

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("launchsync server shut down");
    Ok(())
}

/// Starts the reconcile and countdown timers when the external services are
/// configured.
fn spawn_engine(config: &Config, pool: &DbPool) {
    let client = build_http_client(Duration::from_millis(config.delivery.timeout_ms));
    let destinations: Arc<dyn DestinationStore> =
        Arc::new(SqliteDestinationStore::new(pool.clone()));
    let transport = Arc::new(WebhookTransport::new(client.clone()));
    let settings = config.reconcile.settings();

    let notifier = Arc::new(Notifier::new(
        pool.clone(),
        destinations.clone(),
        transport.clone(),
        settings.concurrency,
        settings.call_timeout,
    ));

    let scanner = Arc::new(CountdownScanner::new(
        destinations.clone(),
        notifier.clone(),
        config.reconcile.max_countdown_lookback(),
        settings.concurrency,
    ));
    tokio::spawn(background::start_countdown_task(
        scanner,
        config.schedule.countdown_interval_seconds,
    ));

    let (Some(feed_url), Some(calendar_url)) = (&config.feed.url, &config.calendar.base_url)
    else {
        tracing::warn!("feed.url or calendar.base_url not configured, reconciliation disabled");
        return;
    };

    let caps = Capabilities {
        feed: Arc::new(HttpFeedSource::new(client.clone(), feed_url.clone())),
        destinations,
        calendar: Arc::new(HttpCalendarService::new(client, calendar_url.clone())),
        transport,
    };
    let reconciler = Arc::new(Reconciler::new(
        pool.clone(),
        caps,
        config.reconcile.policy(),
        settings,
        notifier,
    ));
    tokio::spawn(background::start_reconcile_task(
        reconciler,
        config.schedule.reconcile_interval_seconds,
    ));
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
