mod api;
mod broadcast;
mod cli;
mod listener;
mod router;
mod scheduler;
mod sse;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use livetrack_core::Config;
use livetrack_notify::{Dispatcher, EventClassifier, SbbItinerary, TelegramChannel};
use livetrack_store::{PgChangeFeedConnector, PgStore, TrackStore};
use livetrack_tracker::FetcherRegistry;

use crate::cli::{Cli, Command};
use crate::listener::Backoff;
use crate::scheduler::{load_roster, parse_cron, TrackScheduler};
use crate::state::AppState;

const ITINERARY_TIMEOUT: Duration = Duration::from_secs(5);
const ROSTER_COMMAND_QUEUE: usize = 4;

type Tasks = Vec<(&'static str, JoinHandle<()>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    livetrack_core::config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_summary();

    run(cli.mode(), config).await
}

async fn run(mode: Command, config: Config) -> anyhow::Result<()> {
    info!(?mode, version = env!("CARGO_PKG_VERSION"), "livetrack starting");

    let store = PgStore::connect(&config.postgres)
        .await
        .context("connecting to PostgreSQL")?;
    store.migrate().await.context("applying migrations")?;
    let pool = store.pool().clone();
    let store: Arc<dyn TrackStore> = Arc::new(store);

    let cancel = CancellationToken::new();
    let mut tasks: Tasks = Vec::new();

    if mode.tracks() {
        start_tracking(&config, store.clone(), &cancel, &mut tasks).await?;
    }
    if mode.serves() {
        start_serving(&config, store.clone(), pool, &cancel, &mut tasks).await?;
    }

    if let Err(e) = os_signal().await {
        error!(error = %e, "cannot listen for shutdown signals, stopping");
    }
    info!("shutdown signal received");
    cancel.cancel();

    let joined = futures::future::join_all(tasks.into_iter().map(|(name, handle)| async move {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "task ended abnormally");
        }
    }));
    match tokio::time::timeout(config.shutdown_timeout, joined).await {
        Ok(_) => info!("shutdown complete"),
        Err(_) => warn!(timeout = ?config.shutdown_timeout, "tasks did not stop in time, forcing shutdown"),
    }
    Ok(())
}

/// Authenticate the chat bot, load the roster and spawn the fetch and
/// reset tasks. Any failure here aborts startup.
async fn start_tracking(
    config: &Config,
    store: Arc<dyn TrackStore>,
    cancel: &CancellationToken,
    tasks: &mut Tasks,
) -> anyhow::Result<()> {
    let (channel, token) = config.telegram.credentials()?;
    let telegram = TelegramChannel::from_config(token.to_string(), channel.to_string(), &config.telegram.api_url)?;
    telegram
        .authenticate()
        .await
        .context("authenticating Telegram bot")?;

    let itinerary = SbbItinerary::new(&config.telegram.itinerary_api_url, ITINERARY_TIMEOUT)?;
    let classifier = EventClassifier::new(&config.telegram.livetrack_endpoint, Arc::new(itinerary));
    let dispatcher = Dispatcher::new(Arc::new(telegram));
    let fetchers = FetcherRegistry::http(
        &config.trackers.spot_base_url,
        &config.trackers.garmin_base_url,
        config.trackers.http_timeout,
    )?;

    let organization = config.scheduler.organization.clone();
    let roster = load_roster(store.as_ref(), organization.as_deref())
        .await
        .context("loading pilot roster")?;
    let schedule = parse_cron(&config.scheduler.reset_cron)
        .with_context(|| format!("invalid RESET_CRON '{}'", config.scheduler.reset_cron))?;
    info!(pilots = roster.len(), "roster loaded");

    let (commands_tx, commands_rx) = mpsc::channel(ROSTER_COMMAND_QUEUE);
    let scheduler = TrackScheduler::new(
        roster,
        fetchers,
        store.clone(),
        classifier,
        dispatcher,
        config.scheduler.pacing,
    );
    tasks.push((
        "fetch",
        tokio::spawn(scheduler.run(config.scheduler.fetch_interval, commands_rx, cancel.clone())),
    ));
    tasks.push((
        "reset",
        tokio::spawn(scheduler::run_daily_reset(
            schedule,
            store,
            organization,
            commands_tx,
            cancel.clone(),
        )),
    ));
    Ok(())
}

/// Spawn the broadcast hub, the store listener and the HTTP server.
async fn start_serving(
    config: &Config,
    store: Arc<dyn TrackStore>,
    pool: sqlx::PgPool,
    cancel: &CancellationToken,
    tasks: &mut Tasks,
) -> anyhow::Result<()> {
    let broadcast_cfg = &config.broadcast;
    let (hub, hub_task) = broadcast::spawn(broadcast_cfg.mailbox_capacity, cancel.clone());
    tasks.push(("hub", hub_task));

    tasks.push((
        "listener",
        tokio::spawn(listener::run_listener(
            Arc::new(PgChangeFeedConnector::new(pool)),
            broadcast_cfg.notify_channel.clone(),
            hub.clone(),
            Backoff::new(broadcast_cfg.min_reconnect, broadcast_cfg.max_reconnect),
            cancel.clone(),
        )),
    ));

    let state = Arc::new(AppState {
        store,
        hub,
        heartbeat: broadcast_cfg.heartbeat,
        dates_limit: config.server.dates_limit,
        cancel: cancel.clone(),
    });
    let app = router::build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Server listening on http://{}", addr);

    let shutdown = cancel.clone().cancelled_owned();
    tasks.push((
        "http",
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                error!(error = %e, "HTTP server failed");
            }
        }),
    ));
    Ok(())
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C (cross-platform fallback).
async fn os_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
