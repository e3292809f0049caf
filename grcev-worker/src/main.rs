//! GRC event delivery worker.
//!
//! Polls the delivery log store for pending and due-for-retry
//! deliveries, dispatches each over its subscription's transport, and
//! quarantines deliveries that exhausted their retries.

mod config;
mod shutdown;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use grcev_core::config::ConfigStore;
use grcev_core::processors::{DeadLetterMover, DeliveryBatchRunner, EventDispatcher};
use grcev_core::store::PgDeliveryStore;
use grcev_core::transports::{
    ChannelBroker, DEFAULT_QUEUE_NAME, DirectCallTransport, HandlerRegistry, QueueTransport,
    TransportRegistry, WebhookTransport,
};
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// GRC event delivery worker - reliable webhook, queue and direct-call
/// delivery with bounded retries and dead-letter quarantine
#[derive(Parser, Debug)]
#[command(name = "grcev-worker")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./grcev-config.toml")]
    config: PathBuf,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting grcev-worker v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    // Get database URL from environment
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    // Run migrations if requested
    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    // Transports. The in-process broker binds the default queue; an
    // embedder wiring a real broker bridge binds its own names instead.
    let broker = Arc::new(ChannelBroker::new());
    let queue_rx = broker.bind(DEFAULT_QUEUE_NAME);
    let queue_drain = tokio::spawn(drain_queue(queue_rx));

    let transports = TransportRegistry::new(
        Arc::new(WebhookTransport::new(loaded_config.signing_key())),
        Arc::new(QueueTransport::new(broker)),
        Arc::new(DirectCallTransport::new(Arc::new(HandlerRegistry::new()))),
    );

    let store = Arc::new(PgDeliveryStore::new(db_pool.clone()));
    let dispatcher = Arc::new(EventDispatcher::new(
        store.clone(),
        transports,
        loaded_config.webhook_timeout(),
    ));

    // Runtime-reloadable loop settings.
    let runner_config = ConfigStore::new(loaded_config.runner_config());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = DeliveryBatchRunner::new(store.clone(), dispatcher);
    let runner_handle = tokio::spawn(runner.run(shutdown_rx.clone(), runner_config.clone()));

    let mover = DeadLetterMover::new(store);
    let mover_handle = tokio::spawn(mover.run(shutdown_rx, runner_config.clone()));

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = shutdown::spawn_config_reload_handler(config_loader, runner_config);

    shutdown::shutdown_signal().await;

    // Stop accepting new batch work; in-flight attempts finish cleanly.
    let _ = shutdown_tx.send(true);
    let _ = runner_handle.await;
    let _ = mover_handle.await;
    reload_notify.notify_one();
    queue_drain.abort();

    // Close database connections gracefully
    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Worker shutdown complete");

    Ok(())
}

/// Consume the default in-process queue, tracing each hand-off.
///
/// Stands in for an external broker bridge: the hand-off itself is the
/// acknowledgement; downstream consumption is deployment-specific.
async fn drain_queue(mut rx: tokio::sync::mpsc::Receiver<grcev_sdk::objects::QueueMessage>) {
    while let Some(message) = rx.recv().await {
        tracing::info!(
            event_id = %message.event_id,
            subscription = %message.subscription_code,
            "Queue message handed off"
        );
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
