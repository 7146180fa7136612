//! Raffle HTTP server.
//!
//! Run with: `cargo run --bin raffle-server`
//!
//! Health: <http://localhost:8080/health>
//! Metrics: <http://localhost:9090/metrics>

use anyhow::Context;
use axum::{Router, routing::get};
use raffle_core::{SystemClock, ThreadRandom};
use raffle_postgres::PostgresRaffleStore;
use raffle_runtime::metrics::MetricsServer;
use raffle_runtime::{EngineEnvironment, Notifier, RaffleEngine};
use raffle_web::{AppState, Config, FsBlobStore, LogSink, build_router};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env();
    info!(bind = %config.bind_address(), "Starting raffle server");

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout))
        .connect(&config.database.url)
        .await
        .context("connecting to PostgreSQL")?;
    let store = PostgresRaffleStore::from_pool(pool);
    store.migrate().await.context("running migrations")?;
    info!("PostgreSQL connected and migrated");

    let metrics_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.metrics_port)
        .parse()
        .context("parsing metrics address")?;
    let mut metrics = MetricsServer::new(metrics_addr);
    metrics.start().context("installing metrics recorder")?;
    let metrics_task = tokio::spawn(serve_metrics(Arc::new(metrics)));

    let (notifier, notifier_worker) = Notifier::spawn(
        Arc::new(LogSink),
        config.engine.notification_queue_capacity,
    );
    let engine = RaffleEngine::new(
        EngineEnvironment {
            store: Arc::new(store),
            clock: Arc::new(SystemClock),
            random: Arc::new(ThreadRandom),
            blobs: Arc::new(FsBlobStore::new(&config.storage.payment_proof_dir)),
            notifier,
        },
        config.engine.engine_config(),
    );

    let app = build_router(AppState::new(engine));
    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("binding {}", config.bind_address()))?;
    info!(addr = %config.bind_address(), "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    // The router and its engine are gone; the worker drains the queue and stops.
    metrics_task.abort();
    match tokio::time::timeout(config.shutdown_timeout(), notifier_worker).await {
        Ok(_) => info!("Notifications flushed"),
        Err(_) => warn!("Notification queue not drained before shutdown timeout"),
    }
    info!("Shutdown complete");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,raffle=debug,sqlx=warn")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve_metrics(metrics: Arc<MetricsServer>) {
    let addr = metrics.addr();
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let metrics = Arc::clone(&metrics);
            async move { metrics.render().unwrap_or_default() }
        }),
    );
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            info!(%addr, "Metrics endpoint listening");
            if let Err(error) = axum::serve(listener, app).await {
                warn!(%error, "Metrics endpoint stopped");
            }
        },
        Err(error) => warn!(%addr, %error, "Metrics endpoint unavailable"),
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
