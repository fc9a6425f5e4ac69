//! `snojobs-manager`: process wiring for the job manager.
//!
//! Builds storage, the orchestration context and the consumer pool, then
//! runs until Ctrl-C or SIGTERM. The message bus is in-process only:
//! workers and callers living in other processes need a broker-backed
//! [`Publisher`](snojobs_events::Publisher) and a feed into the
//! `job.response` / `job.metadata` consumers, neither of which exists yet.
//! Until then the binary serves as a wiring skeleton; submissions go
//! through [`OrchestratorContext`] embedded in the same process as a
//! worker subscribed to `job.request`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snojobs_db::{MemoryStore, PgStore, Storage};
use snojobs_events::{ConsumerRegistry, MessageBus};
use snojobs_orchestrator::{OrchestratorConfig, OrchestratorContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = OrchestratorConfig::from_env();
    tracing::info!(
        consumer_concurrency = config.consumer_concurrency,
        bus_capacity = config.bus_capacity,
        storage_timeout_ms = config.storage_timeout.as_millis() as u64,
        "Loaded manager configuration",
    );

    // --- Storage ---
    let store: Arc<dyn Storage> = match &config.database_url {
        Some(database_url) => {
            let pool = snojobs_db::create_pool(
                database_url,
                config.db_max_connections,
                config.storage_timeout,
            )
            .await
            .context("Failed to connect to database")?;
            tracing::info!("Database connection pool created");

            snojobs_db::health_check(&pool)
                .await
                .context("Database health check failed")?;
            tracing::info!("Database health check passed");

            snojobs_db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database migrations applied");

            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    // --- Message bus ---
    let bus = Arc::new(MessageBus::new(config.bus_capacity));
    tracing::info!("Message bus created");

    // --- Services ---
    let context = OrchestratorContext::new(&config, store, bus.clone());

    let mut registry = ConsumerRegistry::new(config.consumer_concurrency);
    context
        .register_consumers(&bus, &mut registry)
        .context("Failed to register message consumers")?;

    let cancel = CancellationToken::new();
    let consumers = registry.spawn(cancel.clone());
    tracing::info!(consumers = consumers.len(), "Job manager started");

    shutdown_signal().await;

    // --- Shutdown ---
    tracing::info!("Shutdown requested, draining consumers");
    cancel.cancel();

    let drain = async {
        for handle in consumers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Consumer task failed");
            }
        }
    };
    let timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(timeout, drain).await.is_err() {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Consumers did not drain in time",
        );
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Install the global subscriber. `LOG_FORMAT=json` selects JSON output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "snojobs_orchestrator=debug,snojobs_events=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
