//! Composition root: load configuration, wire every component together,
//! and serve. Builds shared state once, spawns background workers, then
//! blocks on `axum::serve` until a shutdown signal arrives.

use std::sync::Arc;

use swaprail::api::{self, AppState};
use swaprail::config::Config;
use swaprail::db::Database;
use swaprail::events::AuditEventBus;
use swaprail::logging;
use swaprail::notify::NotificationHub;
use swaprail::order::PgOrderStore;
use swaprail::orchestrator::Orchestrator;
use swaprail::queue::RedisJobQueue;
use swaprail::venue::{MockVenue, VenueRegistry};
use swaprail::worker::{WorkerPool, WorkerPoolConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    let _logging_guard = logging::init_logging(&config);
    tracing::info!(%config, "starting swaprail");

    let db = Database::connect(&config).await?;
    db.migrate().await?;

    let queue = Arc::new(RedisJobQueue::connect(&config.redis_url()).await?);
    let store = Arc::new(PgOrderStore::new(db.pool().clone()));
    let hub = Arc::new(NotificationHub::new());
    let events = AuditEventBus::new();

    let registry = Arc::new(VenueRegistry::new(vec![
        Arc::new(MockVenue::new("meteora", 10, 5)),
        Arc::new(MockVenue::new("raydium", 25, 2)),
        Arc::new(MockVenue::new("orca", 15, 3)),
    ]));

    // Persistence happens at the source (orchestrator and HTTP handlers
    // each call `OrderStore::append_audit` directly), so this is a
    // passive observer only — no second write path into `order_history`.
    events.subscribe(Arc::new(|event: &swaprail::events::DomainEvent| {
        tracing::info!(event = event.tag(), order_id = ?event.order_id(), "domain event");
    }));

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        registry.clone(),
        queue.clone(),
        hub.clone(),
        events.clone(),
    ));

    let worker_pool = Arc::new(WorkerPool::new(
        queue.clone(),
        orchestrator.clone(),
        WorkerPoolConfig {
            concurrency: config.queue_concurrency as usize,
            max_retries: config.queue_max_attempts,
            ..Default::default()
        },
    ));
    let worker_handles = worker_pool.clone().spawn();

    let state = AppState {
        store,
        queue,
        registry,
        hub,
        events,
        orchestrator,
        started_at: chrono::Utc::now(),
    };

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker_pool.drain(std::time::Duration::from_secs(10)).await;
    for handle in worker_handles {
        handle.abort();
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
