//! Composition-root application state, threaded into every handler via
//! axum's `State` extractor: one struct of `Arc`-wrapped shared
//! services, built once in `main` and cloned cheaply per request.

use std::sync::Arc;

use crate::events::AuditEventBus;
use crate::notify::SharedNotificationHub;
use crate::order::OrderStore;
use crate::orchestrator::Orchestrator;
use crate::queue::JobQueue;
use crate::venue::VenueRegistry;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub queue: Arc<dyn JobQueue>,
    pub registry: Arc<VenueRegistry>,
    pub hub: SharedNotificationHub,
    pub events: AuditEventBus,
    pub orchestrator: Arc<Orchestrator>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}
