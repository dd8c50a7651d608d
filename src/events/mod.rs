//! Audit Event Bus: an in-process, synchronously-dispatched pub/sub
//! over a closed set of domain events. Dispatch is direct and
//! synchronous since there is no network hop here — listeners are
//! just other in-process components (the audit persister, the
//! notification hub).
//!
//! Listener isolation: a panicking or error-returning listener is
//! logged and skipped, never allowed to stop delivery to the remaining
//! listeners or to propagate back to whatever raised the event.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DomainEvent {
    #[serde(rename = "order:created")]
    OrderCreated { order_id: Uuid },
    #[serde(rename = "order:status-changed")]
    OrderStatusChanged {
        order_id: Uuid,
        from: String,
        to: String,
    },
    #[serde(rename = "order:failed")]
    OrderFailed { order_id: Uuid, reason: String },
    #[serde(rename = "order:confirmed")]
    OrderConfirmed {
        order_id: Uuid,
        transaction_hash: String,
    },
    #[serde(rename = "execution:started")]
    ExecutionStarted { order_id: Uuid, attempt: u32 },
    #[serde(rename = "execution:quotes-fetched")]
    ExecutionQuotesFetched { order_id: Uuid, venue_count: usize },
    #[serde(rename = "execution:dex-selected")]
    ExecutionDexSelected { order_id: Uuid, venue: String },
    #[serde(rename = "execution:swap-submitted")]
    ExecutionSwapSubmitted { order_id: Uuid, venue: String },
    #[serde(rename = "execution:swap-confirmed")]
    ExecutionSwapConfirmed {
        order_id: Uuid,
        venue: String,
        executed_price: Decimal,
    },
    #[serde(rename = "execution:failed")]
    ExecutionFailed { order_id: Uuid, reason: String },
    #[serde(rename = "execution:retrying")]
    ExecutionRetrying { order_id: Uuid, attempt: u32 },
    #[serde(rename = "queue:job-added")]
    QueueJobAdded { order_id: Uuid, job_id: Uuid },
    #[serde(rename = "system:error")]
    SystemError { context: String, message: String },
}

impl DomainEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::OrderCreated { .. } => "order:created",
            Self::OrderStatusChanged { .. } => "order:status-changed",
            Self::OrderFailed { .. } => "order:failed",
            Self::OrderConfirmed { .. } => "order:confirmed",
            Self::ExecutionStarted { .. } => "execution:started",
            Self::ExecutionQuotesFetched { .. } => "execution:quotes-fetched",
            Self::ExecutionDexSelected { .. } => "execution:dex-selected",
            Self::ExecutionSwapSubmitted { .. } => "execution:swap-submitted",
            Self::ExecutionSwapConfirmed { .. } => "execution:swap-confirmed",
            Self::ExecutionFailed { .. } => "execution:failed",
            Self::ExecutionRetrying { .. } => "execution:retrying",
            Self::QueueJobAdded { .. } => "queue:job-added",
            Self::SystemError { .. } => "system:error",
        }
    }

    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            Self::OrderCreated { order_id }
            | Self::OrderStatusChanged { order_id, .. }
            | Self::OrderFailed { order_id, .. }
            | Self::OrderConfirmed { order_id, .. }
            | Self::ExecutionStarted { order_id, .. }
            | Self::ExecutionQuotesFetched { order_id, .. }
            | Self::ExecutionDexSelected { order_id, .. }
            | Self::ExecutionSwapSubmitted { order_id, .. }
            | Self::ExecutionSwapConfirmed { order_id, .. }
            | Self::ExecutionFailed { order_id, .. }
            | Self::ExecutionRetrying { order_id, .. }
            | Self::QueueJobAdded { order_id, .. } => Some(*order_id),
            Self::SystemError { .. } => None,
        }
    }
}

pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &DomainEvent);
}

impl<F> EventListener for F
where
    F: Fn(&DomainEvent) + Send + Sync,
{
    fn on_event(&self, event: &DomainEvent) {
        self(event)
    }
}

#[derive(Clone)]
pub struct AuditEventBus {
    listeners: Arc<RwLock<Vec<Arc<dyn EventListener>>>>,
}

impl AuditEventBus {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) {
        self.listeners
            .write()
            .expect("audit bus listener lock poisoned")
            .push(listener);
    }

    /// Dispatches synchronously to every listener in subscription
    /// order. A listener that panics is caught and logged rather than
    /// unwinding into the publisher — one bad subscriber must never
    /// corrupt an order's own request path.
    pub fn publish(&self, event: DomainEvent) {
        let tag = event.tag();
        let listeners = self
            .listeners
            .read()
            .expect("audit bus listener lock poisoned")
            .clone();
        for listener in listeners {
            let event_ref = &event;
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event_ref);
            }));
            if result.is_err() {
                tracing::error!(event = tag, "audit event listener panicked");
            }
        }
    }
}

impl Default for AuditEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publish_reaches_every_listener_even_if_one_panics() {
        let bus = AuditEventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.subscribe(Arc::new(|_: &DomainEvent| {
            panic!("boom");
        }));
        let calls_clone = calls.clone();
        bus.subscribe(Arc::new(move |_: &DomainEvent| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));

        bus.publish(DomainEvent::OrderCreated {
            order_id: Uuid::new_v4(),
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn event_tag_matches_variant() {
        let event = DomainEvent::ExecutionRetrying {
            order_id: Uuid::new_v4(),
            attempt: 2,
        };
        assert_eq!(event.tag(), "execution:retrying");
    }
}
