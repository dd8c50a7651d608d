//! Execution Orchestrator: the per-job state machine that turns a
//! `pending` order into `completed`/`failed`/`cancelled`.
//!
//! Follows a load-state, advance-one-step, persist, emit loop shape
//! with a strict transition discipline: quote -> select venue ->
//! submit swap -> confirm, with a retry branch back to quote selection
//! on a retriable venue failure.

pub mod classify;

use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::events::{AuditEventBus, DomainEvent};
use crate::notify::{SharedNotificationHub, WsPush};
use crate::order::{Order, OrderStatus, OrderStore, OrderUpdate};
use crate::queue::{ExecutionJob, JobQueue};
use crate::venue::VenueRegistry;

use classify::{classify, FailureClass};

pub struct Orchestrator {
    store: Arc<dyn OrderStore>,
    registry: Arc<VenueRegistry>,
    queue: Arc<dyn JobQueue>,
    hub: SharedNotificationHub,
    events: AuditEventBus,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn OrderStore>,
        registry: Arc<VenueRegistry>,
        queue: Arc<dyn JobQueue>,
        hub: SharedNotificationHub,
        events: AuditEventBus,
    ) -> Self {
        Self {
            store,
            registry,
            queue,
            hub,
            events,
        }
    }

    fn push_status(&self, order_id: Uuid, status: &str, attempt: u32) {
        self.hub.push(
            order_id,
            WsPush::Status {
                order_id,
                status: status.to_string(),
                attempt: Some(attempt),
            },
        );
    }

    /// Publishes a domain event to the bus (for live observers, e.g.
    /// structured logging) and persists it as the order's next audit
    /// entry. This is the only place execution events are written to
    /// the audit log, so versions stay monotonic per order and no event
    /// is ever recorded twice.
    async fn emit(&self, order_id: Uuid, event: DomainEvent, data: serde_json::Value) {
        let tag = event.tag();
        self.events.publish(event);
        if let Err(e) = self.store.append_audit(order_id, tag, data).await {
            tracing::warn!(order_id = %order_id, error = %e, "failed to append audit record");
        }
    }

    /// Runs one job to completion or to a retry decision. Returns
    /// `Ok(true)` if the job should be acked (terminal outcome reached
    /// or the order was already finished by a prior delivery), `Ok(false)`
    /// if it should be nacked for redelivery.
    pub async fn execute(&self, job: &ExecutionJob) -> Result<bool, AppError> {
        let order_id = job.order_id;
        let Some(order) = self.store.find_by_id(order_id).await? else {
            tracing::warn!(order_id = %order_id, "job references an order that no longer exists");
            return Ok(true);
        };

        if order.status.is_terminal() {
            // Duplicate delivery of a job whose order already finished;
            // ack and move on without a second swap.
            return Ok(true);
        }

        if order.status == OrderStatus::Pending {
            self.store
                .update_status(order_id, OrderStatus::Processing)
                .await?;
            self.emit(
                order_id,
                DomainEvent::OrderStatusChanged {
                    order_id,
                    from: "pending".to_string(),
                    to: "processing".to_string(),
                },
                serde_json::json!({ "from": "pending", "to": "processing" }),
            )
            .await;
        }

        self.push_status(order_id, "processing", job.attempt);
        self.emit(
            order_id,
            DomainEvent::ExecutionStarted {
                order_id,
                attempt: job.attempt,
            },
            serde_json::json!({ "attempt": job.attempt }),
        )
        .await;

        match self.run_attempt(&order, job.attempt).await {
            Ok(()) => Ok(true),
            Err(AttemptFailure { class, message }) => {
                let retries_exhausted = order.retry_count + 1 > order.max_retries;
                if class == FailureClass::Terminal || retries_exhausted {
                    self.fail_order(&order, &message).await?;
                    return Ok(true);
                }

                self.store
                    .update(
                        order.id,
                        OrderUpdate {
                            retry_count: Some(order.retry_count + 1),
                            error_message: Some(Some(message.clone())),
                            ..Default::default()
                        },
                    )
                    .await?;
                self.emit(
                    order_id,
                    DomainEvent::ExecutionRetrying {
                        order_id,
                        attempt: job.attempt + 1,
                    },
                    serde_json::json!({ "attempt": job.attempt + 1, "reason": message }),
                )
                .await;
                Ok(false)
            }
        }
    }

    async fn run_attempt(&self, order: &Order, attempt: u32) -> Result<(), AttemptFailure> {
        self.emit(
            order.id,
            DomainEvent::ExecutionQuotesFetched {
                order_id: order.id,
                venue_count: self.registry.venue_names().len(),
            },
            serde_json::json!({ "venueCount": self.registry.venue_names().len() }),
        )
        .await;

        let quote = self
            .registry
            .get_best_quote(
                &order.token_in,
                &order.token_out,
                order.amount,
                order.slippage_tolerance,
            )
            .await
            .map_err(|e| AttemptFailure {
                class: classify(&e),
                message: e.to_string(),
            })?;

        self.emit(
            order.id,
            DomainEvent::ExecutionDexSelected {
                order_id: order.id,
                venue: quote.venue.clone(),
            },
            serde_json::json!({ "venue": quote.venue }),
        )
        .await;
        self.push_status(order.id, "routing", attempt);
        self.store
            .update(
                order.id,
                OrderUpdate {
                    selected_venue: Some(Some(quote.venue.clone())),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| AttemptFailure {
                class: FailureClass::Terminal,
                message: e.to_string(),
            })?;

        let venue = self.registry.get(&quote.venue).ok_or_else(|| AttemptFailure {
            class: FailureClass::Retriable,
            message: format!("venue {} no longer registered", quote.venue),
        })?;

        self.emit(
            order.id,
            DomainEvent::ExecutionSwapSubmitted {
                order_id: order.id,
                venue: quote.venue.clone(),
            },
            serde_json::json!({ "venue": quote.venue }),
        )
        .await;

        let result = venue
            .execute_swap(&quote, order.slippage_tolerance)
            .await
            .map_err(|e| AttemptFailure {
                class: classify(&e),
                message: e.to_string(),
            })?;

        self.emit(
            order.id,
            DomainEvent::ExecutionSwapConfirmed {
                order_id: order.id,
                venue: result.venue.clone(),
                executed_price: result.executed_price,
            },
            serde_json::json!({ "venue": result.venue, "executedPrice": result.executed_price }),
        )
        .await;

        let confirmed_at = chrono::Utc::now();
        self.store
            .update(
                order.id,
                OrderUpdate {
                    status: Some(OrderStatus::Completed),
                    executed_price: Some(Some(result.executed_price)),
                    transaction_hash: Some(Some(result.transaction_hash.clone())),
                    confirmed_at: Some(Some(confirmed_at)),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| AttemptFailure {
                class: FailureClass::Terminal,
                message: e.to_string(),
            })?;

        self.emit(
            order.id,
            DomainEvent::OrderConfirmed {
                order_id: order.id,
                transaction_hash: result.transaction_hash.clone(),
            },
            serde_json::json!({
                "venue": result.venue,
                "transactionHash": result.transaction_hash,
                "executedPrice": result.executed_price,
            }),
        )
        .await;
        self.hub.push(
            order.id,
            WsPush::Success {
                order_id: order.id,
                transaction_hash: result.transaction_hash.clone(),
                executed_price: result.executed_price,
                venue: result.venue.clone(),
            },
        );
        self.hub.clear(order.id);

        Ok(())
    }

    async fn fail_order(&self, order: &Order, message: &str) -> Result<(), AppError> {
        self.store
            .update(
                order.id,
                OrderUpdate {
                    status: Some(OrderStatus::Failed),
                    error_message: Some(Some(message.to_string())),
                    ..Default::default()
                },
            )
            .await?;
        self.emit(
            order.id,
            DomainEvent::OrderFailed {
                order_id: order.id,
                reason: message.to_string(),
            },
            serde_json::json!({ "reason": message }),
        )
        .await;
        self.emit(
            order.id,
            DomainEvent::ExecutionFailed {
                order_id: order.id,
                reason: message.to_string(),
            },
            serde_json::json!({ "reason": message }),
        )
        .await;
        self.hub.push(
            order.id,
            WsPush::Error {
                order_id: order.id,
                message: message.to_string(),
            },
        );
        self.hub.clear(order.id);
        Ok(())
    }

    /// Requeues a retriable job with its attempt counter advanced. The
    /// worker pool calls this after `execute` returns `Ok(false)`.
    pub async fn requeue(&self, order_id: Uuid) -> Result<(), AppError> {
        let job_id = self.queue.enqueue(order_id).await?;
        self.emit(
            order_id,
            DomainEvent::QueueJobAdded { order_id, job_id },
            serde_json::json!({ "jobId": job_id }),
        )
        .await;
        Ok(())
    }
}

struct AttemptFailure {
    class: FailureClass,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::CreateOrderInput;
    use crate::order::InMemoryOrderStore;
    use crate::queue::InMemoryJobQueue;
    use crate::venue::MockVenue;
    use rust_decimal::Decimal;

    fn hub() -> SharedNotificationHub {
        Arc::new(crate::notify::NotificationHub::new())
    }

    #[tokio::test]
    async fn happy_path_completes_order() {
        let store: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
        let registry = Arc::new(VenueRegistry::new(vec![Arc::new(
            MockVenue::new("meteora", 10, 5).with_fixed_slippage_pct(Decimal::ZERO),
        )]));
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        let orchestrator = Orchestrator::new(
            store.clone(),
            registry,
            queue,
            hub(),
            AuditEventBus::new(),
        );

        let order = store
            .create(CreateOrderInput {
                token_in: "SOL".into(),
                token_out: "USDC".into(),
                amount: Decimal::new(100, 0),
                slippage_tolerance: None,
                max_retries: None,
            })
            .await
            .unwrap();

        let job = ExecutionJob::new(order.id);
        let should_ack = orchestrator.execute(&job).await.unwrap();
        assert!(should_ack);

        let final_order = store.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(final_order.status, OrderStatus::Completed);
        assert!(final_order.completion_invariant_holds());
    }

    #[tokio::test]
    async fn all_venues_failing_exhausts_retries_then_fails() {
        let store: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
        let registry = Arc::new(VenueRegistry::new(vec![Arc::new(
            MockVenue::new("meteora", 10, 5).always_failing(),
        )]));
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        let orchestrator = Orchestrator::new(
            store.clone(),
            registry,
            queue,
            hub(),
            AuditEventBus::new(),
        );

        let order = store
            .create(CreateOrderInput {
                token_in: "SOL".into(),
                token_out: "USDC".into(),
                amount: Decimal::new(100, 0),
                slippage_tolerance: None,
                max_retries: Some(1),
            })
            .await
            .unwrap();

        let mut job = ExecutionJob::new(order.id);
        for attempt in 1..=2 {
            job.attempt = attempt;
            let should_ack = orchestrator.execute(&job).await.unwrap();
            if should_ack {
                break;
            }
        }

        let final_order = store.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(final_order.status, OrderStatus::Failed);
    }

    #[tokio::test]
    async fn duplicate_delivery_after_completion_is_a_noop_ack() {
        let store: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
        let registry = Arc::new(VenueRegistry::new(vec![Arc::new(
            MockVenue::new("meteora", 10, 5).with_fixed_slippage_pct(Decimal::ZERO),
        )]));
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        let orchestrator = Orchestrator::new(
            store.clone(),
            registry,
            queue,
            hub(),
            AuditEventBus::new(),
        );

        let order = store
            .create(CreateOrderInput {
                token_in: "SOL".into(),
                token_out: "USDC".into(),
                amount: Decimal::new(100, 0),
                slippage_tolerance: None,
                max_retries: None,
            })
            .await
            .unwrap();
        let job = ExecutionJob::new(order.id);
        assert!(orchestrator.execute(&job).await.unwrap());

        // redelivered duplicate of the same job after the order is terminal
        assert!(orchestrator.execute(&job).await.unwrap());
    }
}
