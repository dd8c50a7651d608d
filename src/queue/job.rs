//! Job Queue data types: the unit of work handed to the worker pool,
//! and the trait every backing store (Redis streams, in-memory) honors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionJob {
    pub job_id: Uuid,
    pub order_id: Uuid,
    pub attempt: u32,
}

impl ExecutionJob {
    pub fn new(order_id: Uuid) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            order_id,
            attempt: 1,
        }
    }
}

/// A job leased off the queue: the worker must `ack` or `nack` it
/// before the visibility timeout elapses, or another worker will claim
/// it.
#[derive(Debug, Clone)]
pub struct LeasedJob {
    pub job: ExecutionJob,
    /// Opaque handle identifying this lease to the backing store, used
    /// to ack/nack the exact delivery rather than the logical job id.
    pub delivery_tag: String,
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl BackoffPolicy {
    /// Exponential backoff with a hard ceiling, keyed off the attempt
    /// number already spent.
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let exp = self.base_delay_ms.saturating_mul(1u64 << attempt.min(16));
        exp.min(self.max_delay_ms)
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a new job. Enqueueing the same `order_id` twice while a
    /// job for it is still outstanding is a no-op that returns the
    /// existing job id, guarding against duplicate submission from a
    /// retried HTTP request.
    async fn enqueue(&self, order_id: Uuid) -> Result<Uuid, AppError>;

    /// Lease the next available job, or `None` if the queue is empty.
    /// Leased jobs become invisible to other consumers until acked,
    /// nacked, or reclaimed after the visibility timeout.
    async fn lease(&self, consumer: &str) -> Result<Option<LeasedJob>, AppError>;

    /// Acknowledge successful processing; removes the job permanently.
    async fn ack(&self, leased: &LeasedJob) -> Result<(), AppError>;

    /// Report a retriable failure. Re-delivers after an exponential
    /// backoff unless `attempt` has exhausted `max_retries`, in which
    /// case the job moves to the dead-letter partition.
    async fn nack(&self, leased: &LeasedJob, max_retries: u32) -> Result<(), AppError>;

    /// Reclaim jobs whose lease has expired without an ack/nack,
    /// making them leasable again.
    async fn reclaim_stalled(&self) -> Result<u32, AppError>;

    async fn dead_letter_count(&self) -> Result<u64, AppError>;

    async fn pending_count(&self) -> Result<u64, AppError>;
}
