//! In-memory [`JobQueue`], standing in for Redis in unit and
//! integration tests that don't stand up a broker.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;
use crate::queue::job::{BackoffPolicy, ExecutionJob, JobQueue, LeasedJob};

struct Lease {
    job: ExecutionJob,
    leased_at: chrono::DateTime<Utc>,
}

struct State {
    ready: VecDeque<ExecutionJob>,
    leased: HashMap<String, Lease>,
    delayed: Vec<(chrono::DateTime<Utc>, ExecutionJob)>,
    dedup: HashMap<Uuid, Uuid>,
    dead_letter: Vec<ExecutionJob>,
}

pub struct InMemoryJobQueue {
    state: Mutex<State>,
    backoff: BackoffPolicy,
    visibility_timeout: chrono::Duration,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                ready: VecDeque::new(),
                leased: HashMap::new(),
                delayed: Vec::new(),
                dedup: HashMap::new(),
                dead_letter: Vec::new(),
            }),
            backoff: BackoffPolicy::default(),
            visibility_timeout: chrono::Duration::seconds(30),
        }
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, order_id: Uuid) -> Result<Uuid, AppError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.dedup.get(&order_id) {
            return Ok(*existing);
        }
        let job = ExecutionJob::new(order_id);
        state.dedup.insert(order_id, job.job_id);
        state.ready.push_back(job.clone());
        Ok(job.job_id)
    }

    async fn lease(&self, _consumer: &str) -> Result<Option<LeasedJob>, AppError> {
        let mut state = self.state.lock().await;
        let Some(job) = state.ready.pop_front() else {
            return Ok(None);
        };
        let tag = Uuid::new_v4().to_string();
        state.leased.insert(
            tag.clone(),
            Lease {
                job: job.clone(),
                leased_at: Utc::now(),
            },
        );
        Ok(Some(LeasedJob {
            job,
            delivery_tag: tag,
        }))
    }

    async fn ack(&self, leased: &LeasedJob) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        state.leased.remove(&leased.delivery_tag);
        state.dedup.remove(&leased.job.order_id);
        Ok(())
    }

    async fn nack(&self, leased: &LeasedJob, max_retries: u32) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        state.leased.remove(&leased.delivery_tag);

        if leased.job.attempt >= max_retries {
            state.dead_letter.push(leased.job.clone());
            state.dedup.remove(&leased.job.order_id);
            return Ok(());
        }

        let mut next = leased.job.clone();
        next.attempt += 1;
        let delay = self.backoff.delay_for_attempt(next.attempt);
        let ready_at = Utc::now() + chrono::Duration::milliseconds(delay as i64);
        state.delayed.push((ready_at, next));
        Ok(())
    }

    async fn reclaim_stalled(&self) -> Result<u32, AppError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let mut ready_now = Vec::new();
        state.delayed.retain(|(at, job)| {
            if *at <= now {
                ready_now.push(job.clone());
                false
            } else {
                true
            }
        });
        let mut reclaimed = ready_now.len() as u32;
        for job in ready_now {
            state.ready.push_back(job);
        }

        let stale_tags: Vec<String> = state
            .leased
            .iter()
            .filter(|(_, lease)| now - lease.leased_at >= self.visibility_timeout)
            .map(|(tag, _)| tag.clone())
            .collect();
        for tag in stale_tags {
            if let Some(lease) = state.leased.remove(&tag) {
                state.ready.push_back(lease.job);
                reclaimed += 1;
            }
        }

        Ok(reclaimed)
    }

    async fn dead_letter_count(&self) -> Result<u64, AppError> {
        Ok(self.state.lock().await.dead_letter.len() as u64)
    }

    async fn pending_count(&self) -> Result<u64, AppError> {
        let state = self.state.lock().await;
        Ok((state.ready.len() + state.leased.len() + state.delayed.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_dedupes_outstanding_order() {
        let q = InMemoryJobQueue::new();
        let order_id = Uuid::new_v4();
        let first = q.enqueue(order_id).await.unwrap();
        let second = q.enqueue(order_id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(q.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn nack_below_max_retries_schedules_redelivery() {
        let q = InMemoryJobQueue::new();
        let order_id = Uuid::new_v4();
        q.enqueue(order_id).await.unwrap();
        let leased = q.lease("w1").await.unwrap().unwrap();
        q.nack(&leased, 3).await.unwrap();
        assert_eq!(q.dead_letter_count().await.unwrap(), 0);
        assert_eq!(q.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn nack_past_max_retries_dead_letters() {
        let q = InMemoryJobQueue::new();
        let order_id = Uuid::new_v4();
        q.enqueue(order_id).await.unwrap();
        let mut leased = q.lease("w1").await.unwrap().unwrap();
        leased.job.attempt = 3;
        q.nack(&leased, 3).await.unwrap();
        assert_eq!(q.dead_letter_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lease_on_empty_queue_returns_none() {
        let q = InMemoryJobQueue::new();
        assert!(q.lease("w1").await.unwrap().is_none());
    }
}
