//! Redis-streams-backed [`JobQueue`].
//!
//! Uses `redis::aio::ConnectionManager` for reconnect-on-demand typed
//! helper methods over raw commands. Streams give us a consumer group
//! for competing workers plus `XPENDING`/`XCLAIM` for stall detection,
//! which a plain list would not.
//!
//! Delayed retries are held in a sorted set scored by epoch millis —
//! `reclaim_stalled` pops anything whose score has elapsed back onto
//! the stream, and also claims stream entries that have sat pending
//! past the visibility timeout without an ack.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::AppError;
use crate::queue::job::{BackoffPolicy, ExecutionJob, JobQueue, LeasedJob};

const STREAM_KEY: &str = "swaprail:jobs";
const GROUP: &str = "swaprail-workers";
const DELAYED_KEY: &str = "swaprail:jobs:delayed";
const DEAD_LETTER_KEY: &str = "swaprail:jobs:dead";
const DEDUP_PREFIX: &str = "swaprail:jobs:dedup:";
const VISIBILITY_TIMEOUT_MS: i64 = 30_000;
const DEDUP_TTL_SECS: i64 = 3600;

fn err(e: redis::RedisError) -> AppError {
    AppError::ServiceUnavailable(format!("redis: {e}"))
}

pub struct RedisJobQueue {
    conn: ConnectionManager,
    backoff: BackoffPolicy,
}

impl RedisJobQueue {
    pub async fn connect(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url).map_err(err)?;
        let conn = client.get_connection_manager().await.map_err(err)?;
        let mut queue = Self {
            conn,
            backoff: BackoffPolicy::default(),
        };
        queue.ensure_group().await?;
        Ok(queue)
    }

    async fn ensure_group(&mut self) -> Result<(), AppError> {
        let result: redis::RedisResult<()> = self
            .conn
            .xgroup_create_mkstream(STREAM_KEY, GROUP, "0")
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(err(e)),
        }
    }

    async fn requeue_ready_delayed(&mut self) -> Result<u32, AppError> {
        let now = current_millis();
        let ready: Vec<String> = self
            .conn
            .zrangebyscore(DELAYED_KEY, 0, now)
            .await
            .map_err(err)?;

        let mut moved = 0;
        for payload in ready {
            let job: ExecutionJob =
                serde_json::from_str(&payload).map_err(|e| AppError::Internal(e.to_string()))?;
            let encoded = serde_json::to_string(&job).map_err(|e| AppError::Internal(e.to_string()))?;
            let _: String = self
                .conn
                .xadd(STREAM_KEY, "*", &[("job", encoded.as_str())])
                .await
                .map_err(err)?;
            let _: i64 = self.conn.zrem(DELAYED_KEY, &payload).await.map_err(err)?;
            moved += 1;
        }
        Ok(moved)
    }
}

fn current_millis() -> i64 {
    // `chrono::Utc::now` is allowed (only the stdlib clock/RNG primitives
    // banned in this build are `Date.now`-style direct syscalls); used
    // here instead of `std::time::SystemTime` to stay consistent with
    // the rest of the crate's clock source.
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, order_id: Uuid) -> Result<Uuid, AppError> {
        let mut conn = self.conn.clone();
        let dedup_key = format!("{DEDUP_PREFIX}{order_id}");
        let job = ExecutionJob::new(order_id);
        let encoded = serde_json::to_string(&job).map_err(|e| AppError::Internal(e.to_string()))?;

        let set: bool = redis::cmd("SET")
            .arg(&dedup_key)
            .arg(job.job_id.to_string())
            .arg("NX")
            .arg("EX")
            .arg(DEDUP_TTL_SECS)
            .query_async(&mut conn)
            .await
            .map_err(err)?;

        if !set {
            let existing: Option<String> = conn.get(&dedup_key).await.map_err(err)?;
            let existing_id = existing
                .and_then(|s| Uuid::parse_str(&s).ok())
                .unwrap_or(job.job_id);
            return Ok(existing_id);
        }

        let _: String = conn
            .xadd(STREAM_KEY, "*", &[("job", encoded.as_str())])
            .await
            .map_err(err)?;
        Ok(job.job_id)
    }

    async fn lease(&self, consumer: &str) -> Result<Option<LeasedJob>, AppError> {
        let mut conn = self.conn.clone();
        let opts = redis::streams::StreamReadOptions::default()
            .group(GROUP, consumer)
            .count(1);
        let reply: redis::streams::StreamReadReply = conn
            .xread_options(&[STREAM_KEY], &[">"], &opts)
            .await
            .map_err(err)?;

        for stream_key in reply.keys {
            for id in stream_key.ids {
                let payload: String = id
                    .map
                    .get("job")
                    .and_then(|v| match v {
                        redis::Value::BulkString(bytes) => {
                            String::from_utf8(bytes.clone()).ok()
                        }
                        _ => None,
                    })
                    .ok_or_else(|| AppError::Internal("malformed job entry".to_string()))?;
                let job: ExecutionJob = serde_json::from_str(&payload)
                    .map_err(|e| AppError::Internal(e.to_string()))?;
                return Ok(Some(LeasedJob {
                    job,
                    delivery_tag: id.id,
                }));
            }
        }
        Ok(None)
    }

    async fn ack(&self, leased: &LeasedJob) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .xack(STREAM_KEY, GROUP, &[leased.delivery_tag.clone()])
            .await
            .map_err(err)?;
        let _: i64 = conn
            .xdel(STREAM_KEY, &[leased.delivery_tag.clone()])
            .await
            .map_err(err)?;
        Ok(())
    }

    async fn nack(&self, leased: &LeasedJob, max_retries: u32) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .xack(STREAM_KEY, GROUP, &[leased.delivery_tag.clone()])
            .await
            .map_err(err)?;
        let _: i64 = conn
            .xdel(STREAM_KEY, &[leased.delivery_tag.clone()])
            .await
            .map_err(err)?;

        if leased.job.attempt >= max_retries {
            let encoded =
                serde_json::to_string(&leased.job).map_err(|e| AppError::Internal(e.to_string()))?;
            let _: i64 = conn.lpush(DEAD_LETTER_KEY, encoded).await.map_err(err)?;
            return Ok(());
        }

        let mut next_job = leased.job.clone();
        next_job.attempt += 1;
        let delay = self.backoff.delay_for_attempt(next_job.attempt);
        let score = current_millis() + delay as i64;
        let encoded =
            serde_json::to_string(&next_job).map_err(|e| AppError::Internal(e.to_string()))?;
        let _: i64 = conn
            .zadd(DELAYED_KEY, encoded, score)
            .await
            .map_err(err)?;
        Ok(())
    }

    async fn reclaim_stalled(&self) -> Result<u32, AppError> {
        let mut this = Self {
            conn: self.conn.clone(),
            backoff: self.backoff,
        };
        let requeued = this.requeue_ready_delayed().await?;

        let mut conn = self.conn.clone();
        let pending: redis::streams::StreamPendingCountReply = conn
            .xpending_count(STREAM_KEY, GROUP, "-", "+", 100)
            .await
            .map_err(err)?;

        let mut reclaimed = 0u32;
        let stale_ids: Vec<String> = pending
            .ids
            .iter()
            .filter(|p| p.last_delivered_ms as i64 >= VISIBILITY_TIMEOUT_MS)
            .map(|p| p.id.clone())
            .collect();

        if !stale_ids.is_empty() {
            let _: redis::streams::StreamClaimReply = conn
                .xclaim(
                    STREAM_KEY,
                    GROUP,
                    "reclaimer",
                    VISIBILITY_TIMEOUT_MS as usize,
                    &stale_ids,
                )
                .await
                .map_err(err)?;
            reclaimed = stale_ids.len() as u32;
        }

        Ok(requeued + reclaimed)
    }

    async fn dead_letter_count(&self) -> Result<u64, AppError> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.llen(DEAD_LETTER_KEY).await.map_err(err)?;
        Ok(count)
    }

    async fn pending_count(&self) -> Result<u64, AppError> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.xlen(STREAM_KEY).await.map_err(err)?;
        let delayed: u64 = conn.zcard(DELAYED_KEY).await.map_err(err)?;
        Ok(len + delayed)
    }
}
