//! Job Queue component: durable work handoff between the HTTP layer
//! and the worker pool.

pub mod job;
pub mod mem_queue;
pub mod redis_queue;

pub use job::{BackoffPolicy, ExecutionJob, JobQueue, LeasedJob};
pub use mem_queue::InMemoryJobQueue;
pub use redis_queue::RedisJobQueue;
