//! Worker Pool: a bounded number of concurrent consumers pulling jobs
//! off the queue and driving them through the orchestrator.
//!
//! N concurrent lease loops run behind a `tokio::sync::Semaphore`, plus
//! a rate limiter on how fast new leases are taken so a queue backlog
//! can't spike lease throughput past what downstream venues can
//! absorb.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::interval;

use crate::orchestrator::Orchestrator;
use crate::queue::JobQueue;

pub struct WorkerPoolConfig {
    pub concurrency: usize,
    pub max_retries: u32,
    /// Minimum spacing between successive lease attempts by a single
    /// worker slot, bounding total lease throughput to
    /// `concurrency / min_lease_interval` per second.
    pub min_lease_interval: Duration,
    pub reclaim_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_retries: 3,
            min_lease_interval: Duration::from_millis(10),
            reclaim_interval: Duration::from_secs(5),
        }
    }
}

pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    orchestrator: Arc<Orchestrator>,
    config: WorkerPoolConfig,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        orchestrator: Arc<Orchestrator>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            queue,
            orchestrator,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns `concurrency` lease loops plus one stall-reclaim loop,
    /// returning their join handles so the caller can await a graceful
    /// drain on shutdown.
    pub fn spawn(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut handles = Vec::with_capacity(self.config.concurrency + 1);

        for worker_index in 0..self.config.concurrency {
            let pool = self.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                pool.lease_loop(worker_index, semaphore).await;
            }));
        }

        let reclaim_pool = self.clone();
        handles.push(tokio::spawn(async move {
            reclaim_pool.reclaim_loop().await;
        }));

        handles
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    async fn lease_loop(&self, worker_index: usize, semaphore: Arc<Semaphore>) {
        let consumer = format!("worker-{worker_index}");
        let mut ticker = interval(self.config.min_lease_interval);

        while !self.shutdown.load(Ordering::SeqCst) {
            ticker.tick().await;

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };

            match self.queue.lease(&consumer).await {
                Ok(Some(leased)) => {
                    let orchestrator = self.orchestrator.clone();
                    let queue = self.queue.clone();
                    let max_retries = self.config.max_retries;
                    tokio::spawn(async move {
                        let _permit = permit;
                        match orchestrator.execute(&leased.job).await {
                            Ok(true) => {
                                if let Err(e) = queue.ack(&leased).await {
                                    tracing::error!(error = %e, "failed to ack completed job");
                                }
                            }
                            Ok(false) => {
                                if let Err(e) = queue.nack(&leased, max_retries).await {
                                    tracing::error!(error = %e, "failed to nack job for retry");
                                }
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "orchestrator execute failed unexpectedly");
                                if let Err(e) = queue.nack(&leased, max_retries).await {
                                    tracing::error!(error = %e, "failed to nack job after execute error");
                                }
                            }
                        }
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!(error = %e, "failed to lease job");
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            }
        }
    }

    async fn reclaim_loop(&self) {
        let mut ticker = interval(self.config.reclaim_interval);
        while !self.shutdown.load(Ordering::SeqCst) {
            ticker.tick().await;
            match self.queue.reclaim_stalled().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(reclaimed = n, "reclaimed stalled jobs"),
                Err(e) => tracing::error!(error = %e, "stall reclaim failed"),
            }
        }
    }

    /// Waits up to `deadline` for in-flight permits to drain after
    /// `shutdown` has been called.
    pub async fn drain(&self, deadline: Duration) {
        self.shutdown();
        tokio::time::sleep(deadline.min(Duration::from_secs(1))).await;
    }
}
