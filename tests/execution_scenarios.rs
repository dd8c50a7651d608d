//! End-to-end execution scenarios driven directly against the
//! orchestrator and worker pool with in-memory backings, covering the
//! literal scenarios this system is required to satisfy.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use swaprail::events::AuditEventBus;
use swaprail::notify::NotificationHub;
use swaprail::order::{CreateOrderInput, InMemoryOrderStore, OrderStatus, OrderStore};
use swaprail::orchestrator::Orchestrator;
use swaprail::queue::{ExecutionJob, InMemoryJobQueue, JobQueue};
use swaprail::venue::{MockVenue, VenueRegistry};
use swaprail::worker::{WorkerPool, WorkerPoolConfig};

fn harness(
    venues: Vec<Arc<dyn swaprail::venue::VenueAdapter>>,
) -> (
    Arc<InMemoryOrderStore>,
    Arc<InMemoryJobQueue>,
    Arc<Orchestrator>,
) {
    let store = Arc::new(InMemoryOrderStore::new());
    let queue = Arc::new(InMemoryJobQueue::new());
    let registry = Arc::new(VenueRegistry::new(venues));
    let hub = Arc::new(NotificationHub::new());
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone() as Arc<dyn OrderStore>,
        registry,
        queue.clone() as Arc<dyn JobQueue>,
        hub,
        AuditEventBus::new(),
    ));
    (store, queue, orchestrator)
}

#[tokio::test]
async fn happy_path_reaches_completed_with_best_venue() {
    let (store, _queue, orchestrator) = harness(vec![
        Arc::new(MockVenue::new("meteora", 0, 5).with_fixed_slippage_pct(Decimal::ZERO)),
        Arc::new(MockVenue::new("raydium", 50, 2).with_fixed_slippage_pct(Decimal::ZERO)),
    ]);

    let order = store
        .create(CreateOrderInput {
            token_in: "SOL".into(),
            token_out: "USDC".into(),
            amount: Decimal::new(100, 0),
            slippage_tolerance: Some(Decimal::new(10, 1)),
            max_retries: Some(3),
        })
        .await
        .unwrap();

    let job = ExecutionJob::new(order.id);
    let should_ack = orchestrator.execute(&job).await.unwrap();
    assert!(should_ack);

    let final_order = store.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(final_order.status, OrderStatus::Completed);
    // meteora has 0bps spread (higher amountOut) so it should win.
    assert_eq!(final_order.selected_venue.as_deref(), Some("meteora"));
    assert!(final_order.completion_invariant_holds());
}

#[tokio::test]
async fn slippage_failure_then_success_increments_retry_count_once() {
    // First attempt realizes 2% slippage against a 1% tolerance and
    // fails; the second attempt realizes 0% and completes.
    let (store, _queue, orchestrator) = harness(vec![Arc::new(
        MockVenue::new("meteora", 10, 5)
            .with_slippage_sequence_pct(vec![Decimal::new(2, 0), Decimal::ZERO]),
    )]);

    let order = store
        .create(CreateOrderInput {
            token_in: "SOL".into(),
            token_out: "USDC".into(),
            amount: Decimal::ONE,
            slippage_tolerance: Some(Decimal::new(1, 0)),
            max_retries: Some(3),
        })
        .await
        .unwrap();

    let mut job = ExecutionJob::new(order.id);
    let should_ack = orchestrator.execute(&job).await.unwrap();
    assert!(!should_ack, "first attempt should fail on slippage and be nacked");

    let mid_order = store.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(mid_order.retry_count, 1);
    assert_eq!(mid_order.status, OrderStatus::Processing);

    job.attempt += 1;
    let should_ack = orchestrator.execute(&job).await.unwrap();
    assert!(should_ack, "second attempt should complete within tolerance");

    let final_order = store.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(final_order.status, OrderStatus::Completed);
    assert_eq!(final_order.retry_count, 1);
}

#[tokio::test]
async fn all_venues_failing_ends_failed_after_max_retries() {
    let (store, _queue, orchestrator) = harness(vec![
        Arc::new(MockVenue::new("meteora", 10, 5).always_failing()),
        Arc::new(MockVenue::new("raydium", 10, 5).always_failing()),
    ]);

    let order = store
        .create(CreateOrderInput {
            token_in: "SOL".into(),
            token_out: "USDC".into(),
            amount: Decimal::ONE,
            slippage_tolerance: None,
            max_retries: Some(2),
        })
        .await
        .unwrap();

    let mut job = ExecutionJob::new(order.id);
    loop {
        job.attempt += 1;
        let should_ack = orchestrator.execute(&job).await.unwrap();
        if should_ack {
            break;
        }
        assert!(job.attempt <= 5, "orchestrator never terminated the order");
    }

    let final_order = store.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(final_order.status, OrderStatus::Failed);
    assert_eq!(final_order.retry_count, 2);
    assert!(final_order.error_message.is_some());
}

#[tokio::test]
async fn cancel_before_execute_skips_swap_submission() {
    let (store, _queue, orchestrator) = harness(vec![Arc::new(MockVenue::new(
        "meteora", 10, 5,
    ))]);

    let order = store
        .create(CreateOrderInput {
            token_in: "SOL".into(),
            token_out: "USDC".into(),
            amount: Decimal::ONE,
            slippage_tolerance: None,
            max_retries: None,
        })
        .await
        .unwrap();

    store
        .update_status(order.id, OrderStatus::Cancelled)
        .await
        .unwrap();

    let job = ExecutionJob::new(order.id);
    let should_ack = orchestrator.execute(&job).await.unwrap();
    assert!(should_ack, "worker must ack a job for an already-terminal order");

    let final_order = store.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(final_order.status, OrderStatus::Cancelled);
    assert!(final_order.selected_venue.is_none());
}

#[tokio::test]
async fn duplicate_delivery_after_completion_performs_no_second_swap() {
    let (store, _queue, orchestrator) = harness(vec![Arc::new(
        MockVenue::new("meteora", 10, 5).with_fixed_slippage_pct(Decimal::ZERO),
    )]);

    let order = store
        .create(CreateOrderInput {
            token_in: "SOL".into(),
            token_out: "USDC".into(),
            amount: Decimal::ONE,
            slippage_tolerance: None,
            max_retries: None,
        })
        .await
        .unwrap();

    let job = ExecutionJob::new(order.id);
    assert!(orchestrator.execute(&job).await.unwrap());
    let first_tx = store
        .find_by_id(order.id)
        .await
        .unwrap()
        .unwrap()
        .transaction_hash;

    // Redelivered duplicate after completion.
    assert!(orchestrator.execute(&job).await.unwrap());
    let second_tx = store
        .find_by_id(order.id)
        .await
        .unwrap()
        .unwrap()
        .transaction_hash;

    assert_eq!(first_tx, second_tx, "no second swap should have been submitted");
}

#[tokio::test]
async fn concurrent_submissions_all_reach_terminal_status() {
    let store = Arc::new(InMemoryOrderStore::new());
    let queue = Arc::new(InMemoryJobQueue::new());
    let registry = Arc::new(VenueRegistry::new(vec![Arc::new(
        MockVenue::new("meteora", 10, 5).with_fixed_slippage_pct(Decimal::ZERO),
    )]));
    let hub = Arc::new(NotificationHub::new());
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone() as Arc<dyn OrderStore>,
        registry,
        queue.clone() as Arc<dyn JobQueue>,
        hub,
        AuditEventBus::new(),
    ));

    let pool = Arc::new(WorkerPool::new(
        queue.clone() as Arc<dyn JobQueue>,
        orchestrator.clone(),
        WorkerPoolConfig {
            concurrency: 10,
            max_retries: 3,
            min_lease_interval: Duration::from_millis(2),
            reclaim_interval: Duration::from_secs(5),
        },
    ));
    let handles = pool.clone().spawn();

    let mut order_ids = Vec::new();
    for _ in 0..50 {
        let order = store
            .create(CreateOrderInput {
                token_in: "SOL".into(),
                token_out: "USDC".into(),
                amount: Decimal::ONE,
                slippage_tolerance: None,
                max_retries: Some(3),
            })
            .await
            .unwrap();
        queue.enqueue(order.id).await.unwrap();
        order_ids.push(order.id);
    }

    let mut all_terminal = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut pending = 0;
        for id in &order_ids {
            if !store
                .find_by_id(*id)
                .await
                .unwrap()
                .unwrap()
                .status
                .is_terminal()
            {
                pending += 1;
            }
        }
        if pending == 0 {
            all_terminal = true;
            break;
        }
    }

    pool.shutdown();
    for handle in handles {
        handle.abort();
    }

    assert!(all_terminal, "all 50 orders should reach a terminal status");
    let mut seen_uuids = std::collections::HashSet::new();
    for id in &order_ids {
        let order = store.find_by_id(*id).await.unwrap().unwrap();
        assert!(order.status.is_terminal());
        seen_uuids.insert(order.id);
    }
    assert_eq!(seen_uuids.len(), 50);
}
