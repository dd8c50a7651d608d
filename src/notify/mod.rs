//! Notification Hub: routes execution progress to whichever WebSocket
//! connections are subscribed to an order. Live connections are keyed
//! by order id behind a concurrent map, and pushes never block the
//! publisher on a slow client.

pub mod message;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

pub use message::{WsClientAction, WsPush};

pub struct NotificationHub {
    subscribers: DashMap<Uuid, Vec<mpsc::UnboundedSender<WsPush>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    /// Registers a new subscriber for `order_id` and returns the
    /// receiving half. Dropping the receiver (connection closed) is
    /// how a subscriber unregisters — `push` prunes dead senders
    /// lazily rather than requiring an explicit unsubscribe call.
    pub fn subscribe(&self, order_id: Uuid) -> mpsc::UnboundedReceiver<WsPush> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.entry(order_id).or_default().push(tx);
        rx
    }

    /// Fans a message out to every live subscriber of `order_id`,
    /// dropping senders whose receiver has gone away. Never blocks the
    /// caller on a slow or stalled consumer.
    pub fn push(&self, order_id: Uuid, message: WsPush) {
        if let Some(mut entry) = self.subscribers.get_mut(&order_id) {
            entry.retain(|tx| tx.send(message.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self, order_id: Uuid) -> usize {
        self.subscribers
            .get(&order_id)
            .map(|e| e.len())
            .unwrap_or(0)
    }

    /// Drops the whole subscriber list for a terminal order, so the
    /// map doesn't grow without bound across the life of the process.
    pub fn clear(&self, order_id: Uuid) {
        self.subscribers.remove(&order_id);
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for WsPush {
    fn clone(&self) -> Self {
        match self {
            Self::Status {
                order_id,
                status,
                attempt,
            } => Self::Status {
                order_id: *order_id,
                status: status.clone(),
                attempt: *attempt,
            },
            Self::Error { order_id, message } => Self::Error {
                order_id: *order_id,
                message: message.clone(),
            },
            Self::Success {
                order_id,
                transaction_hash,
                executed_price,
                venue,
            } => Self::Success {
                order_id: *order_id,
                transaction_hash: transaction_hash.clone(),
                executed_price: *executed_price,
                venue: venue.clone(),
            },
            Self::Ack { message } => Self::Ack {
                message: message.clone(),
            },
        }
    }
}

pub type SharedNotificationHub = Arc<NotificationHub>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_delivers_to_subscriber() {
        let hub = NotificationHub::new();
        let order_id = Uuid::new_v4();
        let mut rx = hub.subscribe(order_id);

        hub.push(
            order_id,
            WsPush::Status {
                order_id,
                status: "processing".to_string(),
                attempt: Some(1),
            },
        );

        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, WsPush::Status { .. }));
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned_on_next_push() {
        let hub = NotificationHub::new();
        let order_id = Uuid::new_v4();
        let rx = hub.subscribe(order_id);
        drop(rx);

        hub.push(
            order_id,
            WsPush::Error {
                order_id,
                message: "x".to_string(),
            },
        );

        assert_eq!(hub.subscriber_count(order_id), 0);
    }

    #[test]
    fn push_to_unknown_order_is_a_no_op() {
        let hub = NotificationHub::new();
        hub.push(
            Uuid::new_v4(),
            WsPush::Error {
                order_id: Uuid::new_v4(),
                message: "x".to_string(),
            },
        );
    }
}
