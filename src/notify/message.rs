//! Wire messages pushed to WebSocket subscribers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::order::CreateOrderInput;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsPush {
    Status {
        order_id: Uuid,
        status: String,
        attempt: Option<u32>,
    },
    Error {
        order_id: Uuid,
        message: String,
    },
    Success {
        order_id: Uuid,
        transaction_hash: String,
        executed_price: Decimal,
        venue: String,
    },
    /// Generic acknowledgement, e.g. the reply to a client `ping`.
    #[serde(rename = "success")]
    Ack { message: String },
}

/// An `execute` client action creates a new order and binds the
/// sending socket as its subscriber, same payload shape as the
/// `POST /orders` request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WsClientAction {
    Execute { order: CreateOrderInput },
    Ping,
}
