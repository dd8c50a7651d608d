//! Order and audit record types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted order status. Intermediate in-flight states (`routing`,
/// `submitted`) are deliberately absent here — they are progress values
/// emitted to the audit log and pushed to subscribers but never written
/// to `orders.status` (spec open question, resolved in DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether `self -> next` is a legal persisted transition.
    ///
    /// Terminal states never transition. `completed -> *` is rejected
    /// even though `completed` is already covered by `is_terminal`, to
    /// make the rule explicit at the call site.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if *self == next {
            return false;
        }
        true
    }
}

/// In-memory progress values reported to the audit bus and to
/// subscribers over the notification hub. A superset of [`OrderStatus`]
/// that additionally carries the non-persisted `routing`/`submitted`
/// steps of a swap in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Processing,
    Routing,
    Submitted,
    Completed,
    Failed,
    Cancelled,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Routing => "routing",
            Self::Submitted => "submitted",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub token_in: String,
    pub token_out: String,
    pub amount: Decimal,
    pub status: OrderStatus,
    pub slippage_tolerance: Decimal,
    pub max_retries: u32,
    pub retry_count: u32,
    pub selected_venue: Option<String>,
    pub executed_price: Option<Decimal>,
    pub transaction_hash: Option<String>,
    pub error_message: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Set once a job has ever been enqueued for this order. Gates hard
    /// delete: only `pending` orders that never had a job enqueued may
    /// be deleted, which is how an enqueue failure during order
    /// creation rolls back the orphaned row.
    pub job_enqueued: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Invariant check: `status = completed` implies venue, tx hash,
    /// price and confirmation timestamp are all present.
    pub fn completion_invariant_holds(&self) -> bool {
        if self.status != OrderStatus::Completed {
            return true;
        }
        self.selected_venue.is_some()
            && self.transaction_hash.is_some()
            && self.executed_price.map(|p| p > Decimal::ZERO).unwrap_or(false)
            && self.confirmed_at.is_some()
    }
}

/// Input to [`crate::order::store::OrderStore::create`].
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderInput {
    pub token_in: String,
    pub token_out: String,
    pub amount: Decimal,
    #[serde(default)]
    pub slippage_tolerance: Option<Decimal>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum OrderValidationError {
    #[error("tokenIn and tokenOut must differ")]
    SameToken,
    #[error("tokenIn must not be empty")]
    EmptyTokenIn,
    #[error("tokenOut must not be empty")]
    EmptyTokenOut,
    #[error("amount must be positive and finite")]
    InvalidAmount,
    #[error("slippageTolerance must be between 0 and 100")]
    InvalidSlippage,
    #[error("maxRetries must be between 0 and 10")]
    InvalidMaxRetries,
}

pub const DEFAULT_SLIPPAGE_TOLERANCE: &str = "0.5";
pub const DEFAULT_MAX_RETRIES: u32 = 3;

impl CreateOrderInput {
    pub fn validate(&self) -> Result<(), OrderValidationError> {
        if self.token_in.is_empty() {
            return Err(OrderValidationError::EmptyTokenIn);
        }
        if self.token_out.is_empty() {
            return Err(OrderValidationError::EmptyTokenOut);
        }
        if self.token_in == self.token_out {
            return Err(OrderValidationError::SameToken);
        }
        if self.amount <= Decimal::ZERO {
            return Err(OrderValidationError::InvalidAmount);
        }
        if let Some(s) = self.slippage_tolerance {
            if s < Decimal::ZERO || s > Decimal::from(100) {
                return Err(OrderValidationError::InvalidSlippage);
            }
        }
        if let Some(r) = self.max_retries {
            if r > 10 {
                return Err(OrderValidationError::InvalidMaxRetries);
            }
        }
        Ok(())
    }
}

/// Partial update applied atomically by [`crate::order::store::OrderStore::update`].
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub retry_count: Option<u32>,
    pub selected_venue: Option<Option<String>>,
    pub executed_price: Option<Option<Decimal>>,
    pub transaction_hash: Option<Option<String>>,
    pub error_message: Option<Option<String>>,
    pub confirmed_at: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilters {
    pub status: Option<OrderStatus>,
    pub token_in: Option<String>,
    pub token_out: Option<String>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Append-only audit record, ordered per order by `(timestamp, event_version)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub order_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub event_version: i64,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_reject_further_transitions() {
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Failed.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn non_terminal_states_allow_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Pending));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn rejects_same_token_pair() {
        let input = CreateOrderInput {
            token_in: "SOL".into(),
            token_out: "SOL".into(),
            amount: Decimal::ONE,
            slippage_tolerance: None,
            max_retries: None,
        };
        assert!(matches!(input.validate(), Err(OrderValidationError::SameToken)));
    }

    #[test]
    fn rejects_non_positive_amount() {
        let input = CreateOrderInput {
            token_in: "SOL".into(),
            token_out: "USDC".into(),
            amount: Decimal::ZERO,
            slippage_tolerance: None,
            max_retries: None,
        };
        assert!(matches!(input.validate(), Err(OrderValidationError::InvalidAmount)));
    }

    #[test]
    fn rejects_out_of_range_slippage() {
        let input = CreateOrderInput {
            token_in: "SOL".into(),
            token_out: "USDC".into(),
            amount: Decimal::ONE,
            slippage_tolerance: Some(Decimal::from(101)),
            max_retries: None,
        };
        assert!(matches!(input.validate(), Err(OrderValidationError::InvalidSlippage)));
    }

    #[test]
    fn completion_invariant_requires_all_fields() {
        let mut order = Order {
            id: Uuid::new_v4(),
            token_in: "SOL".into(),
            token_out: "USDC".into(),
            amount: Decimal::ONE,
            status: OrderStatus::Completed,
            slippage_tolerance: Decimal::new(5, 1),
            max_retries: 3,
            retry_count: 0,
            selected_venue: None,
            executed_price: None,
            transaction_hash: None,
            error_message: None,
            confirmed_at: None,
            job_enqueued: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!order.completion_invariant_holds());

        order.selected_venue = Some("meteora".into());
        order.transaction_hash = Some("S1".into());
        order.executed_price = Some(Decimal::new(962, 1));
        order.confirmed_at = Some(Utc::now());
        assert!(order.completion_invariant_holds());
    }
}
