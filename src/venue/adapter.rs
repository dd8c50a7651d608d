//! Venue Adapter: the closed capability set every DEX/venue integration
//! implements, behind a single narrow async trait so the registry can
//! treat every venue uniformly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum VenueError {
    #[error("{venue}: pair {token_in}/{token_out} not supported")]
    UnsupportedPair {
        venue: String,
        token_in: String,
        token_out: String,
    },
    #[error("{venue}: quote expired or slippage exceeded: {message}")]
    SlippageExceeded { venue: String, message: String },
    #[error("{venue}: venue unreachable: {message}")]
    Unreachable { venue: String, message: String },
    #[error("{venue}: swap rejected: {message}")]
    Rejected { venue: String, message: String },
    #[error("{venue}: transaction {tx_hash} not found")]
    TransactionNotFound { venue: String, tx_hash: String },
}

impl VenueError {
    /// Whether this failure is worth retrying on a different venue or
    /// the same venue later: only hard rejections and unsupported pairs
    /// are terminal for the *current attempt's* venue choice, everything
    /// else is transient.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, VenueError::UnsupportedPair { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub venue: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    pub price_per_token: Decimal,
    pub estimated_fee: Decimal,
    pub estimated_price_impact: Decimal,
    /// Floor the executed amount out must clear for the swap to be
    /// honored: `amount_out * (1 - slippage_tolerance / 100)`.
    pub minimum_amount_out: Decimal,
    /// Venue-specific hop path, e.g. `["SOL", "USDC"]` for a direct
    /// swap or `["SOL", "USDT", "USDC"]` when routed through an
    /// intermediate token.
    pub route: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub expires_in_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapResult {
    pub venue: String,
    pub transaction_hash: String,
    pub executed_price: Decimal,
    pub executed_amount_out: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub state: TransactionState,
    pub confirmations: u32,
}

/// A single venue's trading pairs, quote and execution surface. Every
/// method is venue-scoped: the registry is what fans requests out
/// across many adapters.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn enabled(&self) -> bool;

    fn supported_pairs(&self) -> Vec<(String, String)>;

    async fn get_quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: Decimal,
        slippage_tolerance: Decimal,
    ) -> Result<Quote, VenueError>;

    async fn execute_swap(
        &self,
        quote: &Quote,
        slippage_tolerance: Decimal,
    ) -> Result<SwapResult, VenueError>;

    async fn get_transaction_status(&self, tx_hash: &str) -> Result<TransactionStatus, VenueError>;

    async fn health_check(&self) -> bool;
}
