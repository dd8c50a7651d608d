//! Deterministic mock venues standing in for real DEX integrations.
//!
//! Live venue wiring is out of scope here, but the registry,
//! orchestrator, and worker pool all need something to drive against;
//! these mirror the shape of a real adapter closely enough that
//! swapping one in later is a matter of implementing [`VenueAdapter`],
//! not touching any caller.

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::venue::adapter::{
    Quote, SwapResult, TransactionState, TransactionStatus, VenueAdapter, VenueError,
};

pub struct MockVenue {
    name: String,
    enabled: bool,
    pairs: Vec<(String, String)>,
    /// Basis points subtracted from the naive 1:1 rate, so distinct
    /// mocks produce distinct quotes for the registry's best-quote sort
    /// to discriminate on.
    spread_bps: u32,
    fee_bps: u32,
    /// Forces every swap through this venue to fail, for exercising the
    /// orchestrator's venue-exhaustion path in tests.
    always_fails: bool,
    /// Realized slippage in percent, one entry consumed per
    /// `execute_swap` call and the last entry repeated once exhausted.
    /// A single value behaves like a constant; multiple values let a
    /// test drive "exceeds tolerance, then succeeds" deterministically
    /// across retries of the same order. An empty sequence picks a
    /// small random value instead.
    slippage_sequence_pct: Vec<Decimal>,
    swap_call_count: AtomicUsize,
    latency: Duration,
    tx_counter: AtomicU64,
}

impl MockVenue {
    pub fn new(name: impl Into<String>, spread_bps: u32, fee_bps: u32) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            pairs: vec![
                ("SOL".to_string(), "USDC".to_string()),
                ("USDC".to_string(), "SOL".to_string()),
                ("ETH".to_string(), "USDC".to_string()),
                ("USDC".to_string(), "ETH".to_string()),
            ],
            spread_bps,
            fee_bps,
            always_fails: false,
            slippage_sequence_pct: Vec::new(),
            swap_call_count: AtomicUsize::new(0),
            latency: Duration::from_millis(5),
            tx_counter: AtomicU64::new(0),
        }
    }

    pub fn always_failing(mut self) -> Self {
        self.always_fails = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_fixed_slippage_pct(mut self, pct: Decimal) -> Self {
        self.slippage_sequence_pct = vec![pct];
        self
    }

    pub fn with_slippage_sequence_pct(mut self, sequence: Vec<Decimal>) -> Self {
        self.slippage_sequence_pct = sequence;
        self
    }

    fn next_slippage_pct(&self) -> Decimal {
        if self.slippage_sequence_pct.is_empty() {
            let jitter: f64 = rand::thread_rng().gen_range(0.0..0.05);
            return Decimal::try_from(jitter).unwrap();
        }
        let call = self.swap_call_count.fetch_add(1, Ordering::Relaxed);
        let index = call.min(self.slippage_sequence_pct.len() - 1);
        self.slippage_sequence_pct[index]
    }
}

#[async_trait]
impl VenueAdapter for MockVenue {
    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn supported_pairs(&self) -> Vec<(String, String)> {
        self.pairs.clone()
    }

    async fn get_quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: Decimal,
        slippage_tolerance: Decimal,
    ) -> Result<Quote, VenueError> {
        tokio::time::sleep(self.latency).await;

        if !self
            .pairs
            .iter()
            .any(|(a, b)| a == token_in && b == token_out)
        {
            return Err(VenueError::UnsupportedPair {
                venue: self.name.clone(),
                token_in: token_in.to_string(),
                token_out: token_out.to_string(),
            });
        }

        let spread = Decimal::new(self.spread_bps as i64, 4);
        let fee = Decimal::new(self.fee_bps as i64, 4);
        let amount_out = amount_in * (Decimal::ONE - spread);
        let estimated_fee = amount_in * fee;
        let minimum_amount_out =
            amount_out * (Decimal::ONE - slippage_tolerance / Decimal::from(100));

        Ok(Quote {
            venue: self.name.clone(),
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount_in,
            amount_out,
            price_per_token: amount_out / amount_in,
            estimated_fee,
            estimated_price_impact: spread,
            minimum_amount_out,
            route: vec![token_in.to_string(), token_out.to_string()],
            timestamp: chrono::Utc::now(),
            expires_in_seconds: 30,
        })
    }

    async fn execute_swap(
        &self,
        quote: &Quote,
        slippage_tolerance: Decimal,
    ) -> Result<SwapResult, VenueError> {
        tokio::time::sleep(self.latency).await;

        if self.always_fails {
            return Err(VenueError::Rejected {
                venue: self.name.clone(),
                message: "mock venue configured to always reject".to_string(),
            });
        }

        let slippage_pct = self.next_slippage_pct();
        let actual_amount_out =
            quote.amount_out * (Decimal::ONE - slippage_pct / Decimal::from(100));

        if actual_amount_out < quote.minimum_amount_out {
            return Err(VenueError::SlippageExceeded {
                venue: self.name.clone(),
                message: format!(
                    "executed amountOut {actual_amount_out} below minimumAmountOut {} (tolerance {slippage_tolerance}%)",
                    quote.minimum_amount_out
                ),
            });
        }

        let seq = self.tx_counter.fetch_add(1, Ordering::Relaxed);

        Ok(SwapResult {
            venue: self.name.clone(),
            transaction_hash: format!("mock-{}-{}-{}", self.name, seq, Uuid::new_v4()),
            executed_price: quote.price_per_token,
            executed_amount_out: actual_amount_out,
        })
    }

    async fn get_transaction_status(&self, tx_hash: &str) -> Result<TransactionStatus, VenueError> {
        tokio::time::sleep(self.latency).await;
        if !tx_hash.starts_with("mock-") {
            return Err(VenueError::TransactionNotFound {
                venue: self.name.clone(),
                tx_hash: tx_hash.to_string(),
            });
        }
        Ok(TransactionStatus {
            state: TransactionState::Confirmed,
            confirmations: 32,
        })
    }

    async fn health_check(&self) -> bool {
        self.enabled && !self.always_fails
    }
}
