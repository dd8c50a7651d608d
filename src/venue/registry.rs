//! Venue Registry & Aggregator: fans a quote request out to every
//! enabled venue concurrently and picks a winner by a deterministic
//! tie-break order.
//!
//! `futures::future::join_all` drives one future per venue, tolerant of
//! individual failures.

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::venue::adapter::{Quote, VenueAdapter, VenueError};

pub struct VenueRegistry {
    venues: Vec<Arc<dyn VenueAdapter>>,
}

impl VenueRegistry {
    pub fn new(venues: Vec<Arc<dyn VenueAdapter>>) -> Self {
        Self { venues }
    }

    pub fn venue_names(&self) -> Vec<String> {
        self.venues.iter().map(|v| v.name().to_string()).collect()
    }

    fn enabled_for_pair(&self, token_in: &str, token_out: &str) -> Vec<&Arc<dyn VenueAdapter>> {
        self.venues
            .iter()
            .filter(|v| v.enabled())
            .filter(|v| {
                v.supported_pairs()
                    .iter()
                    .any(|(a, b)| a == token_in && b == token_out)
            })
            .collect()
    }

    /// Queries every enabled, pair-supporting venue concurrently.
    /// Individual venue failures are swallowed into the returned list
    /// alongside successes — the caller decides what "no quotes" means.
    pub async fn get_all_quotes(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: Decimal,
        slippage_tolerance: Decimal,
    ) -> Vec<Result<Quote, VenueError>> {
        let candidates = self.enabled_for_pair(token_in, token_out);
        let futures = candidates
            .into_iter()
            .map(|v| v.get_quote(token_in, token_out, amount_in, slippage_tolerance));
        futures::future::join_all(futures).await
    }

    /// Best quote by a deterministic tie-break: highest `amountOut`,
    /// then lowest `estimatedFee`, then venue name ascending.
    pub async fn get_best_quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: Decimal,
        slippage_tolerance: Decimal,
    ) -> Result<Quote, VenueError> {
        let results = self
            .get_all_quotes(token_in, token_out, amount_in, slippage_tolerance)
            .await;
        let mut quotes: Vec<Quote> = results.into_iter().filter_map(Result::ok).collect();

        if quotes.is_empty() {
            return Err(VenueError::UnsupportedPair {
                venue: "registry".to_string(),
                token_in: token_in.to_string(),
                token_out: token_out.to_string(),
            });
        }

        quotes.sort_by(|a, b| {
            b.amount_out
                .cmp(&a.amount_out)
                .then(a.estimated_fee.cmp(&b.estimated_fee))
                .then(a.venue.cmp(&b.venue))
        });
        Ok(quotes.remove(0))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn VenueAdapter>> {
        self.venues.iter().find(|v| v.name() == name).cloned()
    }

    /// Every enabled venue other than `exclude`, in registration order —
    /// the orchestrator's fallback pool once a venue has failed.
    pub fn alternatives(&self, exclude: &str) -> Vec<Arc<dyn VenueAdapter>> {
        self.venues
            .iter()
            .filter(|v| v.enabled() && v.name() != exclude)
            .cloned()
            .collect()
    }

    pub async fn health_check_all(&self) -> Vec<(String, bool)> {
        let futures = self.venues.iter().map(|v| async move {
            let ok = v.health_check().await;
            (v.name().to_string(), ok)
        });
        futures::future::join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::mock::MockVenue;

    fn registry() -> VenueRegistry {
        VenueRegistry::new(vec![
            Arc::new(MockVenue::new("meteora", 10, 5)),
            Arc::new(MockVenue::new("raydium", 25, 2)),
            Arc::new(MockVenue::new("orca", 10, 3)),
        ])
    }

    #[tokio::test]
    async fn best_quote_picks_highest_amount_out_then_lowest_fee() {
        let reg = registry();
        let best = reg
            .get_best_quote("SOL", "USDC", Decimal::new(1000, 0), Decimal::new(5, 1))
            .await
            .unwrap();
        // meteora and orca both have the 10bps spread (highest amountOut);
        // orca wins on lower fee.
        assert_eq!(best.venue, "orca");
    }

    #[tokio::test]
    async fn best_quote_sets_minimum_amount_out_from_slippage_tolerance() {
        let reg = registry();
        let best = reg
            .get_best_quote("SOL", "USDC", Decimal::new(1000, 0), Decimal::new(1, 0))
            .await
            .unwrap();
        let expected = best.amount_out * Decimal::new(99, 2);
        assert_eq!(best.minimum_amount_out, expected);
    }

    #[tokio::test]
    async fn unsupported_pair_yields_no_quotes() {
        let reg = registry();
        let err = reg
            .get_best_quote("DOGE", "SHIB", Decimal::new(1, 0), Decimal::new(5, 1))
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn disabled_venue_excluded_from_aggregation() {
        let reg = VenueRegistry::new(vec![
            Arc::new(MockVenue::new("meteora", 10, 5).disabled()),
            Arc::new(MockVenue::new("raydium", 25, 2)),
        ]);
        let all = reg
            .get_all_quotes("SOL", "USDC", Decimal::new(1, 0), Decimal::new(5, 1))
            .await;
        assert_eq!(all.len(), 1);
    }
}
