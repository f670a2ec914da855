//! Algorithm execution context
//!
//! The context is the only surface an algorithm touches: latest quotes, a
//! monotonic clock, order submission and cancellation, a bucketed
//! historical volume profile, and a log hook. Orders submitted through
//! the context are stamped with the strategy id so fills route back to
//! the originating algorithm.

use crate::core::types::{OrderRequest, Quote, Symbol};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// The engine-side seam the context submits through.
pub trait OrderGateway: Send + Sync {
    /// Returns the allocated client order id, or the rejection reason.
    fn submit(&self, request: OrderRequest) -> Result<i64, String>;

    fn cancel(&self, client_order_id: i64) -> Result<(), String>;
}

/// Bucketed historical volume for VWAP-style pacing.
///
/// `profile(symbol, buckets)` returns per-bucket volume fractions that
/// sum to 1.0 across the interval.
pub trait VolumeProfileSource: Send + Sync {
    fn profile(&self, symbol: &Symbol, buckets: usize) -> Vec<f64>;
}

/// Flat profile: equal volume in every bucket.
pub struct UniformVolumeProfile;

impl VolumeProfileSource for UniformVolumeProfile {
    fn profile(&self, _symbol: &Symbol, buckets: usize) -> Vec<f64> {
        if buckets == 0 {
            return Vec::new();
        }
        vec![1.0 / buckets as f64; buckets]
    }
}

/// Handed to each algorithm at `initialize`. Cheap to clone.
#[derive(Clone)]
pub struct AlgoContext {
    strategy_id: String,
    quotes: Arc<DashMap<Symbol, Quote>>,
    gateway: Arc<dyn OrderGateway>,
    volume: Arc<dyn VolumeProfileSource>,
    started: Instant,
}

impl AlgoContext {
    /// `started` is the engine's start instant; every context and the
    /// scheduler's timer ticks share it as the monotonic epoch.
    pub fn new(
        strategy_id: impl Into<String>,
        quotes: Arc<DashMap<Symbol, Quote>>,
        gateway: Arc<dyn OrderGateway>,
        volume: Arc<dyn VolumeProfileSource>,
        started: Instant,
    ) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            quotes,
            gateway,
            volume,
            started,
        }
    }

    pub fn strategy_id(&self) -> &str {
        &self.strategy_id
    }

    /// Latest quote seen for the symbol, if any.
    pub fn latest_quote(&self, symbol: &Symbol) -> Option<Quote> {
        self.quotes.get(symbol).map(|q| q.clone())
    }

    /// Monotonic nanoseconds since engine start. Timer math must use
    /// this, never the wall clock.
    pub fn monotonic_nanos(&self) -> i64 {
        self.started.elapsed().as_nanos().min(i64::MAX as u128) as i64
    }

    /// Wall-clock epoch nanoseconds, for record stamping only.
    pub fn epoch_nanos(&self) -> i64 {
        crate::utils::clock::epoch_nanos()
    }

    /// Submit an order on behalf of this strategy. The request is stamped
    /// with the strategy id so the fill routes back here.
    pub fn submit_order(&self, mut request: OrderRequest) -> Result<i64, String> {
        request.strategy_id = Some(self.strategy_id.clone());
        self.gateway.submit(request)
    }

    pub fn cancel_order(&self, client_order_id: i64) -> Result<(), String> {
        self.gateway.cancel(client_order_id)
    }

    /// Historical volume fractions across `buckets` time buckets.
    pub fn volume_profile(&self, symbol: &Symbol, buckets: usize) -> Vec<f64> {
        self.volume.profile(symbol, buckets)
    }

    /// Structured log hook; lands in the engine's trace stream tagged
    /// with the strategy id.
    pub fn log(&self, message: &str) {
        info!(strategy = %self.strategy_id, "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Side;
    use crate::testing::test_context;

    #[test]
    fn test_submit_stamps_strategy_id() {
        let (ctx, gateway, _) = test_context("twap-1");
        let request = OrderRequest::limit(Symbol::equity("AAPL"), Side::Buy, 10, 15_000);
        let id = ctx.submit_order(request).unwrap();
        assert_eq!(id, 1);

        let submitted = gateway.submitted.lock();
        assert_eq!(submitted[0].strategy_id.as_deref(), Some("twap-1"));
    }

    #[test]
    fn test_rejection_propagates_reason() {
        let (ctx, gateway, _) = test_context("mm-1");
        *gateway.reject_with.lock() = Some("MaxOrderSize: too big".to_string());
        let request = OrderRequest::limit(Symbol::equity("AAPL"), Side::Buy, 10, 15_000);
        let err = ctx.submit_order(request).unwrap_err();
        assert!(err.contains("MaxOrderSize"));
    }

    #[test]
    fn test_quote_cache_lookup() {
        let (ctx, _, quotes) = test_context("x");
        let symbol = Symbol::equity("AAPL");
        assert!(ctx.latest_quote(&symbol).is_none());

        quotes.insert(
            symbol.clone(),
            Quote {
                symbol: symbol.clone(),
                bid_price: 14_990,
                ask_price: 15_010,
                bid_size: 100,
                ask_size: 100,
                timestamp_nanos: 1,
                price_scale: 100,
            },
        );
        assert_eq!(ctx.latest_quote(&symbol).unwrap().mid_price(), 15_000);
    }

    #[test]
    fn test_uniform_profile_sums_to_one() {
        let profile = UniformVolumeProfile.profile(&Symbol::equity("AAPL"), 10);
        assert_eq!(profile.len(), 10);
        let sum: f64 = profile.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(UniformVolumeProfile.profile(&Symbol::equity("AAPL"), 0).is_empty());
    }

    #[test]
    fn test_monotonic_clock_advances() {
        let (ctx, _, _) = test_context("clock");
        let a = ctx.monotonic_nanos();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = ctx.monotonic_nanos();
        assert!(b > a);
    }
}
