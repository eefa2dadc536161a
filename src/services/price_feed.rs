// services/price_feed.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::errors::Result;

/// A conversion rate with its observation time. Consumers decide how old
/// a quote they are willing to act on.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub usd_per_eth: f64,
    pub quoted_at: DateTime<Utc>,
}

impl PriceQuote {
    pub fn is_stale(&self, max_age: Duration) -> bool {
        Utc::now() - self.quoted_at > max_age
    }
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn latest(&self) -> Result<PriceQuote>;
}

/// Fixed-rate feed standing in for a live market source. Not suitable for
/// production pricing; the rate comes from configuration and each quote is
/// stamped at call time.
pub struct FixedRateFeed {
    usd_per_eth: f64,
}

impl FixedRateFeed {
    pub fn new(usd_per_eth: f64) -> Self {
        FixedRateFeed { usd_per_eth }
    }
}

#[async_trait]
impl PriceFeed for FixedRateFeed {
    async fn latest(&self) -> Result<PriceQuote> {
        Ok(PriceQuote {
            usd_per_eth: self.usd_per_eth,
            quoted_at: Utc::now(),
        })
    }
}
