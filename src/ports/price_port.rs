//! Price-series source port.

use crate::domain::bar::Bar;
use crate::domain::error::RrsweepError;
use crate::domain::interval::Interval;
use crate::domain::pair::Pair;
use async_trait::async_trait;

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// All stored bars for a symbol and interval, in any order.
    async fn fetch_bars(&self, symbol: &str, interval: Interval) -> Result<Vec<Bar>, RrsweepError>;

    async fn list_pairs(&self) -> Result<Vec<Pair>, RrsweepError>;
}
