//! Persistence gateway for trades and summaries.
//!
//! Both insert operations are insert-if-absent on the record's key and must be
//! atomic with respect to concurrent callers.

use crate::domain::analytics::StrategySummary;
use crate::domain::error::RrsweepError;
use crate::domain::interval::Interval;
use crate::domain::trade::{SummaryKey, Trade, TradeKey};
use async_trait::async_trait;

/// Narrows `TradeStore::summaries`. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryFilter {
    pub strategy: Option<String>,
    pub symbol: Option<String>,
    pub interval: Option<Interval>,
}

impl SummaryFilter {
    pub fn matches(&self, summary: &StrategySummary) -> bool {
        self.strategy.as_ref().is_none_or(|s| *s == summary.strategy)
            && self.symbol.as_ref().is_none_or(|s| *s == summary.symbol)
            && self.interval.is_none_or(|i| i == summary.interval)
    }
}

#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn find_trade(&self, key: &TradeKey) -> Result<Option<Trade>, RrsweepError>;

    async fn exists_trade(&self, key: &TradeKey) -> Result<bool, RrsweepError> {
        Ok(self.find_trade(key).await?.is_some())
    }

    /// Insert trades whose key is not yet stored. Returns how many were new.
    async fn insert_trades(&self, trades: &[Trade]) -> Result<usize, RrsweepError>;

    async fn exists_summary(&self, key: &SummaryKey) -> Result<bool, RrsweepError>;

    /// `false` when a summary with the same key already existed.
    async fn insert_summary(&self, summary: &StrategySummary) -> Result<bool, RrsweepError>;

    /// Persisted trades of one grid point, ordered by entry time.
    async fn trades_for(&self, key: &SummaryKey) -> Result<Vec<Trade>, RrsweepError>;

    /// Summary keys that have trades, whether or not a summary exists.
    async fn trade_groups(&self) -> Result<Vec<SummaryKey>, RrsweepError>;

    async fn summaries(&self, filter: &SummaryFilter) -> Result<Vec<StrategySummary>, RrsweepError>;
}
