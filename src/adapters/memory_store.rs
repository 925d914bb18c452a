//! In-process `TradeStore` for tests.

use crate::domain::analytics::StrategySummary;
use crate::domain::error::RrsweepError;
use crate::domain::trade::{SummaryKey, Trade, TradeKey};
use crate::ports::store_port::{SummaryFilter, TradeStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    trades: HashMap<TradeKey, Trade>,
    summaries: HashMap<SummaryKey, StrategySummary>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    latency: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before every existence check, widening check-then-write windows.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub async fn trade_count(&self) -> usize {
        self.inner.lock().await.trades.len()
    }

    pub async fn summary_count(&self) -> usize {
        self.inner.lock().await.summaries.len()
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn find_trade(&self, key: &TradeKey) -> Result<Option<Trade>, RrsweepError> {
        self.pause().await;
        Ok(self.inner.lock().await.trades.get(key).cloned())
    }

    async fn insert_trades(&self, trades: &[Trade]) -> Result<usize, RrsweepError> {
        let mut inner = self.inner.lock().await;
        let mut inserted = 0;
        for trade in trades {
            if let std::collections::hash_map::Entry::Vacant(slot) = inner.trades.entry(trade.key()) {
                slot.insert(trade.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn exists_summary(&self, key: &SummaryKey) -> Result<bool, RrsweepError> {
        self.pause().await;
        Ok(self.inner.lock().await.summaries.contains_key(key))
    }

    async fn insert_summary(&self, summary: &StrategySummary) -> Result<bool, RrsweepError> {
        let mut inner = self.inner.lock().await;
        let key = summary.key();
        if inner.summaries.contains_key(&key) {
            return Ok(false);
        }
        inner.summaries.insert(key, summary.clone());
        Ok(true)
    }

    async fn trades_for(&self, key: &SummaryKey) -> Result<Vec<Trade>, RrsweepError> {
        let inner = self.inner.lock().await;
        let mut trades: Vec<Trade> = inner
            .trades
            .iter()
            .filter(|(k, _)| k.summary == *key)
            .map(|(_, t)| t.clone())
            .collect();
        trades.sort_by_key(|t| t.entry_time);
        Ok(trades)
    }

    async fn trade_groups(&self) -> Result<Vec<SummaryKey>, RrsweepError> {
        let inner = self.inner.lock().await;
        let mut keys: Vec<SummaryKey> = Vec::new();
        for key in inner.trades.keys() {
            if !keys.contains(&key.summary) {
                keys.push(key.summary.clone());
            }
        }
        Ok(keys)
    }

    async fn summaries(&self, filter: &SummaryFilter) -> Result<Vec<StrategySummary>, RrsweepError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .summaries
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }
}
