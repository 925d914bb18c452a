//! Validated, ascending price series for one symbol and interval.

use crate::domain::bar::Bar;
use crate::domain::error::RrsweepError;
use crate::domain::interval::Interval;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct PriceSeries {
    pub symbol: String,
    pub interval: Interval,
    bars: Vec<Bar>,
}

impl PriceSeries {
    /// Sort bars ascending (sources may return either order) and reject duplicates.
    ///
    /// An empty input is `NoData`; equal timestamps are `InvalidSeries`.
    pub fn from_unordered(
        symbol: &str,
        interval: Interval,
        mut bars: Vec<Bar>,
    ) -> Result<Self, RrsweepError> {
        if bars.is_empty() {
            return Err(RrsweepError::NoData {
                symbol: symbol.to_string(),
                interval: interval.to_string(),
            });
        }
        bars.sort_by_key(|b| b.timestamp);
        Self::from_ascending(symbol, interval, bars)
    }

    /// Accept bars that must already be strictly increasing in time.
    pub fn from_ascending(
        symbol: &str,
        interval: Interval,
        bars: Vec<Bar>,
    ) -> Result<Self, RrsweepError> {
        if let Some(w) = bars.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(RrsweepError::InvalidSeries {
                symbol: symbol.to_string(),
                interval: interval.to_string(),
                timestamp: w[1].timestamp,
            });
        }
        Ok(Self {
            symbol: symbol.to_string(),
            interval,
            bars,
        })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.bars.iter().map(|b| b.timestamp).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    /// Fail with `InsufficientData` when fewer than `minimum` bars are present.
    pub fn require(&self, minimum: usize) -> Result<(), RrsweepError> {
        if self.bars.len() < minimum {
            return Err(RrsweepError::InsufficientData {
                symbol: self.symbol.clone(),
                interval: self.interval.to_string(),
                bars: self.bars.len(),
                minimum,
            });
        }
        Ok(())
    }
}
