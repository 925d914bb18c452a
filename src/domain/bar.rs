//! OHLCV bar representation.

use chrono::{DateTime, Utc};

/// One kline. `timestamp` is the bar's open time.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Build a bar from an epoch-millisecond open time, the unit klines are stored in.
    pub fn from_millis(
        open_time_ms: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Option<Self> {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(open_time_ms)?;
        Some(Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    pub fn open_time_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// high - low
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}
