//! Higher-timeframe trend and its as-of alignment onto a lower timeframe.

use crate::domain::indicator::{calculate_ema, value_at};
use crate::domain::series::PriceSeries;
use chrono::{DateTime, Utc};

pub const DEFAULT_TREND_EMA: usize = 200;

/// Trend state of one higher-timeframe bar. `None` while the EMA warms up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendPoint {
    pub timestamp: DateTime<Utc>,
    pub uptrend: Option<bool>,
}

/// `close > EMA(ema_period)` per bar.
pub fn compute_trend(series: &PriceSeries, ema_period: usize) -> Vec<TrendPoint> {
    let closes = series.closes();
    let ema = calculate_ema(&closes, ema_period);
    series
        .bars()
        .iter()
        .enumerate()
        .map(|(i, bar)| TrendPoint {
            timestamp: bar.timestamp,
            uptrend: value_at(&ema, i).map(|e| bar.close > e),
        })
        .collect()
}

/// For each lower timestamp, the latest higher trend at or before it.
///
/// Both inputs must be ascending. Runs as a single merge over the two slices.
pub fn align_trend(lower: &[DateTime<Utc>], higher: &[TrendPoint]) -> Vec<Option<bool>> {
    let mut out = Vec::with_capacity(lower.len());
    let mut cursor = 0usize;
    let mut current: Option<bool> = None;

    for ts in lower {
        while cursor < higher.len() && higher[cursor].timestamp <= *ts {
            current = higher[cursor].uptrend;
            cursor += 1;
        }
        out.push(current);
    }
    out
}

/// Trend for intervals that are not filtered by a higher timeframe.
pub fn constant_uptrend(len: usize) -> Vec<Option<bool>> {
    vec![Some(true); len]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use crate::domain::interval::Interval;

    const HOUR_MS: i64 = 3_600_000;

    fn ts(hour: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(hour * HOUR_MS).unwrap()
    }

    fn point(hour: i64, uptrend: Option<bool>) -> TrendPoint {
        TrendPoint {
            timestamp: ts(hour),
            uptrend,
        }
    }

    #[test]
    fn lower_bars_before_first_higher_row_are_undefined() {
        let higher = vec![point(4, Some(true)), point(8, Some(false))];
        let lower: Vec<_> = (0..10).map(ts).collect();
        let aligned = align_trend(&lower, &higher);

        assert_eq!(&aligned[0..4], &[None, None, None, None]);
        assert_eq!(&aligned[4..8], &[Some(true); 4]);
        assert_eq!(&aligned[8..10], &[Some(false); 2]);
    }

    #[test]
    fn exact_timestamp_match_is_included() {
        let higher = vec![point(2, Some(false))];
        let aligned = align_trend(&[ts(1), ts(2)], &higher);
        assert_eq!(aligned, vec![None, Some(false)]);
    }

    #[test]
    fn undefined_higher_trend_is_carried_forward() {
        let higher = vec![point(0, Some(true)), point(4, None)];
        let aligned = align_trend(&[ts(3), ts(5)], &higher);
        assert_eq!(aligned, vec![Some(true), None]);
    }

    #[test]
    fn empty_higher_series_aligns_to_none() {
        let aligned = align_trend(&[ts(1), ts(2)], &[]);
        assert_eq!(aligned, vec![None, None]);
    }

    #[test]
    fn trend_compares_close_to_ema() {
        let bars: Vec<Bar> = (0..6)
            .map(|h| {
                let close = if h < 5 { 100.0 } else { 90.0 };
                Bar::from_millis(h * 4 * HOUR_MS, close, close, close, close, 1.0).unwrap()
            })
            .collect();
        let series = PriceSeries::from_ascending("BTCUSDT", Interval::FourHours, bars).unwrap();
        let trend = compute_trend(&series, 3);

        assert_eq!(trend[0].uptrend, None);
        assert_eq!(trend[1].uptrend, None);
        // flat closes sit on the EMA, which is not above it
        assert_eq!(trend[2].uptrend, Some(false));
        assert_eq!(trend[5].uptrend, Some(false));
        assert_eq!(trend[5].timestamp, ts(20));
    }
}
