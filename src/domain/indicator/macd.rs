//! MACD (Moving Average Convergence Divergence).
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9.
//! The line is defined from index max(fast, slow) - 1, the signal and histogram
//! another (signal - 1) bars later.

use super::{calculate_ema, Series};

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Series,
    pub signal: Series,
    pub histogram: Series,
}

impl MacdSeries {
    fn undefined(len: usize) -> Self {
        Self {
            line: vec![None; len],
            signal: vec![None; len],
            histogram: vec![None; len],
        }
    }
}

pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdSeries {
    let len = closes.len();
    if fast == 0 || slow == 0 || signal_period == 0 {
        return MacdSeries::undefined(len);
    }

    let ema_fast = calculate_ema(closes, fast);
    let ema_slow = calculate_ema(closes, slow);

    let line: Series = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    // EMA of the defined tail of the line, re-aligned to the bar index.
    let mut signal = vec![None; len];
    if let Some(start) = line.iter().position(Option::is_some) {
        let tail: Vec<f64> = line[start..].iter().map(|v| v.unwrap_or(0.0)).collect();
        for (offset, value) in calculate_ema(&tail, signal_period).into_iter().enumerate() {
            signal[start + offset] = value;
        }
    }

    let histogram = line
        .iter()
        .zip(&signal)
        .map(|(l, s)| Some((*l)? - (*s)?))
        .collect();

    MacdSeries {
        line,
        signal,
        histogram,
    }
}

pub fn calculate_macd_default(closes: &[f64]) -> MacdSeries {
    calculate_macd(closes, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
}

/// Bars needed before the signal line is defined.
pub fn macd_lookback(fast: usize, slow: usize, signal_period: usize) -> usize {
    fast.max(slow) + signal_period - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1).collect()
    }

    #[test]
    fn macd_warmup_default() {
        let series = calculate_macd_default(&trending(60));
        let first_signal = macd_lookback(DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL) - 1;

        assert!(series.line[DEFAULT_SLOW - 2].is_none());
        assert!(series.line[DEFAULT_SLOW - 1].is_some());
        assert!(series.signal[first_signal - 1].is_none());
        assert!(series.signal[first_signal].is_some());
    }

    #[test]
    fn macd_histogram_equals_line_minus_signal() {
        let series = calculate_macd_default(&trending(60));
        for i in 0..60 {
            if let (Some(l), Some(s), Some(h)) =
                (series.line[i], series.signal[i], series.histogram[i])
            {
                assert!((h - (l - s)).abs() < f64::EPSILON);
            }
        }
    }

    #[test]
    fn macd_line_is_ema_fast_minus_ema_slow() {
        let closes = trending(40);
        let series = calculate_macd(&closes, 3, 6, 3);
        let fast = calculate_ema(&closes, 3);
        let slow = calculate_ema(&closes, 6);
        for i in 5..40 {
            let expected = fast[i].unwrap() - slow[i].unwrap();
            assert!((series.line[i].unwrap() - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn macd_zero_period() {
        let series = calculate_macd(&trending(10), 0, 26, 9);
        assert!(series.line.iter().all(Option::is_none));
    }

    #[test]
    fn macd_custom_parameters() {
        let series = calculate_macd(&trending(30), 5, 10, 3);
        let warmup = macd_lookback(5, 10, 3) - 1;
        assert!(series.signal[warmup - 1].is_none());
        assert!(series.signal[warmup].is_some());
    }
}
