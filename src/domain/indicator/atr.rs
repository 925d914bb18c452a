//! Average True Range with Wilder smoothing.
//!
//! TR[0] = high - low; afterwards the usual true range against the previous close.
//! Seed is the mean of the first n true ranges, then
//! ATR[i] = (ATR[i-1] * (n-1) + TR[i]) / n. Warmup: first (n-1) values are undefined.

use super::Series;
use crate::domain::bar::Bar;

pub fn calculate_atr(bars: &[Bar], period: usize) -> Series {
    let mut out = vec![None; bars.len()];
    if period == 0 || bars.len() < period {
        return out;
    }

    let tr: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.range()
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect();

    let mut atr = tr[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(atr);
    for (i, &range) in tr.iter().enumerate().skip(period) {
        atr = (atr * (period - 1) as f64 + range) / period as f64;
        out[i] = Some(atr);
    }

    out
}
