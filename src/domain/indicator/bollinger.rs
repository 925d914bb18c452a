//! Bollinger Bands.
//!
//! - Middle: SMA over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! StdDev is the population standard deviation (divides by N).
//! Warmup: first (period-1) values are undefined.

use super::Series;

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerSeries {
    pub middle: Series,
    pub upper: Series,
    pub lower: Series,
}

pub fn calculate_bollinger(closes: &[f64], period: usize, multiplier: f64) -> BollingerSeries {
    let len = closes.len();
    let mut bands = BollingerSeries {
        middle: vec![None; len],
        upper: vec![None; len],
        lower: vec![None; len],
    };
    if period == 0 {
        return bands;
    }

    for i in (period - 1)..len {
        let window = &closes[i + 1 - period..=i];
        let middle = window.iter().sum::<f64>() / period as f64;
        let variance = window
            .iter()
            .map(|c| {
                let diff = c - middle;
                diff * diff
            })
            .sum::<f64>()
            / period as f64;
        let width = multiplier * variance.sqrt();

        bands.middle[i] = Some(middle);
        bands.upper[i] = Some(middle + width);
        bands.lower[i] = Some(middle - width);
    }

    bands
}
