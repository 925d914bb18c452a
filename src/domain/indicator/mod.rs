//! Technical indicator provider.
//!
//! Every function takes a slice aligned to the bar series and returns a vector
//! of the same length. Bars inside an indicator's warmup carry `None`; callers
//! treat an undefined value as "cannot originate a trade".

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rolling;
pub mod rsi;

pub use atr::calculate_atr;
pub use bollinger::{calculate_bollinger, BollingerSeries};
pub use ema::calculate_ema;
pub use macd::{calculate_macd, MacdSeries};
pub use rolling::rolling_mean;
pub use rsi::calculate_rsi;

/// One value per bar, `None` during warmup.
pub type Series = Vec<Option<f64>>;

/// Value at `i`, treating out-of-range and non-finite values as undefined.
pub fn value_at(series: &[Option<f64>], i: usize) -> Option<f64> {
    series.get(i).copied().flatten().filter(|v| v.is_finite())
}
