//! MACD line crossing its signal line on a volume spike, with the trend.
//!
//! Risk is the entry bar's range rather than a smoothed ATR.

use crate::domain::features::{BarContext, IndicatorSpec, RiskSource};
use crate::domain::indicator::macd::macd_lookback;
use crate::domain::signal::{Signal, SignalGenerator};
use crate::ports::config_port::ConfigPort;

pub const NAME: &str = "MACD-VolumeSpike";
pub const SECTION: &str = "strategy.macd_volume";

#[derive(Debug, Clone, PartialEq)]
pub struct MacdVolumeStrategy {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
    pub volume_window: usize,
    pub volume_multiplier: f64,
}

impl Default for MacdVolumeStrategy {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
            volume_window: 20,
            volume_multiplier: 1.5,
        }
    }
}

impl MacdVolumeStrategy {
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = Self::default();
        let period = |key: &str, default: usize| {
            config.get_int(SECTION, key, default as i64).max(1) as usize
        };
        Self {
            fast: period("fast", d.fast),
            slow: period("slow", d.slow),
            signal: period("signal", d.signal),
            volume_window: period("volume_window", d.volume_window),
            volume_multiplier: config.get_double(SECTION, "volume_multiplier", d.volume_multiplier),
        }
    }
}

impl SignalGenerator for MacdVolumeStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn indicator_spec(&self) -> IndicatorSpec {
        IndicatorSpec {
            macd_fast: self.fast,
            macd_slow: self.slow,
            macd_signal: self.signal,
            volume_window: self.volume_window,
            risk: RiskSource::BarRange,
            ..IndicatorSpec::default()
        }
    }

    // a crossover compares against the previous bar, hence the extra one
    fn required_lookback(&self) -> usize {
        (macd_lookback(self.fast, self.slow, self.signal) + 1).max(self.volume_window)
    }

    fn evaluate(&self, ctx: &BarContext<'_>) -> Signal {
        let Some(prev) = ctx.prev else {
            return Signal::None;
        };
        let f = ctx.features;
        let (Some(line), Some(signal), Some(prev_line), Some(prev_signal)) =
            (f.macd_line, f.macd_signal, prev.macd_line, prev.macd_signal)
        else {
            return Signal::None;
        };
        if !ctx.volume_spike(self.volume_multiplier) {
            return Signal::None;
        }

        let cross_up = prev_line < prev_signal && line > signal;
        let cross_down = prev_line > prev_signal && line < signal;
        Signal::from_conditions(
            cross_up && f.trend == Some(true),
            cross_down && f.trend == Some(false),
        )
    }
}
