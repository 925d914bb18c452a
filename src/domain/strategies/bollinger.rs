//! Close outside a Bollinger band on a volume spike, with the trend and a
//! minimum volatility.

use crate::domain::features::{BarContext, IndicatorSpec, RiskSource};
use crate::domain::grid::{SweepGrid, DEFAULT_RR_RATIOS};
use crate::domain::signal::{Signal, SignalGenerator};
use crate::ports::config_port::ConfigPort;

pub const NAME: &str = "BollingerBreakout";
pub const SECTION: &str = "strategy.bollinger";

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerStrategy {
    pub period: usize,
    pub stddev: f64,
    pub volume_window: usize,
    pub volume_multiplier: f64,
    pub atr_period: usize,
    /// ATR must exceed this fraction of the close.
    pub atr_floor: f64,
}

impl Default for BollingerStrategy {
    fn default() -> Self {
        Self {
            period: 20,
            stddev: 2.0,
            volume_window: 20,
            volume_multiplier: 1.5,
            atr_period: 14,
            atr_floor: 0.005,
        }
    }
}

impl BollingerStrategy {
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = Self::default();
        let period = |key: &str, default: usize| {
            config.get_int(SECTION, key, default as i64).max(1) as usize
        };
        Self {
            period: period("period", d.period),
            stddev: config.get_double(SECTION, "stddev", d.stddev),
            volume_window: period("volume_window", d.volume_window),
            volume_multiplier: config.get_double(SECTION, "volume_multiplier", d.volume_multiplier),
            atr_period: period("atr_period", d.atr_period),
            atr_floor: config.get_double(SECTION, "atr_floor", d.atr_floor),
        }
    }
}

impl SignalGenerator for BollingerStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn indicator_spec(&self) -> IndicatorSpec {
        IndicatorSpec {
            bollinger_period: self.period,
            bollinger_stddev: self.stddev,
            volume_window: self.volume_window,
            atr_period: self.atr_period,
            risk: RiskSource::Atr,
            ..IndicatorSpec::default()
        }
    }

    fn required_lookback(&self) -> usize {
        self.period.max(self.volume_window).max(self.atr_period)
    }

    fn evaluate(&self, ctx: &BarContext<'_>) -> Signal {
        let f = ctx.features;
        let (Some(upper), Some(lower)) = (f.bb_upper, f.bb_lower) else {
            return Signal::None;
        };
        if !ctx.volume_spike(self.volume_multiplier) || !ctx.atr_above(self.atr_floor) {
            return Signal::None;
        }
        let close = ctx.bar.close;
        Signal::from_conditions(
            close > upper && f.trend == Some(true),
            close < lower && f.trend == Some(false),
        )
    }

    fn default_grid(&self) -> SweepGrid {
        SweepGrid::new(DEFAULT_RR_RATIOS.to_vec(), vec![2.0, 2.5, 3.0, 4.0])
            .unwrap_or_default()
    }
}
