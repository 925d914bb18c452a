//! Mean-reversion entries in the direction of the long-term trend.
//!
//! Long: RSI oversold, close above the EMA, higher timeframe up.
//! Short: RSI overbought, close below the EMA, higher timeframe down.

use crate::domain::features::{BarContext, IndicatorSpec, RiskSource};
use crate::domain::signal::{Signal, SignalGenerator};
use crate::ports::config_port::ConfigPort;

pub const NAME: &str = "RSI-EMA";
pub const SECTION: &str = "strategy.rsi_ema";

#[derive(Debug, Clone, PartialEq)]
pub struct RsiEmaStrategy {
    pub rsi_period: usize,
    pub rsi_threshold: f64,
    pub ema_period: usize,
    pub atr_period: usize,
}

impl Default for RsiEmaStrategy {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_threshold: 30.0,
            ema_period: 200,
            atr_period: 14,
        }
    }
}

impl RsiEmaStrategy {
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = Self::default();
        Self {
            rsi_period: config.get_int(SECTION, "rsi_period", d.rsi_period as i64).max(1) as usize,
            rsi_threshold: config.get_double(SECTION, "rsi_threshold", d.rsi_threshold),
            ema_period: config.get_int(SECTION, "ema_period", d.ema_period as i64).max(1) as usize,
            atr_period: config.get_int(SECTION, "atr_period", d.atr_period as i64).max(1) as usize,
        }
    }
}

impl SignalGenerator for RsiEmaStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn indicator_spec(&self) -> IndicatorSpec {
        IndicatorSpec {
            rsi_period: self.rsi_period,
            ema_period: self.ema_period,
            atr_period: self.atr_period,
            risk: RiskSource::Atr,
            ..IndicatorSpec::default()
        }
    }

    fn required_lookback(&self) -> usize {
        (self.rsi_period + 1).max(self.ema_period).max(self.atr_period)
    }

    fn evaluate(&self, ctx: &BarContext<'_>) -> Signal {
        let f = ctx.features;
        let (Some(rsi), Some(ema)) = (f.rsi, f.ema) else {
            return Signal::None;
        };
        let close = ctx.bar.close;

        let long = rsi < self.rsi_threshold && close > ema && f.trend == Some(true);
        let short = rsi > 100.0 - self.rsi_threshold && close < ema && f.trend == Some(false);
        Signal::from_conditions(long, short)
    }
}
