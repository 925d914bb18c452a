//! Per-bar feature records.
//!
//! Indicators are computed once over the whole series and zipped into one
//! record per bar, so signal evaluation and simulation only ever index.

use crate::domain::bar::Bar;
use crate::domain::indicator::{
    calculate_atr, calculate_bollinger, calculate_ema, calculate_macd, calculate_rsi,
    rolling_mean, value_at,
};
use crate::domain::series::PriceSeries;

/// Where the simulator takes its risk distance from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskSource {
    /// Wilder ATR over `atr_period`.
    Atr,
    /// The entry bar's own `high - low`.
    BarRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSpec {
    pub rsi_period: usize,
    pub ema_period: usize,
    pub atr_period: usize,
    pub volume_window: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_stddev: f64,
    pub risk: RiskSource,
}

impl Default for IndicatorSpec {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            ema_period: 200,
            atr_period: 14,
            volume_window: 20,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_stddev: 2.0,
            risk: RiskSource::Atr,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BarFeatures {
    pub rsi: Option<f64>,
    pub ema: Option<f64>,
    pub atr: Option<f64>,
    /// Risk distance per `RiskSource`; what the simulator multiplies.
    pub risk: Option<f64>,
    pub volume_ma: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    pub trend: Option<bool>,
}

/// What a signal predicate sees for one bar.
#[derive(Debug, Clone, Copy)]
pub struct BarContext<'a> {
    pub bar: &'a Bar,
    pub features: &'a BarFeatures,
    pub prev: Option<&'a BarFeatures>,
}

impl BarContext<'_> {
    /// `volume > multiplier × rolling mean volume`.
    pub fn volume_spike(&self, multiplier: f64) -> bool {
        self.features
            .volume_ma
            .is_some_and(|ma| self.bar.volume > multiplier * ma)
    }

    /// `atr > fraction × close`.
    pub fn atr_above(&self, fraction: f64) -> bool {
        self.features
            .atr
            .is_some_and(|atr| atr > fraction * self.bar.close)
    }
}

#[derive(Debug, Clone)]
pub struct FeatureFrame {
    series: PriceSeries,
    features: Vec<BarFeatures>,
}

impl FeatureFrame {
    /// `trend` is aligned to the series; missing entries are `None`.
    pub fn build(series: PriceSeries, spec: &IndicatorSpec, trend: &[Option<bool>]) -> Self {
        let bars = series.bars();
        let closes = series.closes();
        let volumes = series.volumes();

        let rsi = calculate_rsi(&closes, spec.rsi_period);
        let ema = calculate_ema(&closes, spec.ema_period);
        let atr = calculate_atr(bars, spec.atr_period);
        let volume_ma = rolling_mean(&volumes, spec.volume_window);
        let macd = calculate_macd(&closes, spec.macd_fast, spec.macd_slow, spec.macd_signal);
        let bb = calculate_bollinger(&closes, spec.bollinger_period, spec.bollinger_stddev);

        let features = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| {
                let atr_i = value_at(&atr, i);
                let risk = match spec.risk {
                    RiskSource::Atr => atr_i,
                    RiskSource::BarRange => Some(bar.range()).filter(|r| r.is_finite()),
                };
                BarFeatures {
                    rsi: value_at(&rsi, i),
                    ema: value_at(&ema, i),
                    atr: atr_i,
                    risk,
                    volume_ma: value_at(&volume_ma, i),
                    macd_line: value_at(&macd.line, i),
                    macd_signal: value_at(&macd.signal, i),
                    bb_middle: value_at(&bb.middle, i),
                    bb_upper: value_at(&bb.upper, i),
                    bb_lower: value_at(&bb.lower, i),
                    trend: trend.get(i).copied().flatten(),
                }
            })
            .collect();

        Self { series, features }
    }

    pub fn series(&self) -> &PriceSeries {
        &self.series
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn bar(&self, i: usize) -> Option<&Bar> {
        self.series.bars().get(i)
    }

    pub fn features(&self, i: usize) -> Option<&BarFeatures> {
        self.features.get(i)
    }

    pub fn context(&self, i: usize) -> Option<BarContext<'_>> {
        Some(BarContext {
            bar: self.bar(i)?,
            features: self.features.get(i)?,
            prev: i.checked_sub(1).and_then(|p| self.features.get(p)),
        })
    }
}
