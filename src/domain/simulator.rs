//! Bar-by-bar exit simulation.
//!
//! A signal on bar `i` enters at the open of bar `i + 1`. Later bars are
//! scanned in order until the stop-loss or take-profit level is touched. When
//! one bar touches both, the stop-loss wins. A series that runs out first
//! leaves the trade unresolved and it is dropped.

use crate::domain::error::RrsweepError;
use crate::domain::features::FeatureFrame;
use crate::domain::trade::{Side, Trade, TradeParameters, TradeStatus};
use chrono::{DateTime, Utc};

/// Entry levels fixed at the entry bar, before any exit is known.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPlan {
    pub entry_index: usize,
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub risk_input: f64,
    pub stop_loss_price: f64,
    pub stop_loss_percent: f64,
    pub take_profit_price: f64,
    pub take_profit_percent: f64,
    pub rsi_at_entry: Option<f64>,
    pub params: TradeParameters,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Closed(Trade),
    Unresolved,
}

pub struct TradeSimulator<'a> {
    strategy_name: &'a str,
    frame: &'a FeatureFrame,
}

impl<'a> TradeSimulator<'a> {
    pub fn new(strategy_name: &'a str, frame: &'a FeatureFrame) -> Self {
        Self {
            strategy_name,
            frame,
        }
    }

    /// Levels for a signal on `signal_index`.
    ///
    /// `Ok(None)` when the signal bar is the last one. `MissingRiskInput` when the
    /// entry bar has no usable risk distance (undefined, NaN or zero).
    pub fn plan(
        &self,
        signal_index: usize,
        side: Side,
        params: TradeParameters,
    ) -> Result<Option<EntryPlan>, RrsweepError> {
        let entry_index = signal_index + 1;
        let Some(entry_bar) = self.frame.bar(entry_index) else {
            return Ok(None);
        };
        let features = self.frame.features(entry_index);
        let entry_price = entry_bar.open;

        let risk_input = features
            .and_then(|f| f.risk)
            .filter(|r| r.is_finite() && *r > 0.0);
        let Some(risk_input) = risk_input.filter(|_| entry_price.is_finite() && entry_price > 0.0)
        else {
            return Err(RrsweepError::MissingRiskInput {
                entry_time: entry_bar.timestamp,
            });
        };

        let (risk, reward) = params.distances(risk_input);
        let (stop_loss_price, take_profit_price) = match side {
            Side::Long => (entry_price - risk, entry_price + reward),
            Side::Short => (entry_price + risk, entry_price - reward),
        };

        Ok(Some(EntryPlan {
            entry_index,
            side,
            entry_price,
            entry_time: entry_bar.timestamp,
            risk_input,
            stop_loss_price,
            stop_loss_percent: risk / entry_price,
            take_profit_price,
            take_profit_percent: reward / entry_price,
            rsi_at_entry: features.and_then(|f| f.rsi),
            params,
        }))
    }

    /// Walk forward from the bar after entry until a level is touched.
    pub fn resolve(&self, plan: &EntryPlan) -> Outcome {
        let bars = self.frame.series().bars();
        let start = (plan.entry_index + 1).min(bars.len());

        for bar in bars[start..]
            .iter()
            .filter(|b| b.timestamp > plan.entry_time)
        {
            let (stopped, target) = match plan.side {
                Side::Long => (
                    bar.low <= plan.stop_loss_price,
                    bar.high >= plan.take_profit_price,
                ),
                Side::Short => (
                    bar.high >= plan.stop_loss_price,
                    bar.low <= plan.take_profit_price,
                ),
            };
            if stopped {
                return Outcome::Closed(self.close(plan, bar.timestamp, TradeStatus::Loss));
            }
            if target {
                return Outcome::Closed(self.close(plan, bar.timestamp, TradeStatus::Win));
            }
        }
        Outcome::Unresolved
    }

    /// `plan` then `resolve`. `Ok(None)` when there is no entry bar.
    pub fn simulate(
        &self,
        signal_index: usize,
        side: Side,
        params: TradeParameters,
    ) -> Result<Option<Outcome>, RrsweepError> {
        Ok(self
            .plan(signal_index, side, params)?
            .map(|plan| self.resolve(&plan)))
    }

    fn close(&self, plan: &EntryPlan, exit_time: DateTime<Utc>, status: TradeStatus) -> Trade {
        let series = self.frame.series();
        let result_pct = match status {
            TradeStatus::Win => plan.take_profit_percent,
            TradeStatus::Loss => -plan.stop_loss_percent,
        };
        Trade {
            strategy_name: self.strategy_name.to_string(),
            symbol: series.symbol.clone(),
            interval: series.interval,
            side: plan.side,
            entry_price: plan.entry_price,
            entry_time: plan.entry_time,
            stop_loss_price: plan.stop_loss_price,
            stop_loss_percent: plan.stop_loss_percent,
            take_profit_price: plan.take_profit_price,
            take_profit_percent: plan.take_profit_percent,
            exit_time,
            result_pct,
            status,
            atr: plan.risk_input,
            atr_multiplier: plan.params.atr_multiplier,
            rr_ratio: plan.params.rr_ratio,
            rsi_at_entry: plan.rsi_at_entry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use crate::domain::features::{IndicatorSpec, RiskSource};
    use crate::domain::interval::Interval;
    use crate::domain::series::PriceSeries;

    const HOUR_MS: i64 = 3_600_000;

    /// Bars as (open, high, low). Risk comes from each bar's range.
    fn frame(bars: &[(f64, f64, f64)]) -> FeatureFrame {
        let bars = bars
            .iter()
            .enumerate()
            .map(|(i, &(o, h, l))| Bar::from_millis(i as i64 * HOUR_MS, o, h, l, o, 1.0).unwrap())
            .collect();
        let series = PriceSeries::from_ascending("BTCUSDT", Interval::OneHour, bars).unwrap();
        let spec = IndicatorSpec {
            risk: RiskSource::BarRange,
            ..IndicatorSpec::default()
        };
        FeatureFrame::build(series, &spec, &[])
    }

    fn params(atr: f64, rr: f64) -> TradeParameters {
        TradeParameters::new(atr, rr).unwrap()
    }

    fn closed(outcome: Option<Outcome>) -> Trade {
        match outcome {
            Some(Outcome::Closed(trade)) => trade,
            other => panic!("expected a closed trade, got {other:?}"),
        }
    }

    #[test]
    fn levels_for_a_long_entry() {
        // entry bar range 10, mult 2, rr 2
        let f = frame(&[(99.0, 100.0, 98.0), (100.0, 105.0, 95.0), (100.0, 101.0, 89.0)]);
        let sim = TradeSimulator::new("test", &f);
        let plan = sim.plan(0, Side::Long, params(2.0, 2.0)).unwrap().unwrap();

        assert_eq!(plan.entry_price, 100.0);
        assert_eq!(plan.stop_loss_price, 80.0);
        assert_eq!(plan.take_profit_price, 140.0);
        assert!((plan.stop_loss_percent - 0.2).abs() < 1e-12);
        assert!((plan.take_profit_percent - 0.4).abs() < 1e-12);
        assert_eq!(plan.entry_time.timestamp_millis(), HOUR_MS);
    }

    #[test]
    fn neither_level_touched_is_unresolved() {
        let f = frame(&[(99.0, 100.0, 98.0), (100.0, 105.0, 95.0), (100.0, 101.0, 89.0)]);
        let sim = TradeSimulator::new("test", &f);
        let outcome = sim.simulate(0, Side::Long, params(2.0, 2.0)).unwrap();
        assert_eq!(outcome, Some(Outcome::Unresolved));
    }

    #[test]
    fn both_levels_on_one_bar_resolve_as_loss() {
        let f = frame(&[(99.0, 100.0, 98.0), (100.0, 105.0, 95.0), (100.0, 145.0, 75.0)]);
        let sim = TradeSimulator::new("test", &f);
        let trade = closed(sim.simulate(0, Side::Long, params(2.0, 2.0)).unwrap());

        assert_eq!(trade.status, TradeStatus::Loss);
        assert!((trade.result_pct + 0.20).abs() < 1e-12);
        assert_eq!(trade.exit_time.timestamp_millis(), 2 * HOUR_MS);
    }

    #[test]
    fn short_hits_target() {
        // short from 100 with range 10: SL 120, TP 60
        let f = frame(&[
            (99.0, 100.0, 98.0),
            (100.0, 105.0, 95.0),
            (95.0, 110.0, 80.0),
            (70.0, 75.0, 55.0),
        ]);
        let sim = TradeSimulator::new("test", &f);
        let trade = closed(sim.simulate(0, Side::Short, params(2.0, 2.0)).unwrap());

        assert_eq!(trade.status, TradeStatus::Win);
        assert_eq!(trade.stop_loss_price, 120.0);
        assert_eq!(trade.take_profit_price, 60.0);
        assert!((trade.result_pct - 0.4).abs() < 1e-12);
        assert_eq!(trade.exit_time.timestamp_millis(), 3 * HOUR_MS);
    }

    #[test]
    fn entry_bar_itself_is_not_scanned() {
        // entry bar's own low would stop out a long, but only later bars count
        let f = frame(&[(99.0, 100.0, 98.0), (100.0, 200.0, 10.0), (100.0, 101.0, 99.0)]);
        let sim = TradeSimulator::new("test", &f);
        let outcome = sim.simulate(0, Side::Long, params(0.1, 1.0)).unwrap();
        assert_eq!(outcome, Some(Outcome::Unresolved));
    }

    #[test]
    fn signal_on_last_bar_has_no_entry() {
        let f = frame(&[(99.0, 100.0, 98.0), (100.0, 105.0, 95.0)]);
        let sim = TradeSimulator::new("test", &f);
        assert_eq!(sim.simulate(1, Side::Long, params(2.0, 2.0)).unwrap(), None);
    }

    #[test]
    fn zero_risk_input_is_skipped() {
        let f = frame(&[(99.0, 100.0, 98.0), (100.0, 100.0, 100.0), (100.0, 150.0, 50.0)]);
        let sim = TradeSimulator::new("test", &f);
        match sim.simulate(0, Side::Long, params(2.0, 2.0)) {
            Err(RrsweepError::MissingRiskInput { entry_time }) => {
                assert_eq!(entry_time.timestamp_millis(), HOUR_MS);
            }
            other => panic!("expected MissingRiskInput, got {other:?}"),
        }
    }

    #[test]
    fn trade_carries_identity_fields() {
        let f = frame(&[(99.0, 100.0, 98.0), (100.0, 105.0, 95.0), (100.0, 141.0, 90.0)]);
        let sim = TradeSimulator::new("RSI-EMA", &f);
        let trade = closed(sim.simulate(0, Side::Long, params(2.0, 2.0)).unwrap());

        assert_eq!(trade.strategy_name, "RSI-EMA");
        assert_eq!(trade.symbol, "BTCUSDT");
        assert_eq!(trade.interval, Interval::OneHour);
        assert_eq!(trade.atr, 10.0);
        assert_eq!(trade.status, TradeStatus::Win);
        assert_eq!(trade.rsi_at_entry, None);
    }
}
