//! Performance analytics over the closed trades of one grid point.
//!
//! Equity follows a fixed-fractional model: every trade risks 1% of the
//! current balance, a win returns that risk times the reward/risk ratio.
//! Each trade's own `result_pct` does not enter the curve.

use crate::domain::interval::Interval;
use crate::domain::trade::{SummaryKey, Trade, TradeParameters};

pub const DEFAULT_INITIAL_BALANCE: f64 = 100.0;
pub const RISK_PER_TRADE: f64 = 0.01;

/// Full-precision results.
#[derive(Debug, Clone, PartialEq)]
pub struct Performance {
    pub total_trades: usize,
    pub wins: usize,
    /// Fraction in [0, 1].
    pub win_rate: f64,
    pub equity_curve: Vec<f64>,
    pub initial_balance: f64,
    pub final_balance: f64,
    /// Fraction of the initial balance.
    pub total_return: f64,
    /// Fraction ≤ 0.
    pub max_drawdown: f64,
    pub recovery_factor: f64,
    pub expectancy: f64,
    pub avg_hours_per_trade: f64,
}

impl Performance {
    pub fn compute(trades: &[Trade], rr_ratio: f64, initial_balance: f64) -> Self {
        let total_trades = trades.len();
        let wins = trades.iter().filter(|t| t.is_win()).count();
        let win_rate = if total_trades > 0 {
            wins as f64 / total_trades as f64
        } else {
            0.0
        };

        let equity_curve = equity_curve(trades, rr_ratio, initial_balance);
        let final_balance = equity_curve.last().copied().unwrap_or(initial_balance);
        let total_return = if initial_balance > 0.0 {
            (final_balance - initial_balance) / initial_balance
        } else {
            0.0
        };

        let max_drawdown = max_drawdown(&equity_curve);
        let recovery_factor = recovery_factor(final_balance - initial_balance, max_drawdown, initial_balance);
        let expectancy = win_rate * rr_ratio - (1.0 - win_rate);

        let avg_hours_per_trade = if total_trades > 0 {
            trades.iter().map(Trade::holding_hours).sum::<f64>() / total_trades as f64
        } else {
            0.0
        };

        Self {
            total_trades,
            wins,
            win_rate,
            equity_curve,
            initial_balance,
            final_balance,
            total_return,
            max_drawdown,
            recovery_factor,
            expectancy,
            avg_hours_per_trade,
        }
    }
}

/// Balance after each trade, starting with `initial_balance`.
pub fn equity_curve(trades: &[Trade], rr_ratio: f64, initial_balance: f64) -> Vec<f64> {
    let mut curve = Vec::with_capacity(trades.len() + 1);
    let mut balance = initial_balance;
    curve.push(balance);
    for trade in trades {
        if trade.is_win() {
            balance += balance * RISK_PER_TRADE * rr_ratio;
        } else {
            balance -= balance * RISK_PER_TRADE;
        }
        curve.push(balance);
    }
    curve
}

/// Deepest fall from the running peak (peak includes the current point).
pub fn max_drawdown(curve: &[f64]) -> f64 {
    if curve.len() < 2 {
        return 0.0;
    }
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &value in curve {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = worst.min(value / peak - 1.0);
        }
    }
    worst
}

/// Net profit over the largest drawdown in balance units; `+∞` without drawdown.
pub fn recovery_factor(net_profit: f64, max_drawdown: f64, initial_balance: f64) -> f64 {
    let denominator = (max_drawdown * initial_balance).abs();
    if denominator == 0.0 {
        f64::INFINITY
    } else {
        net_profit / denominator
    }
}

pub fn round2(value: f64) -> f64 {
    if value.is_finite() {
        (value * 100.0).round() / 100.0
    } else {
        value
    }
}

/// Persisted, reporting-precision summary of one grid point.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySummary {
    pub strategy: String,
    pub symbol: String,
    pub interval: Interval,
    pub atr_multiplier: f64,
    pub rr_ratio: f64,
    pub total_trades: usize,
    /// Percent.
    pub win_rate: f64,
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub final_balance: f64,
    pub recovery_factor: f64,
    pub expectancy: f64,
    pub avg_hours_per_trade: f64,
}

impl StrategySummary {
    pub fn from_performance(key: &SummaryKey, perf: &Performance) -> Self {
        Self {
            strategy: key.strategy.clone(),
            symbol: key.symbol.clone(),
            interval: key.interval,
            atr_multiplier: key.params.atr_multiplier,
            rr_ratio: key.params.rr_ratio,
            total_trades: perf.total_trades,
            win_rate: round2(perf.win_rate * 100.0),
            total_return_pct: round2(perf.total_return * 100.0),
            max_drawdown_pct: round2(perf.max_drawdown * 100.0),
            final_balance: round2(perf.final_balance),
            recovery_factor: round2(perf.recovery_factor),
            expectancy: round2(perf.expectancy),
            avg_hours_per_trade: round2(perf.avg_hours_per_trade),
        }
    }

    pub fn key(&self) -> SummaryKey {
        SummaryKey::new(
            &self.strategy,
            &self.symbol,
            self.interval,
            TradeParameters {
                atr_multiplier: self.atr_multiplier,
                rr_ratio: self.rr_ratio,
            },
        )
    }
}

/// Summarize the trades of one grid point.
pub fn summarize(key: &SummaryKey, trades: &[Trade], initial_balance: f64) -> StrategySummary {
    let perf = Performance::compute(trades, key.params.rr_ratio, initial_balance);
    StrategySummary::from_performance(key, &perf)
}

/// Best first: highest return, ties broken by recovery factor.
pub fn rank_summaries(summaries: &mut [StrategySummary]) {
    summaries.sort_by(|a, b| {
        b.total_return_pct
            .total_cmp(&a.total_return_pct)
            .then(b.recovery_factor.total_cmp(&a.recovery_factor))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade::{Side, TradeStatus};
    use chrono::{DateTime, TimeDelta, Utc};

    fn trade(win: bool, hours: i64) -> Trade {
        let entry = DateTime::<Utc>::from_timestamp_millis(0).unwrap();
        Trade {
            strategy_name: "RSI-EMA".into(),
            symbol: "BTCUSDT".into(),
            interval: Interval::OneHour,
            side: Side::Long,
            entry_price: 100.0,
            entry_time: entry,
            stop_loss_price: 90.0,
            stop_loss_percent: 0.1,
            take_profit_price: 120.0,
            take_profit_percent: 0.2,
            exit_time: entry + TimeDelta::hours(hours),
            result_pct: if win { 0.2 } else { -0.1 },
            status: if win { TradeStatus::Win } else { TradeStatus::Loss },
            atr: 5.0,
            atr_multiplier: 2.0,
            rr_ratio: 2.0,
            rsi_at_entry: None,
        }
    }

    fn key(rr: f64) -> SummaryKey {
        SummaryKey::new(
            "RSI-EMA",
            "BTCUSDT",
            Interval::OneHour,
            TradeParameters::new(2.0, rr).unwrap(),
        )
    }

    #[test]
    fn empty_trade_list() {
        let perf = Performance::compute(&[], 2.0, 100.0);
        assert_eq!(perf.total_trades, 0);
        assert_eq!(perf.win_rate, 0.0);
        assert_eq!(perf.max_drawdown, 0.0);
        assert!(perf.recovery_factor.is_infinite() && perf.recovery_factor > 0.0);
        assert_eq!(perf.final_balance, 100.0);
        assert_eq!(perf.avg_hours_per_trade, 0.0);
    }

    #[test]
    fn fixed_one_percent_risk_model() {
        let curve = equity_curve(&[trade(true, 1), trade(false, 1)], 2.0, 100.0);
        assert_eq!(curve.len(), 3);
        assert!((curve[1] - 102.0).abs() < 1e-9);
        assert!((curve[2] - 100.98).abs() < 1e-9);
    }

    #[test]
    fn wins_follow_trade_status() {
        let trades = [trade(true, 1), trade(false, 1), trade(true, 1)];
        assert!(trades[0].is_win() && !trades[1].is_win());
        let perf = Performance::compute(&trades, 2.0, 100.0);
        assert_eq!(perf.wins, 2);
        assert!((perf.win_rate - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn curve_ignores_per_trade_result_size() {
        let mut big = trade(true, 1);
        big.result_pct = 5.0;
        let a = equity_curve(&[big], 2.0, 100.0);
        let b = equity_curve(&[trade(true, 1)], 2.0, 100.0);
        assert_eq!(a, b);
    }

    #[test]
    fn equity_path_depends_on_order() {
        let wlw = [trade(true, 1), trade(false, 1), trade(true, 1)];
        let wwl = [trade(true, 1), trade(true, 1), trade(false, 1)];
        let a = Performance::compute(&wlw, 2.0, 100.0);
        let b = Performance::compute(&wwl, 2.0, 100.0);

        assert_ne!(a.equity_curve, b.equity_curve);
        // multiplicative steps commute, so only the path differs
        assert!((a.final_balance - b.final_balance).abs() < 1e-9);
        assert!((a.max_drawdown - b.max_drawdown).abs() < 1e-12);
    }

    #[test]
    fn drawdown_depends_on_order() {
        let lose_first = [trade(false, 1), trade(false, 1), trade(true, 1), trade(true, 1)];
        let alternate = [trade(false, 1), trade(true, 1), trade(false, 1), trade(true, 1)];
        let a = Performance::compute(&lose_first, 2.0, 100.0);
        let b = Performance::compute(&alternate, 2.0, 100.0);
        assert!(a.max_drawdown < b.max_drawdown);
    }

    #[test]
    fn drawdown_is_never_positive() {
        assert_eq!(max_drawdown(&[100.0, 110.0, 120.0]), 0.0);
        let dd = max_drawdown(&[100.0, 120.0, 90.0, 130.0]);
        assert!((dd + 0.25).abs() < 1e-12);
        assert_eq!(max_drawdown(&[100.0]), 0.0);
    }

    #[test]
    fn win_rate_and_expectancy() {
        let trades = [trade(true, 2), trade(false, 4), trade(true, 6), trade(false, 8)];
        let perf = Performance::compute(&trades, 2.0, 100.0);
        assert_eq!(perf.wins, 2);
        assert!((perf.win_rate - 0.5).abs() < 1e-12);
        assert!((perf.expectancy - 0.5).abs() < 1e-12);
        assert!((perf.avg_hours_per_trade - 5.0).abs() < 1e-12);
    }

    #[test]
    fn recovery_factor_uses_initial_balance() {
        // 100 → 99 → 101.97
        let perf = Performance::compute(&[trade(false, 1), trade(true, 1)], 3.0, 100.0);
        let expected = (perf.final_balance - 100.0) / (0.01 * 100.0);
        assert!((perf.recovery_factor - expected).abs() < 1e-9);
    }

    #[test]
    fn summary_rounds_to_two_places() {
        let trades = [trade(true, 1), trade(false, 2), trade(false, 2)];
        let summary = summarize(&key(2.0), &trades, DEFAULT_INITIAL_BALANCE);

        assert_eq!(summary.total_trades, 3);
        assert_eq!(summary.win_rate, 33.33);
        // 100 → 102 → 100.98 → 99.9702
        assert_eq!(summary.final_balance, 99.97);
        assert_eq!(summary.total_return_pct, -0.03);
        assert_eq!(summary.max_drawdown_pct, -1.99);
        assert_eq!(summary.expectancy, 0.0);
        assert_eq!(summary.avg_hours_per_trade, 1.67);
    }

    #[test]
    fn summary_without_drawdown_keeps_infinite_recovery() {
        let summary = summarize(&key(2.0), &[trade(true, 1)], DEFAULT_INITIAL_BALANCE);
        assert!(summary.recovery_factor.is_infinite());
        assert_eq!(summary.key(), key(2.0));
    }

    #[test]
    fn ranking_puts_best_return_first() {
        let mut flat = summarize(&key(1.5), &[], DEFAULT_INITIAL_BALANCE);
        let mut good = summarize(&key(2.0), &[trade(true, 1)], DEFAULT_INITIAL_BALANCE);
        let bad = summarize(&key(3.0), &[trade(false, 1)], DEFAULT_INITIAL_BALANCE);
        flat.recovery_factor = 0.0;
        good.recovery_factor = 4.0;
        let mut tied = good.clone();
        tied.recovery_factor = 9.0;

        let mut all = vec![bad.clone(), flat.clone(), good.clone(), tied.clone()];
        rank_summaries(&mut all);
        assert_eq!(all, vec![tied, good, flat, bad]);
    }
}
