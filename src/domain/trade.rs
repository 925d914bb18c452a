//! Trades, grid parameters and the keys they are persisted under.

use crate::domain::error::RrsweepError;
use crate::domain::interval::Interval;
use chrono::{DateTime, Utc};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "long" => Ok(Side::Long),
            "short" => Ok(Side::Short),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeStatus {
    Win,
    Loss,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Win => "win",
            TradeStatus::Loss => "loss",
        }
    }
}

impl FromStr for TradeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "win" => Ok(TradeStatus::Win),
            "loss" => Ok(TradeStatus::Loss),
            other => Err(format!("unknown trade status: {other}")),
        }
    }
}

/// One grid point. Identity (equality, hashing, persistence keys) is quantised
/// to hundredths, so `2.5` and `2.500001` name the same grid point.
#[derive(Debug, Clone, Copy)]
pub struct TradeParameters {
    pub atr_multiplier: f64,
    pub rr_ratio: f64,
}

impl TradeParameters {
    pub fn new(atr_multiplier: f64, rr_ratio: f64) -> Result<Self, RrsweepError> {
        if !(atr_multiplier.is_finite() && atr_multiplier > 0.0) {
            return Err(RrsweepError::InvalidParameters {
                reason: format!("atr_multiplier must be positive, got {atr_multiplier}"),
            });
        }
        if !(rr_ratio.is_finite() && rr_ratio > 0.0) {
            return Err(RrsweepError::InvalidParameters {
                reason: format!("rr_ratio must be positive, got {rr_ratio}"),
            });
        }
        Ok(Self {
            atr_multiplier,
            rr_ratio,
        })
    }

    pub fn atr_multiplier_x100(&self) -> i64 {
        (self.atr_multiplier * 100.0).round() as i64
    }

    pub fn rr_ratio_x100(&self) -> i64 {
        (self.rr_ratio * 100.0).round() as i64
    }

    /// (risk, reward) distances for a given ATR reading.
    pub fn distances(&self, atr: f64) -> (f64, f64) {
        let risk = atr * self.atr_multiplier;
        (risk, risk * self.rr_ratio)
    }
}

impl PartialEq for TradeParameters {
    fn eq(&self, other: &Self) -> bool {
        self.atr_multiplier_x100() == other.atr_multiplier_x100()
            && self.rr_ratio_x100() == other.rr_ratio_x100()
    }
}

impl Eq for TradeParameters {}

impl Hash for TradeParameters {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.atr_multiplier_x100().hash(state);
        self.rr_ratio_x100().hash(state);
    }
}

/// Identity of a persisted summary: one grid point of one strategy on one series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SummaryKey {
    pub strategy: String,
    pub symbol: String,
    pub interval: Interval,
    pub params: TradeParameters,
}

impl SummaryKey {
    pub fn new(strategy: &str, symbol: &str, interval: Interval, params: TradeParameters) -> Self {
        Self {
            strategy: strategy.to_string(),
            symbol: symbol.to_string(),
            interval,
            params,
        }
    }

    pub fn trade_key(&self, entry_time: DateTime<Utc>) -> TradeKey {
        TradeKey {
            summary: self.clone(),
            entry_time,
        }
    }
}

impl fmt::Display for SummaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} atr×{} rr {}",
            self.strategy, self.symbol, self.interval, self.params.atr_multiplier, self.params.rr_ratio
        )
    }
}

/// Dedup key of a trade: at most one trade exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TradeKey {
    pub summary: SummaryKey,
    pub entry_time: DateTime<Utc>,
}

impl fmt::Display for TradeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.summary, self.entry_time)
    }
}

/// Terminal record of one simulation. Only the simulator builds these.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub strategy_name: String,
    pub symbol: String,
    pub interval: Interval,
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub stop_loss_price: f64,
    pub stop_loss_percent: f64,
    pub take_profit_price: f64,
    pub take_profit_percent: f64,
    pub exit_time: DateTime<Utc>,
    pub result_pct: f64,
    pub status: TradeStatus,
    pub atr: f64,
    pub atr_multiplier: f64,
    pub rr_ratio: f64,
    pub rsi_at_entry: Option<f64>,
}

impl Trade {
    pub fn params(&self) -> TradeParameters {
        TradeParameters {
            atr_multiplier: self.atr_multiplier,
            rr_ratio: self.rr_ratio,
        }
    }

    pub fn summary_key(&self) -> SummaryKey {
        SummaryKey::new(&self.strategy_name, &self.symbol, self.interval, self.params())
    }

    pub fn key(&self) -> TradeKey {
        self.summary_key().trade_key(self.entry_time)
    }

    pub fn is_win(&self) -> bool {
        self.status == TradeStatus::Win
    }

    pub fn holding_hours(&self) -> f64 {
        (self.exit_time - self.entry_time).num_seconds() as f64 / 3600.0
    }
}
