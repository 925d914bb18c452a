//! Configuration validation.
//!
//! Every value is checked before any data is touched, so a bad config fails
//! with `ConfigInvalid` naming the section and key.

use crate::domain::error::RrsweepError;
use crate::domain::grid::{default_atr_multipliers, SweepGrid, DEFAULT_RR_RATIOS};
use crate::domain::interval::Interval;
use crate::domain::strategies::{bollinger, macd_volume, rsi_ema, STRATEGY_NAMES};
use crate::domain::sweep::SweepSettings;
use crate::domain::trend::DEFAULT_TREND_EMA;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_INTERVALS: [Interval; 4] = [
    Interval::FiveMinutes,
    Interval::FifteenMinutes,
    Interval::OneHour,
    Interval::FourHours,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Sqlite,
    Csv,
}

/// The `[sweep]` section, parsed and checked.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    /// Empty means every stored pair.
    pub symbols: Vec<String>,
    pub intervals: Vec<Interval>,
    pub strategies: Vec<String>,
    /// `None` leaves each strategy on its own default grid.
    pub grid: Option<SweepGrid>,
    pub max_concurrent_jobs: usize,
    pub max_concurrent_simulations: usize,
    pub settings: SweepSettings,
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> RrsweepError {
    RrsweepError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_config(config: &dyn ConfigPort) -> Result<SweepConfig, RrsweepError> {
    validate_data_source(config)?;
    validate_strategy_config(config)?;
    validate_sweep_config(config)
}

pub fn validate_data_source(config: &dyn ConfigPort) -> Result<DataSource, RrsweepError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "sqlite".to_string());
    match source.trim().to_lowercase().as_str() {
        "sqlite" => {
            if config.get_string("sqlite", "path").is_none() {
                return Err(RrsweepError::ConfigMissing {
                    section: "sqlite".to_string(),
                    key: "path".to_string(),
                });
            }
            Ok(DataSource::Sqlite)
        }
        "csv" => {
            if config.get_string("data", "csv_dir").is_none() {
                return Err(RrsweepError::ConfigMissing {
                    section: "data".to_string(),
                    key: "csv_dir".to_string(),
                });
            }
            Ok(DataSource::Csv)
        }
        other => Err(invalid("data", "source", format!("unknown source '{other}'"))),
    }
}

pub fn validate_sweep_config(config: &dyn ConfigPort) -> Result<SweepConfig, RrsweepError> {
    let symbols: Vec<String> = config
        .get_list("sweep", "symbols")
        .into_iter()
        .map(|s| s.to_uppercase())
        .collect();

    let intervals = parse_intervals(config)?;

    let strategies = config.get_list("sweep", "strategies");
    let strategies = if strategies.is_empty() {
        STRATEGY_NAMES.iter().map(|s| s.to_string()).collect()
    } else {
        for name in &strategies {
            if !STRATEGY_NAMES.contains(&name.as_str()) {
                return Err(invalid("sweep", "strategies", format!("unknown strategy '{name}'")));
            }
        }
        strategies
    };

    let rr_ratios = parse_floats(config, "rr_ratios")?;
    let atr_multipliers = parse_floats(config, "atr_multipliers")?;
    let grid = if rr_ratios.is_none() && atr_multipliers.is_none() {
        None
    } else {
        let grid = SweepGrid::new(
            rr_ratios.unwrap_or_else(|| DEFAULT_RR_RATIOS.to_vec()),
            atr_multipliers.unwrap_or_else(default_atr_multipliers),
        )
        .map_err(|e| invalid("sweep", "rr_ratios/atr_multipliers", e.to_string()))?;
        Some(grid)
    };

    let initial_balance = config.get_double("sweep", "initial_balance", 100.0);
    if !(initial_balance.is_finite() && initial_balance > 0.0) {
        return Err(invalid("sweep", "initial_balance", "initial_balance must be positive"));
    }

    let max_concurrent_jobs = positive_int(config, "sweep", "max_concurrent_jobs", 3)?;
    let max_concurrent_simulations = positive_int(config, "sweep", "max_concurrent_simulations", 3)?;

    let higher_interval = match config.get_string("sweep", "higher_interval") {
        Some(raw) => raw
            .parse::<Interval>()
            .map_err(|e| invalid("sweep", "higher_interval", e.to_string()))?,
        None => Interval::FourHours,
    };
    let trend_ema_period = positive_int(config, "sweep", "trend_ema_period", DEFAULT_TREND_EMA as i64)?;

    Ok(SweepConfig {
        symbols,
        intervals,
        strategies,
        grid,
        max_concurrent_jobs,
        max_concurrent_simulations,
        settings: SweepSettings {
            initial_balance,
            higher_interval,
            trend_ema_period,
        },
    })
}

/// Variant parameters in the `[strategy.*]` sections.
pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), RrsweepError> {
    let s = rsi_ema::SECTION;
    for key in ["rsi_period", "ema_period", "atr_period"] {
        positive_int(config, s, key, 14)?;
    }
    let threshold = config.get_double(s, "rsi_threshold", 30.0);
    if !(threshold > 0.0 && threshold < 50.0) {
        return Err(invalid(s, "rsi_threshold", "rsi_threshold must be between 0 and 50"));
    }

    let s = macd_volume::SECTION;
    let fast = positive_int(config, s, "fast", 12)?;
    let slow = positive_int(config, s, "slow", 26)?;
    positive_int(config, s, "signal", 9)?;
    positive_int(config, s, "volume_window", 20)?;
    positive_double(config, s, "volume_multiplier", 1.5)?;
    if fast >= slow {
        return Err(invalid(s, "fast", "fast period must be shorter than slow period"));
    }

    let s = bollinger::SECTION;
    positive_int(config, s, "period", 20)?;
    positive_int(config, s, "volume_window", 20)?;
    positive_int(config, s, "atr_period", 14)?;
    positive_double(config, s, "stddev", 2.0)?;
    positive_double(config, s, "volume_multiplier", 1.5)?;
    let floor = config.get_double(s, "atr_floor", 0.005);
    if !(floor.is_finite() && floor >= 0.0) {
        return Err(invalid(s, "atr_floor", "atr_floor must be non-negative"));
    }
    Ok(())
}

fn parse_intervals(config: &dyn ConfigPort) -> Result<Vec<Interval>, RrsweepError> {
    let raw = config.get_list("sweep", "intervals");
    if raw.is_empty() {
        return Ok(DEFAULT_INTERVALS.to_vec());
    }
    raw.iter()
        .map(|s| {
            s.parse::<Interval>()
                .map_err(|e| invalid("sweep", "intervals", e.to_string()))
        })
        .collect()
}

fn parse_floats(config: &dyn ConfigPort, key: &str) -> Result<Option<Vec<f64>>, RrsweepError> {
    let raw = config.get_list("sweep", key);
    if raw.is_empty() {
        return Ok(None);
    }
    let values = raw
        .iter()
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| invalid("sweep", key, format!("'{s}' is not a number")))
        })
        .collect::<Result<Vec<f64>, _>>()?;
    if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
        return Err(invalid("sweep", key, format!("{bad} must be positive")));
    }
    Ok(Some(values))
}

fn positive_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<usize, RrsweepError> {
    let value = config.get_int(section, key, default);
    if value <= 0 {
        return Err(invalid(section, key, format!("{key} must be positive")));
    }
    Ok(value as usize)
}

fn positive_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, RrsweepError> {
    let value = config.get_double(section, key, default);
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid(section, key, format!("{key} must be positive")));
    }
    Ok(value)
}
