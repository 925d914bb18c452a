//! Strategy variants, selectable by their persisted name.

pub mod bollinger;
pub mod macd_volume;
pub mod rsi_ema;

use crate::domain::error::RrsweepError;
use crate::domain::signal::SignalGenerator;
use crate::ports::config_port::ConfigPort;
use std::sync::Arc;

pub use bollinger::BollingerStrategy;
pub use macd_volume::MacdVolumeStrategy;
pub use rsi_ema::RsiEmaStrategy;

pub const STRATEGY_NAMES: [&str; 3] = [rsi_ema::NAME, macd_volume::NAME, bollinger::NAME];

/// Variant with default parameters.
pub fn strategy_by_name(name: &str) -> Result<Arc<dyn SignalGenerator>, RrsweepError> {
    match name {
        rsi_ema::NAME => Ok(Arc::new(RsiEmaStrategy::default())),
        macd_volume::NAME => Ok(Arc::new(MacdVolumeStrategy::default())),
        bollinger::NAME => Ok(Arc::new(BollingerStrategy::default())),
        other => Err(unknown(other)),
    }
}

/// Variant with parameters read from its `[strategy.*]` section.
pub fn strategy_from_config(
    name: &str,
    config: &dyn ConfigPort,
) -> Result<Arc<dyn SignalGenerator>, RrsweepError> {
    match name {
        rsi_ema::NAME => Ok(Arc::new(RsiEmaStrategy::from_config(config))),
        macd_volume::NAME => Ok(Arc::new(MacdVolumeStrategy::from_config(config))),
        bollinger::NAME => Ok(Arc::new(BollingerStrategy::from_config(config))),
        other => Err(unknown(other)),
    }
}

/// Config section holding a variant's parameters.
pub fn config_section(name: &str) -> Option<&'static str> {
    match name {
        rsi_ema::NAME => Some(rsi_ema::SECTION),
        macd_volume::NAME => Some(macd_volume::SECTION),
        bollinger::NAME => Some(bollinger::SECTION),
        _ => None,
    }
}

fn unknown(name: &str) -> RrsweepError {
    RrsweepError::UnknownStrategy {
        name: name.to_string(),
    }
}
