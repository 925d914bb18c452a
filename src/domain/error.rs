//! Domain error types.

use chrono::{DateTime, Utc};

/// Top-level error type for rrsweep.
///
/// `MissingRiskInput` and `DuplicateWork` exist so callers can name the
/// condition, but the engine handles both locally and never returns them
/// from a sweep.
#[derive(Debug, thiserror::Error)]
pub enum RrsweepError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no data for {symbol} at {interval}")]
    NoData { symbol: String, interval: String },

    #[error("insufficient data for {symbol} at {interval}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        interval: String,
        bars: usize,
        minimum: usize,
    },

    #[error("invalid series for {symbol} at {interval}: timestamp {timestamp} is not after its predecessor")]
    InvalidSeries {
        symbol: String,
        interval: String,
        timestamp: DateTime<Utc>,
    },

    #[error("no risk input at {entry_time}")]
    MissingRiskInput { entry_time: DateTime<Utc> },

    #[error("already persisted: {key}")]
    DuplicateWork { key: String },

    #[error("unknown strategy: {name}")]
    UnknownStrategy { name: String },

    #[error("invalid interval: {value}")]
    InvalidInterval { value: String },

    #[error("invalid trade parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("sweep cancelled: {reason}")]
    Cancelled { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&RrsweepError> for std::process::ExitCode {
    fn from(err: &RrsweepError) -> Self {
        let code: u8 = match err {
            RrsweepError::Io(_) | RrsweepError::Cancelled { .. } => 1,
            RrsweepError::ConfigParse { .. }
            | RrsweepError::ConfigMissing { .. }
            | RrsweepError::ConfigInvalid { .. }
            | RrsweepError::UnknownStrategy { .. }
            | RrsweepError::InvalidInterval { .. }
            | RrsweepError::InvalidParameters { .. } => 2,
            RrsweepError::Database { .. } | RrsweepError::DatabaseQuery { .. } => 3,
            RrsweepError::InvalidSeries { .. } => 4,
            RrsweepError::NoData { .. } | RrsweepError::InsufficientData { .. } => 5,
            RrsweepError::MissingRiskInput { .. } | RrsweepError::DuplicateWork { .. } => 0,
        };
        std::process::ExitCode::from(code)
    }
}

impl RrsweepError {
    /// Errors that abort one symbol/interval but leave the rest of a sweep running.
    pub fn is_series_error(&self) -> bool {
        matches!(
            self,
            RrsweepError::NoData { .. }
                | RrsweepError::InsufficientData { .. }
                | RrsweepError::InvalidSeries { .. }
        )
    }
}
