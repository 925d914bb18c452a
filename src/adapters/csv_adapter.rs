//! CSV kline files as a price source.
//!
//! One file per series, named `{SYMBOL}_{interval}.csv`, with a header row and
//! columns `open_time,open,high,low,close,volume`. `open_time` is epoch
//! milliseconds. Extra trailing columns (close time, trade counts) are ignored.

use crate::domain::bar::Bar;
use crate::domain::error::RrsweepError;
use crate::domain::interval::Interval;
use crate::domain::pair::{Pair, DEFAULT_EXCHANGE};
use crate::ports::price_port::PriceSource;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub struct CsvAdapter {
    base_path: PathBuf,
    exchange: String,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            exchange: DEFAULT_EXCHANGE.to_string(),
        }
    }

    pub fn with_exchange(mut self, exchange: &str) -> Self {
        self.exchange = exchange.to_string();
        self
    }

    pub fn csv_path(&self, symbol: &str, interval: Interval) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, interval))
    }
}

/// Parse kline rows from CSV text.
pub fn parse_klines(content: &str) -> Result<Vec<Bar>, RrsweepError> {
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut bars = Vec::new();

    for (row, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| RrsweepError::Database {
            reason: format!("CSV parse error: {}", e),
        })?;
        let line = row + 2;

        let field = |idx: usize, name: &str| -> Result<&str, RrsweepError> {
            record.get(idx).map(str::trim).ok_or_else(|| RrsweepError::Database {
                reason: format!("line {line}: missing {name} column"),
            })
        };
        let number = |idx: usize, name: &str| -> Result<f64, RrsweepError> {
            field(idx, name)?
                .parse::<f64>()
                .map_err(|e| RrsweepError::Database {
                    reason: format!("line {line}: invalid {name} value: {e}"),
                })
        };

        let open_time: i64 = field(0, "open_time")?
            .parse()
            .map_err(|e| RrsweepError::Database {
                reason: format!("line {line}: invalid open_time: {e}"),
            })?;

        let bar = Bar::from_millis(
            open_time,
            number(1, "open")?,
            number(2, "high")?,
            number(3, "low")?,
            number(4, "close")?,
            number(5, "volume")?,
        )
        .ok_or_else(|| RrsweepError::Database {
            reason: format!("line {line}: open_time {open_time} out of range"),
        })?;
        bars.push(bar);
    }

    Ok(bars)
}

pub async fn read_klines(path: &Path) -> Result<Vec<Bar>, RrsweepError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RrsweepError::Database {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
    parse_klines(&content)
}

#[async_trait]
impl PriceSource for CsvAdapter {
    /// A missing file is an empty series, not an error.
    async fn fetch_bars(&self, symbol: &str, interval: Interval) -> Result<Vec<Bar>, RrsweepError> {
        let path = self.csv_path(symbol, interval);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        read_klines(&path).await
    }

    async fn list_pairs(&self) -> Result<Vec<Pair>, RrsweepError> {
        let mut entries =
            tokio::fs::read_dir(&self.base_path)
                .await
                .map_err(|e| RrsweepError::Database {
                    reason: format!(
                        "failed to read directory {}: {}",
                        self.base_path.display(),
                        e
                    ),
                })?;

        let mut symbols: Vec<String> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RrsweepError::Database {
                reason: format!("directory entry error: {}", e),
            })?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(stem) = name.strip_suffix(".csv") else {
                continue;
            };
            let Some((symbol, interval)) = stem.rsplit_once('_') else {
                continue;
            };
            if interval.parse::<Interval>().is_ok() && !symbols.iter().any(|s| s == symbol) {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols
            .iter()
            .map(|s| Pair::new(s, &self.exchange))
            .collect())
    }
}
