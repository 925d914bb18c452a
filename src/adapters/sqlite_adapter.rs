//! SQLite persistence: klines and pairs as a price source, trades and
//! summaries as the trade store.
//!
//! Dedup keys are UNIQUE constraints and inserts are `INSERT OR IGNORE`, so
//! insert-if-absent holds even across processes sharing the file. Grid
//! parameters are keyed by their hundredths. Blocking driver calls run on
//! tokio's blocking pool.

use crate::domain::analytics::StrategySummary;
use crate::domain::bar::Bar;
use crate::domain::error::RrsweepError;
use crate::domain::interval::Interval;
use crate::domain::pair::{Pair, DEFAULT_EXCHANGE};
use crate::domain::trade::{SummaryKey, Trade, TradeKey, TradeParameters};
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PriceSource;
use crate::ports::store_port::{SummaryFilter, TradeStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS klines (
    symbol TEXT NOT NULL,
    interval TEXT NOT NULL,
    open_time INTEGER NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume REAL NOT NULL,
    PRIMARY KEY (symbol, interval, open_time)
);
CREATE TABLE IF NOT EXISTS pairs (
    symbol TEXT PRIMARY KEY,
    exchange TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS trades (
    id INTEGER PRIMARY KEY,
    strategy TEXT NOT NULL,
    symbol TEXT NOT NULL,
    interval TEXT NOT NULL,
    entry_time INTEGER NOT NULL,
    atr_multiplier_x100 INTEGER NOT NULL,
    rr_ratio_x100 INTEGER NOT NULL,
    side TEXT NOT NULL,
    entry_price REAL NOT NULL,
    stop_loss_price REAL NOT NULL,
    stop_loss_percent REAL NOT NULL,
    take_profit_price REAL NOT NULL,
    take_profit_percent REAL NOT NULL,
    exit_time INTEGER NOT NULL,
    result_pct REAL NOT NULL,
    status TEXT NOT NULL,
    atr REAL NOT NULL,
    atr_multiplier REAL NOT NULL,
    rr_ratio REAL NOT NULL,
    rsi_at_entry REAL,
    UNIQUE (strategy, symbol, interval, entry_time, atr_multiplier_x100, rr_ratio_x100)
);
CREATE TABLE IF NOT EXISTS strategies (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    symbol TEXT NOT NULL,
    interval TEXT NOT NULL,
    atr_multiplier_x100 INTEGER NOT NULL,
    rr_ratio_x100 INTEGER NOT NULL,
    atr_multiplier REAL NOT NULL,
    rr_ratio REAL NOT NULL,
    total_trades INTEGER NOT NULL,
    win_rate REAL NOT NULL,
    total_return_pct REAL NOT NULL,
    max_drawdown_pct REAL NOT NULL,
    final_balance REAL NOT NULL,
    recovery_factor REAL,
    expectancy REAL NOT NULL,
    avg_hours_per_trade REAL NOT NULL,
    UNIQUE (name, symbol, interval, atr_multiplier_x100, rr_ratio_x100)
);
CREATE INDEX IF NOT EXISTS idx_trades_group
    ON trades(strategy, symbol, interval, atr_multiplier_x100, rr_ratio_x100);";

const TRADE_COLUMNS: &str = "strategy, symbol, interval, side, entry_price, entry_time,
    stop_loss_price, stop_loss_percent, take_profit_price, take_profit_percent, exit_time,
    result_pct, status, atr, atr_multiplier, rr_ratio, rsi_at_entry";

const SUMMARY_COLUMNS: &str = "name, symbol, interval, atr_multiplier, rr_ratio, total_trades,
    win_rate, total_return_pct, max_drawdown_pct, final_balance, recovery_factor, expectancy,
    avg_hours_per_trade";

#[derive(Clone)]
pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_error(e: r2d2::Error) -> RrsweepError {
    RrsweepError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> RrsweepError {
    RrsweepError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn conversion_error(idx: usize, reason: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(std::io::Error::other(reason)))
}

fn millis_to_time(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| conversion_error(idx, format!("timestamp {ms} out of range")))
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let text: String = row.get(idx)?;
    text.parse::<T>()
        .map_err(|e| conversion_error(idx, format!("{text}: {e}")))
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<Trade> {
    Ok(Trade {
        strategy_name: row.get(0)?,
        symbol: row.get(1)?,
        interval: parse_column(row, 2)?,
        side: parse_column(row, 3)?,
        entry_price: row.get(4)?,
        entry_time: millis_to_time(5, row.get(5)?)?,
        stop_loss_price: row.get(6)?,
        stop_loss_percent: row.get(7)?,
        take_profit_price: row.get(8)?,
        take_profit_percent: row.get(9)?,
        exit_time: millis_to_time(10, row.get(10)?)?,
        result_pct: row.get(11)?,
        status: parse_column(row, 12)?,
        atr: row.get(13)?,
        atr_multiplier: row.get(14)?,
        rr_ratio: row.get(15)?,
        rsi_at_entry: row.get(16)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<StrategySummary> {
    let recovery: Option<f64> = row.get(10)?;
    let total_trades: i64 = row.get(5)?;
    Ok(StrategySummary {
        strategy: row.get(0)?,
        symbol: row.get(1)?,
        interval: parse_column(row, 2)?,
        atr_multiplier: row.get(3)?,
        rr_ratio: row.get(4)?,
        total_trades: total_trades.max(0) as usize,
        win_rate: row.get(6)?,
        total_return_pct: row.get(7)?,
        max_drawdown_pct: row.get(8)?,
        final_balance: row.get(9)?,
        recovery_factor: recovery.unwrap_or(f64::INFINITY),
        expectancy: row.get(11)?,
        avg_hours_per_trade: row.get(12)?,
    })
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>, RrsweepError> {
    rows.map(|r| r.map_err(query_error)).collect()
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, RrsweepError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| RrsweepError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;
        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;
        Self::open(&db_path, pool_size)
    }

    pub fn open(path: &str, pool_size: u32) -> Result<Self, RrsweepError> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|c| c.execute_batch("PRAGMA busy_timeout = 5000;"));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;
        Ok(Self { pool })
    }

    /// Single-connection pool: every connection to `:memory:` is its own database.
    pub fn in_memory() -> Result<Self, RrsweepError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, RrsweepError> {
        self.pool.get().map_err(pool_error)
    }

    pub fn initialize_schema(&self) -> Result<(), RrsweepError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_error)
    }

    /// Upsert klines for one series. Returns rows written.
    pub fn insert_bars(
        &self,
        symbol: &str,
        interval: Interval,
        bars: &[Bar],
    ) -> Result<usize, RrsweepError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        let mut written = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO klines
                     (symbol, interval, open_time, open, high, low, close, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(query_error)?;
            for bar in bars {
                written += stmt
                    .execute(params![
                        symbol,
                        interval.as_str(),
                        bar.open_time_ms(),
                        bar.open,
                        bar.high,
                        bar.low,
                        bar.close,
                        bar.volume
                    ])
                    .map_err(query_error)?;
            }
        }
        tx.commit().map_err(query_error)?;
        Ok(written)
    }

    pub fn insert_pair(&self, pair: &Pair) -> Result<(), RrsweepError> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO pairs (symbol, exchange) VALUES (?1, ?2)",
                params![pair.symbol, pair.exchange],
            )
            .map_err(query_error)?;
        Ok(())
    }

    /// Run `f` on a pooled connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, RrsweepError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RrsweepError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(pool_error)?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| RrsweepError::Database {
            reason: format!("blocking task failed: {e}"),
        })?
    }
}

fn bars_for(conn: &Connection, symbol: &str, interval: Interval) -> Result<Vec<Bar>, RrsweepError> {
    let mut stmt = conn
        .prepare(
            "SELECT open_time, open, high, low, close, volume FROM klines
             WHERE symbol = ?1 AND interval = ?2
             ORDER BY open_time ASC",
        )
        .map_err(query_error)?;
    let rows = stmt
        .query_map(params![symbol, interval.as_str()], |row| {
            let open_time: i64 = row.get(0)?;
            Bar::from_millis(
                open_time,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            )
            .ok_or_else(|| conversion_error(0, format!("open_time {open_time} out of range")))
        })
        .map_err(query_error)?;
    collect(rows)
}

#[async_trait]
impl PriceSource for SqliteAdapter {
    async fn fetch_bars(&self, symbol: &str, interval: Interval) -> Result<Vec<Bar>, RrsweepError> {
        let symbol = symbol.to_string();
        self.with_conn(move |conn| bars_for(conn, &symbol, interval))
            .await
    }

    /// The `pairs` table, or the distinct kline symbols when it is empty.
    async fn list_pairs(&self) -> Result<Vec<Pair>, RrsweepError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT symbol, exchange FROM pairs ORDER BY symbol")
                .map_err(query_error)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Pair {
                        symbol: row.get(0)?,
                        exchange: row.get(1)?,
                    })
                })
                .map_err(query_error)?;
            let pairs = collect(rows)?;
            if !pairs.is_empty() {
                return Ok(pairs);
            }

            debug!("pairs table empty, falling back to kline symbols");
            let mut stmt = conn
                .prepare("SELECT DISTINCT symbol FROM klines ORDER BY symbol")
                .map_err(query_error)?;
            let rows = stmt
                .query_map([], |row| {
                    let symbol: String = row.get(0)?;
                    Ok(Pair::new(&symbol, DEFAULT_EXCHANGE))
                })
                .map_err(query_error)?;
            collect(rows)
        })
        .await
    }
}

#[async_trait]
impl TradeStore for SqliteAdapter {
    async fn find_trade(&self, key: &TradeKey) -> Result<Option<Trade>, RrsweepError> {
        let key = key.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {TRADE_COLUMNS} FROM trades
                 WHERE strategy = ?1 AND symbol = ?2 AND interval = ?3 AND entry_time = ?4
                   AND atr_multiplier_x100 = ?5 AND rr_ratio_x100 = ?6"
            );
            let mut stmt = conn.prepare(&sql).map_err(query_error)?;
            let s = &key.summary;
            let mut rows = stmt
                .query_map(
                    params![
                        s.strategy,
                        s.symbol,
                        s.interval.as_str(),
                        key.entry_time.timestamp_millis(),
                        s.params.atr_multiplier_x100(),
                        s.params.rr_ratio_x100()
                    ],
                    trade_from_row,
                )
                .map_err(query_error)?;
            rows.next().transpose().map_err(query_error)
        })
        .await
    }

    async fn insert_trades(&self, trades: &[Trade]) -> Result<usize, RrsweepError> {
        if trades.is_empty() {
            return Ok(0);
        }
        let trades = trades.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(query_error)?;
            let mut inserted = 0;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT OR IGNORE INTO trades
                         (strategy, symbol, interval, entry_time, atr_multiplier_x100, rr_ratio_x100,
                          side, entry_price, stop_loss_price, stop_loss_percent, take_profit_price,
                          take_profit_percent, exit_time, result_pct, status, atr, atr_multiplier,
                          rr_ratio, rsi_at_entry)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                                 ?16, ?17, ?18, ?19)",
                    )
                    .map_err(query_error)?;
                for t in &trades {
                    let params = t.params();
                    inserted += stmt
                        .execute(params![
                            t.strategy_name,
                            t.symbol,
                            t.interval.as_str(),
                            t.entry_time.timestamp_millis(),
                            params.atr_multiplier_x100(),
                            params.rr_ratio_x100(),
                            t.side.as_str(),
                            t.entry_price,
                            t.stop_loss_price,
                            t.stop_loss_percent,
                            t.take_profit_price,
                            t.take_profit_percent,
                            t.exit_time.timestamp_millis(),
                            t.result_pct,
                            t.status.as_str(),
                            t.atr,
                            t.atr_multiplier,
                            t.rr_ratio,
                            t.rsi_at_entry
                        ])
                        .map_err(query_error)?;
                }
            }
            tx.commit().map_err(query_error)?;
            Ok(inserted)
        })
        .await
    }

    async fn exists_summary(&self, key: &SummaryKey) -> Result<bool, RrsweepError> {
        let key = key.clone();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM strategies
                 WHERE name = ?1 AND symbol = ?2 AND interval = ?3
                   AND atr_multiplier_x100 = ?4 AND rr_ratio_x100 = ?5)",
                params![
                    key.strategy,
                    key.symbol,
                    key.interval.as_str(),
                    key.params.atr_multiplier_x100(),
                    key.params.rr_ratio_x100()
                ],
                |row| row.get::<_, bool>(0),
            )
            .map_err(query_error)
        })
        .await
    }

    async fn insert_summary(&self, summary: &StrategySummary) -> Result<bool, RrsweepError> {
        let s = summary.clone();
        self.with_conn(move |conn| {
            let key = s.key();
            let recovery = Some(s.recovery_factor).filter(|v| v.is_finite());
            let changed = conn
                .execute(
                    "INSERT OR IGNORE INTO strategies
                     (name, symbol, interval, atr_multiplier_x100, rr_ratio_x100, atr_multiplier,
                      rr_ratio, total_trades, win_rate, total_return_pct, max_drawdown_pct,
                      final_balance, recovery_factor, expectancy, avg_hours_per_trade)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    params![
                        s.strategy,
                        s.symbol,
                        s.interval.as_str(),
                        key.params.atr_multiplier_x100(),
                        key.params.rr_ratio_x100(),
                        s.atr_multiplier,
                        s.rr_ratio,
                        s.total_trades as i64,
                        s.win_rate,
                        s.total_return_pct,
                        s.max_drawdown_pct,
                        s.final_balance,
                        recovery,
                        s.expectancy,
                        s.avg_hours_per_trade
                    ],
                )
                .map_err(query_error)?;
            Ok(changed == 1)
        })
        .await
    }

    async fn trades_for(&self, key: &SummaryKey) -> Result<Vec<Trade>, RrsweepError> {
        let key = key.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {TRADE_COLUMNS} FROM trades
                 WHERE strategy = ?1 AND symbol = ?2 AND interval = ?3
                   AND atr_multiplier_x100 = ?4 AND rr_ratio_x100 = ?5
                 ORDER BY entry_time ASC"
            );
            let mut stmt = conn.prepare(&sql).map_err(query_error)?;
            let rows = stmt
                .query_map(
                    params![
                        key.strategy,
                        key.symbol,
                        key.interval.as_str(),
                        key.params.atr_multiplier_x100(),
                        key.params.rr_ratio_x100()
                    ],
                    trade_from_row,
                )
                .map_err(query_error)?;
            collect(rows)
        })
        .await
    }

    async fn trade_groups(&self) -> Result<Vec<SummaryKey>, RrsweepError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT strategy, symbol, interval, MIN(atr_multiplier), MIN(rr_ratio)
                     FROM trades
                     GROUP BY strategy, symbol, interval, atr_multiplier_x100, rr_ratio_x100
                     ORDER BY strategy, symbol, interval",
                )
                .map_err(query_error)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(SummaryKey {
                        strategy: row.get(0)?,
                        symbol: row.get(1)?,
                        interval: parse_column(row, 2)?,
                        params: TradeParameters {
                            atr_multiplier: row.get(3)?,
                            rr_ratio: row.get(4)?,
                        },
                    })
                })
                .map_err(query_error)?;
            collect(rows)
        })
        .await
    }

    async fn summaries(&self, filter: &SummaryFilter) -> Result<Vec<StrategySummary>, RrsweepError> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {SUMMARY_COLUMNS} FROM strategies
                 WHERE (?1 IS NULL OR name = ?1)
                   AND (?2 IS NULL OR symbol = ?2)
                   AND (?3 IS NULL OR interval = ?3)
                 ORDER BY name, symbol, interval, atr_multiplier_x100, rr_ratio_x100"
            );
            let mut stmt = conn.prepare(&sql).map_err(query_error)?;
            let rows = stmt
                .query_map(
                    params![
                        filter.strategy,
                        filter.symbol,
                        filter.interval.map(|i| i.as_str())
                    ],
                    summary_from_row,
                )
                .map_err(query_error)?;
            collect(rows)
        })
        .await
    }
}
