#![allow(dead_code)]

use async_trait::async_trait;
use rrsweep::adapters::memory_store::MemoryStore;
use rrsweep::domain::analytics::StrategySummary;
use rrsweep::domain::bar::Bar;
use rrsweep::domain::error::RrsweepError;
use rrsweep::domain::features::{BarContext, IndicatorSpec, RiskSource};
use rrsweep::domain::grid::SweepGrid;
use rrsweep::domain::interval::Interval;
use rrsweep::domain::pair::{Pair, DEFAULT_EXCHANGE};
use rrsweep::domain::signal::{Signal, SignalGenerator};
use rrsweep::domain::trade::{SummaryKey, Trade, TradeKey};
use rrsweep::ports::price_port::PriceSource;
use rrsweep::ports::store_port::{SummaryFilter, TradeStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Counts calls in flight and remembers the highest count seen.
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn enter(&self) -> GaugeGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(self)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct GaugeGuard<'a>(&'a Gauge);

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockPriceSource {
    pub data: HashMap<(String, Interval), Vec<Bar>>,
    pub errors: HashMap<String, String>,
    fetches: AtomicUsize,
    delay: Duration,
    pub in_flight: Gauge,
}

impl MockPriceSource {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            fetches: AtomicUsize::new(0),
            delay: Duration::ZERO,
            in_flight: Gauge::default(),
        }
    }

    /// Every fetch sleeps this long while counted as in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_bars(mut self, symbol: &str, interval: Interval, bars: Vec<Bar>) -> Self {
        self.data.insert((symbol.to_string(), interval), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for MockPriceSource {
    async fn fetch_bars(&self, symbol: &str, interval: Interval) -> Result<Vec<Bar>, RrsweepError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let _in_flight = self.in_flight.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(reason) = self.errors.get(symbol) {
            return Err(RrsweepError::Database {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(&(symbol.to_string(), interval))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_pairs(&self) -> Result<Vec<Pair>, RrsweepError> {
        let mut symbols: Vec<&String> = self.data.keys().map(|(s, _)| s).collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols
            .into_iter()
            .map(|s| Pair::new(s, DEFAULT_EXCHANGE))
            .collect())
    }
}

/// Memory store whose trade lookups are counted while in flight.
/// Lookups happen only inside simulations.
pub struct GaugedStore {
    pub inner: MemoryStore,
    pub lookups: Gauge,
}

impl GaugedStore {
    pub fn new(latency: Duration) -> Self {
        Self {
            inner: MemoryStore::with_latency(latency),
            lookups: Gauge::default(),
        }
    }
}

#[async_trait]
impl TradeStore for GaugedStore {
    async fn find_trade(&self, key: &TradeKey) -> Result<Option<Trade>, RrsweepError> {
        let _in_flight = self.lookups.enter();
        self.inner.find_trade(key).await
    }

    async fn insert_trades(&self, trades: &[Trade]) -> Result<usize, RrsweepError> {
        self.inner.insert_trades(trades).await
    }

    async fn exists_summary(&self, key: &SummaryKey) -> Result<bool, RrsweepError> {
        self.inner.exists_summary(key).await
    }

    async fn insert_summary(&self, summary: &StrategySummary) -> Result<bool, RrsweepError> {
        self.inner.insert_summary(summary).await
    }

    async fn trades_for(&self, key: &SummaryKey) -> Result<Vec<Trade>, RrsweepError> {
        self.inner.trades_for(key).await
    }

    async fn trade_groups(&self) -> Result<Vec<SummaryKey>, RrsweepError> {
        self.inner.trade_groups().await
    }

    async fn summaries(&self, filter: &SummaryFilter) -> Result<Vec<StrategySummary>, RrsweepError> {
        self.inner.summaries(filter).await
    }
}

/// Fires on fixed open times. Risk is the entry bar's range so every bar is tradeable.
#[derive(Debug, Clone)]
pub struct ScriptedStrategy {
    pub longs: Vec<i64>,
    pub shorts: Vec<i64>,
    pub lookback: usize,
    pub grid: Option<SweepGrid>,
}

impl ScriptedStrategy {
    pub fn long_at(open_times: &[i64]) -> Self {
        Self {
            longs: open_times.to_vec(),
            shorts: Vec::new(),
            lookback: 1,
            grid: None,
        }
    }

    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn with_grid(mut self, grid: SweepGrid) -> Self {
        self.grid = Some(grid);
        self
    }
}

impl SignalGenerator for ScriptedStrategy {
    fn name(&self) -> &'static str {
        "Scripted"
    }

    fn indicator_spec(&self) -> IndicatorSpec {
        IndicatorSpec {
            risk: RiskSource::BarRange,
            ..IndicatorSpec::default()
        }
    }

    fn required_lookback(&self) -> usize {
        self.lookback
    }

    fn evaluate(&self, ctx: &BarContext<'_>) -> Signal {
        let t = ctx.bar.open_time_ms();
        Signal::from_conditions(self.longs.contains(&t), self.shorts.contains(&t))
    }

    fn default_grid(&self) -> SweepGrid {
        self.grid.clone().unwrap_or_default()
    }
}

pub fn open_time(interval: Interval, index: usize) -> i64 {
    interval.duration().num_milliseconds() * index as i64
}

pub fn make_bar(interval: Interval, index: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar::from_millis(open_time(interval, index), open, high, low, close, 1_000.0).unwrap()
}

/// `count` bars at `price` with a range of 2 (high +1, low -1).
pub fn flat_bars(interval: Interval, count: usize, price: f64) -> Vec<Bar> {
    (0..count)
        .map(|i| make_bar(interval, i, price, price + 1.0, price - 1.0, price))
        .collect()
}

/// Slow sine-like drift so indicators have something to chew on.
pub fn wavy_bars(interval: Interval, count: usize, start_price: f64) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let x = i as f64;
            let close = start_price + 10.0 * (x / 12.0).sin() + x * 0.05;
            let open = close - 0.5 * (x / 5.0).cos();
            let high = open.max(close) + 1.0 + (x / 7.0).sin().abs();
            let low = open.min(close) - 1.0 - (x / 9.0).cos().abs();
            let volume = 1_000.0 + 400.0 * ((x / 3.0).sin() + 1.0) + if i % 17 == 0 { 3_000.0 } else { 0.0 };
            Bar::from_millis(open_time(interval, i), open, high, low, close, volume).unwrap()
        })
        .collect()
}

pub fn single_grid(atr_multiplier: f64, rr_ratio: f64) -> SweepGrid {
    SweepGrid::new(vec![rr_ratio], vec![atr_multiplier]).unwrap()
}
