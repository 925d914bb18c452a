//! Parameter sweep orchestration.
//!
//! A unit is one (symbol, interval, strategy). Its series, features and
//! signals are prepared once; every grid point then simulates the same
//! signals with its own risk parameters. Grid points already summarized in the
//! store are skipped, so reruns only do missing work.
//!
//! Concurrency is bounded by an injected [`ResourcePool`]: one semaphore for
//! units in flight, a separate one for simulations. A unit holds its job
//! permit while its grid points wait on simulation permits, so the two must not
//! share a semaphore. Within a process, [`KeyLocks`] serialize work per summary
//! key; across processes the store's insert-if-absent keeps one record per key.

use crate::domain::analytics::{summarize, StrategySummary};
use crate::domain::error::RrsweepError;
use crate::domain::features::FeatureFrame;
use crate::domain::grid::SweepGrid;
use crate::domain::interval::Interval;
use crate::domain::series::PriceSeries;
use crate::domain::signal::{scan_signals, SignalGenerator};
use crate::domain::simulator::{Outcome, TradeSimulator};
use crate::domain::trade::{Side, SummaryKey, Trade, TradeParameters};
use crate::domain::trend::{align_trend, compute_trend, constant_uptrend, DEFAULT_TREND_EMA};
use crate::ports::price_port::PriceSource;
use crate::ports::store_port::TradeStore;
use futures::future::{join_all, try_join_all};
use std::collections::HashMap;
use std::sync::{Arc, MutexGuard, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Clone)]
pub struct ResourcePool {
    jobs: Arc<Semaphore>,
    simulations: Arc<Semaphore>,
}

impl ResourcePool {
    /// Limits below one are raised to one.
    pub fn new(max_jobs: usize, max_simulations: usize) -> Self {
        Self {
            jobs: Arc::new(Semaphore::new(max_jobs.max(1))),
            simulations: Arc::new(Semaphore::new(max_simulations.max(1))),
        }
    }

    async fn job_permit(&self) -> Result<OwnedSemaphorePermit, RrsweepError> {
        acquire(&self.jobs).await
    }

    async fn simulation_permit(&self) -> Result<OwnedSemaphorePermit, RrsweepError> {
        acquire(&self.simulations).await
    }
}

impl Default for ResourcePool {
    fn default() -> Self {
        Self::new(3, 3)
    }
}

async fn acquire(semaphore: &Arc<Semaphore>) -> Result<OwnedSemaphorePermit, RrsweepError> {
    semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| RrsweepError::Cancelled {
            reason: e.to_string(),
        })
}

/// One async mutex per summary key. An entry lives only while some task holds
/// or waits on it.
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: std::sync::Mutex<HashMap<SummaryKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Held until the returned guard drops.
    pub async fn acquire(&self, key: &SummaryKey) -> KeyGuard<'_> {
        let lock = self.entries().entry(key.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        KeyGuard {
            locks: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SummaryKey, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the key on drop and forgets it once nobody else wants it.
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: SummaryKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut entries = self.locks.entries();
        if entries
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            entries.remove(&self.key);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepSettings {
    pub initial_balance: f64,
    /// Timeframe whose trend filters shorter intervals.
    pub higher_interval: Interval,
    pub trend_ema_period: usize,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            initial_balance: crate::domain::analytics::DEFAULT_INITIAL_BALANCE,
            higher_interval: Interval::FourHours,
            trend_ema_period: DEFAULT_TREND_EMA,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SweepUnit {
    pub symbol: String,
    pub interval: Interval,
    pub strategy: Arc<dyn SignalGenerator>,
    pub grid: SweepGrid,
}

impl SweepUnit {
    /// Unit over the strategy's own default grid.
    pub fn new(symbol: &str, interval: Interval, strategy: Arc<dyn SignalGenerator>) -> Self {
        let grid = strategy.default_grid();
        Self {
            symbol: symbol.to_string(),
            interval,
            strategy,
            grid,
        }
    }

    pub fn with_grid(mut self, grid: SweepGrid) -> Self {
        self.grid = grid;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointOutcome {
    Evaluated {
        trades: usize,
        new_trades: usize,
        summary: StrategySummary,
    },
    /// A summary for this key already existed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointReport {
    pub params: TradeParameters,
    pub outcome: PointOutcome,
}

#[derive(Debug)]
pub struct UnitReport {
    pub strategy: String,
    pub symbol: String,
    pub interval: Interval,
    pub result: Result<Vec<PointReport>, RrsweepError>,
}

impl UnitReport {
    pub fn evaluated(&self) -> usize {
        self.count(|o| matches!(o, PointOutcome::Evaluated { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, PointOutcome::Skipped))
    }

    fn count(&self, pred: impl Fn(&PointOutcome) -> bool) -> usize {
        match &self.result {
            Ok(points) => points.iter().filter(|p| pred(&p.outcome)).count(),
            Err(_) => 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub units: Vec<UnitReport>,
}

impl SweepReport {
    pub fn evaluated(&self) -> usize {
        self.units.iter().map(UnitReport::evaluated).sum()
    }

    pub fn skipped(&self) -> usize {
        self.units.iter().map(UnitReport::skipped).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&UnitReport, &RrsweepError)> {
        self.units
            .iter()
            .filter_map(|u| u.result.as_ref().err().map(|e| (u, e)))
    }

    /// Summaries written by this run.
    pub fn summaries(&self) -> Vec<&StrategySummary> {
        self.units
            .iter()
            .filter_map(|u| u.result.as_ref().ok())
            .flatten()
            .filter_map(|p| match &p.outcome {
                PointOutcome::Evaluated { summary, .. } => Some(summary),
                PointOutcome::Skipped => None,
            })
            .collect()
    }
}

/// Series, features and signals shared by every grid point of a unit.
struct PreparedUnit {
    frame: FeatureFrame,
    signals: Vec<(usize, Side)>,
}

#[derive(Clone)]
pub struct SweepOrchestrator {
    prices: Arc<dyn PriceSource>,
    store: Arc<dyn TradeStore>,
    pool: ResourcePool,
    locks: Arc<KeyLocks>,
    settings: SweepSettings,
}

impl SweepOrchestrator {
    pub fn new(
        prices: Arc<dyn PriceSource>,
        store: Arc<dyn TradeStore>,
        pool: ResourcePool,
        settings: SweepSettings,
    ) -> Self {
        Self {
            prices,
            store,
            pool,
            locks: Arc::new(KeyLocks::new()),
            settings,
        }
    }

    /// Share key locks with another orchestrator over the same store.
    pub fn with_locks(mut self, locks: Arc<KeyLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Outer product of symbols × strategies × intervals.
    ///
    /// An empty symbol list means every pair the price source knows.
    pub async fn plan_units(
        &self,
        symbols: &[String],
        intervals: &[Interval],
        strategies: &[Arc<dyn SignalGenerator>],
        grid: Option<&SweepGrid>,
    ) -> Result<Vec<SweepUnit>, RrsweepError> {
        let symbols = if symbols.is_empty() {
            let pairs = self.prices.list_pairs().await?;
            debug!(pairs = pairs.len(), "using stored pair list");
            pairs.into_iter().map(|p| p.symbol).collect()
        } else {
            symbols.to_vec()
        };

        let mut units = Vec::with_capacity(symbols.len() * strategies.len() * intervals.len());
        for symbol in &symbols {
            for strategy in strategies {
                for &interval in intervals {
                    let unit = SweepUnit::new(symbol, interval, Arc::clone(strategy));
                    units.push(match grid {
                        Some(g) => unit.with_grid(g.clone()),
                        None => unit,
                    });
                }
            }
        }
        Ok(units)
    }

    /// Run every unit. A failing unit is reported and does not stop the others.
    pub async fn sweep_all(&self, units: Vec<SweepUnit>) -> SweepReport {
        info!(units = units.len(), "starting sweep");
        let reports = join_all(units.iter().map(|unit| async move {
            let result = self.sweep(unit).await;
            match &result {
                Err(e) if e.is_series_error() => warn!(
                    strategy = unit.strategy.name(),
                    symbol = %unit.symbol,
                    interval = %unit.interval,
                    error = %e,
                    "series unusable, unit skipped"
                ),
                Err(e) => error!(
                    strategy = unit.strategy.name(),
                    symbol = %unit.symbol,
                    interval = %unit.interval,
                    error = %e,
                    "unit failed"
                ),
                Ok(_) => {}
            }
            UnitReport {
                strategy: unit.strategy.name().to_string(),
                symbol: unit.symbol.clone(),
                interval: unit.interval,
                result,
            }
        }))
        .await;

        let report = SweepReport { units: reports };
        info!(
            evaluated = report.evaluated(),
            skipped = report.skipped(),
            failed = report.failures().count(),
            "sweep complete"
        );
        report
    }

    /// Evaluate every grid point of one unit.
    pub async fn sweep(&self, unit: &SweepUnit) -> Result<Vec<PointReport>, RrsweepError> {
        let span = info_span!(
            "sweep",
            strategy = unit.strategy.name(),
            symbol = %unit.symbol,
            interval = %unit.interval
        );
        async {
            let _job = self.pool.job_permit().await?;
            let prepared = self.prepare(unit).await?;
            debug!(
                bars = prepared.frame.len(),
                signals = prepared.signals.len(),
                points = unit.grid.total_combinations(),
                "unit prepared"
            );

            let points = unit.grid.combinations().into_iter().map(|params| {
                let key = SummaryKey::new(unit.strategy.name(), &unit.symbol, unit.interval, params);
                self.evaluate_point(key, &prepared)
            });
            try_join_all(points).await
        }
        .instrument(span)
        .await
    }

    /// Recompute summaries for grid points that have trades but no summary.
    ///
    /// Returns the number of summaries written.
    pub async fn rebuild_summaries(&self) -> Result<usize, RrsweepError> {
        let groups = self.store.trade_groups().await?;
        let mut written = 0;
        for key in groups {
            let _guard = self.locks.acquire(&key).await;
            if self.store.exists_summary(&key).await? {
                continue;
            }
            let trades = self.store.trades_for(&key).await?;
            let summary = summarize(&key, &trades, self.settings.initial_balance);
            if self.store.insert_summary(&summary).await? {
                debug!(%key, trades = trades.len(), "summary rebuilt");
                written += 1;
            }
        }
        info!(written, "summaries rebuilt");
        Ok(written)
    }

    async fn prepare(&self, unit: &SweepUnit) -> Result<PreparedUnit, RrsweepError> {
        let bars = self.prices.fetch_bars(&unit.symbol, unit.interval).await?;
        let series = PriceSeries::from_unordered(&unit.symbol, unit.interval, bars)?;
        series.require(unit.strategy.required_lookback())?;

        let trend = self.trend_for(&series).await?;
        let frame = FeatureFrame::build(series, &unit.strategy.indicator_spec(), &trend);
        let signals = scan_signals(unit.strategy.as_ref(), &frame);
        Ok(PreparedUnit { frame, signals })
    }

    async fn trend_for(&self, series: &PriceSeries) -> Result<Vec<Option<bool>>, RrsweepError> {
        let higher = self.settings.higher_interval;
        if !series.interval.needs_higher_timeframe(higher) {
            return Ok(constant_uptrend(series.len()));
        }

        let bars = self.prices.fetch_bars(&series.symbol, higher).await?;
        if bars.is_empty() {
            warn!(symbol = %series.symbol, %higher, "no higher-timeframe bars, trend undefined");
            return Ok(vec![None; series.len()]);
        }
        let higher_series = PriceSeries::from_unordered(&series.symbol, higher, bars)?;
        let points = compute_trend(&higher_series, self.settings.trend_ema_period);
        Ok(align_trend(&series.timestamps(), &points))
    }

    async fn evaluate_point(
        &self,
        key: SummaryKey,
        prepared: &PreparedUnit,
    ) -> Result<PointReport, RrsweepError> {
        let params = key.params;
        let _guard = self.locks.acquire(&key).await;

        if self.store.exists_summary(&key).await? {
            return Ok(skipped(&key, "summary exists"));
        }

        let (trades, fresh) = {
            let _permit = self.pool.simulation_permit().await?;
            self.collect_trades(&key, prepared).await?
        };

        let new_trades = self.store.insert_trades(&fresh).await?;
        let summary = summarize(&key, &trades, self.settings.initial_balance);
        if !self.store.insert_summary(&summary).await? {
            return Ok(skipped(&key, "summary written concurrently"));
        }

        info!(
            %key,
            trades = trades.len(),
            new_trades,
            win_rate = summary.win_rate,
            total_return_pct = summary.total_return_pct,
            "grid point evaluated"
        );
        Ok(PointReport {
            params,
            outcome: PointOutcome::Evaluated {
                trades: trades.len(),
                new_trades,
                summary,
            },
        })
    }

    /// All closed trades for the key in signal order, and the subset that is new.
    async fn collect_trades(
        &self,
        key: &SummaryKey,
        prepared: &PreparedUnit,
    ) -> Result<(Vec<Trade>, Vec<Trade>), RrsweepError> {
        let simulator = TradeSimulator::new(&key.strategy, &prepared.frame);
        let mut trades = Vec::new();
        let mut fresh = Vec::new();

        for &(index, side) in &prepared.signals {
            let plan = match simulator.plan(index, side, key.params) {
                Ok(Some(plan)) => plan,
                Ok(None) => continue,
                Err(RrsweepError::MissingRiskInput { entry_time }) => {
                    debug!(%entry_time, "no risk input at entry, signal skipped");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let trade_key = key.trade_key(plan.entry_time);
            if let Some(existing) = self.store.find_trade(&trade_key).await? {
                debug!(key = %trade_key, "trade already persisted, reusing");
                trades.push(existing);
                continue;
            }

            match simulator.resolve(&plan) {
                Outcome::Closed(trade) => {
                    fresh.push(trade.clone());
                    trades.push(trade);
                }
                Outcome::Unresolved => {}
            }
        }
        Ok((trades, fresh))
    }
}

/// Already-done grid point. Reported as a skip, never as an error.
fn skipped(key: &SummaryKey, why: &str) -> PointReport {
    let duplicate = RrsweepError::DuplicateWork {
        key: key.to_string(),
    };
    debug!(reason = why, "{duplicate}");
    PointReport {
        params: key.params,
        outcome: PointOutcome::Skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn key_lock_serializes_holders() {
        let locks = Arc::new(KeyLocks::new());
        let key = SummaryKey::new(
            "RSI-EMA",
            "BTCUSDT",
            Interval::OneHour,
            TradeParameters::new(2.0, 2.0).unwrap(),
        );

        let guard = locks.acquire(&key).await;
        let contender = {
            let locks = Arc::clone(&locks);
            let key = key.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(&key).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        assert_eq!(locks.entries().len(), 1);

        drop(guard);
        contender.await.unwrap();
        assert!(locks.entries().is_empty());
    }

    #[tokio::test]
    async fn released_keys_are_forgotten() {
        let locks = KeyLocks::new();
        for step in 1..=200 {
            let atr = 0.5 + step as f64 * 0.01;
            let key = SummaryKey::new(
                "RSI-EMA",
                "BTCUSDT",
                Interval::OneHour,
                TradeParameters::new(atr, 2.0).unwrap(),
            );
            let _guard = locks.acquire(&key).await;
        }
        assert!(locks.entries().is_empty());
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block() {
        let locks = KeyLocks::new();
        let a = SummaryKey::new(
            "RSI-EMA",
            "BTCUSDT",
            Interval::OneHour,
            TradeParameters::new(2.0, 2.0).unwrap(),
        );
        let b = SummaryKey {
            symbol: "ETHUSDT".into(),
            ..a.clone()
        };
        let _ga = locks.acquire(&a).await;
        let gb = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&b)).await;
        assert!(gb.is_ok());
    }

    #[test]
    fn pool_limits_are_at_least_one() {
        let pool = ResourcePool::new(0, 0);
        assert_eq!(pool.jobs.available_permits(), 1);
        assert_eq!(pool.simulations.available_permits(), 1);
    }
}
