//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_adapter::{parse_klines, CsvAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::analytics::{rank_summaries, StrategySummary};
use crate::domain::config_validation::{validate_config, DataSource, SweepConfig};
use crate::domain::error::RrsweepError;
use crate::domain::interval::Interval;
use crate::domain::pair::{Pair, DEFAULT_EXCHANGE};
use crate::domain::signal::SignalGenerator;
use crate::domain::strategies::{strategy_by_name, strategy_from_config, STRATEGY_NAMES};
use crate::domain::sweep::{ResourcePool, SweepOrchestrator, SweepReport};
use crate::logging;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PriceSource;
use crate::ports::store_port::{SummaryFilter, TradeStore};

#[derive(Parser, Debug)]
#[command(name = "rrsweep", about = "Risk/reward parameter sweeps over kline data")]
pub struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sweep the configured grid and persist trades and summaries
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        interval: Option<String>,
        #[arg(long)]
        strategy: Option<String>,
    },
    /// Rebuild missing summaries from persisted trades
    Summarize {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print persisted summaries, best first
    Report {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        strategy: Option<String>,
    },
    /// Load a klines CSV file into the database
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        interval: String,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List available strategy variants
    Strategies,
}

pub fn run(cli: Cli) -> ExitCode {
    logging::init(cli.verbose);

    match cli.command {
        Command::Sweep {
            config,
            symbol,
            interval,
            strategy,
        } => run_sweep(&config, symbol.as_deref(), interval.as_deref(), strategy.as_deref()),
        Command::Summarize { config } => run_summarize(&config),
        Command::Report {
            config,
            symbol,
            strategy,
        } => run_report(&config, symbol.as_deref(), strategy.as_deref()),
        Command::Import {
            config,
            csv,
            symbol,
            interval,
        } => run_import(&config, &csv, &symbol, &interval),
        Command::Validate { config } => run_validate(&config),
        Command::Strategies => run_strategies(),
    }
}

fn fail(e: RrsweepError) -> ExitCode {
    eprintln!("error: {e}");
    (&e).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(fail)
}

fn runtime() -> Result<tokio::runtime::Runtime, RrsweepError> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

/// Narrow the configured sweep to the command-line overrides.
pub fn apply_overrides(
    mut sweep: SweepConfig,
    symbol: Option<&str>,
    interval: Option<&str>,
    strategy: Option<&str>,
) -> Result<SweepConfig, RrsweepError> {
    if let Some(s) = symbol {
        sweep.symbols = vec![s.trim().to_uppercase()];
    }
    if let Some(i) = interval {
        sweep.intervals = vec![i.parse::<Interval>()?];
    }
    if let Some(name) = strategy {
        strategy_by_name(name)?;
        sweep.strategies = vec![name.to_string()];
    }
    Ok(sweep)
}

pub struct Backends {
    pub prices: Arc<dyn PriceSource>,
    pub store: Arc<dyn TradeStore>,
}

#[cfg(feature = "sqlite")]
pub fn open_backends(config: &dyn ConfigPort, source: DataSource) -> Result<Backends, RrsweepError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    let db = Arc::new(SqliteAdapter::from_config(config)?);
    db.initialize_schema()?;

    let prices: Arc<dyn PriceSource> = match source {
        DataSource::Sqlite => db.clone() as Arc<dyn PriceSource>,
        DataSource::Csv => {
            let dir = config.get_string("data", "csv_dir").unwrap_or_default();
            let exchange = config
                .get_string("data", "exchange")
                .unwrap_or_else(|| DEFAULT_EXCHANGE.to_string());
            Arc::new(CsvAdapter::new(PathBuf::from(dir)).with_exchange(&exchange))
        }
    };
    Ok(Backends { prices, store: db })
}

#[cfg(not(feature = "sqlite"))]
pub fn open_backends(_config: &dyn ConfigPort, _source: DataSource) -> Result<Backends, RrsweepError> {
    Err(RrsweepError::Database {
        reason: "sqlite feature is required for persistence".to_string(),
    })
}

fn data_source(config: &dyn ConfigPort) -> DataSource {
    match config.get_string("data", "source") {
        Some(s) if s.trim().eq_ignore_ascii_case("csv") => DataSource::Csv,
        _ => DataSource::Sqlite,
    }
}

fn run_sweep(
    config_path: &Path,
    symbol: Option<&str>,
    interval: Option<&str>,
    strategy: Option<&str>,
) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let sweep = match validate_config(&config)
        .and_then(|s| apply_overrides(s, symbol, interval, strategy))
    {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    // Stage 2: Resolve strategies with their configured parameters
    let strategies: Vec<Arc<dyn SignalGenerator>> = match sweep
        .strategies
        .iter()
        .map(|name| strategy_from_config(name, &config))
        .collect()
    {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    // Stage 3: Open storage
    let backends = match open_backends(&config, data_source(&config)) {
        Ok(b) => b,
        Err(e) => return fail(e),
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => return fail(e),
    };

    // Stage 4: Plan and run
    let orchestrator = SweepOrchestrator::new(
        backends.prices,
        backends.store,
        ResourcePool::new(sweep.max_concurrent_jobs, sweep.max_concurrent_simulations),
        sweep.settings.clone(),
    );
    let report = rt.block_on(async {
        let units = orchestrator
            .plan_units(&sweep.symbols, &sweep.intervals, &strategies, sweep.grid.as_ref())
            .await?;
        eprintln!(
            "Sweeping {} units ({} symbols, {} strategies, {} intervals)",
            units.len(),
            units.len() / (strategies.len() * sweep.intervals.len()).max(1),
            strategies.len(),
            sweep.intervals.len()
        );
        Ok::<SweepReport, RrsweepError>(orchestrator.sweep_all(units).await)
    });
    let report = match report {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    // Stage 5: Print results
    let mut summaries: Vec<StrategySummary> = report.summaries().into_iter().cloned().collect();
    rank_summaries(&mut summaries);
    if !summaries.is_empty() {
        print_summaries(&summaries);
    }

    for (unit, e) in report.failures() {
        eprintln!(
            "warning: {} {} {} failed: {}",
            unit.strategy, unit.symbol, unit.interval, e
        );
    }
    eprintln!(
        "\n{} grid points evaluated, {} skipped, {} units failed",
        report.evaluated(),
        report.skipped(),
        report.failures().count()
    );

    sweep_exit_code(&report)
}

/// Failure only when there was work and none of it succeeded.
pub fn sweep_exit_code(report: &SweepReport) -> ExitCode {
    let all_failed = !report.units.is_empty() && report.units.iter().all(|u| u.result.is_err());
    match report.failures().next() {
        Some((_, e)) if all_failed => e.into(),
        _ => ExitCode::SUCCESS,
    }
}

fn run_summarize(config_path: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let sweep = match validate_config(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let backends = match open_backends(&config, DataSource::Sqlite) {
        Ok(b) => b,
        Err(e) => return fail(e),
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => return fail(e),
    };

    let orchestrator = SweepOrchestrator::new(
        backends.prices,
        backends.store,
        ResourcePool::default(),
        sweep.settings,
    );
    match rt.block_on(orchestrator.rebuild_summaries()) {
        Ok(written) => {
            println!("{written} summaries rebuilt");
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn run_report(config_path: &Path, symbol: Option<&str>, strategy: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let backends = match open_backends(&config, DataSource::Sqlite) {
        Ok(b) => b,
        Err(e) => return fail(e),
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => return fail(e),
    };

    let filter = SummaryFilter {
        strategy: strategy.map(str::to_string),
        symbol: symbol.map(|s| s.trim().to_uppercase()),
        interval: None,
    };
    let mut summaries = match rt.block_on(backends.store.summaries(&filter)) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    if summaries.is_empty() {
        eprintln!("No summaries found");
        return ExitCode::SUCCESS;
    }
    rank_summaries(&mut summaries);
    print_summaries(&summaries);
    eprintln!("{} summaries", summaries.len());
    ExitCode::SUCCESS
}

#[cfg(feature = "sqlite")]
fn run_import(config_path: &Path, csv_path: &Path, symbol: &str, interval: &str) -> ExitCode {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    let interval: Interval = match interval.parse() {
        Ok(i) => i,
        Err(e) => return fail(e),
    };
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    eprintln!("Reading {}", csv_path.display());
    let bars = match fs::read_to_string(csv_path)
        .map_err(RrsweepError::from)
        .and_then(|content| parse_klines(&content))
    {
        Ok(b) => b,
        Err(e) => return fail(e),
    };

    let exchange = config
        .get_string("data", "exchange")
        .unwrap_or_else(|| DEFAULT_EXCHANGE.to_string());
    let pair = Pair::new(symbol, &exchange);

    let result = SqliteAdapter::from_config(&config).and_then(|db| {
        db.initialize_schema()?;
        db.insert_pair(&pair)?;
        db.insert_bars(&pair.symbol, interval, &bars)
    });
    match result {
        Ok(written) => {
            println!("{} {}: {} bars imported", pair.symbol, interval, written);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

#[cfg(not(feature = "sqlite"))]
fn run_import(_config_path: &Path, _csv_path: &Path, _symbol: &str, _interval: &str) -> ExitCode {
    eprintln!("error: sqlite feature is required for import");
    ExitCode::from(1)
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let sweep = match validate_config(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let symbols = if sweep.symbols.is_empty() {
        "(all stored pairs)".to_string()
    } else {
        sweep.symbols.join(", ")
    };
    let intervals: Vec<&str> = sweep.intervals.iter().map(|i| i.as_str()).collect();
    eprintln!("\nSweep:");
    eprintln!("  symbols:     {symbols}");
    eprintln!("  intervals:   {}", intervals.join(", "));
    eprintln!("  strategies:  {}", sweep.strategies.join(", "));
    match &sweep.grid {
        Some(grid) => eprintln!(
            "  grid:        {} rr × {} atr = {} points",
            grid.rr_ratios().len(),
            grid.atr_multipliers().len(),
            grid.total_combinations()
        ),
        None => eprintln!("  grid:        strategy defaults"),
    }
    eprintln!("  balance:     {}", sweep.settings.initial_balance);
    eprintln!(
        "  concurrency: {} jobs, {} simulations",
        sweep.max_concurrent_jobs, sweep.max_concurrent_simulations
    );

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_strategies() -> ExitCode {
    for name in STRATEGY_NAMES {
        match strategy_by_name(name) {
            Ok(strategy) => println!(
                "{:<18} lookback {:>4} bars, {:>2} default grid points",
                strategy.name(),
                strategy.required_lookback(),
                strategy.default_grid().total_combinations()
            ),
            Err(e) => return fail(e),
        }
    }
    ExitCode::SUCCESS
}

pub fn format_summary_row(s: &StrategySummary) -> String {
    format!(
        "{:<18} {:<10} {:<4} {:>5.2} {:>5.2} {:>6} {:>7.2} {:>9.2} {:>8.2} {:>9.2} {:>8.2} {:>6.2} {:>7.2}",
        s.strategy,
        s.symbol,
        s.interval,
        s.atr_multiplier,
        s.rr_ratio,
        s.total_trades,
        s.win_rate,
        s.total_return_pct,
        s.max_drawdown_pct,
        s.final_balance,
        s.recovery_factor,
        s.expectancy,
        s.avg_hours_per_trade,
    )
}

fn print_summaries(summaries: &[StrategySummary]) {
    println!(
        "{:<18} {:<10} {:<4} {:>5} {:>5} {:>6} {:>7} {:>9} {:>8} {:>9} {:>8} {:>6} {:>7}",
        "strategy", "symbol", "int", "atr", "rr", "trades", "win%", "return%", "maxdd%", "balance",
        "recovery", "expect", "hours"
    );
    for summary in summaries {
        println!("{}", format_summary_row(summary));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sweep::UnitReport;

    fn sweep_config() -> SweepConfig {
        let config = FileConfigAdapter::from_string("[sqlite]\npath = x.db\n").unwrap();
        validate_config(&config).unwrap()
    }

    #[test]
    fn overrides_narrow_the_sweep() {
        let sweep = apply_overrides(sweep_config(), Some("ethusdt"), Some("1h"), Some("RSI-EMA"))
            .unwrap();
        assert_eq!(sweep.symbols, vec!["ETHUSDT"]);
        assert_eq!(sweep.intervals, vec![Interval::OneHour]);
        assert_eq!(sweep.strategies, vec!["RSI-EMA"]);
    }

    #[test]
    fn bad_overrides_are_rejected() {
        assert!(matches!(
            apply_overrides(sweep_config(), None, Some("2h"), None),
            Err(RrsweepError::InvalidInterval { .. })
        ));
        assert!(matches!(
            apply_overrides(sweep_config(), None, None, Some("Turtle")),
            Err(RrsweepError::UnknownStrategy { .. })
        ));
    }

    fn unit(result: Result<Vec<crate::domain::sweep::PointReport>, RrsweepError>) -> UnitReport {
        UnitReport {
            strategy: "RSI-EMA".into(),
            symbol: "BTCUSDT".into(),
            interval: Interval::OneHour,
            result,
        }
    }

    fn no_data() -> RrsweepError {
        RrsweepError::NoData {
            symbol: "BTCUSDT".into(),
            interval: "1h".into(),
        }
    }

    #[test]
    fn partial_failure_still_succeeds() {
        let report = SweepReport {
            units: vec![unit(Ok(vec![])), unit(Err(no_data()))],
        };
        assert_eq!(sweep_exit_code(&report), ExitCode::SUCCESS);
    }

    #[test]
    fn total_failure_uses_the_error_code() {
        let err = no_data();
        let expected: ExitCode = (&err).into();
        let report = SweepReport {
            units: vec![unit(Err(err))],
        };
        assert_eq!(sweep_exit_code(&report), expected);
        assert_eq!(sweep_exit_code(&SweepReport::default()), ExitCode::SUCCESS);
    }

    #[test]
    fn infinite_recovery_prints_as_inf() {
        let mut summary = crate::domain::analytics::summarize(
            &crate::domain::trade::SummaryKey::new(
                "RSI-EMA",
                "BTCUSDT",
                Interval::OneHour,
                crate::domain::trade::TradeParameters::new(2.0, 2.0).unwrap(),
            ),
            &[],
            100.0,
        );
        summary.recovery_factor = f64::INFINITY;
        assert!(format_summary_row(&summary).contains("inf"));
    }
}
