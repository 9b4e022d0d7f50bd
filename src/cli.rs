//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{MA_BASELINE_FAST, MA_BASELINE_SLOW, run_benchmark, run_ma_baseline};
use crate::domain::config_validation::{RunSettings, load_run_settings};
use crate::domain::error::PipelineError;
use crate::domain::metrics::PerformanceSummary;
use crate::domain::pipeline::{PipelineConfig, PipelineOutput, run_pipeline};
use crate::domain::scoring::{FALLBACK_BASELINE_VOL, ThresholdPolicy};
use crate::domain::tuning::{
    CandidateOutcome, DEFAULT_SENSITIVITY_VOL_WINDOWS, GridSearch, GridSearchResult, ParamGrid,
    SensitivityRow, SplitSummaries, TimeSplit, fit_baseline_on, sensitivity_sweep, split_summaries,
    with_baseline,
};
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "trendpilot", about = "Trend-following signal and backtest pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full pipeline on one price series
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// CSV file, or a directory of `<symbol>.csv` files
        #[arg(short, long)]
        data: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            data,
            symbol,
        } => run_backtest(&config, &data, symbol.as_deref()),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Everything the `backtest` command reports.
#[derive(Debug)]
pub struct BacktestReport {
    pub symbol: String,
    pub baseline_vol: f64,
    /// Final configuration, after grid-search selection when a split is set.
    pub config: PipelineConfig,
    pub strategy: PipelineOutput,
    pub benchmark: Option<PerformanceSummary>,
    pub ma_baseline: Option<PerformanceSummary>,
    pub grid: Option<GridSearchResult>,
    pub sensitivity: Vec<SensitivityRow>,
    pub splits: Option<SplitSummaries>,
}

/// Split `--data` into the directory handed to the CSV adapter and the
/// symbol to load from it.
pub fn resolve_data_source(
    data: &Path,
    symbol: Option<&str>,
) -> Result<(PathBuf, String), PipelineError> {
    if data.is_dir() {
        let symbol = symbol.ok_or_else(|| {
            PipelineError::configuration("symbol", "--symbol is required when --data is a directory")
        })?;
        return Ok((data.to_path_buf(), symbol.to_string()));
    }
    let stem = data
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| {
            PipelineError::configuration("data", format!("not a CSV file: {}", data.display()))
        })?;
    let dir = match data.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, symbol.map(str::to_string).unwrap_or(stem)))
}

/// Load, tune (when a split is configured) and run the pipeline for one
/// symbol. The baseline volatility is only ever fitted on the training
/// window; without a split the configured value or the fallback is used.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    symbol: &str,
    settings: &RunSettings,
    stop: &AtomicBool,
) -> Result<BacktestReport, PipelineError> {
    let series = data_port.fetch_series(symbol, None, None)?;
    if series.is_empty() {
        return Err(PipelineError::data(format!("no bars for {symbol}")));
    }
    info!(symbol, bars = series.len(), "loaded series");

    let base = &settings.pipeline;
    let mut grid = None;
    let mut sensitivity = Vec::new();
    let mut split = None;

    let (baseline_vol, config) = match settings.split {
        Some((train_end, val_end)) => {
            let time_split = TimeSplit::by_dates(&series, train_end, val_end)?;
            let baseline = settings
                .baseline_vol
                .unwrap_or_else(|| fit_baseline_on(&time_split.train, base.signals.vol_window));
            let fitted = with_baseline(base, baseline);

            let param_grid = ParamGrid::default();
            let search = GridSearch {
                base: &fitted,
                grid: &param_grid,
                min_len: settings.min_validation_bars,
            };
            let result = search.run(&series, &time_split, stop);
            let config = match result.best_candidate() {
                Some(best) => {
                    info!(
                        ema_fast = best.ema_fast,
                        ema_slow = best.ema_slow,
                        regime_buffer = best.regime_buffer,
                        vol_window = best.vol_window,
                        validation_sharpe = result.best_score(),
                        "selected grid candidate"
                    );
                    best.apply(&fitted)
                }
                None => {
                    warn!("no grid candidate ran, keeping configured parameters");
                    fitted.clone()
                }
            };

            sensitivity =
                sensitivity_sweep(&series, &fitted, &param_grid, &DEFAULT_SENSITIVITY_VOL_WINDOWS)?;
            grid = Some(result);
            split = Some(time_split);
            (baseline, config)
        }
        None => {
            let baseline = settings.baseline_vol.unwrap_or(FALLBACK_BASELINE_VOL);
            (baseline, with_baseline(base, baseline))
        }
    };

    let strategy = run_pipeline(&series, &config)?;
    let benchmark = run_benchmark(&series, &config.backtest)?;
    let ma = run_ma_baseline(&series, MA_BASELINE_FAST, MA_BASELINE_SLOW, &config.backtest)?;
    let splits = split
        .as_ref()
        .map(|s| split_summaries(&strategy.backtest, s, config.risk_free_rate));

    Ok(BacktestReport {
        symbol: symbol.to_string(),
        baseline_vol,
        benchmark: PerformanceSummary::compute(&benchmark, config.risk_free_rate),
        ma_baseline: PerformanceSummary::compute(&ma, config.risk_free_rate),
        config,
        strategy,
        grid,
        sensitivity,
        splits,
    })
}

fn run_backtest(config_path: &Path, data: &Path, symbol: Option<&str>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let settings = match load_run_settings(&adapter) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let (dir, symbol) = match resolve_data_source(data, symbol) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("Loading {} from {}", symbol, dir.display());
    let data_port = CsvAdapter::new(dir);
    let stop = AtomicBool::new(false);

    match run_backtest_pipeline(&data_port, &symbol, &settings, &stop) {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn fmt_pct(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}%", v * 100.0))
}

fn fmt_num(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

fn fmt_outcome(outcome: &CandidateOutcome) -> String {
    match outcome {
        CandidateOutcome::Scored(sharpe) => fmt_num(*sharpe),
        CandidateOutcome::Failed(e) => format!("failed ({e})"),
        CandidateOutcome::Cancelled => "cancelled".to_string(),
    }
}

fn print_summary(label: &str, summary: Option<&PerformanceSummary>) {
    eprintln!("\n=== {label} ===");
    let Some(s) = summary else {
        eprintln!("  not enough data");
        return;
    };
    eprintln!("Total Return:     {}", fmt_pct(s.total_return));
    eprintln!("CAGR:             {}", fmt_pct(s.cagr));
    eprintln!("Volatility:       {}", fmt_pct(Some(s.volatility)));
    eprintln!("Sharpe Ratio:     {}", fmt_num(s.sharpe));
    eprintln!("Max Drawdown:     {}", fmt_pct(Some(s.max_drawdown)));
    eprintln!("Exposure:         {:.2}", s.exposure);
    eprintln!("Turnover:         {:.2}", s.turnover_sum);
    eprintln!("Skew:             {}", fmt_num(s.skew));
    eprintln!("Excess Kurtosis:  {}", fmt_num(s.kurtosis_excess));
    eprintln!("Trades:           {}", s.num_trades);
    eprintln!("Hit Rate:         {}", fmt_pct(s.hit_rate));
    eprintln!("Avg Holding Days: {}", fmt_num(s.avg_holding_days));
}

fn print_report(report: &BacktestReport) {
    let signals = &report.config.signals;
    eprintln!(
        "\nSymbol: {} ({} bars, {} to {})",
        report.symbol,
        report.strategy.backtest.len(),
        report.strategy.signals.dates.first().map_or("?".into(), |d| d.to_string()),
        report.strategy.signals.dates.last().map_or("?".into(), |d| d.to_string()),
    );
    eprintln!(
        "Parameters: ema {}/{}, regime buffer {}, risk vol window {}, baseline vol {:.4}",
        signals.ema_fast,
        signals.ema_slow,
        signals.regime_buffer,
        report.config.risk.vol_window,
        report.baseline_vol
    );

    if let Some(grid) = &report.grid {
        eprintln!("\n=== Grid Search (validation Sharpe) ===");
        for e in &grid.evaluations {
            let c = &e.candidate;
            eprintln!(
                "  ema {}/{} buffer {} vol {}: {}",
                c.ema_fast,
                c.ema_slow,
                c.regime_buffer,
                c.vol_window,
                fmt_outcome(&e.outcome)
            );
        }
    }

    print_summary("Strategy", report.strategy.summary.as_ref());
    eprintln!(
        "Avg Leverage:     {:.2} (max {:.2})",
        report.strategy.risk.avg_leverage, report.strategy.risk.max_leverage
    );
    print_summary("Buy & Hold", report.benchmark.as_ref());
    print_summary(
        &format!("MA {MA_BASELINE_FAST}/{MA_BASELINE_SLOW} Baseline"),
        report.ma_baseline.as_ref(),
    );

    if let Some(splits) = &report.splits {
        print_summary("Train", splits.train.as_ref());
        print_summary("Validation", splits.validation.as_ref());
        print_summary("Test", splits.test.as_ref());
    }

    if !report.sensitivity.is_empty() {
        eprintln!("\n=== Sensitivity (full sample) ===");
        for row in &report.sensitivity {
            let c = &row.candidate;
            eprintln!(
                "  ema {}/{} buffer {} vol {}: sharpe {}, return {}, max dd {}",
                c.ema_fast,
                c.ema_slow,
                c.regime_buffer,
                c.vol_window,
                fmt_num(row.sharpe),
                fmt_pct(row.total_return),
                fmt_pct(row.max_drawdown),
            );
        }
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let settings = match load_run_settings(&adapter) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let pipeline = &settings.pipeline;
    let signals = &pipeline.signals;
    let mode = match &signals.policy {
        ThresholdPolicy::Main { entry, hold } => format!("main (entry {entry}, hold {hold})"),
        ThresholdPolicy::Extended { adaptive, .. } => {
            format!("extended (base threshold {})", adaptive.base_threshold)
        }
    };
    eprintln!("  Mode:        {mode}");
    eprintln!("  EMA:         {}/{}", signals.ema_fast, signals.ema_slow);
    eprintln!(
        "  Risk:        target vol {}, cap {}",
        pipeline.risk.target_vol, pipeline.risk.base_cap
    );
    if let Some(overlay) = &pipeline.overlay {
        eprintln!("  Overlay:     {} from {}", overlay.rating, overlay.effective_date);
    }
    match settings.split {
        Some((train_end, val_end)) => {
            eprintln!("  Split:       train <= {train_end}, validation <= {val_end}")
        }
        None => eprintln!("  Split:       none"),
    }
    eprintln!("\nConfig validated successfully");
    ExitCode::SUCCESS
}
