//! Chronological split, baseline-volatility fit, parameter grid search and
//! sensitivity sweep.
//!
//! Grid candidates are independent pipeline runs over a shared, immutable
//! price window and are evaluated in parallel with rayon. A host can stop a
//! search between candidates through an `AtomicBool`; a candidate that has
//! started always runs to completion.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::backtest::BacktestResult;
use super::error::PipelineError;
use super::indicator::realized_volatility;
use super::metrics::{PerformanceSummary, window_sharpe};
use super::ohlcv::PriceSeries;
use super::pipeline::{PipelineConfig, run_pipeline};
use super::scoring::{ThresholdPolicy, fit_baseline_volatility};

/// Vol windows crossed with the grid in the robustness sweep.
pub const DEFAULT_SENSITIVITY_VOL_WINDOWS: [usize; 2] = [10, 40];

/// Train = bars <= train_end, validation = (train_end, val_end], test = the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSplit {
    pub train_end: NaiveDate,
    pub val_end: NaiveDate,
    pub train: PriceSeries,
    pub validation: PriceSeries,
    pub test: PriceSeries,
}

impl TimeSplit {
    pub fn by_dates(
        series: &PriceSeries,
        train_end: NaiveDate,
        val_end: NaiveDate,
    ) -> Result<Self, PipelineError> {
        if val_end <= train_end {
            return Err(PipelineError::configuration(
                "val_end",
                format!("validation end {val_end} must be after train end {train_end}"),
            ));
        }
        let train = series.window(None, Some(train_end));
        let validation = series.window(train_end.succ_opt(), Some(val_end));
        let test = match val_end.succ_opt() {
            Some(start) => series.window(Some(start), None),
            None => PriceSeries::default(),
        };
        if train.is_empty() {
            return Err(PipelineError::data(format!(
                "no bars on or before train end {train_end}"
            )));
        }
        Ok(TimeSplit {
            train_end,
            val_end,
            train,
            validation,
            test,
        })
    }

    /// Train and validation bars together (bars <= val_end).
    pub fn train_and_validation(&self, series: &PriceSeries) -> PriceSeries {
        series.window(None, Some(self.val_end))
    }
}

/// Median signal-side realized volatility over the training window.
pub fn fit_baseline_on(train: &PriceSeries, vol_window: usize) -> f64 {
    let vol = realized_volatility(&train.returns(), vol_window, vol_window);
    fit_baseline_volatility(&vol.values)
}

/// Copy of `config` whose adaptive policy (if any) uses `baseline_vol`.
pub fn with_baseline(config: &PipelineConfig, baseline_vol: f64) -> PipelineConfig {
    let mut config = config.clone();
    if let ThresholdPolicy::Extended { adaptive, .. } = &mut config.signals.policy {
        adaptive.baseline_vol = baseline_vol;
    }
    config
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridCandidate {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub regime_buffer: f64,
    /// Risk-side realized volatility window.
    pub vol_window: usize,
}

impl GridCandidate {
    pub fn new(ema_fast: usize, ema_slow: usize, regime_buffer: f64, vol_window: usize) -> Self {
        GridCandidate {
            ema_fast,
            ema_slow,
            regime_buffer,
            vol_window,
        }
    }

    pub fn apply(&self, base: &PipelineConfig) -> PipelineConfig {
        let mut config = base.clone();
        config.signals.ema_fast = self.ema_fast;
        config.signals.ema_slow = self.ema_slow;
        config.signals.regime_buffer = self.regime_buffer;
        config.risk.vol_window = self.vol_window;
        config
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamGrid {
    pub candidates: Vec<GridCandidate>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        ParamGrid {
            candidates: vec![
                GridCandidate::new(20, 100, 0.01, 20),
                GridCandidate::new(20, 100, 0.02, 20),
                GridCandidate::new(30, 150, 0.01, 20),
                GridCandidate::new(50, 200, 0.01, 20),
            ],
        }
    }
}

impl ParamGrid {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Every candidate crossed with each of `vol_windows`.
    pub fn with_vol_windows(&self, vol_windows: &[usize]) -> ParamGrid {
        let candidates = self
            .candidates
            .iter()
            .flat_map(|c| {
                vol_windows.iter().map(move |&vw| GridCandidate {
                    vol_window: vw,
                    ..c.clone()
                })
            })
            .collect();
        ParamGrid { candidates }
    }
}

#[derive(Debug)]
pub enum CandidateOutcome {
    /// Validation Sharpe; `None` when not evaluable.
    Scored(Option<f64>),
    Failed(PipelineError),
    /// Not started because the stop flag was set.
    Cancelled,
}

#[derive(Debug)]
pub struct CandidateEvaluation {
    pub candidate: GridCandidate,
    pub outcome: CandidateOutcome,
}

#[derive(Debug)]
pub struct GridSearchResult {
    pub evaluations: Vec<CandidateEvaluation>,
    /// Index into `evaluations` of the chosen candidate.
    pub best: Option<usize>,
}

impl GridSearchResult {
    pub fn best_candidate(&self) -> Option<&GridCandidate> {
        self.best.map(|i| &self.evaluations[i].candidate)
    }

    pub fn best_score(&self) -> Option<f64> {
        match self.best.map(|i| &self.evaluations[i].outcome) {
            Some(CandidateOutcome::Scored(score)) => *score,
            _ => None,
        }
    }

    pub fn was_cancelled(&self) -> bool {
        self.evaluations
            .iter()
            .any(|e| matches!(e.outcome, CandidateOutcome::Cancelled))
    }
}

/// Highest evaluable score, first in grid order on ties; otherwise the
/// first candidate that ran without error.
fn select_best(evaluations: &[CandidateEvaluation]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, e) in evaluations.iter().enumerate() {
        if let CandidateOutcome::Scored(Some(score)) = e.outcome {
            if best.is_none_or(|(_, b)| score > b) {
                best = Some((i, score));
            }
        }
    }
    best.map(|(i, _)| i).or_else(|| {
        evaluations
            .iter()
            .position(|e| matches!(e.outcome, CandidateOutcome::Scored(_)))
    })
}

/// Bars dated in `(after, until]`.
fn validation_window(result: &BacktestResult, after: NaiveDate, until: NaiveDate) -> BacktestResult {
    match after.succ_opt() {
        Some(start) => result.slice(Some(start), Some(until)),
        None => result.empty_like(),
    }
}

pub struct GridSearch<'a> {
    pub base: &'a PipelineConfig,
    pub grid: &'a ParamGrid,
    /// Minimum validation bars for a Sharpe to count.
    pub min_len: usize,
}

impl GridSearch<'_> {
    /// Runs every candidate on `split.train + split.validation` and scores it
    /// on the validation window only.
    pub fn run(&self, series: &PriceSeries, split: &TimeSplit, stop: &AtomicBool) -> GridSearchResult {
        let window = split.train_and_validation(series);
        let window = &window;

        let evaluations: Vec<CandidateEvaluation> = self
            .grid
            .candidates
            .par_iter()
            .map(|candidate| {
                if stop.load(Ordering::Relaxed) {
                    debug!(?candidate, "grid search stopped before candidate");
                    return CandidateEvaluation {
                        candidate: candidate.clone(),
                        outcome: CandidateOutcome::Cancelled,
                    };
                }
                let config = candidate.apply(self.base);
                let outcome = match run_pipeline(window, &config) {
                    Ok(out) => {
                        let validation =
                            validation_window(&out.backtest, split.train_end, split.val_end);
                        let score = window_sharpe(&validation, config.risk_free_rate, self.min_len);
                        debug!(?candidate, ?score, "candidate evaluated");
                        CandidateOutcome::Scored(score)
                    }
                    Err(err) => {
                        warn!(?candidate, error = %err, "candidate failed");
                        CandidateOutcome::Failed(err)
                    }
                };
                CandidateEvaluation {
                    candidate: candidate.clone(),
                    outcome,
                }
            })
            .collect();

        let best = select_best(&evaluations);
        info!(
            candidates = evaluations.len(),
            best = ?best.map(|i| &evaluations[i].candidate),
            "grid search complete"
        );
        GridSearchResult { evaluations, best }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityRow {
    pub candidate: GridCandidate,
    pub sharpe: Option<f64>,
    pub total_return: Option<f64>,
    pub max_drawdown: Option<f64>,
}

/// Full-sample robustness check of every grid entry at each vol window.
pub fn sensitivity_sweep(
    series: &PriceSeries,
    base: &PipelineConfig,
    grid: &ParamGrid,
    vol_windows: &[usize],
) -> Result<Vec<SensitivityRow>, PipelineError> {
    grid.with_vol_windows(vol_windows)
        .candidates
        .par_iter()
        .map(|candidate| {
            let out = run_pipeline(series, &candidate.apply(base))?;
            let summary = out.summary.as_ref();
            Ok(SensitivityRow {
                candidate: candidate.clone(),
                sharpe: summary.and_then(|s| s.sharpe),
                total_return: summary.and_then(|s| s.total_return),
                max_drawdown: summary.map(|s| s.max_drawdown),
            })
        })
        .collect()
}

/// Summaries of each split window, each re-based to the initial capital.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitSummaries {
    pub train: Option<PerformanceSummary>,
    pub validation: Option<PerformanceSummary>,
    pub test: Option<PerformanceSummary>,
}

pub fn split_summaries(
    result: &BacktestResult,
    split: &TimeSplit,
    risk_free_rate: f64,
) -> SplitSummaries {
    let summarise =
        |window: BacktestResult| PerformanceSummary::compute(&window.rebase(), risk_free_rate);
    let test = match split.val_end.succ_opt() {
        Some(start) => result.slice(Some(start), None),
        None => result.empty_like(),
    };
    SplitSummaries {
        train: summarise(result.slice(None, Some(split.train_end))),
        validation: summarise(validation_window(result, split.train_end, split.val_end)),
        test: summarise(test),
    }
}
