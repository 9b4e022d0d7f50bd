//! Backtest accounting engine.
//!
//! The one place where execution delay is applied:
//! `executed[t] = target[t-1]`, `executed[0] = 0`. Returns are always
//! recomputed from closes. Equity compounds strategy returns from the
//! initial capital; drawdown is measured against the running peak.
//!
//! The buy-and-hold benchmark and the moving-average baseline go through
//! the same [`run_backtest`] so that cost and delay treatment match.

use chrono::NaiveDate;
use tracing::debug;

use super::error::PipelineError;
use super::indicator::calculate_sma;
use super::ohlcv::{PriceSeries, close_to_close_returns};

/// Windows of the reference moving-average crossover baseline.
pub const MA_BASELINE_FAST: usize = 50;
pub const MA_BASELINE_SLOW: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Fractional cost charged per unit of turnover.
    pub cost_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 1.0,
            cost_rate: 0.0005,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.cost_rate.is_finite() || self.cost_rate < 0.0 {
            return Err(PipelineError::configuration(
                "trading_cost",
                format!("cost rate must be a non-negative number, got {}", self.cost_rate),
            ));
        }
        if !self.initial_capital.is_finite() || self.initial_capital < 0.0 {
            return Err(PipelineError::configuration(
                "initial_capital",
                format!("must be a non-negative number, got {}", self.initial_capital),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BacktestRecord {
    pub date: NaiveDate,
    pub close: f64,
    /// Decision-time target, before the delay.
    pub target: f64,
    pub executed_position: f64,
    pub turnover: f64,
    pub price_return: f64,
    pub cost: f64,
    pub strategy_return: f64,
    pub equity: f64,
    pub drawdown: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BacktestResult {
    pub records: Vec<BacktestRecord>,
    pub initial_capital: f64,
    pub cost_rate: f64,
}

impl BacktestResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.records.iter().map(|r| r.date).collect()
    }

    pub fn equity(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.equity).collect()
    }

    pub fn strategy_returns(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.strategy_return).collect()
    }

    pub fn executed_positions(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.executed_position).collect()
    }

    pub fn final_equity(&self) -> Option<f64> {
        self.records.last().map(|r| r.equity)
    }

    /// Records with `start <= date <= end`, equity left as is.
    /// Same capital and cost rate, no records.
    pub fn empty_like(&self) -> BacktestResult {
        BacktestResult {
            records: Vec::new(),
            initial_capital: self.initial_capital,
            cost_rate: self.cost_rate,
        }
    }

    pub fn slice(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> BacktestResult {
        let records = self
            .records
            .iter()
            .filter(|r| start.is_none_or(|s| r.date >= s) && end.is_none_or(|e| r.date <= e))
            .cloned()
            .collect();
        BacktestResult {
            records,
            initial_capital: self.initial_capital,
            cost_rate: self.cost_rate,
        }
    }

    /// Recompound equity and drawdown from the initial capital over these
    /// records only, so a sub-window can be summarised on its own.
    pub fn rebase(&self) -> BacktestResult {
        let mut records = self.records.clone();
        let mut equity = self.initial_capital;
        let mut peak = f64::NEG_INFINITY;
        for r in &mut records {
            equity *= 1.0 + r.strategy_return;
            peak = peak.max(equity);
            r.equity = equity;
            r.drawdown = drawdown(equity, peak);
        }
        BacktestResult {
            records,
            initial_capital: self.initial_capital,
            cost_rate: self.cost_rate,
        }
    }
}

fn drawdown(equity: f64, peak: f64) -> f64 {
    if peak > 0.0 { equity / peak - 1.0 } else { 0.0 }
}

/// Run the accounting loop for a decision-time target series.
///
/// Non-finite targets are treated as flat.
pub fn run_backtest(
    series: &PriceSeries,
    target: &[f64],
    config: &BacktestConfig,
) -> Result<BacktestResult, PipelineError> {
    config.validate()?;
    if target.len() != series.len() {
        return Err(PipelineError::data(format!(
            "target has {} bars but price series has {}",
            target.len(),
            series.len()
        )));
    }

    let returns = close_to_close_returns(&series.closes());
    let mut records = Vec::with_capacity(series.len());
    let mut prev_target = 0.0_f64;
    let mut prev_position = 0.0_f64;
    let mut equity = config.initial_capital;
    let mut peak = f64::NEG_INFINITY;

    for (i, bar) in series.bars().iter().enumerate() {
        let position = prev_target;
        let turnover = (position - prev_position).abs();
        let cost = config.cost_rate * turnover;
        let strategy_return = position * returns[i] - cost;
        equity *= 1.0 + strategy_return;
        peak = peak.max(equity);

        let t = if target[i].is_finite() { target[i] } else { 0.0 };
        records.push(BacktestRecord {
            date: bar.date,
            close: bar.close,
            target: t,
            executed_position: position,
            turnover,
            price_return: returns[i],
            cost,
            strategy_return,
            equity,
            drawdown: drawdown(equity, peak),
        });

        prev_position = position;
        prev_target = t;
    }

    debug!(
        bars = records.len(),
        final_equity = records.last().map(|r| r.equity),
        "backtest complete"
    );

    Ok(BacktestResult {
        records,
        initial_capital: config.initial_capital,
        cost_rate: config.cost_rate,
    })
}

/// Constant decision-time target of 1.0 through the same engine.
pub fn run_benchmark(
    series: &PriceSeries,
    config: &BacktestConfig,
) -> Result<BacktestResult, PipelineError> {
    run_backtest(series, &vec![1.0; series.len()], config)
}

/// Decision = 1.0 while SMA(fast) > SMA(slow), else 0.0.
pub fn ma_crossover_target(
    series: &PriceSeries,
    fast: usize,
    slow: usize,
) -> Result<Vec<f64>, PipelineError> {
    if fast == 0 || fast >= slow {
        return Err(PipelineError::configuration(
            "ma_baseline",
            format!("fast window ({fast}) must be at least 1 and below slow window ({slow})"),
        ));
    }
    let closes = series.closes();
    let fast_ma = calculate_sma(&closes, fast);
    let slow_ma = calculate_sma(&closes, slow);
    Ok((0..closes.len())
        .map(|i| match (fast_ma.get(i), slow_ma.get(i)) {
            (Some(f), Some(s)) if f > s => 1.0,
            _ => 0.0,
        })
        .collect())
}

pub fn run_ma_baseline(
    series: &PriceSeries,
    fast: usize,
    slow: usize,
    config: &BacktestConfig,
) -> Result<BacktestResult, PipelineError> {
    let target = ma_crossover_target(series, fast, slow)?;
    run_backtest(series, &target, config)
}
