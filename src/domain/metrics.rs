//! Performance statistics over a completed backtest.
//!
//! Degenerate inputs never fail: fewer than two equity points gives no
//! summary at all, and individual statistics that cannot be evaluated
//! (zero-variance Sharpe, CAGR over a zero-day span, moments of tiny
//! samples) are `None`.

use super::backtest::BacktestResult;
use super::indicator::volatility::TRADING_DAYS_PER_YEAR;
use super::trades::{Trade, TradeStats, reconstruct_trades};

const DAYS_PER_YEAR: f64 = 365.25;
/// Return std at or below this is treated as zero variance.
const MIN_STD: f64 = 1e-12;
/// Positions with magnitude above this count towards exposure.
const EXPOSURE_EPS: f64 = 1e-9;
/// Default minimum sample length for a validation-window Sharpe.
pub const DEFAULT_MIN_SHARPE_LEN: usize = 60;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PerformanceSummary {
    pub initial_capital: f64,
    pub equity_end: f64,
    /// `None` when the initial capital is zero.
    pub total_return: Option<f64>,
    pub cagr: Option<f64>,
    pub volatility: f64,
    pub sharpe: Option<f64>,
    pub max_drawdown: f64,
    pub exposure: f64,
    pub turnover_sum: f64,
    pub skew: Option<f64>,
    pub kurtosis_excess: Option<f64>,
    pub num_trades: usize,
    pub hit_rate: Option<f64>,
    pub avg_holding_days: Option<f64>,
}

impl PerformanceSummary {
    pub fn compute(result: &BacktestResult, risk_free_rate: f64) -> Option<Self> {
        let trades = reconstruct_trades(result);
        Self::compute_with_trades(result, &trades, risk_free_rate)
    }

    pub fn compute_with_trades(
        result: &BacktestResult,
        trades: &[Trade],
        risk_free_rate: f64,
    ) -> Option<Self> {
        let records = &result.records;
        let valid_equity = records.iter().filter(|r| r.equity.is_finite()).count();
        if valid_equity < 2 {
            return None;
        }
        let first = records.first()?;
        let last = records.last()?;

        let returns: Vec<f64> = records
            .iter()
            .map(|r| {
                if r.strategy_return.is_finite() {
                    r.strategy_return
                } else {
                    0.0
                }
            })
            .collect();

        let denom = 1.0 + returns[0];
        let initial_capital = if denom.is_finite() && denom > 0.0 {
            first.equity / denom
        } else {
            first.equity
        };
        let equity_end = last.equity;

        let growth = if initial_capital > 0.0 {
            Some(equity_end / initial_capital)
        } else {
            None
        };
        let total_return = growth.map(|g| g - 1.0);

        let days = (last.date - first.date).num_days();
        let cagr = match growth {
            Some(g) if days > 0 && g > 0.0 => {
                let years = days as f64 / DAYS_PER_YEAR;
                Some(g.powf(1.0 / years) - 1.0)
            }
            _ => None,
        };

        let volatility = population_std(&returns) * TRADING_DAYS_PER_YEAR.sqrt();
        let sharpe = sharpe_ratio(&returns, risk_free_rate);

        let max_drawdown = records
            .iter()
            .map(|r| r.drawdown)
            .filter(|d| d.is_finite())
            .fold(0.0, f64::min);

        let n = records.len() as f64;
        let exposure = records
            .iter()
            .filter(|r| r.executed_position.abs() > EXPOSURE_EPS)
            .count() as f64
            / n;
        let turnover_sum = records
            .iter()
            .map(|r| r.turnover)
            .filter(|t| t.is_finite())
            .sum();

        let stats = TradeStats::compute(trades);

        Some(PerformanceSummary {
            initial_capital,
            equity_end,
            total_return,
            cagr,
            volatility,
            sharpe,
            max_drawdown,
            exposure,
            turnover_sum,
            skew: skewness(&returns),
            kurtosis_excess: excess_kurtosis(&returns),
            num_trades: stats.num_trades,
            hit_rate: stats.hit_rate,
            avg_holding_days: stats.avg_holding_days,
        })
    }
}

/// Daily rate equivalent to an annual risk-free rate.
pub fn daily_risk_free(annual: f64) -> f64 {
    (1.0 + annual).powf(1.0 / TRADING_DAYS_PER_YEAR) - 1.0
}

/// Annualized Sharpe of daily returns; `None` for empty or zero-variance samples.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> Option<f64> {
    if returns.is_empty() {
        return None;
    }
    let rf = daily_risk_free(risk_free_rate);
    let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
    let std = population_std(&excess);
    if std <= MIN_STD {
        return None;
    }
    Some(mean(&excess) / std * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Sharpe over a (validation) window, `None` when shorter than `min_len`.
pub fn window_sharpe(result: &BacktestResult, risk_free_rate: f64, min_len: usize) -> Option<f64> {
    let returns: Vec<f64> = result
        .strategy_returns()
        .into_iter()
        .filter(|r| r.is_finite())
        .collect();
    if returns.len() < min_len {
        return None;
    }
    sharpe_ratio(&returns, risk_free_rate)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Sums of squared, cubed and fourth-power deviations from the mean.
fn central_sums(values: &[f64]) -> (f64, f64, f64) {
    let m = mean(values);
    values.iter().fold((0.0, 0.0, 0.0), |(s2, s3, s4), v| {
        let d = v - m;
        (s2 + d * d, s3 + d * d * d, s4 + d * d * d * d)
    })
}

/// Sample skewness with the small-sample bias correction (G1).
pub fn skewness(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let nf = n as f64;
    let (s2, s3, _) = central_sums(values);
    let m2 = s2 / nf;
    if m2 <= MIN_STD * MIN_STD {
        return Some(0.0);
    }
    let m3 = s3 / nf;
    let g1 = m3 / m2.powf(1.5);
    Some(g1 * (nf * (nf - 1.0)).sqrt() / (nf - 2.0))
}

/// Sample excess kurtosis with the small-sample bias correction (G2).
pub fn excess_kurtosis(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 4 {
        return None;
    }
    let nf = n as f64;
    let (s2, _, s4) = central_sums(values);
    if s2 / nf <= MIN_STD * MIN_STD {
        return Some(0.0);
    }
    let numerator = nf * (nf + 1.0) * (nf - 1.0) * s4;
    let denominator = (nf - 2.0) * (nf - 3.0) * s2 * s2;
    let adjustment = 3.0 * (nf - 1.0).powi(2) / ((nf - 2.0) * (nf - 3.0));
    Some(numerator / denominator - adjustment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::{BacktestConfig, run_backtest};
    use crate::domain::ohlcv::{PriceBar, PriceSeries};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn make_series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                date: start + chrono::Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1.0,
            })
            .collect();
        PriceSeries::new(bars).unwrap()
    }

    fn backtest(closes: &[f64], target: f64) -> BacktestResult {
        let config = BacktestConfig {
            initial_capital: 1.0,
            cost_rate: 0.0,
        };
        let series = make_series(closes);
        run_backtest(&series, &vec![target; closes.len()], &config).unwrap()
    }

    #[test]
    fn summary_requires_two_points() {
        assert!(PerformanceSummary::compute(&backtest(&[100.0], 1.0), 0.0).is_none());
    }

    #[test]
    fn total_return_and_exposure() {
        let s = PerformanceSummary::compute(&backtest(&[100.0, 110.0, 121.0], 1.0), 0.0).unwrap();
        assert_relative_eq!(s.total_return.unwrap(), 0.21, epsilon = 1e-12);
        assert_relative_eq!(s.initial_capital, 1.0, epsilon = 1e-12);
        assert_relative_eq!(s.exposure, 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(s.turnover_sum, 1.0, epsilon = 1e-12);
        assert_eq!(s.num_trades, 1);
    }

    #[test]
    fn cagr_uses_calendar_days() {
        let closes: Vec<f64> = (0..366).map(|i| 100.0 + i as f64 * 0.1).collect();
        let s = PerformanceSummary::compute(&backtest(&closes, 1.0), 0.0).unwrap();
        let years = 365.0 / 365.25;
        let expected = (1.0 + s.total_return.unwrap()).powf(1.0 / years) - 1.0;
        assert_relative_eq!(s.cagr.unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn flat_strategy_sharpe_not_evaluable() {
        let s = PerformanceSummary::compute(&backtest(&[100.0, 105.0, 95.0, 100.0], 0.0), 0.0)
            .unwrap();
        assert!(s.sharpe.is_none());
        assert_eq!(s.max_drawdown, 0.0);
        assert_eq!(s.total_return, Some(0.0));
        assert_eq!(s.exposure, 0.0);
    }

    #[test]
    fn zero_capital_leaves_return_undefined() {
        let config = BacktestConfig {
            initial_capital: 0.0,
            cost_rate: 0.0,
        };
        let series = make_series(&[100.0, 110.0, 99.0, 120.0]);
        let bt = run_backtest(&series, &[1.0; 4], &config).unwrap();
        let s = PerformanceSummary::compute(&bt, 0.0).unwrap();
        assert_eq!(s.initial_capital, 0.0);
        assert_eq!(s.equity_end, 0.0);
        assert!(s.total_return.is_none());
        assert!(s.cagr.is_none());
        assert_eq!(s.max_drawdown, 0.0);
        assert_eq!(s.num_trades, 1);
    }

    #[test]
    fn max_drawdown_is_minimum() {
        let s = PerformanceSummary::compute(&backtest(&[100.0, 100.0, 120.0, 90.0, 100.0], 1.0), 0.0)
            .unwrap();
        assert_relative_eq!(s.max_drawdown, -0.25, epsilon = 1e-12);
    }

    #[test]
    fn sharpe_sign_and_risk_free() {
        let returns = [0.01, -0.005, 0.02, 0.0];
        let s0 = sharpe_ratio(&returns, 0.0).unwrap();
        let s5 = sharpe_ratio(&returns, 0.05).unwrap();
        assert!(s0 > 0.0);
        assert!(s5 < s0);
        assert!(sharpe_ratio(&[], 0.0).is_none());
        assert!(sharpe_ratio(&[0.01; 5], 0.0).is_none());
    }

    #[test]
    fn window_sharpe_min_len() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + (i % 3) as f64).collect();
        let bt = backtest(&closes, 1.0);
        assert!(window_sharpe(&bt, 0.0, 60).is_none());
        assert!(window_sharpe(&bt, 0.0, 5).is_some());
    }

    #[test]
    fn daily_risk_free_compounds_to_annual() {
        let d = daily_risk_free(0.05);
        assert_relative_eq!((1.0 + d).powf(252.0), 1.05, epsilon = 1e-12);
    }

    #[test]
    fn skew_and_kurtosis_reference_values() {
        // pandas: Series([1, 2, 3, 10]).skew() == 1.7636..., .kurt() == 3.2280
        let x = [1.0, 2.0, 3.0, 10.0];
        assert_relative_eq!(skewness(&x).unwrap(), 1.763_632_6, epsilon = 1e-6);
        assert_relative_eq!(excess_kurtosis(&x).unwrap(), 3.228, epsilon = 1e-9);
        assert!(skewness(&[1.0, 2.0]).is_none());
        assert!(excess_kurtosis(&[1.0, 2.0, 3.0]).is_none());
        assert_eq!(skewness(&[2.0; 5]), Some(0.0));
    }
}
