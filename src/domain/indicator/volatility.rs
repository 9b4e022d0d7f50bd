//! Realized volatility: rolling population standard deviation of
//! close-to-close returns, annualized with sqrt(252).

use crate::domain::indicator::{IndicatorSeries, IndicatorType, rolling_std};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// `returns[0]` is expected to be the 0.0 placeholder for the first bar and
/// counts as an observation, matching how the return series is built.
pub fn realized_volatility(returns: &[f64], window: usize, min_periods: usize) -> IndicatorSeries {
    let annualize = TRADING_DAYS_PER_YEAR.sqrt();
    let values = rolling_std(returns, window, min_periods)
        .into_iter()
        .map(|v| v.map(|s| s * annualize))
        .collect();
    IndicatorSeries::new(IndicatorType::RealizedVolatility(window), values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_window_warmup() {
        let returns = [0.0, 0.01, -0.01, 0.02, 0.0];
        let vol = realized_volatility(&returns, 3, 3);
        assert_eq!(vol.warmup(), 2);
    }

    #[test]
    fn min_periods_two_defines_second_bar() {
        let returns = [0.0, 0.02, -0.01];
        let vol = realized_volatility(&returns, 20, 2);
        assert!(vol.get(0).is_none());
        // std of [0, 0.02] = 0.01
        let expected = 0.01 * 252f64.sqrt();
        assert!((vol.get(1).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn constant_returns_have_zero_vol() {
        let vol = realized_volatility(&[0.01; 10], 5, 5);
        assert!(vol.get(9).unwrap().abs() < 1e-15);
    }
}
