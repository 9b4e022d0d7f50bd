//! Simple Moving Average. Warmup: first (n-1) bars are undefined.

use crate::domain::indicator::{IndicatorSeries, IndicatorType, rolling_mean};

pub fn calculate_sma(values: &[f64], period: usize) -> IndicatorSeries {
    IndicatorSeries::new(
        IndicatorType::Sma(period),
        rolling_mean(values, period, period),
    )
}
