//! Bollinger Bands indicator.
//!
//! Bollinger Bands consist of:
//! - Middle: Simple Moving Average (SMA) over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! Where StdDev is population standard deviation (divides by N, not N-1).
//!
//! Default parameters: period=20, multiplier=2.0
//! Warmup: first (period-1) bars are undefined.

use crate::domain::indicator::{IndicatorSeries, IndicatorType, rolling_mean, rolling_std};

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_MULT: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<Option<f64>>,
    pub middle: IndicatorSeries,
    pub lower: Vec<Option<f64>>,
}

pub fn calculate_bollinger(closes: &[f64], period: usize, mult: f64) -> BollingerBands {
    let middle = rolling_mean(closes, period, period);
    let stddev = rolling_std(closes, period, period);

    let band = |sign: f64| -> Vec<Option<f64>> {
        middle
            .iter()
            .zip(&stddev)
            .map(|(m, s)| match (m, s) {
                (Some(m), Some(s)) => Some(m + sign * mult * s),
                _ => None,
            })
            .collect()
    };
    let upper = band(1.0);
    let lower = band(-1.0);

    BollingerBands {
        upper,
        middle: IndicatorSeries::new(
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100: (mult * 100.0).round() as u32,
            },
            middle,
        ),
        lower,
    }
}
