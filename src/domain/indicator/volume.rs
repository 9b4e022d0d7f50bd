//! Relative volume = volume / SMA(volume, n).
//!
//! Non-finite volumes count as zero. A zero average gives an undefined value
//! rather than infinity. Warmup: first (n-1) bars are undefined.

use crate::domain::indicator::{IndicatorSeries, IndicatorType, rolling_mean};

pub fn relative_volume(volumes: &[f64], period: usize) -> IndicatorSeries {
    let clean: Vec<f64> = volumes
        .iter()
        .map(|v| if v.is_finite() { *v } else { 0.0 })
        .collect();
    let avg = rolling_mean(&clean, period, period);

    let values = clean
        .iter()
        .zip(avg)
        .map(|(v, a)| match a {
            Some(a) if a != 0.0 => Some(v / a),
            _ => None,
        })
        .collect();

    IndicatorSeries::new(IndicatorType::RelativeVolume(period), values)
}
