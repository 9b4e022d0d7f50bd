//! MACD (Moving Average Convergence Divergence) indicator.
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9.
//! All three EMAs are recursive from the first bar, so every bar is defined.

use crate::domain::error::PipelineError;
use crate::domain::indicator::ema::ema_values;
use crate::domain::indicator::{IndicatorSeries, IndicatorType};

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: IndicatorSeries,
}

pub fn calculate_macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Result<MacdSeries, PipelineError> {
    if fast == 0 || slow == 0 || signal_period == 0 {
        return Err(PipelineError::configuration(
            "macd",
            format!("windows must be >= 1, got ({fast},{slow},{signal_period})"),
        ));
    }
    if fast >= slow {
        return Err(PipelineError::configuration(
            "macd",
            format!("fast window ({fast}) must be below slow window ({slow})"),
        ));
    }

    let ema_fast = ema_values(closes, fast);
    let ema_slow = ema_values(closes, slow);
    let line: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();
    let signal = ema_values(&line, signal_period);
    let histogram = line
        .iter()
        .zip(&signal)
        .map(|(l, s)| Some(l - s))
        .collect();

    Ok(MacdSeries {
        line,
        signal,
        histogram: IndicatorSeries::new(
            IndicatorType::Macd {
                fast,
                slow,
                signal: signal_period,
            },
            histogram,
        ),
    })
}

pub fn calculate_macd_default(closes: &[f64]) -> Result<MacdSeries, PipelineError> {
    calculate_macd(closes, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
}
