//! Technical indicator implementations.
//!
//! Every indicator is a pure function of its input slice and returns a new
//! series index-aligned 1:1 with it. Warm-up bars of windowed indicators are
//! `None`; consumers decide their own fill policy (the scorer treats an
//! undefined confirmation as false).
//!
//! - `IndicatorType`: indicator identity + parameters
//! - `IndicatorSeries`: a per-bar series of optional values

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod pattern;
pub mod rsi;
pub mod sma;
pub mod volatility;
pub mod volume;

pub use bollinger::{BollingerBands, calculate_bollinger};
pub use ema::calculate_ema;
pub use macd::{MacdSeries, calculate_macd};
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;
pub use volatility::realized_volatility;
pub use volume::relative_volume;

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    RelativeVolume(usize),
    RealizedVolatility(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<Option<f64>>,
}

impl IndicatorSeries {
    pub fn new(indicator_type: IndicatorType, values: Vec<Option<f64>>) -> Self {
        Self {
            indicator_type,
            values,
        }
    }

    /// Value at bar `i`, `None` during warm-up or past the end.
    pub fn get(&self, i: usize) -> Option<f64> {
        self.values.get(i).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of leading undefined bars.
    pub fn warmup(&self) -> usize {
        self.values.iter().take_while(|v| v.is_none()).count()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(span) => write!(f, "EMA({})", span),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::RelativeVolume(period) => write!(f, "RELVOL({})", period),
            IndicatorType::RealizedVolatility(period) => write!(f, "RVOL({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({},{})", period, mult)
            }
        }
    }
}

/// Mean over the trailing `window` values, defined once `min_periods` of them exist.
pub(crate) fn rolling_mean(values: &[f64], window: usize, min_periods: usize) -> Vec<Option<f64>> {
    rolling(values, window, min_periods, |w| {
        w.iter().sum::<f64>() / w.len() as f64
    })
}

/// Population (ddof = 0) standard deviation over the trailing `window` values.
pub(crate) fn rolling_std(values: &[f64], window: usize, min_periods: usize) -> Vec<Option<f64>> {
    rolling(values, window, min_periods, |w| {
        let n = w.len() as f64;
        let mean = w.iter().sum::<f64>() / n;
        let variance = w.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        variance.sqrt()
    })
}

fn rolling<F>(values: &[f64], window: usize, min_periods: usize, f: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    if window == 0 {
        return vec![None; values.len()];
    }
    let min_periods = min_periods.clamp(1, window);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            if slice.len() >= min_periods {
                Some(f(slice))
            } else {
                None
            }
        })
        .collect()
}
