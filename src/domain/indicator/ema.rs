//! Exponential Moving Average indicator.
//!
//! a = 2/(span+1), EMA[0] = x[0], then EMA[i] = x[i]*a + EMA[i-1]*(1-a).
//! Recursive from the first value, so every bar is defined.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};

pub fn calculate_ema(values: &[f64], span: usize) -> IndicatorSeries {
    IndicatorSeries::new(
        IndicatorType::Ema(span),
        ema_values(values, span).into_iter().map(Some).collect(),
    )
}

/// Raw EMA values; empty for `span == 0`.
pub(crate) fn ema_values(values: &[f64], span: usize) -> Vec<f64> {
    if span == 0 || values.is_empty() {
        return Vec::new();
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut ema = values[0];
    out.push(ema);
    for &x in &values[1..] {
        ema = x * alpha + ema * (1.0 - alpha);
        out.push(ema);
    }
    out
}
