//! RSI (Relative Strength Index) momentum oscillator.
//!
//! Average gain/loss are simple means over the trailing n price changes.
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0 and avg_gain > 0: RSI = 100
//! If both are 0: RSI = 50 (no movement)
//!
//! Warmup: first n bars are undefined (need n price changes).

use crate::domain::indicator::{IndicatorSeries, IndicatorType};

pub fn calculate_rsi(closes: &[f64], period: usize) -> IndicatorSeries {
    let mut values = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return IndicatorSeries::new(IndicatorType::Rsi(period), values);
    }

    // change[i] is the move into bar i; change[0] does not exist.
    let mut gains = vec![0.0; closes.len()];
    let mut losses = vec![0.0; closes.len()];
    for i in 1..closes.len() {
        let change = closes[i] - closes[i - 1];
        gains[i] = change.max(0.0);
        losses[i] = (-change).max(0.0);
    }

    for i in period..closes.len() {
        let start = i + 1 - period;
        let avg_gain = gains[start..=i].iter().sum::<f64>() / period as f64;
        let avg_loss = losses[start..=i].iter().sum::<f64>() / period as f64;

        let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
            50.0
        } else if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
        };
        values[i] = Some(rsi);
    }

    IndicatorSeries::new(IndicatorType::Rsi(period), values)
}
