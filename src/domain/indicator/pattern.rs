//! Candlestick / price-action pattern detectors.
//!
//! Each detector returns one `PatternSignal` per bar. The first bar (and the
//! Donchian warm-up) is always `Neutral`.

use crate::domain::ohlcv::PriceBar;

/// Wick must be at least this multiple of the body for a reversal candle.
pub const WICK_RATIO: f64 = 2.0;
const MIN_BODY: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatternSignal {
    Bearish,
    #[default]
    Neutral,
    Bullish,
}

impl PatternSignal {
    pub fn as_i8(self) -> i8 {
        match self {
            PatternSignal::Bearish => -1,
            PatternSignal::Neutral => 0,
            PatternSignal::Bullish => 1,
        }
    }
}

/// Two-candle engulfing.
///
/// Bullish: previous red, current green, current body covers the previous one.
/// Bearish: previous green, current red, current body covers the previous one.
pub fn engulfing(bars: &[PriceBar]) -> Vec<PatternSignal> {
    let mut out = vec![PatternSignal::Neutral; bars.len()];
    for i in 1..bars.len() {
        let prev = &bars[i - 1];
        let cur = &bars[i];
        if prev.is_red() && cur.is_green() && cur.close >= prev.open && cur.open <= prev.close {
            out[i] = PatternSignal::Bullish;
        }
        if prev.is_green() && cur.is_red() && cur.open >= prev.close && cur.close <= prev.open {
            out[i] = PatternSignal::Bearish;
        }
    }
    out
}

/// Hammer (long lower wick) / shooting star (long upper wick).
pub fn hammer_shooting_star(bars: &[PriceBar]) -> Vec<PatternSignal> {
    bars.iter()
        .map(|bar| {
            let body = bar.body().max(MIN_BODY);
            let lower = bar.lower_wick();
            let upper = bar.upper_wick();
            if upper >= WICK_RATIO * body && lower <= 0.5 * body {
                PatternSignal::Bearish
            } else if lower >= WICK_RATIO * body && upper <= 0.5 * body {
                PatternSignal::Bullish
            } else {
                PatternSignal::Neutral
            }
        })
        .collect()
}

/// Close breaking out of the previous `window` bars' high/low channel.
///
/// The channel for bar i is built from bars i-window..i-1 only.
pub fn donchian_breakout(bars: &[PriceBar], window: usize) -> Vec<PatternSignal> {
    let mut out = vec![PatternSignal::Neutral; bars.len()];
    if window == 0 {
        return out;
    }
    for i in window..bars.len() {
        let channel = &bars[i - window..i];
        let upper = channel
            .iter()
            .map(|b| b.high)
            .fold(f64::NEG_INFINITY, f64::max);
        let lower = channel.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let close = bars[i].close;
        if close < lower {
            out[i] = PatternSignal::Bearish;
        } else if close > upper {
            out[i] = PatternSignal::Bullish;
        }
    }
    out
}
