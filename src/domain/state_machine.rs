//! Entry/hold hysteresis state machine.
//!
//! Produces the decision-time long/flat series. No execution delay is
//! applied here; the backtest engine owns the one-bar shift.

use super::scoring::SignalScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Decision {
    #[default]
    Flat,
    Long,
}

impl Decision {
    pub fn is_long(self) -> bool {
        self == Decision::Long
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Decision::Flat => 0.0,
            Decision::Long => 1.0,
        }
    }
}

/// Everything the machine looks at on one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarInput {
    pub score: u8,
    pub entry: u8,
    pub hold: u8,
    /// Volume gate; `true` when confirmation is disabled.
    pub volume_ok: bool,
    /// Bearish reversal pattern (extended mode only; `false` otherwise).
    pub force_exit: bool,
}

impl BarInput {
    pub fn from_score(score: &SignalScore, volume_ok: bool, force_exit: bool) -> Self {
        BarInput {
            score: score.score,
            entry: score.thresholds.entry,
            hold: score.thresholds.hold,
            volume_ok,
            force_exit,
        }
    }
}

/// One transition given the state carried from the previous bar.
pub fn step(state: Decision, bar: &BarInput) -> Decision {
    match state {
        Decision::Flat if bar.score >= bar.entry && bar.volume_ok => Decision::Long,
        Decision::Flat => Decision::Flat,
        Decision::Long if bar.force_exit => Decision::Flat,
        Decision::Long if bar.score >= bar.hold => Decision::Long,
        Decision::Long => Decision::Flat,
    }
}

/// Left fold over the bars starting from `Flat`.
pub fn run_state_machine(bars: &[BarInput]) -> Vec<Decision> {
    let mut out = Vec::with_capacity(bars.len());
    bars.iter().fold(Decision::Flat, |state, bar| {
        let next = step(state, bar);
        out.push(next);
        next
    });
    out
}
