//! Base target exposure from (decision, regime, score).

use super::regime::Regime;
use super::state_machine::Decision;

pub const BULL_EXPOSURE: f64 = 1.0;
pub const NEUTRAL_EXPOSURE: f64 = 0.5;
pub const BEAR_EXPOSURE: f64 = 0.25;

/// Table lookup. A Bear bar only gets exposure at the maximum score.
pub fn base_exposure(decision: Decision, regime: Regime, score: u8, max_score: u8) -> f64 {
    match (decision, regime) {
        (Decision::Long, Regime::Bull) => BULL_EXPOSURE,
        (Decision::Long, Regime::Neutral) => NEUTRAL_EXPOSURE,
        (Decision::Long, Regime::Bear) if score == max_score => BEAR_EXPOSURE,
        _ => 0.0,
    }
}

pub fn base_exposures(
    decisions: &[Decision],
    regimes: &[Regime],
    scores: &[u8],
    max_score: u8,
) -> Vec<f64> {
    decisions
        .iter()
        .zip(regimes)
        .zip(scores)
        .map(|((d, r), s)| base_exposure(*d, *r, *s, max_score))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_mapping_by_regime() {
        assert_eq!(base_exposure(Decision::Long, Regime::Bull, 3, 5), 1.0);
        assert_eq!(base_exposure(Decision::Long, Regime::Neutral, 3, 5), 0.5);
        assert_eq!(base_exposure(Decision::Long, Regime::Bear, 5, 5), 0.25);
    }

    #[test]
    fn bear_below_max_is_zero() {
        for score in 0..5 {
            assert_eq!(base_exposure(Decision::Long, Regime::Bear, score, 5), 0.0);
            assert_eq!(base_exposure(Decision::Flat, Regime::Bear, score, 5), 0.0);
        }
    }

    #[test]
    fn flat_is_always_zero() {
        for regime in [Regime::Bull, Regime::Neutral, Regime::Bear] {
            assert_eq!(base_exposure(Decision::Flat, regime, 5, 5), 0.0);
        }
    }

    #[test]
    fn vectorised_lookup() {
        let out = base_exposures(
            &[Decision::Long, Decision::Long, Decision::Flat],
            &[Regime::Bull, Regime::Bear, Regime::Bull],
            &[4, 4, 5],
            5,
        );
        assert_eq!(out, vec![1.0, 0.0, 0.0]);
    }
}
