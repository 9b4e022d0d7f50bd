//! Three-state trend regime from price against a buffered long average.

pub const DEFAULT_BUFFER: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Regime {
    Bull,
    #[default]
    Neutral,
    Bear,
}

impl Regime {
    /// Bull if close > avg·(1+buffer), Bear if close < avg·(1−buffer), else Neutral.
    pub fn classify(close: f64, average: f64, buffer: f64) -> Regime {
        if close > average * (1.0 + buffer) {
            Regime::Bull
        } else if close < average * (1.0 - buffer) {
            Regime::Bear
        } else {
            Regime::Neutral
        }
    }

    pub fn as_i8(self) -> i8 {
        match self {
            Regime::Bull => 1,
            Regime::Neutral => 0,
            Regime::Bear => -1,
        }
    }
}

/// Per-bar regime. Bars whose average is undefined are Neutral.
pub fn classify_regimes(closes: &[f64], average: &[Option<f64>], buffer: f64) -> Vec<Regime> {
    closes
        .iter()
        .zip(average)
        .map(|(&close, avg)| match avg {
            Some(avg) => Regime::classify(close, *avg, buffer),
            None => Regime::Neutral,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_outside_buffer() {
        assert_eq!(Regime::classify(102.0, 100.0, 0.01), Regime::Bull);
        assert_eq!(Regime::classify(98.0, 100.0, 0.01), Regime::Bear);
    }

    #[test]
    fn classify_inside_buffer_is_neutral() {
        assert_eq!(Regime::classify(100.5, 100.0, 0.01), Regime::Neutral);
        assert_eq!(Regime::classify(99.5, 100.0, 0.01), Regime::Neutral);
        assert_eq!(Regime::classify(101.0, 100.0, 0.01), Regime::Neutral);
    }

    #[test]
    fn buffer_prevents_thrashing() {
        let closes = [100.4, 99.7, 100.6, 99.5];
        let avg = [Some(100.0); 4];
        let regimes = classify_regimes(&closes, &avg, 0.01);
        assert!(regimes.iter().all(|r| *r == Regime::Neutral));

        let unbuffered = classify_regimes(&closes, &avg, 0.0);
        assert_eq!(
            unbuffered,
            vec![Regime::Bull, Regime::Bear, Regime::Bull, Regime::Bear]
        );
    }

    #[test]
    fn undefined_average_is_neutral() {
        assert_eq!(classify_regimes(&[5.0], &[None], 0.01), vec![Regime::Neutral]);
    }
}
