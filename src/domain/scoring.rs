//! Composite score and entry/hold threshold policy.
//!
//! The score adds a trend component (fast average above slow average) to
//! three confirmations (price near/below the band midline, momentum above
//! its neutral level, positive MACD histogram) and, in extended mode, a
//! bullish pattern. An undefined confirmation counts as false.
//!
//! Thresholds come from a [`ThresholdPolicy`] picked once at configuration
//! time. Every policy yields `hold <= entry` on every bar.

use tracing::warn;

use super::error::PipelineError;
use super::regime::Regime;

/// Highest score either mode can produce.
pub const MAX_SCORE: u8 = 5;
pub const MAIN_N_FACTORS: u8 = 4;
pub const EXTENDED_N_FACTORS: u8 = 5;
pub const MAIN_ENTRY: u8 = 4;
pub const MAIN_HOLD: u8 = 2;
pub const DEFAULT_BEAR_PENALTY: u8 = 1;
pub const DEFAULT_HYSTERESIS_BUFFER: u8 = 1;
pub const DEFAULT_EXIT_FLOOR: f64 = 1.0;
/// Baseline used when the training window yields no usable volatility.
pub const FALLBACK_BASELINE_VOL: f64 = 0.2;

/// Volatility-scaled entry requirement.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveThreshold {
    pub base_threshold: f64,
    pub sensitivity: f64,
    pub min_mult: f64,
    pub max_mult: f64,
    pub min_required: f64,
    pub use_tanh: bool,
    /// Median realized volatility fitted once on the training window.
    pub baseline_vol: f64,
}

impl Default for AdaptiveThreshold {
    fn default() -> Self {
        AdaptiveThreshold {
            base_threshold: 2.8,
            sensitivity: 0.4,
            min_mult: 0.85,
            max_mult: 1.20,
            min_required: 2.0,
            use_tanh: true,
            baseline_vol: FALLBACK_BASELINE_VOL,
        }
    }
}

impl AdaptiveThreshold {
    /// Effective (unrounded) entry threshold for one bar.
    pub fn effective(&self, vol: Option<f64>, n_factors: u8) -> f64 {
        let ceiling = n_factors as f64;
        let baseline_ok = self.baseline_vol.is_finite() && self.baseline_vol > 0.0;
        match vol {
            Some(v) if v.is_finite() && baseline_ok => {
                let mut norm = v / self.baseline_vol - 1.0;
                if self.use_tanh {
                    norm = norm.tanh();
                }
                let mult = (1.0 + self.sensitivity * norm).clamp(self.min_mult, self.max_mult);
                (self.base_threshold * mult).clamp(self.min_required, ceiling)
            }
            _ => self.base_threshold.clamp(self.min_required, ceiling),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdPolicy {
    /// Fixed integer thresholds, no patterns.
    Main { entry: u8, hold: u8 },
    /// Volatility-adaptive entry, pattern factor enabled.
    Extended {
        adaptive: AdaptiveThreshold,
        n_factors: u8,
        bear_penalty: u8,
        hysteresis_buffer: u8,
        exit_floor: f64,
    },
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        ThresholdPolicy::Main {
            entry: MAIN_ENTRY,
            hold: MAIN_HOLD,
        }
    }
}

/// Thresholds in force on one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub entry: u8,
    pub hold: u8,
    /// Unrounded adaptive threshold; `None` under the fixed policy.
    pub effective: Option<f64>,
}

impl ThresholdPolicy {
    pub fn extended(adaptive: AdaptiveThreshold) -> Self {
        ThresholdPolicy::Extended {
            adaptive,
            n_factors: EXTENDED_N_FACTORS,
            bear_penalty: DEFAULT_BEAR_PENALTY,
            hysteresis_buffer: DEFAULT_HYSTERESIS_BUFFER,
            exit_floor: DEFAULT_EXIT_FLOOR,
        }
    }

    pub fn is_extended(&self) -> bool {
        matches!(self, ThresholdPolicy::Extended { .. })
    }

    pub fn n_factors(&self) -> u8 {
        match self {
            ThresholdPolicy::Main { .. } => MAIN_N_FACTORS,
            ThresholdPolicy::Extended { n_factors, .. } => *n_factors,
        }
    }

    /// Points awarded when the fast average is above the slow one.
    pub fn trend_points(&self) -> u8 {
        match self {
            ThresholdPolicy::Main { .. } => 2,
            ThresholdPolicy::Extended { .. } => 1,
        }
    }

    pub fn max_score(&self) -> u8 {
        let pattern = if self.is_extended() { 1 } else { 0 };
        self.trend_points() + 3 + pattern
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        match self {
            ThresholdPolicy::Main { entry, hold } => {
                if hold > entry {
                    return Err(PipelineError::configuration(
                        "hold_score",
                        format!("hold ({hold}) must not exceed entry ({entry})"),
                    ));
                }
                if *entry > self.max_score() {
                    return Err(PipelineError::configuration(
                        "entry_score",
                        format!("entry ({entry}) exceeds the maximum score {}", self.max_score()),
                    ));
                }
            }
            ThresholdPolicy::Extended {
                adaptive,
                n_factors,
                exit_floor,
                ..
            } => {
                if *n_factors == 0 || *n_factors > MAX_SCORE {
                    return Err(PipelineError::configuration(
                        "n_factors",
                        format!("must be within 1..={MAX_SCORE}"),
                    ));
                }
                let numeric = [
                    ("base_threshold", adaptive.base_threshold),
                    ("sensitivity", adaptive.sensitivity),
                    ("min_mult", adaptive.min_mult),
                    ("max_mult", adaptive.max_mult),
                    ("min_required", adaptive.min_required),
                    ("exit_floor", *exit_floor),
                ];
                if let Some((name, value)) = numeric.iter().find(|(_, v)| !v.is_finite()) {
                    return Err(PipelineError::configuration(
                        *name,
                        format!("must be a finite number, got {value}"),
                    ));
                }
                if adaptive.min_mult <= 0.0 || adaptive.min_mult > adaptive.max_mult {
                    return Err(PipelineError::configuration(
                        "min_mult",
                        "multiplier range must satisfy 0 < min_mult <= max_mult",
                    ));
                }
                if adaptive.min_required > *n_factors as f64 {
                    return Err(PipelineError::configuration(
                        "min_required",
                        format!("must not exceed n_factors ({n_factors})"),
                    ));
                }
                if adaptive.sensitivity < 0.0 || *exit_floor < 0.0 {
                    return Err(PipelineError::configuration(
                        "sensitivity",
                        "sensitivity and exit floor must be non-negative",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Entry/hold thresholds for one bar given its realized volatility and regime.
    pub fn thresholds(&self, vol: Option<f64>, regime: Regime) -> Thresholds {
        match self {
            ThresholdPolicy::Main { entry, hold } => Thresholds {
                entry: *entry,
                hold: (*hold).min(*entry),
                effective: None,
            },
            ThresholdPolicy::Extended {
                adaptive,
                n_factors,
                bear_penalty,
                hysteresis_buffer,
                exit_floor,
            } => {
                let max = self.max_score() as i32;
                let effective = adaptive.effective(vol, *n_factors);

                let mut entry = effective.ceil() as i32;
                if regime == Regime::Bear {
                    entry += *bear_penalty as i32;
                }
                let entry = entry.clamp(1, max);

                let floor = (exit_floor.ceil() as i32).clamp(1, max);
                let hold = floor
                    .max(entry - *hysteresis_buffer as i32)
                    .clamp(1, max)
                    .min(entry);

                Thresholds {
                    entry: entry as u8,
                    hold: hold as u8,
                    effective: Some(effective),
                }
            }
        }
    }
}

/// How raw indicator values are turned into confirmations.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationRules {
    /// Close must be below `bb_mid * (1 + pullback_tolerance)`.
    pub pullback_tolerance: f64,
    /// Momentum oscillator level above which strength confirms.
    pub rsi_neutral: f64,
}

impl Default for ConfirmationRules {
    fn default() -> Self {
        ConfirmationRules {
            pullback_tolerance: 0.01,
            rsi_neutral: 45.0,
        }
    }
}

/// Per-bar inputs to the scorer, all index-aligned.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs<'a> {
    pub closes: &'a [f64],
    pub ema_fast: &'a [Option<f64>],
    pub ema_slow: &'a [Option<f64>],
    pub bb_mid: &'a [Option<f64>],
    pub rsi: &'a [Option<f64>],
    pub macd_hist: &'a [Option<f64>],
    pub pattern_bull: &'a [bool],
    pub volatility: &'a [Option<f64>],
    pub regimes: &'a [Regime],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalScore {
    pub score: u8,
    pub confirm_count: u8,
    pub trend_up: bool,
    pub thresholds: Thresholds,
}

pub fn score_bars(
    inputs: &ScoreInputs<'_>,
    policy: &ThresholdPolicy,
    rules: &ConfirmationRules,
) -> Vec<SignalScore> {
    let at = |s: &[Option<f64>], i: usize| s.get(i).copied().flatten();

    (0..inputs.closes.len())
        .map(|i| {
            let close = inputs.closes[i];
            let trend_up = matches!(
                (at(inputs.ema_fast, i), at(inputs.ema_slow, i)),
                (Some(f), Some(s)) if f > s
            );
            let pullback_ok = at(inputs.bb_mid, i)
                .is_some_and(|mid| close < mid * (1.0 + rules.pullback_tolerance));
            let strength_ok = at(inputs.rsi, i).is_some_and(|r| r > rules.rsi_neutral);
            let macd_ok = at(inputs.macd_hist, i).is_some_and(|h| h > 0.0);
            let confirm_count = pullback_ok as u8 + strength_ok as u8 + macd_ok as u8;

            let mut score = confirm_count;
            if trend_up {
                score += policy.trend_points();
            }
            if policy.is_extended() && inputs.pattern_bull.get(i).copied().unwrap_or(false) {
                score += 1;
            }

            let regime = inputs.regimes.get(i).copied().unwrap_or_default();
            SignalScore {
                score,
                confirm_count,
                trend_up,
                thresholds: policy.thresholds(at(inputs.volatility, i), regime),
            }
        })
        .collect()
}

/// Median of strictly positive, finite volatility values.
///
/// Fitted once on the training window; never refit per bar.
pub fn fit_baseline_volatility(volatility: &[Option<f64>]) -> f64 {
    let mut values: Vec<f64> = volatility
        .iter()
        .flatten()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();
    if values.is_empty() {
        warn!(
            fallback = FALLBACK_BASELINE_VOL,
            "no usable volatility in training window, using fallback baseline"
        );
        return FALLBACK_BASELINE_VOL;
    }
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}
