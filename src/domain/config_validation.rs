//! Typed configuration from a [`ConfigPort`].
//!
//! Malformed values are `ConfigInvalid`, absent required keys are
//! `ConfigMissing`, and parameter relationships (fast vs slow spans, window
//! sizes, cost sign) are checked by the domain types themselves and surface
//! as `Configuration`.

use std::str::FromStr;

use crate::domain::backtest::BacktestConfig;
use crate::domain::error::PipelineError;
use crate::domain::metrics::DEFAULT_MIN_SHARPE_LEN;
use crate::domain::pipeline::{PipelineConfig, SignalParams, VolumeConfirmation};
use crate::domain::risk::{LeverageOverlay, Rating, RiskConfig};
use crate::domain::scoring::{
    AdaptiveThreshold, DEFAULT_BEAR_PENALTY, DEFAULT_EXIT_FLOOR, DEFAULT_HYSTERESIS_BUFFER,
    EXTENDED_N_FACTORS, FALLBACK_BASELINE_VOL, MAIN_ENTRY, MAIN_HOLD, ThresholdPolicy,
};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

/// Everything a run needs besides the price data.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub pipeline: PipelineConfig,
    /// `(train_end, val_end)` when a chronological split is configured.
    pub split: Option<(NaiveDate, NaiveDate)>,
    pub min_validation_bars: usize,
    /// Fixed adaptive baseline; fitted on the training window when `None`.
    pub baseline_vol: Option<f64>,
}

fn parsed<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, PipelineError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| PipelineError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("cannot parse '{s}'"),
            }),
    }
}

fn parsed_or<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, PipelineError> {
    Ok(parsed(config, section, key)?.unwrap_or(default))
}

pub fn load_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, PipelineError> {
    let defaults = BacktestConfig::default();
    let initial_capital = parsed_or(config, "backtest", "initial_capital", defaults.initial_capital)?;
    let backtest = BacktestConfig {
        initial_capital,
        cost_rate: parsed_or(config, "backtest", "trading_cost", defaults.cost_rate)?,
    };
    backtest.validate()?;
    Ok(backtest)
}

fn load_policy(config: &dyn ConfigPort) -> Result<ThresholdPolicy, PipelineError> {
    let mode = config
        .get_string("signals", "mode")
        .unwrap_or_else(|| "main".to_string());
    match mode.trim().to_ascii_lowercase().as_str() {
        "main" => Ok(ThresholdPolicy::Main {
            entry: parsed_or(config, "signals", "entry_score", MAIN_ENTRY)?,
            hold: parsed_or(config, "signals", "hold_score", MAIN_HOLD)?,
        }),
        "extended" => {
            let d = AdaptiveThreshold::default();
            let adaptive = AdaptiveThreshold {
                base_threshold: parsed_or(config, "adaptive", "base_threshold", d.base_threshold)?,
                sensitivity: parsed_or(config, "adaptive", "sensitivity", d.sensitivity)?,
                min_mult: parsed_or(config, "adaptive", "min_mult", d.min_mult)?,
                max_mult: parsed_or(config, "adaptive", "max_mult", d.max_mult)?,
                min_required: parsed_or(config, "adaptive", "min_required", d.min_required)?,
                use_tanh: config.get_bool("adaptive", "use_tanh", d.use_tanh),
                baseline_vol: parsed_or(config, "adaptive", "baseline_vol", FALLBACK_BASELINE_VOL)?,
            };
            Ok(ThresholdPolicy::Extended {
                adaptive,
                n_factors: EXTENDED_N_FACTORS,
                bear_penalty: parsed_or(config, "adaptive", "bear_penalty", DEFAULT_BEAR_PENALTY)?,
                hysteresis_buffer: parsed_or(
                    config,
                    "adaptive",
                    "hysteresis_buffer",
                    DEFAULT_HYSTERESIS_BUFFER,
                )?,
                exit_floor: parsed_or(config, "adaptive", "exit_floor", DEFAULT_EXIT_FLOOR)?,
            })
        }
        other => Err(PipelineError::ConfigInvalid {
            section: "signals".to_string(),
            key: "mode".to_string(),
            reason: format!("unknown mode '{other}', expected main or extended"),
        }),
    }
}

pub fn load_signal_params(config: &dyn ConfigPort) -> Result<SignalParams, PipelineError> {
    let d = SignalParams::default();
    let volume = if config.get_bool("signals", "volume_confirm", false) {
        let v = VolumeConfirmation::default();
        Some(VolumeConfirmation {
            window: parsed_or(config, "signals", "volume_window", v.window)?,
            min_ratio: parsed_or(config, "signals", "volume_min_ratio", v.min_ratio)?,
        })
    } else {
        None
    };
    let params = SignalParams {
        ema_fast: parsed_or(config, "signals", "ema_fast", d.ema_fast)?,
        ema_slow: parsed_or(config, "signals", "ema_slow", d.ema_slow)?,
        regime_buffer: parsed_or(config, "signals", "regime_buffer", d.regime_buffer)?,
        rsi_window: parsed_or(config, "signals", "rsi_window", d.rsi_window)?,
        rsi_neutral: parsed_or(config, "signals", "rsi_neutral", d.rsi_neutral)?,
        bb_window: parsed_or(config, "signals", "bb_window", d.bb_window)?,
        bb_nstd: parsed_or(config, "signals", "bb_nstd", d.bb_nstd)?,
        pullback_tolerance: parsed_or(config, "signals", "pullback_tolerance", d.pullback_tolerance)?,
        macd_fast: parsed_or(config, "signals", "macd_fast", d.macd_fast)?,
        macd_slow: parsed_or(config, "signals", "macd_slow", d.macd_slow)?,
        macd_signal: parsed_or(config, "signals", "macd_signal", d.macd_signal)?,
        vol_window: parsed_or(config, "signals", "vol_window", d.vol_window)?,
        volume,
        donchian_window: parsed_or(config, "signals", "donchian_window", d.donchian_window)?,
        policy: load_policy(config)?,
    };
    params.validate()?;
    Ok(params)
}

pub fn load_risk_config(config: &dyn ConfigPort) -> Result<RiskConfig, PipelineError> {
    let d = RiskConfig::default();
    let risk = RiskConfig {
        target_vol: parsed_or(config, "risk", "target_vol", d.target_vol)?,
        vol_window: parsed_or(config, "risk", "vol_window", d.vol_window)?,
        vol_floor: parsed_or(config, "risk", "vol_floor", d.vol_floor)?,
        base_cap: parsed_or(config, "risk", "base_cap", d.base_cap)?,
        bear_cap_mult: parsed_or(config, "risk", "bear_cap_mult", d.bear_cap_mult)?,
    };
    risk.validate()?;
    Ok(risk)
}

pub fn load_overlay(config: &dyn ConfigPort) -> Result<Option<LeverageOverlay>, PipelineError> {
    let rating = match config.get_string("overlay", "rating") {
        Some(r) if !r.trim().is_empty() => r.parse::<Rating>()?,
        _ => return Ok(None),
    };
    let effective_date =
        config
            .get_date("overlay", "effective_date")?
            .ok_or_else(|| PipelineError::ConfigMissing {
                section: "overlay".to_string(),
                key: "effective_date".to_string(),
            })?;
    let sell_multiplier = parsed_or(
        config,
        "overlay",
        "sell_multiplier",
        LeverageOverlay::DEFAULT_SELL_MULTIPLIER,
    )?;
    if !(sell_multiplier > 0.0 && sell_multiplier <= 1.0) {
        return Err(PipelineError::configuration(
            "sell_multiplier",
            format!("must be within (0, 1], got {sell_multiplier}"),
        ));
    }
    Ok(Some(LeverageOverlay {
        rating,
        effective_date,
        sell_multiplier,
    }))
}

fn load_split(config: &dyn ConfigPort) -> Result<Option<(NaiveDate, NaiveDate)>, PipelineError> {
    let train_end = config.get_date("backtest", "train_end")?;
    let val_end = config.get_date("backtest", "val_end")?;
    match (train_end, val_end) {
        (None, None) => Ok(None),
        (Some(t), Some(v)) if v > t => Ok(Some((t, v))),
        (Some(_), Some(_)) => Err(PipelineError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "val_end".to_string(),
            reason: "val_end must be after train_end".to_string(),
        }),
        (Some(_), None) => Err(PipelineError::ConfigMissing {
            section: "backtest".to_string(),
            key: "val_end".to_string(),
        }),
        (None, Some(_)) => Err(PipelineError::ConfigMissing {
            section: "backtest".to_string(),
            key: "train_end".to_string(),
        }),
    }
}

pub fn load_run_settings(config: &dyn ConfigPort) -> Result<RunSettings, PipelineError> {
    let pipeline = PipelineConfig {
        signals: load_signal_params(config)?,
        risk: load_risk_config(config)?,
        backtest: load_backtest_config(config)?,
        overlay: load_overlay(config)?,
        risk_free_rate: parsed_or(config, "backtest", "risk_free_rate", 0.0)?,
    };
    let baseline_vol = parsed::<f64>(config, "adaptive", "baseline_vol")?;
    if let Some(b) = baseline_vol {
        if !(b > 0.0) {
            return Err(PipelineError::configuration(
                "baseline_vol",
                format!("must be positive, got {b}"),
            ));
        }
    }
    Ok(RunSettings {
        pipeline,
        split: load_split(config)?,
        min_validation_bars: parsed_or(
            config,
            "backtest",
            "min_validation_bars",
            DEFAULT_MIN_SHARPE_LEN,
        )?,
        baseline_vol,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MockConfig {
        values: HashMap<(String, String), String>,
    }

    impl MockConfig {
        fn new(pairs: &[(&str, &str, &str)]) -> Self {
            let values = pairs
                .iter()
                .map(|(s, k, v)| ((s.to_string(), k.to_string()), v.to_string()))
                .collect();
            Self { values }
        }
    }

    impl ConfigPort for MockConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            self.values
                .get(&(section.to_string(), key.to_string()))
                .cloned()
        }

        fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
            self.get_string(section, key)
                .map(|v| v == "true")
                .unwrap_or(default)
        }
    }

    #[test]
    fn empty_config_uses_defaults() {
        let settings = load_run_settings(&MockConfig::new(&[])).unwrap();
        assert_eq!(settings.pipeline.signals, SignalParams::default());
        assert_eq!(settings.pipeline.risk, RiskConfig::default());
        assert_eq!(settings.pipeline.backtest, BacktestConfig::default());
        assert!(settings.pipeline.overlay.is_none());
        assert!(settings.split.is_none());
        assert_eq!(settings.min_validation_bars, 60);
        assert!(settings.baseline_vol.is_none());
    }

    #[test]
    fn fast_not_below_slow_rejected() {
        let config = MockConfig::new(&[("signals", "ema_fast", "200"), ("signals", "ema_slow", "50")]);
        assert!(matches!(
            load_signal_params(&config),
            Err(PipelineError::Configuration { .. })
        ));
    }

    #[test]
    fn negative_cost_rejected() {
        let config = MockConfig::new(&[("backtest", "trading_cost", "-0.001")]);
        assert!(matches!(
            load_backtest_config(&config),
            Err(PipelineError::Configuration { .. })
        ));
    }

    #[test]
    fn zero_initial_capital_loads() {
        let config = MockConfig::new(&[("backtest", "initial_capital", "0")]);
        let backtest = load_backtest_config(&config).unwrap();
        assert_eq!(backtest.initial_capital, 0.0);
    }

    #[test]
    fn negative_or_non_finite_capital_rejected() {
        for value in ["-1", "nan", "inf"] {
            let config = MockConfig::new(&[("backtest", "initial_capital", value)]);
            assert!(matches!(
                load_backtest_config(&config),
                Err(PipelineError::Configuration { .. })
            ));
        }
    }

    #[test]
    fn malformed_number_is_config_invalid() {
        let config = MockConfig::new(&[("risk", "target_vol", "lots")]);
        match load_risk_config(&config) {
            Err(PipelineError::ConfigInvalid { section, key, .. }) => {
                assert_eq!(section, "risk");
                assert_eq!(key, "target_vol");
            }
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn risk_window_of_one_rejected() {
        let config = MockConfig::new(&[("risk", "vol_window", "1")]);
        assert!(matches!(
            load_risk_config(&config),
            Err(PipelineError::Configuration { .. })
        ));
    }

    #[test]
    fn extended_mode_reads_adaptive_section() {
        let config = MockConfig::new(&[
            ("signals", "mode", "extended"),
            ("adaptive", "base_threshold", "3.0"),
            ("adaptive", "bear_penalty", "2"),
            ("adaptive", "use_tanh", "false"),
        ]);
        let params = load_signal_params(&config).unwrap();
        match params.policy {
            ThresholdPolicy::Extended {
                adaptive,
                bear_penalty,
                n_factors,
                ..
            } => {
                assert!((adaptive.base_threshold - 3.0).abs() < f64::EPSILON);
                assert!(!adaptive.use_tanh);
                assert_eq!(bear_penalty, 2);
                assert_eq!(n_factors, 5);
            }
            ThresholdPolicy::Main { .. } => panic!("expected extended policy"),
        }
    }

    #[test]
    fn nan_multiplier_is_configuration_error() {
        let config = MockConfig::new(&[
            ("signals", "mode", "extended"),
            ("adaptive", "min_mult", "NaN"),
        ]);
        match load_signal_params(&config) {
            Err(PipelineError::Configuration { parameter, .. }) => assert_eq!(parameter, "min_mult"),
            other => panic!("expected min_mult rejection, got {other:?}"),
        }
    }

    #[test]
    fn unknown_mode_rejected() {
        let config = MockConfig::new(&[("signals", "mode", "turbo")]);
        assert!(matches!(
            load_signal_params(&config),
            Err(PipelineError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn hold_above_entry_rejected() {
        let config = MockConfig::new(&[("signals", "entry_score", "2"), ("signals", "hold_score", "3")]);
        assert!(load_signal_params(&config).is_err());
    }

    #[test]
    fn overlay_requires_effective_date() {
        let config = MockConfig::new(&[("overlay", "rating", "SELL")]);
        assert!(matches!(
            load_overlay(&config),
            Err(PipelineError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn overlay_parsed() {
        let config = MockConfig::new(&[
            ("overlay", "rating", "strong sell"),
            ("overlay", "effective_date", "2024-03-01"),
            ("overlay", "sell_multiplier", "0.5"),
        ]);
        let overlay = load_overlay(&config).unwrap().unwrap();
        assert_eq!(overlay.rating, Rating::StrongSell);
        assert_eq!(
            overlay.effective_date,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert!((overlay.sell_multiplier - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn split_dates_must_be_ordered() {
        let config = MockConfig::new(&[
            ("backtest", "train_end", "2024-06-01"),
            ("backtest", "val_end", "2024-01-01"),
        ]);
        assert!(load_run_settings(&config).is_err());

        let config = MockConfig::new(&[("backtest", "train_end", "2024-06-01")]);
        assert!(matches!(
            load_run_settings(&config),
            Err(PipelineError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn malformed_date_rejected() {
        let config = MockConfig::new(&[
            ("backtest", "train_end", "June 1st"),
            ("backtest", "val_end", "2024-01-01"),
        ]);
        assert!(matches!(
            load_run_settings(&config),
            Err(PipelineError::ConfigInvalid { .. })
        ));
    }
}
