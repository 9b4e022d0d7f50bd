//! End-to-end composition: indicators, regime, score, state machine,
//! sizing, risk, backtest, trades and summary.
//!
//! Every stage reads the previous stage's output and produces new vectors;
//! the caller's `PriceSeries` is only ever borrowed.

use chrono::NaiveDate;
use tracing::{debug, info};

use super::backtest::{BacktestConfig, BacktestResult, run_backtest};
use super::error::PipelineError;
use super::indicator::pattern::{PatternSignal, donchian_breakout, engulfing, hammer_shooting_star};
use super::indicator::{
    calculate_bollinger, calculate_ema, calculate_macd, calculate_rsi, realized_volatility,
    relative_volume,
};
use super::metrics::PerformanceSummary;
use super::ohlcv::PriceSeries;
use super::regime::{self, Regime, classify_regimes};
use super::risk::{LeverageOverlay, RiskConfig, RiskOutput, apply_risk_management};
use super::scoring::{ConfirmationRules, ScoreInputs, SignalScore, ThresholdPolicy, score_bars};
use super::sizing::base_exposures;
use super::state_machine::{BarInput, Decision, run_state_machine};
use super::trades::{Trade, reconstruct_trades};

/// Entry-only volume gate.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeConfirmation {
    pub window: usize,
    pub min_ratio: f64,
}

impl Default for VolumeConfirmation {
    fn default() -> Self {
        VolumeConfirmation {
            window: 20,
            min_ratio: 1.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalParams {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub regime_buffer: f64,
    pub rsi_window: usize,
    pub rsi_neutral: f64,
    pub bb_window: usize,
    pub bb_nstd: f64,
    pub pullback_tolerance: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    /// Window of the volatility feeding the adaptive threshold.
    pub vol_window: usize,
    pub volume: Option<VolumeConfirmation>,
    pub donchian_window: usize,
    pub policy: ThresholdPolicy,
}

impl Default for SignalParams {
    fn default() -> Self {
        SignalParams {
            ema_fast: 50,
            ema_slow: 200,
            regime_buffer: regime::DEFAULT_BUFFER,
            rsi_window: 14,
            rsi_neutral: 45.0,
            bb_window: 20,
            bb_nstd: 2.0,
            pullback_tolerance: 0.01,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            vol_window: 20,
            volume: None,
            donchian_window: 20,
            policy: ThresholdPolicy::default(),
        }
    }
}

fn window_above_one(parameter: &str, value: usize) -> Result<(), PipelineError> {
    if value <= 1 {
        return Err(PipelineError::configuration(
            parameter,
            format!("rolling window must be greater than 1, got {value}"),
        ));
    }
    Ok(())
}

impl SignalParams {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.ema_fast == 0 || self.ema_fast >= self.ema_slow {
            return Err(PipelineError::configuration(
                "ema_fast",
                format!(
                    "fast span ({}) must be at least 1 and below slow span ({})",
                    self.ema_fast, self.ema_slow
                ),
            ));
        }
        if self.macd_fast == 0 || self.macd_signal == 0 || self.macd_fast >= self.macd_slow {
            return Err(PipelineError::configuration(
                "macd_fast",
                format!(
                    "MACD windows must be positive with fast ({}) below slow ({})",
                    self.macd_fast, self.macd_slow
                ),
            ));
        }
        window_above_one("rsi_window", self.rsi_window)?;
        window_above_one("bb_window", self.bb_window)?;
        window_above_one("vol_window", self.vol_window)?;
        if let Some(volume) = &self.volume {
            window_above_one("volume_window", volume.window)?;
        }
        if self.policy.is_extended() {
            window_above_one("donchian_window", self.donchian_window)?;
        }
        let numeric = [
            ("regime_buffer", self.regime_buffer),
            ("pullback_tolerance", self.pullback_tolerance),
            ("bb_nstd", self.bb_nstd),
            ("rsi_neutral", self.rsi_neutral),
        ];
        if let Some((name, value)) = numeric.iter().find(|(_, v)| !v.is_finite()) {
            return Err(PipelineError::configuration(
                *name,
                format!("must be a finite number, got {value}"),
            ));
        }
        if self.regime_buffer < 0.0 || self.pullback_tolerance < 0.0 || self.bb_nstd < 0.0 {
            return Err(PipelineError::configuration(
                "regime_buffer",
                "buffers, tolerances and band width must not be negative",
            ));
        }
        self.policy.validate()
    }
}

/// Per-bar indicator values the scorer consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSet {
    pub ema_fast: Vec<Option<f64>>,
    pub ema_slow: Vec<Option<f64>>,
    pub rsi: Vec<Option<f64>>,
    pub macd_hist: Vec<Option<f64>>,
    pub bb_mid: Vec<Option<f64>>,
    /// All `None` when volume confirmation is off.
    pub rel_vol: Vec<Option<f64>>,
    pub volatility: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalFrame {
    pub dates: Vec<NaiveDate>,
    pub closes: Vec<f64>,
    pub indicators: IndicatorSet,
    pub regimes: Vec<Regime>,
    pub scores: Vec<SignalScore>,
    pub pattern_bull: Vec<bool>,
    pub pattern_bear: Vec<bool>,
    pub volume_ok: Vec<bool>,
    pub decisions: Vec<Decision>,
    pub max_score: u8,
}

impl SignalFrame {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn score_values(&self) -> Vec<u8> {
        self.scores.iter().map(|s| s.score).collect()
    }
}

fn combine_patterns(series: &PriceSeries, donchian_window: usize) -> (Vec<bool>, Vec<bool>) {
    let bars = series.bars();
    let detectors = [
        engulfing(bars),
        hammer_shooting_star(bars),
        donchian_breakout(bars, donchian_window),
    ];
    let any = |i: usize, wanted: PatternSignal| detectors.iter().any(|d| d[i] == wanted);
    (0..bars.len())
        .map(|i| (any(i, PatternSignal::Bullish), any(i, PatternSignal::Bearish)))
        .unzip()
}

/// Indicators, regime, scores and the decision-time long/flat series.
pub fn generate_signals(
    series: &PriceSeries,
    params: &SignalParams,
) -> Result<SignalFrame, PipelineError> {
    params.validate()?;
    let n = series.len();
    let closes = series.closes();

    let ema_fast = calculate_ema(&closes, params.ema_fast).values;
    let ema_slow = calculate_ema(&closes, params.ema_slow).values;
    let rsi = calculate_rsi(&closes, params.rsi_window).values;
    let macd_hist = calculate_macd(&closes, params.macd_fast, params.macd_slow, params.macd_signal)?
        .histogram
        .values;
    let bb_mid = calculate_bollinger(&closes, params.bb_window, params.bb_nstd)
        .middle
        .values;
    let volatility =
        realized_volatility(&series.returns(), params.vol_window, params.vol_window).values;

    let regimes = classify_regimes(&closes, &ema_slow, params.regime_buffer);

    let (pattern_bull, pattern_bear) = if params.policy.is_extended() {
        combine_patterns(series, params.donchian_window)
    } else {
        (vec![false; n], vec![false; n])
    };

    let (rel_vol, volume_ok) = match &params.volume {
        Some(gate) => {
            let rel_vol = relative_volume(&series.volumes(), gate.window).values;
            let ok = rel_vol
                .iter()
                .map(|v| v.unwrap_or(0.0) >= gate.min_ratio)
                .collect();
            (rel_vol, ok)
        }
        None => (vec![None; n], vec![true; n]),
    };

    let rules = ConfirmationRules {
        pullback_tolerance: params.pullback_tolerance,
        rsi_neutral: params.rsi_neutral,
    };
    let scores = score_bars(
        &ScoreInputs {
            closes: &closes,
            ema_fast: &ema_fast,
            ema_slow: &ema_slow,
            bb_mid: &bb_mid,
            rsi: &rsi,
            macd_hist: &macd_hist,
            pattern_bull: &pattern_bull,
            volatility: &volatility,
            regimes: &regimes,
        },
        &params.policy,
        &rules,
    );

    let bar_inputs: Vec<BarInput> = scores
        .iter()
        .zip(&volume_ok)
        .zip(&pattern_bear)
        .map(|((score, vol_ok), bear)| BarInput::from_score(score, *vol_ok, *bear))
        .collect();
    let decisions = run_state_machine(&bar_inputs);

    debug!(
        bars = n,
        long_bars = decisions.iter().filter(|d| d.is_long()).count(),
        "signals generated"
    );

    Ok(SignalFrame {
        dates: series.dates(),
        closes,
        indicators: IndicatorSet {
            ema_fast,
            ema_slow,
            rsi,
            macd_hist,
            bb_mid,
            rel_vol,
            volatility,
        },
        regimes,
        scores,
        pattern_bull,
        pattern_bear,
        volume_ok,
        decisions,
        max_score: params.policy.max_score(),
    })
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineConfig {
    pub signals: SignalParams,
    pub risk: RiskConfig,
    pub backtest: BacktestConfig,
    pub overlay: Option<LeverageOverlay>,
    pub risk_free_rate: f64,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.signals.validate()?;
        self.risk.validate()?;
        self.backtest.validate()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub signals: SignalFrame,
    /// Pre-risk decision-time exposure.
    pub base_exposure: Vec<f64>,
    pub risk: RiskOutput,
    pub backtest: BacktestResult,
    pub trades: Vec<Trade>,
    /// `None` when the series is too short to summarise.
    pub summary: Option<PerformanceSummary>,
}

pub fn run_pipeline(
    series: &PriceSeries,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PipelineError> {
    config.validate()?;
    let signals = generate_signals(series, &config.signals)?;

    let base_exposure = base_exposures(
        &signals.decisions,
        &signals.regimes,
        &signals.score_values(),
        signals.max_score,
    );
    let risk = apply_risk_management(
        &base_exposure,
        &signals.closes,
        &signals.dates,
        &signals.regimes,
        &config.risk,
        config.overlay.as_ref(),
    )?;
    let backtest = run_backtest(series, &risk.desired, &config.backtest)?;
    let trades = reconstruct_trades(&backtest);
    let summary = PerformanceSummary::compute_with_trades(&backtest, &trades, config.risk_free_rate);

    info!(
        bars = series.len(),
        trades = trades.len(),
        total_return = summary.as_ref().and_then(|s| s.total_return),
        "pipeline complete"
    );

    Ok(PipelineOutput {
        signals,
        base_exposure,
        risk,
        backtest,
        trades,
        summary,
    })
}
