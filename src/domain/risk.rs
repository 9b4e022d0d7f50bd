//! Volatility targeting under a composed leverage cap.
//!
//! `desired[t] = base[t] * clip(target_vol / vol[t], 0, cap[t])`
//!
//! `vol[t]` is the annualized rolling std of close-to-close returns (at
//! least two observations), with undefined values replaced by the floor and
//! everything below the floor raised to it. The cap is
//! `base_cap * bear_cap_mult (Bear bars) * overlay multiplier (from the
//! overlay's effective date on)`. All outputs are decision-time.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use tracing::debug;

use super::error::PipelineError;
use super::indicator::realized_volatility;
use super::ohlcv::close_to_close_returns;
use super::regime::Regime;

/// Minimum observations for the risk-side volatility estimate.
pub const RISK_VOL_MIN_PERIODS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    pub target_vol: f64,
    pub vol_window: usize,
    pub vol_floor: f64,
    pub base_cap: f64,
    pub bear_cap_mult: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            target_vol: 0.15,
            vol_window: 20,
            vol_floor: 0.02,
            base_cap: 1.0,
            bear_cap_mult: 0.7,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.target_vol.is_finite() && self.target_vol > 0.0) {
            return Err(PipelineError::configuration(
                "target_vol",
                "must be positive",
            ));
        }
        if self.vol_window <= 1 {
            return Err(PipelineError::configuration(
                "vol_window",
                format!("rolling window must be greater than 1, got {}", self.vol_window),
            ));
        }
        if !(self.vol_floor > 0.0) {
            return Err(PipelineError::configuration("vol_floor", "must be positive"));
        }
        if !self.base_cap.is_finite() || self.base_cap < 0.0 {
            return Err(PipelineError::configuration(
                "base_cap",
                "must be a finite, non-negative number",
            ));
        }
        if !(self.bear_cap_mult > 0.0 && self.bear_cap_mult <= 1.0) {
            return Err(PipelineError::configuration(
                "bear_cap_mult",
                "must be within (0, 1]",
            ));
        }
        Ok(())
    }
}

/// External analyst rating. Only sell ratings tighten the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Rating {
    pub fn is_sell(self) -> bool {
        matches!(self, Rating::Sell | Rating::StrongSell)
    }
}

impl FromStr for Rating {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('_', " ");
        match normalized.as_str() {
            "BUY" => Ok(Rating::Buy),
            "HOLD" => Ok(Rating::Hold),
            "SELL" => Ok(Rating::Sell),
            "STRONG SELL" => Ok(Rating::StrongSell),
            _ => Err(PipelineError::configuration(
                "rating",
                format!("unknown rating '{s}' (expected BUY, HOLD, SELL or STRONG SELL)"),
            )),
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rating::Buy => "BUY",
            Rating::Hold => "HOLD",
            Rating::Sell => "SELL",
            Rating::StrongSell => "STRONG SELL",
        };
        f.write_str(s)
    }
}

/// `{rating, effective_date}` turned into a per-bar cap multiplier.
#[derive(Debug, Clone, PartialEq)]
pub struct LeverageOverlay {
    pub rating: Rating,
    pub effective_date: NaiveDate,
    pub sell_multiplier: f64,
}

impl LeverageOverlay {
    pub const DEFAULT_SELL_MULTIPLIER: f64 = 0.3;

    pub fn new(rating: Rating, effective_date: NaiveDate) -> Self {
        LeverageOverlay {
            rating,
            effective_date,
            sell_multiplier: Self::DEFAULT_SELL_MULTIPLIER,
        }
    }

    /// Never applied before the effective date.
    pub fn multiplier_at(&self, date: NaiveDate) -> f64 {
        if self.rating.is_sell() && date >= self.effective_date {
            self.sell_multiplier
        } else {
            1.0
        }
    }
}

/// Per-bar effective leverage cap.
pub fn leverage_caps(
    dates: &[NaiveDate],
    regimes: &[Regime],
    config: &RiskConfig,
    overlay: Option<&LeverageOverlay>,
) -> Vec<f64> {
    dates
        .iter()
        .zip(regimes)
        .map(|(date, regime)| {
            let mut cap = config.base_cap.max(0.0);
            if *regime == Regime::Bear {
                cap *= config.bear_cap_mult;
            }
            if let Some(overlay) = overlay {
                cap *= overlay.multiplier_at(*date);
            }
            cap.max(0.0)
        })
        .collect()
}

/// Floored realized volatility used for sizing.
pub fn floored_volatility(closes: &[f64], vol_window: usize, vol_floor: f64) -> Vec<f64> {
    let returns = close_to_close_returns(closes);
    realized_volatility(&returns, vol_window, RISK_VOL_MIN_PERIODS)
        .values
        .into_iter()
        .map(|v| match v {
            Some(v) if v.is_finite() => v.max(vol_floor),
            _ => vol_floor,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskOutput {
    /// Final decision-time target exposure.
    pub desired: Vec<f64>,
    /// Leverage multiplier actually applied.
    pub leverage: Vec<f64>,
    pub cap: Vec<f64>,
    pub realized_vol: Vec<f64>,
    pub avg_leverage: f64,
    pub max_leverage: f64,
}

pub fn apply_risk_management(
    base: &[f64],
    closes: &[f64],
    dates: &[NaiveDate],
    regimes: &[Regime],
    config: &RiskConfig,
    overlay: Option<&LeverageOverlay>,
) -> Result<RiskOutput, PipelineError> {
    config.validate()?;
    let n = base.len();
    if closes.len() != n || dates.len() != n || regimes.len() != n {
        return Err(PipelineError::data(format!(
            "risk inputs are misaligned: base {n}, closes {}, dates {}, regimes {}",
            closes.len(),
            dates.len(),
            regimes.len()
        )));
    }

    let cap = leverage_caps(dates, regimes, config, overlay);
    let realized_vol = floored_volatility(closes, config.vol_window, config.vol_floor);

    let leverage: Vec<f64> = realized_vol
        .iter()
        .zip(&cap)
        .map(|(vol, cap)| (config.target_vol / vol).clamp(0.0, *cap))
        .collect();

    let desired: Vec<f64> = base.iter().zip(&leverage).map(|(b, l)| b * l).collect();

    let avg_leverage = if n > 0 {
        leverage.iter().sum::<f64>() / n as f64
    } else {
        0.0
    };
    let max_leverage = leverage.iter().copied().fold(0.0, f64::max);

    debug!(bars = n, avg_leverage, max_leverage, "risk management applied");

    Ok(RiskOutput {
        desired,
        leverage,
        cap,
        realized_vol,
        avg_leverage,
        max_leverage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect()
    }

    #[test]
    fn rating_parsing() {
        assert_eq!("sell".parse::<Rating>().unwrap(), Rating::Sell);
        assert_eq!(" Strong Sell ".parse::<Rating>().unwrap(), Rating::StrongSell);
        assert_eq!("STRONG_SELL".parse::<Rating>().unwrap(), Rating::StrongSell);
        assert!("meh".parse::<Rating>().is_err());
    }

    #[test]
    fn overlay_never_retroactive() {
        let d = dates(5);
        let overlay = LeverageOverlay::new(Rating::Sell, d[2]);
        let caps = leverage_caps(
            &d,
            &[Regime::Bull; 5],
            &RiskConfig::default(),
            Some(&overlay),
        );
        assert_eq!(caps[0], 1.0);
        assert_eq!(caps[1], 1.0);
        assert!((caps[2] - 0.3).abs() < 1e-12);
        assert!((caps[4] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn buy_overlay_leaves_cap_unchanged() {
        let d = dates(3);
        let overlay = LeverageOverlay::new(Rating::Buy, d[0]);
        let caps = leverage_caps(&d, &[Regime::Bull; 3], &RiskConfig::default(), Some(&overlay));
        assert!(caps.iter().all(|c| *c == 1.0));
    }

    #[test]
    fn bear_and_overlay_compose() {
        let d = dates(2);
        let overlay = LeverageOverlay::new(Rating::StrongSell, d[0]);
        let caps = leverage_caps(
            &d,
            &[Regime::Bear, Regime::Neutral],
            &RiskConfig::default(),
            Some(&overlay),
        );
        assert!((caps[0] - 0.7 * 0.3).abs() < 1e-12);
        assert!((caps[1] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn floored_volatility_fills_warmup() {
        let vol = floored_volatility(&[100.0, 100.0, 100.0], 20, 0.02);
        assert_eq!(vol, vec![0.02, 0.02, 0.02]);
    }

    #[test]
    fn desired_bounded_by_cap_at_floor() {
        let closes = [100.0; 10];
        let d = dates(10);
        let out = apply_risk_management(
            &[1.0; 10],
            &closes,
            &d,
            &[Regime::Bear; 10],
            &RiskConfig::default(),
            None,
        )
        .unwrap();
        for (desired, cap) in out.desired.iter().zip(&out.cap) {
            assert!(*desired <= *cap + 1e-12);
        }
        assert!((out.max_leverage - 0.7).abs() < 1e-12);
    }

    #[test]
    fn high_vol_scales_down() {
        let closes: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { 100.0 } else { 110.0 })
            .collect();
        let out = apply_risk_management(
            &[1.0; 30],
            &closes,
            &dates(30),
            &[Regime::Bull; 30],
            &RiskConfig::default(),
            None,
        )
        .unwrap();
        assert!(out.desired[29] < 0.2);
        assert!(out.avg_leverage <= out.max_leverage);
    }

    #[test]
    fn misaligned_inputs_are_data_errors() {
        let err = apply_risk_management(
            &[1.0; 3],
            &[100.0; 2],
            &dates(3),
            &[Regime::Bull; 3],
            &RiskConfig::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Data { .. }));
    }

    #[test]
    fn invalid_config_rejected() {
        let config = RiskConfig {
            vol_window: 1,
            ..RiskConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration { .. })
        ));
    }

    #[test]
    fn non_finite_cap_rejected() {
        for base_cap in [f64::NAN, f64::INFINITY] {
            let config = RiskConfig {
                base_cap,
                ..RiskConfig::default()
            };
            match config.validate() {
                Err(PipelineError::Configuration { parameter, .. }) => {
                    assert_eq!(parameter, "base_cap")
                }
                other => panic!("expected base_cap rejection, got {other:?}"),
            }
        }
    }
}
