//! trendpilot: deterministic trend-following research pipeline.
//!
//! Indicators feed a regime classifier and a composite scorer, a hysteresis
//! state machine turns scores into decisions, and a sizer plus volatility
//! targeting risk manager produce the exposure that a single-delay backtest
//! turns into equity, trades and a performance summary.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], and a thin host in [`cli`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
