//! Core domain types and logic.

pub mod backtest;
pub mod config_validation;
pub mod error;
pub mod indicator;
pub mod metrics;
pub mod ohlcv;
pub mod pipeline;
pub mod regime;
pub mod risk;
pub mod scoring;
pub mod sizing;
pub mod state_machine;
pub mod trades;
pub mod tuning;
