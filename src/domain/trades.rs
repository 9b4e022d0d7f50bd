//! Trade reconstruction from executed exposure.
//!
//! A trade is a maximal run of bars whose executed position has the same
//! nonzero sign. A run still open on the last bar is reported, truncated
//! there.

use chrono::NaiveDate;

use super::backtest::BacktestResult;

/// Positions with magnitude at or below this are flat.
pub const POSITION_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    fn of(position: f64) -> Option<Direction> {
        if position.abs() <= POSITION_EPS {
            None
        } else if position > 0.0 {
            Some(Direction::Long)
        } else {
            Some(Direction::Short)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Trade {
    pub entry_index: usize,
    pub exit_index: usize,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub direction: Direction,
    pub holding_bars: usize,
    pub holding_days: i64,
    /// `prod(1 + strategy_return) - 1` over the run, costs included.
    pub pnl: f64,
}

pub fn reconstruct_trades(result: &BacktestResult) -> Vec<Trade> {
    let records = &result.records;
    let mut trades = Vec::new();
    let mut open: Option<(usize, Direction)> = None;

    let close = |start: usize, end: usize, direction: Direction| {
        let pnl = records[start..=end]
            .iter()
            .map(|r| 1.0 + r.strategy_return)
            .product::<f64>()
            - 1.0;
        let entry_date = records[start].date;
        let exit_date = records[end].date;
        Trade {
            entry_index: start,
            exit_index: end,
            entry_date,
            exit_date,
            direction,
            holding_bars: end - start + 1,
            holding_days: (exit_date - entry_date).num_days(),
            pnl,
        }
    };

    for (i, record) in records.iter().enumerate() {
        let direction = Direction::of(record.executed_position);
        match (open, direction) {
            (None, Some(d)) => open = Some((i, d)),
            (Some((start, d)), current) if current != Some(d) => {
                trades.push(close(start, i - 1, d));
                open = current.map(|c| (i, c));
            }
            _ => {}
        }
    }
    if let Some((start, d)) = open {
        trades.push(close(start, records.len() - 1, d));
    }
    trades
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TradeStats {
    pub num_trades: usize,
    /// Fraction of trades with positive P&L; `None` without trades.
    pub hit_rate: Option<f64>,
    pub avg_holding_days: Option<f64>,
}

impl TradeStats {
    pub fn compute(trades: &[Trade]) -> Self {
        if trades.is_empty() {
            return TradeStats {
                num_trades: 0,
                hit_rate: None,
                avg_holding_days: None,
            };
        }
        let n = trades.len() as f64;
        let winners = trades.iter().filter(|t| t.pnl > 0.0).count();
        let total_days: i64 = trades.iter().map(|t| t.holding_days).sum();
        TradeStats {
            num_trades: trades.len(),
            hit_rate: Some(winners as f64 / n),
            avg_holding_days: Some(total_days as f64 / n),
        }
    }
}

/// Trades overlapping `[start, end]`.
pub fn trades_in_window(trades: &[Trade], start: NaiveDate, end: NaiveDate) -> Vec<Trade> {
    trades
        .iter()
        .filter(|t| t.entry_date <= end && t.exit_date >= start)
        .cloned()
        .collect()
}
