//! OHLCV bars and the validated price series the pipeline runs on.

use chrono::NaiveDate;

use super::error::PipelineError;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// |close - open|
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// high - max(open, close), never negative.
    pub fn upper_wick(&self) -> f64 {
        (self.high - self.open.max(self.close)).max(0.0)
    }

    /// min(open, close) - low, never negative.
    pub fn lower_wick(&self) -> f64 {
        (self.open.min(self.close) - self.low).max(0.0)
    }

    pub fn is_green(&self) -> bool {
        self.close > self.open
    }

    pub fn is_red(&self) -> bool {
        self.close < self.open
    }
}

/// An ordered, immutable run of bars.
///
/// Construction rejects duplicate or out-of-order dates and non-positive or
/// non-finite closes. Deduplication is the loader's job, not ours. The
/// default series has no bars.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(bars: Vec<PriceBar>) -> Result<Self, PipelineError> {
        for (i, bar) in bars.iter().enumerate() {
            if !bar.close.is_finite() || bar.close <= 0.0 {
                return Err(PipelineError::data(format!(
                    "close must be positive and finite, got {} on {}",
                    bar.close, bar.date
                )));
            }
            if i > 0 {
                let prev = bars[i - 1].date;
                if bar.date == prev {
                    return Err(PipelineError::data(format!(
                        "duplicate timestamp {}",
                        bar.date
                    )));
                }
                if bar.date < prev {
                    return Err(PipelineError::data(format!(
                        "timestamps not increasing: {} follows {}",
                        bar.date, prev
                    )));
                }
            }
        }
        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Close-to-close simple returns; bar 0 is 0.0.
    pub fn returns(&self) -> Vec<f64> {
        close_to_close_returns(&self.closes())
    }

    /// Bars with `start <= date <= end` as a new series.
    pub fn window(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> PriceSeries {
        let bars = self
            .bars
            .iter()
            .filter(|b| start.is_none_or(|s| b.date >= s) && end.is_none_or(|e| b.date <= e))
            .cloned()
            .collect();
        PriceSeries { bars }
    }

    /// Index of the first bar dated on or after `date`.
    pub fn position_of(&self, date: NaiveDate) -> usize {
        self.bars.partition_point(|b| b.date < date)
    }
}

/// Simple percentage change between consecutive values; index 0 is 0.0.
pub fn close_to_close_returns(closes: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(closes.len());
    for (i, &c) in closes.iter().enumerate() {
        if i == 0 {
            out.push(0.0);
        } else {
            let prev = closes[i - 1];
            let r = if prev != 0.0 { c / prev - 1.0 } else { 0.0 };
            out.push(if r.is_finite() { r } else { 0.0 });
        }
    }
    out
}
