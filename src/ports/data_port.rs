//! Price data supplier port.
//!
//! Whatever caching or rate limiting a supplier needs lives inside its
//! implementation and is passed in as a value; the pipeline never reaches
//! for process-wide state.

use crate::domain::error::PipelineError;
use crate::domain::ohlcv::PriceSeries;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `symbol` dated within `[start, end]` (either bound optional).
    fn fetch_series(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceSeries, PipelineError>;

    fn list_symbols(&self) -> Result<Vec<String>, PipelineError>;
}
