// =============================================================================
// Indicator Computation Unit
// =============================================================================
//
// Applies a list of indicator requests to one timeframe's frame and stamps
// every produced column with the per-timeframe suffix downstream consumers
// merge on.  Copy-on-write: the caller's frame is never touched.
//
// Column standardization happens here and only here, which is what makes it
// idempotent: a column that already ends in `_{timeframe}` is left alone, so
// re-standardizing an output frame is a no-op.

use anyhow::Result;
use tracing::debug;

use crate::frame::OhlcvFrame;
use crate::indicators;
use crate::types::IndicatorRequest;

/// Stateless computation unit.  Cheap to clone and share across workers.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorEngine;

impl IndicatorEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compute every request against `frame` and return a new frame with the
    /// indicator columns appended and standardized for `timeframe`.
    ///
    /// Fails on the first request that cannot be computed; per-request
    /// isolation is the resilient processor's job, not this unit's.
    pub fn apply(
        &self,
        frame: &OhlcvFrame,
        requests: &[IndicatorRequest],
        timeframe: &str,
    ) -> Result<OhlcvFrame> {
        let mut out = frame.clone();
        let mut computed = 0usize;
        for request in requests {
            for (name, values) in indicators::compute_request(request, frame)? {
                out.set_column(name, values);
                computed += 1;
            }
        }
        standardize_column_names(&mut out, timeframe);
        debug!(
            timeframe,
            rows = out.len(),
            columns = computed,
            "indicator computation complete"
        );
        Ok(out)
    }
}

/// Rename every indicator column to `{name}_{timeframe}` unless it already
/// carries that suffix.  OHLCV, timestamp, and volume data live as struct
/// fields on the frame and are never candidates for renaming.
pub fn standardize_column_names(frame: &mut OhlcvFrame, timeframe: &str) {
    let suffix = format!("_{timeframe}");
    frame.rename_columns(|name| {
        if name.ends_with(&suffix) {
            name.to_string()
        } else {
            format!("{name}{suffix}")
        }
    });
}
