// =============================================================================
// Incremental Execution — recompute only over a bounded trailing window
// =============================================================================
//
// Maintains, per timeframe, an owned copy of the last `lookback_window` raw
// bars.  Each update appends the newly arrived rows, trims the cache FIFO by
// position, recomputes indicators over the full window, and hands back only
// the rows corresponding to the new input.
//
// The cache is the one piece of durable state in this core.  It is
// single-writer by contract (`&mut self`); callers with several concurrent
// streams must hold one processor per stream.

use std::collections::HashMap;

use anyhow::Result;
use tracing::debug;

use crate::compute::IndicatorEngine;
use crate::frame::OhlcvFrame;
use crate::types::IndicatorRequest;

/// Bars retained per timeframe when no window is configured.
pub const DEFAULT_LOOKBACK_WINDOW: usize = 200;

/// Incremental wrapper around the computation unit.
#[derive(Debug, Default)]
pub struct IncrementalProcessor {
    lookback_window: usize,
    engine: IndicatorEngine,
    cache: HashMap<String, OhlcvFrame>,
}

impl IncrementalProcessor {
    /// `lookback_window` is clamped to at least 1.
    pub fn new(lookback_window: usize) -> Self {
        Self {
            lookback_window: lookback_window.max(1),
            engine: IndicatorEngine::new(),
            cache: HashMap::new(),
        }
    }

    /// Append `new_rows` to the timeframe's cached window, recompute the
    /// requested indicators over the whole window, and return the trailing
    /// rows corresponding to `new_rows`.
    ///
    /// When more rows arrive than the window holds, only the last
    /// `lookback_window` of them are represented in the result.
    pub fn update(
        &mut self,
        timeframe: &str,
        new_rows: &OhlcvFrame,
        requests: &[IndicatorRequest],
    ) -> Result<OhlcvFrame> {
        let cached = self
            .cache
            .entry(timeframe.to_string())
            .or_insert_with(OhlcvFrame::new);

        // The cache holds raw bars only; incoming indicator columns (if any)
        // are not part of the stream state.
        let mut raw = new_rows.clone();
        raw.clear_columns();
        cached.append(&raw);

        // FIFO trim by position.
        if cached.len() > self.lookback_window {
            *cached = cached.tail(self.lookback_window);
        }
        let window = cached.clone();

        debug!(
            timeframe,
            new_rows = new_rows.len(),
            cached = window.len(),
            "incremental update"
        );
        let computed = self.engine.apply(&window, requests, timeframe)?;
        Ok(computed.tail(new_rows.len().min(computed.len())))
    }

    /// Rows currently cached for a timeframe.
    pub fn cached_rows(&self, timeframe: &str) -> usize {
        self.cache.get(timeframe).map_or(0, OhlcvFrame::len)
    }

    /// Drop one timeframe's cached window, or all of them.
    pub fn reset(&mut self, timeframe: Option<&str>) {
        match timeframe {
            Some(tf) => {
                self.cache.remove(tf);
            }
            None => self.cache.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::ramp_frame;
    use crate::indicators::IndicatorKind;

    fn sma_request() -> Vec<IndicatorRequest> {
        vec![IndicatorRequest::new(IndicatorKind::Sma).with_param("period", 5)]
    }

    #[test]
    fn update_returns_only_new_rows() {
        let mut processor = IncrementalProcessor::new(50);
        let seed = ramp_frame(30);
        let out = processor.update("1h", &seed, &sma_request()).unwrap();
        assert_eq!(out.len(), 30);

        let fresh = ramp_frame(40).tail(4);
        let out = processor.update("1h", &fresh, &sma_request()).unwrap();
        assert_eq!(out.len(), 4);
        assert!(out.column("sma_5_1h").unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn cache_is_trimmed_fifo() {
        let mut processor = IncrementalProcessor::new(10);
        let frame = ramp_frame(30);
        processor.update("1h", &frame, &sma_request()).unwrap();
        assert_eq!(processor.cached_rows("1h"), 10);

        let next = ramp_frame(35).tail(5);
        processor.update("1h", &next, &sma_request()).unwrap();
        assert_eq!(processor.cached_rows("1h"), 10);
    }

    #[test]
    fn new_rows_have_full_window_context() {
        // The returned rows must match a batch run over the same history:
        // the cached window supplies the warm-up the new rows alone lack.
        let engine = IndicatorEngine::new();
        let full = ramp_frame(60);
        let batch = engine.apply(&full, &sma_request(), "1h").unwrap();

        let mut processor = IncrementalProcessor::new(100);
        processor.update("1h", &full.slice(0, 55), &sma_request()).unwrap();
        let out = processor.update("1h", &full.slice(55, 60), &sma_request()).unwrap();

        let batch_col = batch.column("sma_5_1h").unwrap();
        let inc_col = out.column("sma_5_1h").unwrap();
        assert_eq!(inc_col.len(), 5);
        for i in 0..5 {
            assert!((inc_col[i] - batch_col[55 + i]).abs() < 1e-9);
        }
    }

    #[test]
    fn streams_are_isolated_per_timeframe() {
        let mut processor = IncrementalProcessor::new(50);
        processor.update("1h", &ramp_frame(20), &sma_request()).unwrap();
        processor.update("4h", &ramp_frame(8), &sma_request()).unwrap();
        assert_eq!(processor.cached_rows("1h"), 20);
        assert_eq!(processor.cached_rows("4h"), 8);

        processor.reset(Some("1h"));
        assert_eq!(processor.cached_rows("1h"), 0);
        assert_eq!(processor.cached_rows("4h"), 8);
    }

    #[test]
    fn burst_larger_than_window_is_clamped() {
        let mut processor = IncrementalProcessor::new(10);
        let out = processor.update("1h", &ramp_frame(25), &sma_request()).unwrap();
        // Only the window's worth of rows can be represented.
        assert_eq!(out.len(), 10);
        assert_eq!(processor.cached_rows("1h"), 10);
    }
}
