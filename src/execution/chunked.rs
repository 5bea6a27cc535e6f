// =============================================================================
// Chunked Execution — bounded-memory processing of one large frame
// =============================================================================
//
// Splits a frame into `chunk_size`-row windows.  Every window except the
// first gets `overlap_size` rows of look-back context prepended so rolling
// indicators keep their warm-up across chunk boundaries; the overlap rows
// are trimmed from each computed chunk before concatenation, so the output
// row count always equals the input row count.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compute::IndicatorEngine;
use crate::frame::OhlcvFrame;
use crate::types::IndicatorRequest;

fn default_chunk_size() -> usize {
    5_000
}

fn default_overlap_size() -> usize {
    100
}

/// Chunked wrapper around the computation unit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkedProcessor {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,
}

impl Default for ChunkedProcessor {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap_size: default_overlap_size(),
        }
    }
}

impl ChunkedProcessor {
    /// `chunk_size` is clamped to at least 1.
    pub fn new(chunk_size: usize, overlap_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap_size,
        }
    }

    /// Process `frame` chunk by chunk through `engine`.
    ///
    /// Frames no larger than one chunk go straight through.  Output row
    /// count equals input row count for any `chunk_size >= 1`.
    pub fn process(
        &self,
        engine: &IndicatorEngine,
        frame: &OhlcvFrame,
        requests: &[IndicatorRequest],
        timeframe: &str,
    ) -> Result<OhlcvFrame> {
        let chunk_size = self.chunk_size.max(1);
        if frame.len() <= chunk_size {
            return engine.apply(frame, requests, timeframe);
        }

        let mut out = OhlcvFrame::new();
        let mut start = 0usize;
        let mut chunks = 0usize;
        while start < frame.len() {
            let end = (start + chunk_size).min(frame.len());
            // Look-back context for every chunk except the first.
            let context_start = start.saturating_sub(self.overlap_size);
            let window = frame.slice(context_start, end);

            let computed = engine.apply(&window, requests, timeframe)?;
            // Drop the context rows again so concatenation preserves length.
            let trimmed = computed.slice(start - context_start, computed.len());
            out.append(&trimmed);

            start = end;
            chunks += 1;
        }

        debug!(
            timeframe,
            chunks,
            rows = out.len(),
            chunk_size,
            overlap = self.overlap_size,
            "chunked computation complete"
        );
        Ok(out)
    }
}
