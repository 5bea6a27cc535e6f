// =============================================================================
// Execution Strategy Layer
// =============================================================================
//
// Three ways to run the computation unit over large or growing inputs —
// chunked (bounded memory), parallel (independent timeframes on a worker
// pool), incremental (only the newly arrived rows) — plus the auto-selector
// that picks a plan from data volume.

pub mod chunked;
pub mod incremental;
pub mod parallel;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use chunked::ChunkedProcessor;
pub use incremental::IncrementalProcessor;
pub use parallel::ParallelProcessor;

/// Chunking activates above this many total rows.
pub const CHUNK_THRESHOLD_ROWS: usize = 10_000;

/// Parallelism activates above this many total rows (and more than one
/// timeframe).
pub const PARALLEL_THRESHOLD_ROWS: usize = 1_000;

/// The execution plan for one batch call.  Chunking and parallelism compose:
/// each timeframe's work may be chunked while timeframes run concurrently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub use_chunking: bool,
    pub use_parallel: bool,
}

impl ExecutionPlan {
    /// Pick a plan from data volume, honoring force overrides when set.
    pub fn select(
        total_rows: usize,
        timeframe_count: usize,
        force_chunking: Option<bool>,
        force_parallel: Option<bool>,
    ) -> Self {
        let use_chunking = force_chunking.unwrap_or(total_rows > CHUNK_THRESHOLD_ROWS);
        let use_parallel = force_parallel
            .unwrap_or(timeframe_count > 1 && total_rows > PARALLEL_THRESHOLD_ROWS);
        let plan = Self {
            use_chunking,
            use_parallel,
        };
        debug!(total_rows, timeframe_count, ?plan, "execution plan selected");
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_batch_runs_plain() {
        let plan = ExecutionPlan::select(500, 3, None, None);
        assert!(!plan.use_chunking);
        assert!(!plan.use_parallel);
    }

    #[test]
    fn many_rows_chunk() {
        let plan = ExecutionPlan::select(20_000, 1, None, None);
        assert!(plan.use_chunking);
        assert!(!plan.use_parallel); // single timeframe never parallelizes
    }

    #[test]
    fn many_timeframes_parallelize() {
        let plan = ExecutionPlan::select(5_000, 3, None, None);
        assert!(!plan.use_chunking);
        assert!(plan.use_parallel);
    }

    #[test]
    fn both_can_combine() {
        let plan = ExecutionPlan::select(50_000, 4, None, None);
        assert!(plan.use_chunking);
        assert!(plan.use_parallel);
    }

    #[test]
    fn force_flags_override_thresholds() {
        let plan = ExecutionPlan::select(100, 1, Some(true), Some(true));
        assert!(plan.use_chunking);
        assert!(plan.use_parallel);

        let plan = ExecutionPlan::select(1_000_000, 10, Some(false), Some(false));
        assert!(!plan.use_chunking);
        assert!(!plan.use_parallel);
    }
}
