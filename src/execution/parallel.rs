// =============================================================================
// Parallel Execution — independent timeframes on a bounded worker pool
// =============================================================================
//
// Each timeframe's computation is independent: no shared mutable state is
// touched inside a worker, so no locking is needed during computation.
// Results are merged after a join barrier on the dispatching thread, and the
// first worker error aborts the whole batch call (propagate-on-first-error).
// Partial tolerance across timeframes is the resilient processor's job;
// compose it *inside* the work closure when that behavior is wanted.

use std::collections::HashMap;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::frame::OhlcvFrame;
use crate::types::{IndicatorRequest, TimeframeIndicatorConfig};

/// Hard cap on workers regardless of what the host machine reports.
const MAX_WORKERS: usize = 8;

/// Bounded rayon pool dispatching one unit of work per timeframe.
pub struct ParallelProcessor {
    pool: rayon::ThreadPool,
}

impl ParallelProcessor {
    /// Build a pool with `workers` threads, or `available_parallelism`
    /// (capped at `MAX_WORKERS`) when unset.
    pub fn new(workers: Option<usize>) -> Result<Self> {
        let workers = workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .clamp(1, MAX_WORKERS);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("failed to build worker pool")?;
        debug!(workers, "parallel processor ready");
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `work` once per enabled config with data, concurrently, joining
    /// on all workers before returning.
    ///
    /// The first failing unit fails the whole call.  Configs whose timeframe
    /// has no frame are skipped with a warning only; unlike
    /// `ResilientProcessor::process_with_recovery`, no `ErrorContext` is
    /// recorded for them.  The configuration handler reports missing
    /// timeframes as issues before execution gets here, so callers wanting
    /// them in a report should validate first.
    pub fn map<T, F>(
        &self,
        data: &HashMap<String, OhlcvFrame>,
        configs: &[TimeframeIndicatorConfig],
        work: F,
    ) -> Result<Vec<(String, T)>>
    where
        T: Send,
        F: Fn(&str, &OhlcvFrame, &[IndicatorRequest]) -> Result<T> + Sync,
    {
        let units: Vec<(&TimeframeIndicatorConfig, &OhlcvFrame)> = configs
            .iter()
            .filter(|c| c.enabled)
            .filter_map(|c| match data.get(&c.timeframe) {
                Some(frame) => Some((c, frame)),
                None => {
                    warn!(timeframe = %c.timeframe, "no frame for timeframe, skipped");
                    None
                }
            })
            .collect();

        self.pool.install(|| {
            units
                .par_iter()
                .map(|(config, frame)| {
                    let out = work(&config.timeframe, frame, &config.indicators)
                        .with_context(|| format!("timeframe {} failed", config.timeframe))?;
                    Ok((config.timeframe.clone(), out))
                })
                .collect::<Result<Vec<(String, T)>>>()
        })
    }

    /// Compute one output frame per timeframe; first error aborts the batch.
    pub fn process<F>(
        &self,
        data: &HashMap<String, OhlcvFrame>,
        configs: &[TimeframeIndicatorConfig],
        work: F,
    ) -> Result<HashMap<String, OhlcvFrame>>
    where
        F: Fn(&str, &OhlcvFrame, &[IndicatorRequest]) -> Result<OhlcvFrame> + Sync,
    {
        Ok(self.map(data, configs, work)?.into_iter().collect())
    }
}
