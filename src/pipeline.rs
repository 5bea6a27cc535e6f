// =============================================================================
// Adaptive Pipeline — end-to-end orchestration of one processing batch
// =============================================================================
//
// Ties the stages together in order: data-quality check, optional auto-fix,
// availability analysis, configuration validation, execution-plan selection,
// resilient per-timeframe computation, and finally report + metrics assembly.
//
// Every stage hands the next one plain data.  The pipeline itself holds no
// state between calls.

use std::collections::HashMap;
use std::time::Instant;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config_handler::ConfigurationHandler;
use crate::execution::{ChunkedProcessor, ExecutionPlan, ParallelProcessor};
use crate::frame::OhlcvFrame;
use crate::quality::{check_data_quality, fix_data_quality_issues, FixOptions};
use crate::resilient::{BatchOutcome, RecoveryConfig, ResilientProcessor};
use crate::types::{
    ErrorReport, FallbackStrategy, ProcessingMetrics, SuccessRate, TimeframeIndicatorConfig,
};

// -----------------------------------------------------------------------------
// Settings
// -----------------------------------------------------------------------------

fn default_auto_fix() -> bool {
    true
}

/// Everything tunable about one pipeline instance.  All fields have working
/// defaults so `{}` deserializes to a usable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// How the configuration handler corrects infeasible indicator requests.
    pub fallback_strategy: FallbackStrategy,
    /// Recovery policy applied per timeframe during computation.
    pub recovery: RecoveryConfig,
    /// Repair quality findings in place before computing.
    #[serde(default = "default_auto_fix")]
    pub auto_fix_quality: bool,
    pub fix_options: FixOptions,
    /// Chunk geometry used when the plan (or a force flag) enables chunking.
    pub chunking: ChunkedProcessor,
    /// Override automatic chunking selection.
    pub force_chunking: Option<bool>,
    /// Override automatic parallel selection.
    pub force_parallel: Option<bool>,
    /// Worker-thread cap for the parallel path.  `None` sizes from the host.
    pub parallel_workers: Option<usize>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fallback_strategy: FallbackStrategy::default(),
            recovery: RecoveryConfig::default(),
            auto_fix_quality: true,
            fix_options: FixOptions::default(),
            chunking: ChunkedProcessor::default(),
            force_chunking: None,
            force_parallel: None,
            parallel_workers: None,
        }
    }
}

// -----------------------------------------------------------------------------
// Pipeline
// -----------------------------------------------------------------------------

/// Output of one batch run: computed frames plus the full account of what
/// happened while producing them.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub frames: HashMap<String, OhlcvFrame>,
    pub report: ErrorReport,
    pub metrics: ProcessingMetrics,
}

#[derive(Debug, Default)]
pub struct AdaptivePipeline {
    settings: PipelineSettings,
}

impl AdaptivePipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one batch: all enabled configs against their timeframes' frames.
    ///
    /// Per-timeframe failures are absorbed into the report; `Err` surfaces
    /// only for fail-fast recovery or a worker-pool build failure.
    pub fn run(
        &self,
        data: &HashMap<String, OhlcvFrame>,
        configs: &[TimeframeIndicatorConfig],
    ) -> Result<PipelineOutput> {
        let started = Instant::now();

        // Stage 1: quality findings, then optional repair.
        let quality_issues = check_data_quality(data);
        let repaired;
        let data = if self.settings.auto_fix_quality && !quality_issues.is_empty() {
            repaired = fix_data_quality_issues(data, self.settings.fix_options);
            &repaired
        } else {
            data
        };

        // Stage 2: availability + configuration correction.
        let handler = ConfigurationHandler::new(self.settings.fallback_strategy);
        let availability = ConfigurationHandler::analyze_data_availability(data);
        let (issues, corrected) = handler.validate_configuration(configs, &availability);
        let warnings: Vec<String> = issues.iter().map(|issue| issue.message.clone()).collect();

        // Stage 3: pick an execution plan from the corrected workload.
        let total_rows: usize = corrected
            .iter()
            .filter_map(|config| data.get(&config.timeframe))
            .map(|frame| frame.len())
            .sum();
        let plan = ExecutionPlan::select(
            total_rows,
            corrected.len(),
            self.settings.force_chunking,
            self.settings.force_parallel,
        );

        // Stage 4: resilient computation, serial or across timeframes.
        let mut processor = ResilientProcessor::new(self.settings.recovery.clone());
        if plan.use_chunking {
            processor = processor.with_chunking(self.settings.chunking);
        }
        let outcome = if plan.use_parallel {
            let pool = ParallelProcessor::new(self.settings.parallel_workers)?;
            let results = pool.map(data, &corrected, |timeframe, frame, requests| {
                processor.process_timeframe(timeframe, frame, requests)
            })?;
            let mut outcome = BatchOutcome::default();
            for (timeframe, result) in results {
                outcome.actions.insert(timeframe.clone(), result.recovery_action);
                if result.successful {
                    if let Some(frame) = result.frame {
                        outcome.frames.insert(timeframe, frame);
                    }
                } else if let Some(ctx) = result.error_context {
                    outcome.errors.push(ctx);
                }
            }
            outcome
        } else {
            processor.process_with_recovery(data, &corrected)?
        };

        // Stage 5: report and metrics.
        let enabled_total = configs.iter().filter(|config| config.enabled).count();
        let rows_processed: usize = outcome.frames.values().map(|frame| frame.len()).sum();
        let indicators_computed: usize = outcome
            .frames
            .values()
            .map(|frame| frame.column_count())
            .sum();
        let elapsed = started.elapsed();
        let secs = elapsed.as_secs_f64();
        let metrics = ProcessingMetrics {
            total_time_ms: elapsed.as_millis() as u64,
            rows_processed,
            indicators_computed,
            throughput_rows_per_sec: if secs > 0.0 {
                rows_processed as f64 / secs
            } else {
                0.0
            },
        };
        let report = ErrorReport {
            data_quality_issues: quality_issues,
            processing_errors: outcome.errors,
            recovery_actions: outcome.actions,
            success_rate: Some(SuccessRate::new(outcome.frames.len(), enabled_total)),
            warnings,
        };
        info!(
            timeframes = outcome.frames.len(),
            enabled = enabled_total,
            rows = rows_processed,
            ms = metrics.total_time_ms,
            "pipeline batch complete"
        );

        Ok(PipelineOutput {
            frames: outcome.frames,
            report,
            metrics,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::ramp_frame;
    use crate::indicators::IndicatorKind;
    use crate::types::IndicatorRequest;

    /// Route batch logs through the test harness; `RUST_LOG` controls the
    /// filter as usual.
    fn init_logging() {
        use tracing_subscriber::EnvFilter;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    }

    fn sma(period: usize) -> IndicatorRequest {
        IndicatorRequest::new(IndicatorKind::Sma).with_param("period", period as u64)
    }

    fn batch() -> HashMap<String, OhlcvFrame> {
        let mut data = HashMap::new();
        data.insert("1h".to_string(), ramp_frame(120));
        data.insert("1d".to_string(), OhlcvFrame::new());
        data
    }

    #[test]
    fn end_to_end_partial_success() {
        init_logging();
        let data = batch();
        let configs = vec![
            TimeframeIndicatorConfig::new("1h", vec![sma(10)]),
            TimeframeIndicatorConfig::new("1d", vec![sma(5)]),
        ];

        let out = AdaptivePipeline::default().run(&data, &configs).unwrap();

        let frame = out.frames.get("1h").unwrap();
        assert!(frame.column("sma_10_1h").is_some());
        assert!(!out.frames.contains_key("1d"));

        let rate = out.report.success_rate.unwrap();
        assert_eq!(rate.timeframes_processed, 1);
        assert_eq!(rate.total_timeframes, 2);
        assert!(!out.report.warnings.is_empty());
        assert_eq!(out.metrics.rows_processed, 120);
        assert!(out.metrics.indicators_computed >= 1);
    }

    #[test]
    fn infeasible_period_is_corrected_before_computing() {
        let mut data = HashMap::new();
        data.insert("1h".to_string(), ramp_frame(30));
        let configs = vec![TimeframeIndicatorConfig::new("1h", vec![sma(50)])];

        let out = AdaptivePipeline::default().run(&data, &configs).unwrap();

        let frame = out.frames.get("1h").unwrap();
        assert_eq!(frame.column_count(), 1);
        let names = frame.column_names();
        assert!(names[0].starts_with("sma_") && names[0].ends_with("_1h"));
        assert!(!out.report.warnings.is_empty());
    }

    #[test]
    fn forced_parallel_path_matches_serial() {
        let data = batch();
        let configs = vec![TimeframeIndicatorConfig::new("1h", vec![sma(10)])];

        let serial = AdaptivePipeline::default().run(&data, &configs).unwrap();

        let settings = PipelineSettings {
            force_parallel: Some(true),
            parallel_workers: Some(2),
            ..Default::default()
        };
        let parallel = AdaptivePipeline::new(settings).run(&data, &configs).unwrap();

        let a = serial.frames.get("1h").unwrap();
        let b = parallel.frames.get("1h").unwrap();
        assert_eq!(a.column_names(), b.column_names());
        let left = a.column("sma_10_1h").unwrap();
        let right = b.column("sma_10_1h").unwrap();
        assert_eq!(left.len(), right.len());
        for (x, y) in left.iter().zip(right) {
            assert!((x.is_nan() && y.is_nan()) || x == y);
        }
    }

    #[test]
    fn forced_chunking_preserves_row_count() {
        let mut data = HashMap::new();
        data.insert("1h".to_string(), ramp_frame(250));
        let configs = vec![TimeframeIndicatorConfig::new("1h", vec![sma(10)])];

        let settings = PipelineSettings {
            force_chunking: Some(true),
            chunking: ChunkedProcessor::new(64, 16),
            ..Default::default()
        };
        let out = AdaptivePipeline::new(settings).run(&data, &configs).unwrap();

        assert_eq!(out.frames.get("1h").unwrap().len(), 250);
    }

    #[test]
    fn auto_fix_repairs_gaps_before_computing() {
        let mut frame = ramp_frame(40);
        frame.close[5] = f64::NAN;
        frame.close[6] = f64::NAN;
        let mut data = HashMap::new();
        data.insert("1h".to_string(), frame);
        let configs = vec![TimeframeIndicatorConfig::new("1h", vec![sma(10)])];

        let out = AdaptivePipeline::default().run(&data, &configs).unwrap();

        assert!(out.report.data_quality_issues.contains_key("1h"));
        let column = out.frames.get("1h").unwrap().column("sma_10_1h").unwrap();
        assert!(column.iter().skip(9).all(|v| v.is_finite()));
    }

    #[test]
    fn settings_deserialize_from_empty_object() {
        let settings: PipelineSettings = serde_json::from_str("{}").unwrap();
        assert!(settings.auto_fix_quality);
        assert!(settings.force_chunking.is_none());
        assert_eq!(
            settings.fallback_strategy,
            FallbackStrategy::ReducePeriod
        );
    }
}
