// =============================================================================
// indicator-pipeline — adaptive multi-timeframe technical indicator engine
// =============================================================================
//
// The crate computes technical indicators over OHLCV data across several
// timeframes at once, and keeps producing output when the inputs are not
// ideal: configurations are checked for feasibility and corrected before
// computing, data-quality defects are detected and repaired, failures run
// through a per-timeframe recovery state machine, and large or wide batches
// are split into chunks or spread across worker threads.
//
// Typical entry points:
//   - `AdaptivePipeline::run` for a full batch with reporting and metrics
//   - `ResilientProcessor` for recovery-wrapped computation alone
//   - `IndicatorEngine::apply` for plain single-frame computation
//   - `IncrementalProcessor::update` for streaming appends

pub mod compute;
pub mod config_handler;
pub mod execution;
pub mod frame;
pub mod indicators;
pub mod pipeline;
pub mod quality;
pub mod resilient;
pub mod types;

pub use compute::IndicatorEngine;
pub use config_handler::{ConfigurationHandler, FeasibilityReport};
pub use execution::{
    ChunkedProcessor, ExecutionPlan, IncrementalProcessor, ParallelProcessor,
};
pub use frame::{Bar, OhlcvFrame};
pub use indicators::IndicatorKind;
pub use pipeline::{AdaptivePipeline, PipelineOutput, PipelineSettings};
pub use quality::{check_data_quality, fix_data_quality_issues, FixOptions};
pub use resilient::{BatchOutcome, RecoveryConfig, ResilientProcessor};
pub use types::{
    ConfigurationIssue, DataAvailability, ErrorContext, ErrorReport, FallbackStrategy,
    IndicatorRequest, IssueKind, ProcessingMetrics, RecoveryAction, RecoveryResult,
    RecoveryStrategy, SuccessRate, TimeframeIndicatorConfig,
};
