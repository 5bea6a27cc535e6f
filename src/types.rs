// =============================================================================
// Shared types used across the indicator pipeline
// =============================================================================
//
// Value objects exchanged between the configuration handler, the resilient
// processor, the execution strategies, and the top-level pipeline.  All are
// plain data: cloneable, serializable, and owned by whoever produced them.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Strategy enums
// =============================================================================

/// Policy for adapting an infeasible indicator request to the available data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Drop the infeasible request entirely.
    Skip,
    /// Shrink period-like parameters until the request fits.
    ReducePeriod,
    /// Alias of `ReducePeriod` — true data padding is not implemented.
    PadData,
    /// Keep the request unchanged; the issue is still recorded.
    WarnAndContinue,
}

impl Default for FallbackStrategy {
    fn default() -> Self {
        Self::ReducePeriod
    }
}

impl std::fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::ReducePeriod => write!(f, "reduce_period"),
            Self::PadData => write!(f, "pad_data"),
            Self::WarnAndContinue => write!(f, "warn_and_continue"),
        }
    }
}

impl FromStr for FallbackStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(Self::Skip),
            "reduce_period" => Ok(Self::ReducePeriod),
            "pad_data" => Ok(Self::PadData),
            "warn_and_continue" => Ok(Self::WarnAndContinue),
            other => Err(anyhow::anyhow!("unknown fallback strategy: {other}")),
        }
    }
}

/// Policy for handling a computation failure during indicator execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Propagate the failure immediately; the batch aborts.
    FailFast,
    /// Give up on the failing timeframe only.
    SkipTimeframe,
    /// Try dropping one indicator at a time until computation succeeds.
    SkipIndicator,
    /// Replace all requested indicators with deterministic fallback columns.
    UseFallback,
    /// Bounded retries only; after exhaustion the timeframe is skipped.
    Retry,
    /// Compute each indicator in isolation and keep whatever succeeds.
    PartialProcessing,
}

impl Default for RecoveryStrategy {
    fn default() -> Self {
        Self::PartialProcessing
    }
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FailFast => write!(f, "fail_fast"),
            Self::SkipTimeframe => write!(f, "skip_timeframe"),
            Self::SkipIndicator => write!(f, "skip_indicator"),
            Self::UseFallback => write!(f, "use_fallback"),
            Self::Retry => write!(f, "retry"),
            Self::PartialProcessing => write!(f, "partial_processing"),
        }
    }
}

impl FromStr for RecoveryStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail_fast" => Ok(Self::FailFast),
            "skip_timeframe" => Ok(Self::SkipTimeframe),
            "skip_indicator" => Ok(Self::SkipIndicator),
            "use_fallback" => Ok(Self::UseFallback),
            "retry" => Ok(Self::Retry),
            "partial_processing" => Ok(Self::PartialProcessing),
            other => Err(anyhow::anyhow!("unknown recovery strategy: {other}")),
        }
    }
}

// =============================================================================
// Requests and per-timeframe configuration
// =============================================================================

/// One declarative indicator request: which computation to run and with what
/// parameters.  Parameters are free-form JSON values; each indicator kind
/// reads the keys it understands and falls back to its defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRequest {
    pub kind: crate::indicators::IndicatorKind,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl IndicatorRequest {
    pub fn new(kind: crate::indicators::IndicatorKind) -> Self {
        Self {
            kind,
            params: BTreeMap::new(),
        }
    }

    /// Builder-style parameter setter used heavily in tests and examples.
    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Read a parameter as `usize`, falling back to `default` when the key is
    /// absent or not an unsigned integer.
    pub fn param_usize(&self, key: &str, default: usize) -> usize {
        self.params
            .get(key)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(default)
    }

    /// Read a parameter as `f64`, falling back to `default`.
    pub fn param_f64(&self, key: &str, default: f64) -> f64 {
        self.params
            .get(key)
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }

    /// Points required from the data before this request can be computed.
    pub fn required_points(&self) -> usize {
        self.kind.required_points(self)
    }

    /// Short human-readable label, e.g. `sma(period=50)`.
    pub fn label(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("{}({})", self.kind, params.join(", "))
    }
}

/// Everything the caller wants computed for one timeframe.
///
/// Immutable once passed in: the configuration handler builds corrected
/// copies rather than mutating the caller's instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeIndicatorConfig {
    pub timeframe: String,
    pub indicators: Vec<IndicatorRequest>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_true() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

impl TimeframeIndicatorConfig {
    pub fn new(timeframe: impl Into<String>, indicators: Vec<IndicatorRequest>) -> Self {
        Self {
            timeframe: timeframe.into(),
            indicators,
            enabled: true,
            weight: 1.0,
        }
    }
}

// =============================================================================
// Derived diagnostics
// =============================================================================

/// How much usable data one timeframe actually has.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataAvailability {
    pub timeframe: String,
    pub total_points: usize,
    /// Bars with a finite close value.
    pub valid_points: usize,
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Category of a configuration problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingData,
    InsufficientData,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingData => write!(f, "missing_data"),
            Self::InsufficientData => write!(f, "insufficient_data"),
        }
    }
}

/// One configuration problem found during validation.  Purely informational;
/// issues never abort a run on their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationIssue {
    pub timeframe: String,
    pub indicator: Option<String>,
    pub kind: IssueKind,
    pub message: String,
    pub suggested_fix: Option<String>,
}

/// Frame shape snapshot embedded in error contexts for post-mortems.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DataInfo {
    pub rows: usize,
    pub indicator_columns: usize,
}

/// Record of one failure and what recovery did about it.
///
/// Created on first failure, updated while recovery runs, then frozen into
/// the batch error report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub timeframe: String,
    pub indicator: Option<String>,
    pub error_type: String,
    pub error_message: String,
    pub timestamp: DateTime<Utc>,
    pub data_info: DataInfo,
    pub recovery_attempted: bool,
    pub recovery_successful: bool,
}

impl ErrorContext {
    pub fn new(timeframe: &str, error_type: &str, message: &str, data_info: DataInfo) -> Self {
        Self {
            timeframe: timeframe.to_string(),
            indicator: None,
            error_type: error_type.to_string(),
            error_message: message.to_string(),
            timestamp: Utc::now(),
            data_info,
            recovery_attempted: false,
            recovery_successful: false,
        }
    }
}

/// Terminal action the resilient processor took for one timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    None,
    Retried,
    SkippedTimeframe,
    SkippedIndicator,
    UsedFallback,
    PartialProcessing,
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Retried => write!(f, "retried"),
            Self::SkippedTimeframe => write!(f, "skipped_timeframe"),
            Self::SkippedIndicator => write!(f, "skipped_indicator"),
            Self::UsedFallback => write!(f, "used_fallback"),
            Self::PartialProcessing => write!(f, "partial_processing"),
        }
    }
}

/// Outcome of processing one timeframe through the resilient processor.
/// Exactly one per timeframe per processing call.
#[derive(Debug, Clone)]
pub struct RecoveryResult {
    pub successful: bool,
    pub frame: Option<crate::frame::OhlcvFrame>,
    pub error_context: Option<ErrorContext>,
    pub recovery_action: RecoveryAction,
    pub message: String,
}

// =============================================================================
// Batch-level reporting
// =============================================================================

/// Processed/total counters for one batch call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessRate {
    pub timeframes_processed: usize,
    pub total_timeframes: usize,
    pub success_percentage: f64,
}

impl SuccessRate {
    pub fn new(processed: usize, total: usize) -> Self {
        let pct = if total == 0 {
            100.0
        } else {
            processed as f64 / total as f64 * 100.0
        };
        Self {
            timeframes_processed: processed,
            total_timeframes: total,
            success_percentage: pct,
        }
    }
}

/// Everything that went wrong (or nearly wrong) during one batch call,
/// returned alongside the output frames.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorReport {
    pub data_quality_issues: HashMap<String, Vec<String>>,
    pub processing_errors: Vec<ErrorContext>,
    pub recovery_actions: HashMap<String, RecoveryAction>,
    pub success_rate: Option<SuccessRate>,
    pub warnings: Vec<String>,
}

/// Observability counters for one batch call.  No behavioral invariants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    pub total_time_ms: u64,
    pub rows_processed: usize,
    pub indicators_computed: usize,
    pub throughput_rows_per_sec: f64,
}
