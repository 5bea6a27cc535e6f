// =============================================================================
// Resilient Processor — per-timeframe failure recovery state machine
// =============================================================================
//
// Wraps the indicator computation unit with a configurable recovery policy.
// Per timeframe the machine runs: attempt -> bounded retries -> strategy
// dispatch -> terminal result.  Exactly one `RecoveryResult` comes out per
// timeframe, and nothing is ever raised to the caller except the deliberate
// fail-fast propagation.
//
// No frame data ever crosses from one timeframe's recovery to another's.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::compute::{standardize_column_names, IndicatorEngine};
use crate::execution::ChunkedProcessor;
use crate::frame::OhlcvFrame;
use crate::indicators::sma::calculate_sma;
use crate::types::{
    DataInfo, ErrorContext, IndicatorRequest, RecoveryAction, RecoveryResult, RecoveryStrategy,
    TimeframeIndicatorConfig,
};

/// Rolling-average window used by the fallback columns (capped by row count).
const FALLBACK_SMA_WINDOW: usize = 10;

/// Recovery policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    pub strategy: RecoveryStrategy,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            strategy: RecoveryStrategy::default(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Outcome of a whole batch run through the resilient processor.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub frames: HashMap<String, OhlcvFrame>,
    pub errors: Vec<ErrorContext>,
    pub actions: HashMap<String, RecoveryAction>,
}

/// The resilient wrapper itself.  Stateless between calls.
#[derive(Debug, Clone, Default)]
pub struct ResilientProcessor {
    engine: IndicatorEngine,
    config: RecoveryConfig,
    chunking: Option<ChunkedProcessor>,
}

impl ResilientProcessor {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            engine: IndicatorEngine::new(),
            config,
            chunking: None,
        }
    }

    /// Route every unit invocation through the chunked processor, so large
    /// frames stay within bounded memory even during recovery attempts.
    pub fn with_chunking(mut self, chunking: ChunkedProcessor) -> Self {
        self.chunking = Some(chunking);
        self
    }

    pub fn strategy(&self) -> RecoveryStrategy {
        self.config.strategy
    }

    /// One unit invocation: chunked when configured, plain otherwise.
    fn run_unit(
        &self,
        timeframe: &str,
        frame: &OhlcvFrame,
        requests: &[IndicatorRequest],
    ) -> Result<OhlcvFrame> {
        match &self.chunking {
            Some(chunking) => chunking.process(&self.engine, frame, requests, timeframe),
            None => self.engine.apply(frame, requests, timeframe),
        }
    }

    /// Process every enabled config against its timeframe's frame.
    ///
    /// Successful frames are collected into the outcome map; every
    /// non-success becomes an `ErrorContext`.  Returns `Err` only under
    /// `FailFast`.
    pub fn process_with_recovery(
        &self,
        data: &HashMap<String, OhlcvFrame>,
        configs: &[TimeframeIndicatorConfig],
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for config in configs {
            if !config.enabled {
                continue;
            }
            let Some(frame) = data.get(&config.timeframe) else {
                outcome.errors.push(ErrorContext::new(
                    &config.timeframe,
                    "missing_data",
                    "no frame supplied for timeframe",
                    DataInfo::default(),
                ));
                continue;
            };

            let result = self
                .process_timeframe(&config.timeframe, frame, &config.indicators)
                .with_context(|| format!("timeframe {} failed", config.timeframe))?;

            outcome
                .actions
                .insert(config.timeframe.clone(), result.recovery_action);
            if result.successful {
                if let Some(frame) = result.frame {
                    outcome.frames.insert(config.timeframe.clone(), frame);
                }
            } else if let Some(ctx) = result.error_context {
                outcome.errors.push(ctx);
            }
        }

        Ok(outcome)
    }

    /// Run the recovery state machine for one timeframe.
    ///
    /// Returns `Err` only when the strategy is `FailFast` and every attempt
    /// failed; in all other cases the outcome is a `RecoveryResult`.
    pub fn process_timeframe(
        &self,
        timeframe: &str,
        frame: &OhlcvFrame,
        requests: &[IndicatorRequest],
    ) -> Result<RecoveryResult> {
        let data_info = DataInfo {
            rows: frame.len(),
            indicator_columns: frame.column_count(),
        };

        // --- Attempt + bounded retries ---------------------------------------
        let mut last_ctx = match self.run_unit(timeframe, frame, requests) {
            Ok(out) => {
                return Ok(RecoveryResult {
                    successful: true,
                    frame: Some(out),
                    error_context: None,
                    recovery_action: RecoveryAction::None,
                    message: "computed without recovery".to_string(),
                })
            }
            Err(e) => ErrorContext::new(timeframe, "computation", &format!("{e:#}"), data_info),
        };

        for attempt in 1..=self.config.max_retries {
            std::thread::sleep(Duration::from_millis(self.config.retry_delay_ms));
            debug!(timeframe, attempt, "retrying indicator computation");
            match self.run_unit(timeframe, frame, requests) {
                Ok(out) => {
                    last_ctx.recovery_attempted = true;
                    last_ctx.recovery_successful = true;
                    return Ok(RecoveryResult {
                        successful: true,
                        frame: Some(out),
                        error_context: Some(last_ctx),
                        recovery_action: RecoveryAction::Retried,
                        message: format!("succeeded on retry {attempt}"),
                    });
                }
                Err(e) => {
                    last_ctx =
                        ErrorContext::new(timeframe, "computation", &format!("{e:#}"), data_info);
                    last_ctx.recovery_attempted = true;
                }
            }
        }

        warn!(
            timeframe,
            strategy = %self.config.strategy,
            error = %last_ctx.error_message,
            "retries exhausted — dispatching recovery strategy"
        );

        // --- Strategy dispatch ------------------------------------------------
        match self.config.strategy {
            RecoveryStrategy::FailFast => Err(anyhow::anyhow!(
                "computation failed after {} retries: {}",
                self.config.max_retries,
                last_ctx.error_message
            )),
            RecoveryStrategy::SkipTimeframe | RecoveryStrategy::Retry => {
                Ok(self.terminal_failure(timeframe, last_ctx, self.config.strategy))
            }
            RecoveryStrategy::SkipIndicator => {
                Ok(self.recover_skip_indicator(timeframe, frame, requests, last_ctx))
            }
            RecoveryStrategy::PartialProcessing => {
                Ok(self.recover_partial(timeframe, frame, requests, last_ctx))
            }
            RecoveryStrategy::UseFallback => {
                Ok(self.recover_fallback(timeframe, frame, last_ctx))
            }
        }
    }

    fn terminal_failure(
        &self,
        timeframe: &str,
        mut ctx: ErrorContext,
        strategy: RecoveryStrategy,
    ) -> RecoveryResult {
        ctx.recovery_successful = false;
        let action = if strategy == RecoveryStrategy::Retry {
            RecoveryAction::Retried
        } else {
            RecoveryAction::SkippedTimeframe
        };
        info!(timeframe, %action, "timeframe abandoned after recovery");
        RecoveryResult {
            successful: false,
            frame: None,
            error_context: Some(ctx),
            recovery_action: action,
            message: format!("timeframe {timeframe} skipped after exhausting recovery"),
        }
    }

    /// Remove one request at a time; the first single removal that makes the
    /// full computation succeed wins.  Falls through to partial processing
    /// when no single removal helps.
    fn recover_skip_indicator(
        &self,
        timeframe: &str,
        frame: &OhlcvFrame,
        requests: &[IndicatorRequest],
        mut ctx: ErrorContext,
    ) -> RecoveryResult {
        if requests.len() > 1 {
            for skip_index in 0..requests.len() {
                let subset: Vec<IndicatorRequest> = requests
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != skip_index)
                    .map(|(_, r)| r.clone())
                    .collect();

                if let Ok(out) = self.run_unit(timeframe, frame, &subset) {
                    let removed = &requests[skip_index];
                    ctx.recovery_attempted = true;
                    ctx.recovery_successful = true;
                    ctx.indicator = Some(removed.kind.to_string());
                    info!(
                        timeframe,
                        removed = %removed.label(),
                        "computation recovered by skipping one indicator"
                    );
                    return RecoveryResult {
                        successful: true,
                        frame: Some(out),
                        error_context: Some(ctx),
                        recovery_action: RecoveryAction::SkippedIndicator,
                        message: format!("recovered by removing {}", removed.label()),
                    };
                }
            }
        }
        self.recover_partial(timeframe, frame, requests, ctx)
    }

    /// Compute each request in isolation and keep the union of whatever
    /// succeeds.  Falls through to the deterministic fallback columns when
    /// nothing succeeds.
    fn recover_partial(
        &self,
        timeframe: &str,
        frame: &OhlcvFrame,
        requests: &[IndicatorRequest],
        mut ctx: ErrorContext,
    ) -> RecoveryResult {
        let mut out = frame.clone();
        let mut kept = 0usize;
        let mut failed = 0usize;

        for request in requests {
            match self.run_unit(timeframe, frame, std::slice::from_ref(request)) {
                Ok(partial) => {
                    for name in partial.column_names() {
                        if let Some(values) = partial.column(name) {
                            out.set_column(name.to_string(), values.to_vec());
                        }
                    }
                    kept += 1;
                }
                Err(e) => {
                    debug!(timeframe, request = %request.label(), error = %format!("{e:#}"), "partial processing: request failed");
                    failed += 1;
                }
            }
        }

        if kept > 0 {
            ctx.recovery_attempted = true;
            ctx.recovery_successful = true;
            info!(timeframe, kept, failed, "partial processing recovered");
            return RecoveryResult {
                successful: true,
                frame: Some(out),
                error_context: Some(ctx),
                recovery_action: RecoveryAction::PartialProcessing,
                message: format!("partial processing kept {kept} of {} requests", kept + failed),
            };
        }
        self.recover_fallback(timeframe, frame, ctx)
    }

    /// Discard the requested indicators and synthesize two deterministic
    /// columns from close alone: a short rolling average and a simple
    /// momentum.  Succeeds whenever the frame is non-empty.
    fn recover_fallback(
        &self,
        timeframe: &str,
        frame: &OhlcvFrame,
        mut ctx: ErrorContext,
    ) -> RecoveryResult {
        if frame.is_empty() {
            ctx.recovery_attempted = true;
            ctx.recovery_successful = false;
            return RecoveryResult {
                successful: false,
                frame: None,
                error_context: Some(ctx),
                recovery_action: RecoveryAction::UsedFallback,
                message: "fallback impossible on an empty frame".to_string(),
            };
        }

        let window = FALLBACK_SMA_WINDOW.min(frame.len());
        let rolling = calculate_sma(&frame.close, window);

        let mut momentum = Vec::with_capacity(frame.len());
        momentum.push(0.0);
        for w in frame.close.windows(2) {
            let pct = if w[0] != 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 };
            momentum.push(if pct.is_finite() { pct } else { 0.0 });
        }

        let mut out = frame.clone();
        out.set_column("fallback_sma", rolling);
        out.set_column("fallback_momentum", momentum);
        standardize_column_names(&mut out, timeframe);

        ctx.recovery_attempted = true;
        ctx.recovery_successful = true;
        info!(timeframe, window, "fallback columns synthesized");
        RecoveryResult {
            successful: true,
            frame: Some(out),
            error_context: Some(ctx),
            recovery_action: RecoveryAction::UsedFallback,
            message: "replaced requested indicators with fallback columns".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::ramp_frame;
    use crate::indicators::IndicatorKind;

    fn processor(strategy: RecoveryStrategy) -> ResilientProcessor {
        ResilientProcessor::new(RecoveryConfig {
            strategy,
            max_retries: 1,
            retry_delay_ms: 0,
        })
    }

    fn good_request() -> IndicatorRequest {
        IndicatorRequest::new(IndicatorKind::Sma).with_param("period", 5)
    }

    fn bad_request() -> IndicatorRequest {
        IndicatorRequest::new(IndicatorKind::Sma).with_param("period", 500)
    }

    #[test]
    fn success_needs_no_recovery() {
        let result = processor(RecoveryStrategy::SkipTimeframe)
            .process_timeframe("1h", &ramp_frame(30), &[good_request()])
            .unwrap();
        assert!(result.successful);
        assert_eq!(result.recovery_action, RecoveryAction::None);
        assert!(result.error_context.is_none());
        assert!(result.frame.unwrap().column("sma_5_1h").is_some());
    }

    #[test]
    fn skip_timeframe_is_terminal_failure() {
        let result = processor(RecoveryStrategy::SkipTimeframe)
            .process_timeframe("1h", &ramp_frame(30), &[bad_request()])
            .unwrap();
        assert!(!result.successful);
        assert!(result.frame.is_none());
        let ctx = result.error_context.unwrap();
        assert!(ctx.recovery_attempted);
        assert!(!ctx.recovery_successful);
        assert_eq!(ctx.data_info.rows, 30);
    }

    #[test]
    fn skip_indicator_removes_the_offender() {
        let result = processor(RecoveryStrategy::SkipIndicator)
            .process_timeframe("1h", &ramp_frame(30), &[good_request(), bad_request()])
            .unwrap();
        assert!(result.successful);
        assert_eq!(result.recovery_action, RecoveryAction::SkippedIndicator);
        let frame = result.frame.unwrap();
        assert!(frame.column("sma_5_1h").is_some());
        assert!(frame.column("sma_500_1h").is_none());
        assert_eq!(result.error_context.unwrap().indicator.as_deref(), Some("sma"));
    }

    #[test]
    fn skip_indicator_falls_through_to_partial() {
        // Two bad requests: no single removal can succeed, but partial
        // processing of zero requests then falls to fallback columns.
        let result = processor(RecoveryStrategy::SkipIndicator)
            .process_timeframe("1h", &ramp_frame(30), &[bad_request(), bad_request()])
            .unwrap();
        assert!(result.successful);
        assert_eq!(result.recovery_action, RecoveryAction::UsedFallback);
    }

    #[test]
    fn partial_processing_keeps_the_union() {
        let requests = vec![
            good_request(),
            bad_request(),
            IndicatorRequest::new(IndicatorKind::Ema).with_param("period", 5),
        ];
        let result = processor(RecoveryStrategy::PartialProcessing)
            .process_timeframe("1h", &ramp_frame(30), &requests)
            .unwrap();
        assert!(result.successful);
        assert_eq!(result.recovery_action, RecoveryAction::PartialProcessing);
        let frame = result.frame.unwrap();
        assert!(frame.column("sma_5_1h").is_some());
        assert!(frame.column("ema_5_1h").is_some());
        assert!(frame.column("sma_500_1h").is_none());
    }

    #[test]
    fn fallback_produces_exactly_two_suffixed_columns() {
        // No indicator computable: exactly a short rolling average and a
        // momentum column come out, both timeframe-suffixed.
        let result = processor(RecoveryStrategy::UseFallback)
            .process_timeframe("4h", &ramp_frame(30), &[bad_request()])
            .unwrap();
        assert!(result.successful);
        let frame = result.frame.unwrap();
        assert_eq!(
            frame.column_names(),
            vec!["fallback_sma_4h", "fallback_momentum_4h"]
        );
        let momentum = frame.column("fallback_momentum_4h").unwrap();
        assert_eq!(momentum.len(), 30);
        assert!((momentum[0] - 0.0).abs() < 1e-12);
        assert!(momentum.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn fallback_on_empty_frame_fails_cleanly() {
        let result = processor(RecoveryStrategy::UseFallback)
            .process_timeframe("1h", &OhlcvFrame::new(), &[bad_request()])
            .unwrap();
        assert!(!result.successful);
        assert_eq!(result.recovery_action, RecoveryAction::UsedFallback);
    }

    #[test]
    fn fail_fast_propagates() {
        let err = processor(RecoveryStrategy::FailFast)
            .process_timeframe("1h", &ramp_frame(30), &[bad_request()])
            .unwrap_err();
        assert!(err.to_string().contains("failed after 1 retries"));
    }

    #[test]
    fn every_non_fail_fast_strategy_terminates() {
        for strategy in [
            RecoveryStrategy::SkipTimeframe,
            RecoveryStrategy::SkipIndicator,
            RecoveryStrategy::UseFallback,
            RecoveryStrategy::Retry,
            RecoveryStrategy::PartialProcessing,
        ] {
            let result = processor(strategy)
                .process_timeframe("1h", &ramp_frame(20), &[bad_request()]);
            assert!(result.is_ok(), "{strategy} raised");
        }
    }

    #[test]
    fn batch_collects_partial_success() {
        let data = HashMap::from([
            ("1h".to_string(), ramp_frame(30)),
            ("4h".to_string(), ramp_frame(3)),
        ]);
        let configs = vec![
            TimeframeIndicatorConfig::new("1h", vec![good_request()]),
            TimeframeIndicatorConfig::new("4h", vec![bad_request()]),
            TimeframeIndicatorConfig::new("1d", vec![good_request()]),
        ];

        let outcome = processor(RecoveryStrategy::SkipTimeframe)
            .process_with_recovery(&data, &configs)
            .unwrap();
        assert_eq!(outcome.frames.len(), 1);
        assert!(outcome.frames.contains_key("1h"));
        // One computation failure plus one missing-data context.
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors.iter().any(|e| e.error_type == "missing_data"));
    }

    #[test]
    fn batch_fail_fast_aborts() {
        let data = HashMap::from([("1h".to_string(), ramp_frame(3))]);
        let configs = vec![TimeframeIndicatorConfig::new("1h", vec![bad_request()])];
        assert!(processor(RecoveryStrategy::FailFast)
            .process_with_recovery(&data, &configs)
            .is_err());
    }
}
