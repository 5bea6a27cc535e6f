// =============================================================================
// Configuration Handler — feasibility analysis and adaptive correction
// =============================================================================
//
// Decides, before any computation runs, whether each requested indicator can
// be satisfied by the data that is actually available, and adapts the
// configuration when it cannot.  Problems are reported as data
// (`ConfigurationIssue`), never as errors: an infeasible configuration is a
// normal input, not an exceptional one.
//
// Caller-owned configs are read-only; corrections always build new
// `TimeframeIndicatorConfig` instances.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::frame::OhlcvFrame;
use crate::indicators::IndicatorKind;
use crate::types::{
    ConfigurationIssue, DataAvailability, FallbackStrategy, IndicatorRequest, IssueKind,
    TimeframeIndicatorConfig,
};

/// Composed feasibility report for one batch of configs against one data set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeasibilityReport {
    /// True iff no issues were found.
    pub feasible: bool,
    pub availability: HashMap<String, DataAvailability>,
    /// Per-timeframe maximum required points across its requests.
    pub requirements: HashMap<String, usize>,
    pub issues: Vec<ConfigurationIssue>,
    pub recommendations: Vec<String>,
}

/// Analyzes availability and corrects infeasible configurations using one
/// fallback strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigurationHandler {
    pub fallback: FallbackStrategy,
}

impl ConfigurationHandler {
    pub fn new(fallback: FallbackStrategy) -> Self {
        Self { fallback }
    }

    /// Measure how much usable data each timeframe has.  Pure; an empty
    /// frame yields zero counts and no date range.
    pub fn analyze_data_availability(
        data: &HashMap<String, OhlcvFrame>,
    ) -> HashMap<String, DataAvailability> {
        data.iter()
            .map(|(timeframe, frame)| {
                let availability = DataAvailability {
                    timeframe: timeframe.clone(),
                    total_points: frame.len(),
                    valid_points: frame.valid_close_count(),
                    date_range: frame.date_range(),
                };
                (timeframe.clone(), availability)
            })
            .collect()
    }

    /// Check every enabled config against `availability` and build a
    /// corrected config list.
    ///
    /// - A timeframe with no availability entry (or zero data points) gets a
    ///   `MissingData` issue and is dropped from the corrected output.
    /// - A request needing more points than `valid_points` gets an
    ///   `InsufficientData` issue, then the fallback strategy decides whether
    ///   it is dropped, shrunk, or kept as-is.
    /// - Unknown indicator kinds pass through unchanged (with a warning);
    ///   they are never dropped here.
    pub fn validate_configuration(
        &self,
        configs: &[TimeframeIndicatorConfig],
        availability: &HashMap<String, DataAvailability>,
    ) -> (Vec<ConfigurationIssue>, Vec<TimeframeIndicatorConfig>) {
        let mut issues = Vec::new();
        let mut corrected = Vec::new();

        for config in configs {
            if !config.enabled {
                debug!(timeframe = %config.timeframe, "config disabled — skipped");
                continue;
            }

            let avail = availability.get(&config.timeframe);
            let Some(avail) = avail.filter(|a| a.total_points > 0) else {
                issues.push(ConfigurationIssue {
                    timeframe: config.timeframe.clone(),
                    indicator: None,
                    kind: IssueKind::MissingData,
                    message: format!("no data available for timeframe {}", config.timeframe),
                    suggested_fix: Some(format!(
                        "load price bars for {} before requesting indicators on it",
                        config.timeframe
                    )),
                });
                continue;
            };

            let mut kept = Vec::with_capacity(config.indicators.len());
            for request in &config.indicators {
                if let IndicatorKind::Unknown(name) = &request.kind {
                    warn!(
                        timeframe = %config.timeframe,
                        indicator = %name,
                        "unknown indicator kind — passed through unchanged"
                    );
                    kept.push(request.clone());
                    continue;
                }

                let required = request.required_points();
                if required <= avail.valid_points {
                    kept.push(request.clone());
                    continue;
                }

                issues.push(ConfigurationIssue {
                    timeframe: config.timeframe.clone(),
                    indicator: Some(request.kind.to_string()),
                    kind: IssueKind::InsufficientData,
                    message: format!(
                        "{} needs {required} points but {} has only {} valid",
                        request.label(),
                        config.timeframe,
                        avail.valid_points
                    ),
                    suggested_fix: Some(format!(
                        "reduce periods to fit {} points or load at least {required} bars",
                        avail.valid_points
                    )),
                });

                match self.fallback {
                    FallbackStrategy::Skip => {
                        debug!(
                            timeframe = %config.timeframe,
                            indicator = %request.kind,
                            "infeasible request skipped"
                        );
                    }
                    FallbackStrategy::WarnAndContinue => kept.push(request.clone()),
                    FallbackStrategy::ReducePeriod | FallbackStrategy::PadData => {
                        if self.fallback == FallbackStrategy::PadData {
                            // Data padding is not implemented; behaves as
                            // reduce_period.
                            warn!(
                                timeframe = %config.timeframe,
                                "pad_data fallback aliases reduce_period"
                            );
                        }
                        let params = request.kind.shrink_params(request, avail.valid_points);
                        kept.push(IndicatorRequest {
                            kind: request.kind.clone(),
                            params,
                        });
                    }
                }
            }

            corrected.push(TimeframeIndicatorConfig {
                timeframe: config.timeframe.clone(),
                indicators: kept,
                enabled: config.enabled,
                weight: config.weight,
            });
        }

        (issues, corrected)
    }

    /// Per-timeframe maximum of `required_points` across requests (0 when a
    /// timeframe has no requests).
    pub fn suggest_minimum_data_requirements(
        configs: &[TimeframeIndicatorConfig],
    ) -> HashMap<String, usize> {
        configs
            .iter()
            .map(|config| {
                let max_required = config
                    .indicators
                    .iter()
                    .map(IndicatorRequest::required_points)
                    .max()
                    .unwrap_or(0);
                (config.timeframe.clone(), max_required)
            })
            .collect()
    }

    /// One-call feasibility check: availability + requirements + issues +
    /// human-readable recommendations.
    pub fn validate_configuration_feasibility(
        &self,
        configs: &[TimeframeIndicatorConfig],
        data: &HashMap<String, OhlcvFrame>,
    ) -> FeasibilityReport {
        let availability = Self::analyze_data_availability(data);
        let requirements = Self::suggest_minimum_data_requirements(configs);
        let (issues, _) = self.validate_configuration(configs, &availability);

        let mut recommendations = Vec::new();
        for (timeframe, &required) in &requirements {
            let valid = availability
                .get(timeframe)
                .map(|a| a.valid_points)
                .unwrap_or(0);
            if required > valid {
                recommendations.push(format!(
                    "{timeframe}: need {required} valid points, have {valid} — \
                     reduce indicator periods or extend the history window"
                ));
            }
        }
        recommendations.sort();

        FeasibilityReport {
            feasible: issues.is_empty(),
            availability,
            requirements,
            issues,
            recommendations,
        }
    }
}
