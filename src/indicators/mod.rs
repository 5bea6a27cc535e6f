// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicator math, plus the
// `IndicatorKind` dispatch table the rest of the pipeline works through.
//
// Every series function is tail-aligned: a result of length L describes the
// last L bars of its input, so shorter-than-input series can be left-padded
// with NaN when they become frame columns.
//
// `IndicatorKind` is a closed enum.  Each known kind carries its own
// data-requirement formula and period-shrink formula so feasibility analysis
// never has to string-match on indicator names.  `Unknown` requests pass
// through validation untouched and compute nothing.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod roc;
pub mod rsi;
pub mod sma;

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::frame::OhlcvFrame;
use crate::types::IndicatorRequest;

/// Closed set of indicator computations the pipeline knows how to run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
    Macd,
    Bollinger,
    Atr,
    Roc,
    /// A kind this pipeline has no computation for.  Carried through
    /// validation unchanged, never dropped, computes no columns.
    #[serde(untagged)]
    Unknown(String),
}

impl std::fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sma => write!(f, "sma"),
            Self::Ema => write!(f, "ema"),
            Self::Rsi => write!(f, "rsi"),
            Self::Macd => write!(f, "macd"),
            Self::Bollinger => write!(f, "bollinger"),
            Self::Atr => write!(f, "atr"),
            Self::Roc => write!(f, "roc"),
            Self::Unknown(name) => write!(f, "{name}"),
        }
    }
}

/// Static data requirements for one indicator kind.
///
/// Invariant: `minimum_data_points <= recommended_data_points` when the
/// latter is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorRequirement {
    pub minimum_data_points: usize,
    pub recommended_data_points: Option<usize>,
    pub default_params: BTreeMap<String, Value>,
    pub fallback_params: BTreeMap<String, Value>,
}

fn params(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

impl IndicatorKind {
    /// Static requirement table entry for this kind (computed with default
    /// parameters).  `Unknown` kinds require nothing.
    pub fn requirement(&self) -> IndicatorRequirement {
        match self {
            Self::Sma | Self::Ema => IndicatorRequirement {
                minimum_data_points: 20,
                recommended_data_points: Some(60),
                default_params: params(&[("period", json!(20))]),
                fallback_params: params(&[("period", json!(5))]),
            },
            Self::Rsi => IndicatorRequirement {
                minimum_data_points: 15,
                recommended_data_points: Some(50),
                default_params: params(&[("period", json!(14))]),
                fallback_params: params(&[("period", json!(7))]),
            },
            Self::Macd => IndicatorRequirement {
                minimum_data_points: 45,
                recommended_data_points: Some(90),
                default_params: params(&[
                    ("fast_period", json!(12)),
                    ("slow_period", json!(26)),
                    ("signal_period", json!(9)),
                ]),
                fallback_params: params(&[
                    ("fast_period", json!(5)),
                    ("slow_period", json!(10)),
                    ("signal_period", json!(3)),
                ]),
            },
            Self::Bollinger => IndicatorRequirement {
                minimum_data_points: 20,
                recommended_data_points: Some(60),
                default_params: params(&[("period", json!(20)), ("num_std", json!(2.0))]),
                fallback_params: params(&[("period", json!(10)), ("num_std", json!(2.0))]),
            },
            Self::Atr => IndicatorRequirement {
                minimum_data_points: 15,
                recommended_data_points: Some(50),
                default_params: params(&[("period", json!(14))]),
                fallback_params: params(&[("period", json!(7))]),
            },
            Self::Roc => IndicatorRequirement {
                minimum_data_points: 11,
                recommended_data_points: Some(30),
                default_params: params(&[("period", json!(10))]),
                fallback_params: params(&[("period", json!(5))]),
            },
            Self::Unknown(_) => IndicatorRequirement {
                minimum_data_points: 0,
                recommended_data_points: None,
                default_params: BTreeMap::new(),
                fallback_params: BTreeMap::new(),
            },
        }
    }

    /// Data points required before `request` can produce a single value.
    ///
    /// Per-kind formulas: plain period for the moving averages and bands,
    /// `period + 1` for the delta-based kinds (RSI, ATR, ROC all consume one
    /// bar of history per value), and `slow + signal + 10` for the dual-EMA
    /// pair so the signal line gets a usable warm-up.
    pub fn required_points(&self, request: &IndicatorRequest) -> usize {
        match self {
            Self::Sma | Self::Ema => request.param_usize("period", 20),
            Self::Bollinger => request.param_usize("period", 20),
            Self::Rsi => request.param_usize("period", 14) + 1,
            Self::Atr => request.param_usize("period", 14) + 1,
            Self::Roc => request.param_usize("period", 10) + 1,
            Self::Macd => {
                let slow = request.param_usize("slow_period", 26);
                let signal = request.param_usize("signal_period", 9);
                slow + signal + 10
            }
            Self::Unknown(_) => 0,
        }
    }

    /// Shrink period-like parameters so the request fits `valid_points`
    /// (with one bar of margin), never going below the kind's floor (1 for
    /// plain averages, 2 for the oscillator-style kinds).  Non-period
    /// parameters are preserved.
    ///
    /// The result is a fresh parameter map; the original request is never
    /// mutated.
    pub fn shrink_params(
        &self,
        request: &IndicatorRequest,
        valid_points: usize,
    ) -> BTreeMap<String, Value> {
        let mut out = request.params.clone();
        match self {
            Self::Sma | Self::Ema => {
                let period = request.param_usize("period", 20);
                let shrunk = period.min(valid_points.saturating_sub(1)).max(1);
                out.insert("period".into(), json!(shrunk));
            }
            Self::Bollinger => {
                let period = request.param_usize("period", 20);
                let shrunk = period.min(valid_points.saturating_sub(1)).max(2);
                out.insert("period".into(), json!(shrunk));
            }
            Self::Rsi => {
                let period = request.param_usize("period", 14);
                let shrunk = period.min(valid_points.saturating_sub(1)).max(2);
                out.insert("period".into(), json!(shrunk));
            }
            Self::Atr => {
                let period = request.param_usize("period", 14);
                let shrunk = period.min(valid_points.saturating_sub(1)).max(1);
                out.insert("period".into(), json!(shrunk));
            }
            Self::Roc => {
                let period = request.param_usize("period", 10);
                let shrunk = period.min(valid_points.saturating_sub(1)).max(1);
                out.insert("period".into(), json!(shrunk));
            }
            Self::Macd => {
                let fast = request.param_usize("fast_period", 12);
                let slow = request.param_usize("slow_period", 26);
                let signal = request.param_usize("signal_period", 9);

                // Split the post-warm-up budget between slow and signal in
                // their original proportion.
                let budget = valid_points.saturating_sub(10);
                let total = (slow + signal).max(1);
                let new_slow = (budget * slow / total).clamp(3, slow.max(3));
                let new_signal = (budget.saturating_sub(new_slow)).clamp(2, signal.max(2));
                let new_fast = (fast * new_slow / slow.max(1)).clamp(2, new_slow - 1);

                out.insert("fast_period".into(), json!(new_fast));
                out.insert("slow_period".into(), json!(new_slow));
                out.insert("signal_period".into(), json!(new_signal));
            }
            Self::Unknown(_) => {}
        }
        out
    }
}

/// Compute the columns for one request against one frame.
///
/// Returns `(column_name, tail-aligned values)` pairs; the caller is
/// responsible for padding and appending them to the frame.  Unknown kinds
/// log a warning and produce no columns.
pub fn compute_request(
    request: &IndicatorRequest,
    frame: &OhlcvFrame,
) -> Result<Vec<(String, Vec<f64>)>> {
    if frame.is_empty() {
        bail!("{}: cannot compute on an empty frame", request.kind);
    }

    match &request.kind {
        IndicatorKind::Sma => {
            let period = request.param_usize("period", 20);
            let series = sma::calculate_sma(&frame.close, period);
            if series.is_empty() {
                bail!(
                    "sma(period={period}): need {period} closes, have {}",
                    frame.len()
                );
            }
            Ok(vec![(format!("sma_{period}"), series)])
        }
        IndicatorKind::Ema => {
            let period = request.param_usize("period", 20);
            let series = ema::calculate_ema(&frame.close, period);
            if series.is_empty() {
                bail!(
                    "ema(period={period}): need {period} closes, have {}",
                    frame.len()
                );
            }
            Ok(vec![(format!("ema_{period}"), series)])
        }
        IndicatorKind::Rsi => {
            let period = request.param_usize("period", 14);
            let series = rsi::calculate_rsi(&frame.close, period);
            if series.is_empty() {
                bail!(
                    "rsi(period={period}): need {} closes, have {}",
                    period + 1,
                    frame.len()
                );
            }
            Ok(vec![(format!("rsi_{period}"), series)])
        }
        IndicatorKind::Macd => {
            let fast = request.param_usize("fast_period", 12);
            let slow = request.param_usize("slow_period", 26);
            let signal = request.param_usize("signal_period", 9);
            let Some(series) = macd::calculate_macd(&frame.close, fast, slow, signal) else {
                bail!(
                    "macd(fast={fast}, slow={slow}, signal={signal}): \
                     degenerate periods or too few closes ({})",
                    frame.len()
                );
            };
            Ok(vec![
                (format!("macd_{fast}_{slow}"), series.macd),
                (format!("macd_signal_{fast}_{slow}_{signal}"), series.signal),
                (format!("macd_hist_{fast}_{slow}_{signal}"), series.histogram),
            ])
        }
        IndicatorKind::Bollinger => {
            let period = request.param_usize("period", 20);
            let num_std = request.param_f64("num_std", 2.0);
            let Some(bands) = bollinger::calculate_bollinger(&frame.close, period, num_std) else {
                bail!(
                    "bollinger(period={period}): need {period} closes, have {}",
                    frame.len()
                );
            };
            Ok(vec![
                (format!("bb_upper_{period}"), bands.upper),
                (format!("bb_middle_{period}"), bands.middle),
                (format!("bb_lower_{period}"), bands.lower),
            ])
        }
        IndicatorKind::Atr => {
            let period = request.param_usize("period", 14);
            let series = atr::calculate_atr(&frame.high, &frame.low, &frame.close, period);
            if series.is_empty() {
                bail!(
                    "atr(period={period}): need {} bars, have {}",
                    period + 1,
                    frame.len()
                );
            }
            Ok(vec![(format!("atr_{period}"), series)])
        }
        IndicatorKind::Roc => {
            let period = request.param_usize("period", 10);
            let series = roc::calculate_roc(&frame.close, period);
            if series.is_empty() {
                bail!(
                    "roc(period={period}): need {} closes, have {}",
                    period + 1,
                    frame.len()
                );
            }
            Ok(vec![(format!("roc_{period}"), series)])
        }
        IndicatorKind::Unknown(name) => {
            warn!(indicator = %name, "unknown indicator kind — no columns computed");
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::ramp_frame;

    fn req(kind: IndicatorKind) -> IndicatorRequest {
        IndicatorRequest::new(kind)
    }

    #[test]
    fn kind_serde_round_trip() {
        let kinds = vec![
            IndicatorKind::Sma,
            IndicatorKind::Macd,
            IndicatorKind::Unknown("ichimoku".into()),
        ];
        let json = serde_json::to_string(&kinds).unwrap();
        assert_eq!(json, r#"["sma","macd","ichimoku"]"#);
        let back: Vec<IndicatorKind> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kinds);
    }

    #[test]
    fn requirement_invariant_holds_for_all_kinds() {
        for kind in [
            IndicatorKind::Sma,
            IndicatorKind::Ema,
            IndicatorKind::Rsi,
            IndicatorKind::Macd,
            IndicatorKind::Bollinger,
            IndicatorKind::Atr,
            IndicatorKind::Roc,
        ] {
            let r = kind.requirement();
            if let Some(rec) = r.recommended_data_points {
                assert!(r.minimum_data_points <= rec, "{kind}");
            }
        }
    }

    #[test]
    fn required_points_monotonic_in_period() {
        // Requirement must be non-decreasing as the period grows.
        let mut last = 0;
        for period in [1usize, 5, 14, 50, 200] {
            let r = req(IndicatorKind::Sma).with_param("period", period);
            let needed = r.required_points();
            assert!(needed >= last);
            last = needed;
        }
    }

    #[test]
    fn macd_requirement_formula() {
        let r = req(IndicatorKind::Macd)
            .with_param("slow_period", 26)
            .with_param("signal_period", 9);
        assert_eq!(r.required_points(), 26 + 9 + 10);
    }

    #[test]
    fn unknown_requires_nothing() {
        let r = req(IndicatorKind::Unknown("vwap".into()));
        assert_eq!(r.required_points(), 0);
    }

    #[test]
    fn shrink_fits_valid_points() {
        // After shrinking, the recomputed requirement must fit the data.
        for (kind, valid) in [
            (IndicatorKind::Sma, 29usize),
            (IndicatorKind::Ema, 12),
            (IndicatorKind::Rsi, 10),
            (IndicatorKind::Bollinger, 8),
            (IndicatorKind::Atr, 9),
            (IndicatorKind::Roc, 6),
            (IndicatorKind::Macd, 30),
        ] {
            let original = req(kind.clone()).with_param("period", 50);
            let shrunk = IndicatorRequest {
                kind: kind.clone(),
                params: kind.shrink_params(&original, valid),
            };
            assert!(
                shrunk.required_points() <= valid,
                "{kind}: {} > {valid}",
                shrunk.required_points()
            );
            assert!(shrunk.required_points() <= original.required_points().max(valid));
        }
    }

    #[test]
    fn shrink_respects_floors() {
        let original = req(IndicatorKind::Rsi).with_param("period", 14);
        let shrunk = IndicatorKind::Rsi.shrink_params(&original, 1);
        assert_eq!(shrunk.get("period").unwrap().as_u64().unwrap(), 2);

        let original = req(IndicatorKind::Sma).with_param("period", 14);
        let shrunk = IndicatorKind::Sma.shrink_params(&original, 0);
        assert_eq!(shrunk.get("period").unwrap().as_u64().unwrap(), 1);
    }

    #[test]
    fn shrink_preserves_unrelated_params() {
        let original = req(IndicatorKind::Bollinger)
            .with_param("period", 50)
            .with_param("num_std", 2.5);
        let shrunk = IndicatorKind::Bollinger.shrink_params(&original, 10);
        assert!((shrunk.get("num_std").unwrap().as_f64().unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn macd_shrink_keeps_fast_below_slow() {
        let original = req(IndicatorKind::Macd)
            .with_param("fast_period", 12)
            .with_param("slow_period", 26)
            .with_param("signal_period", 9);
        let shrunk = IndicatorKind::Macd.shrink_params(&original, 25);
        let fast = shrunk.get("fast_period").unwrap().as_u64().unwrap();
        let slow = shrunk.get("slow_period").unwrap().as_u64().unwrap();
        assert!(fast < slow, "fast={fast} slow={slow}");
    }

    #[test]
    fn compute_sma_appends_one_column() {
        let frame = ramp_frame(30);
        let cols = compute_request(&req(IndicatorKind::Sma).with_param("period", 10), &frame)
            .unwrap();
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].0, "sma_10");
        assert_eq!(cols[0].1.len(), 21);
    }

    #[test]
    fn compute_macd_appends_three_columns() {
        let frame = ramp_frame(100);
        let cols = compute_request(&req(IndicatorKind::Macd), &frame).unwrap();
        let names: Vec<&str> = cols.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["macd_12_26", "macd_signal_12_26_9", "macd_hist_12_26_9"]
        );
    }

    #[test]
    fn compute_on_empty_frame_fails() {
        let frame = OhlcvFrame::new();
        assert!(compute_request(&req(IndicatorKind::Sma), &frame).is_err());
    }

    #[test]
    fn compute_insufficient_data_fails() {
        let frame = ramp_frame(5);
        let err = compute_request(&req(IndicatorKind::Sma).with_param("period", 50), &frame)
            .unwrap_err();
        assert!(err.to_string().contains("need 50"));
    }

    #[test]
    fn compute_unknown_kind_is_a_no_op() {
        let frame = ramp_frame(30);
        let cols =
            compute_request(&req(IndicatorKind::Unknown("vwap".into())), &frame).unwrap();
        assert!(cols.is_empty());
    }
}
