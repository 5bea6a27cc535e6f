// =============================================================================
// Data Quality Checker — structural diagnostics and auto-repair
// =============================================================================
//
// A cross-cutting pass that runs before (and optionally after) indicator
// computation.  `check_data_quality` is purely diagnostic and returns
// human-readable findings per timeframe; `fix_data_quality_issues` applies
// independently toggleable repairs and returns new frames, leaving the
// caller's data untouched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::frame::OhlcvFrame;

/// Price written into an OHLC column that is missing in its entirety (so
/// neither forward- nor backward-fill can find a reference value).
pub const DEFAULT_FILL_PRICE: f64 = 100.0;

/// Absolute single-step close return treated as an extreme move.
const EXTREME_MOVE_THRESHOLD: f64 = 0.5;

/// Below this many rows a dataset is flagged as too small to trust.
const SMALL_DATASET_ROWS: usize = 10;

/// Which repairs `fix_data_quality_issues` applies.  Each fix is independent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FixOptions {
    pub fix_nan: bool,
    pub fix_inf: bool,
    pub fix_ohlc: bool,
}

impl Default for FixOptions {
    fn default() -> Self {
        Self {
            fix_nan: true,
            fix_inf: true,
            fix_ohlc: true,
        }
    }
}

/// Inspect every timeframe's frame and report structural problems as
/// human-readable strings.  Purely diagnostic; nothing is modified.
pub fn check_data_quality(data: &HashMap<String, OhlcvFrame>) -> HashMap<String, Vec<String>> {
    let mut report = HashMap::new();

    for (timeframe, frame) in data {
        let mut findings = Vec::new();

        if frame.is_empty() {
            findings.push("table is empty".to_string());
            report.insert(timeframe.clone(), findings);
            continue;
        }

        let rows = frame.len();
        for (name, values) in ohlc_columns(frame) {
            let nan_count = values.iter().filter(|v| v.is_nan()).count();
            if nan_count > 0 {
                findings.push(format!(
                    "{name}: {nan_count} NaN values ({:.1}%)",
                    nan_count as f64 / rows as f64 * 100.0
                ));
            }
        }
        for (name, values) in numeric_columns(frame) {
            let inf_count = values.iter().filter(|v| v.is_infinite()).count();
            if inf_count > 0 {
                findings.push(format!("{name}: {inf_count} infinite values"));
            }
        }

        let bad_high = (0..rows)
            .filter(|&i| frame.high[i] < frame.open[i].max(frame.close[i]))
            .count();
        if bad_high > 0 {
            findings.push(format!("{bad_high} rows with high < max(open, close)"));
        }
        let bad_low = (0..rows)
            .filter(|&i| frame.low[i] > frame.open[i].min(frame.close[i]))
            .count();
        if bad_low > 0 {
            findings.push(format!("{bad_low} rows with low > min(open, close)"));
        }

        let extreme_moves = frame
            .close
            .windows(2)
            .filter(|w| {
                w[0] != 0.0 && w[0].is_finite() && ((w[1] - w[0]) / w[0]).abs() > EXTREME_MOVE_THRESHOLD
            })
            .count();
        if extreme_moves > 0 {
            findings.push(format!(
                "{extreme_moves} single-step close moves exceeding {:.0}%",
                EXTREME_MOVE_THRESHOLD * 100.0
            ));
        }

        let mut seen = std::collections::HashSet::with_capacity(rows);
        let duplicates = frame
            .timestamps
            .iter()
            .filter(|ts| !seen.insert(**ts))
            .count();
        if duplicates > 0 {
            findings.push(format!("{duplicates} duplicate timestamps"));
        }

        if rows < SMALL_DATASET_ROWS {
            findings.push(format!(
                "very small dataset ({rows} rows, < {SMALL_DATASET_ROWS})"
            ));
        }

        if !findings.is_empty() {
            debug!(timeframe, count = findings.len(), "data quality findings");
            report.insert(timeframe.clone(), findings);
        }
    }

    report
}

/// Repair the problems `check_data_quality` reports, per `options`:
///
/// - `fix_nan`  — forward-fill then backward-fill NaNs in each OHLC column;
///   a column with no finite value at all is set to `DEFAULT_FILL_PRICE`.
/// - `fix_inf`  — replace ±∞ with the median of the column's finite values
///   (0.0 when none exist).
/// - `fix_ohlc` — widen `high` to cover `max(open, close)` and narrow `low`
///   to cover `min(open, close)`, restoring the OHLC invariant.
///
/// Returns repaired copies; the input frames are untouched.
pub fn fix_data_quality_issues(
    data: &HashMap<String, OhlcvFrame>,
    options: FixOptions,
) -> HashMap<String, OhlcvFrame> {
    let mut fixed = HashMap::with_capacity(data.len());

    for (timeframe, frame) in data {
        let mut frame = frame.clone();

        if options.fix_nan {
            fill_missing(&mut frame.open);
            fill_missing(&mut frame.high);
            fill_missing(&mut frame.low);
            fill_missing(&mut frame.close);
        }
        if options.fix_inf {
            replace_infinities(&mut frame.open);
            replace_infinities(&mut frame.high);
            replace_infinities(&mut frame.low);
            replace_infinities(&mut frame.close);
            replace_infinities(&mut frame.volume);
        }
        if options.fix_ohlc {
            for i in 0..frame.len() {
                let body_high = frame.open[i].max(frame.close[i]);
                let body_low = frame.open[i].min(frame.close[i]);
                frame.high[i] = frame.high[i].max(body_high);
                frame.low[i] = frame.low[i].min(body_low);
            }
        }

        info!(timeframe, rows = frame.len(), "data quality fixes applied");
        fixed.insert(timeframe.clone(), frame);
    }

    fixed
}

/// Forward-fill then backward-fill NaNs; all-NaN columns fall back to the
/// default fill price.
fn fill_missing(values: &mut [f64]) {
    let mut last_seen = f64::NAN;
    for v in values.iter_mut() {
        if v.is_nan() {
            *v = last_seen;
        } else {
            last_seen = *v;
        }
    }
    let mut next_seen = f64::NAN;
    for v in values.iter_mut().rev() {
        if v.is_nan() {
            *v = next_seen;
        } else {
            next_seen = *v;
        }
    }
    for v in values.iter_mut() {
        if v.is_nan() {
            *v = DEFAULT_FILL_PRICE;
        }
    }
}

/// Replace ±∞ with the median of the finite values (0.0 when none exist).
fn replace_infinities(values: &mut [f64]) {
    if !values.iter().any(|v| v.is_infinite()) {
        return;
    }
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let replacement = if finite.is_empty() {
        0.0
    } else {
        finite.sort_by(|a, b| a.total_cmp(b));
        let mid = finite.len() / 2;
        if finite.len() % 2 == 0 {
            (finite[mid - 1] + finite[mid]) / 2.0
        } else {
            finite[mid]
        }
    };
    for v in values.iter_mut() {
        if v.is_infinite() {
            *v = replacement;
        }
    }
}

fn ohlc_columns(frame: &OhlcvFrame) -> [(&'static str, &[f64]); 4] {
    [
        ("open", frame.open.as_slice()),
        ("high", frame.high.as_slice()),
        ("low", frame.low.as_slice()),
        ("close", frame.close.as_slice()),
    ]
}

fn numeric_columns(frame: &OhlcvFrame) -> [(&'static str, &[f64]); 5] {
    [
        ("open", frame.open.as_slice()),
        ("high", frame.high.as_slice()),
        ("low", frame.low.as_slice()),
        ("close", frame.close.as_slice()),
        ("volume", frame.volume.as_slice()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::ramp_frame;

    fn wrap(frame: OhlcvFrame) -> HashMap<String, OhlcvFrame> {
        HashMap::from([("1h".to_string(), frame)])
    }

    #[test]
    fn clean_data_has_no_findings() {
        let report = check_data_quality(&wrap(ramp_frame(50)));
        assert!(report.is_empty());
    }

    #[test]
    fn empty_frame_is_reported() {
        let report = check_data_quality(&wrap(OhlcvFrame::new()));
        assert_eq!(report["1h"], vec!["table is empty".to_string()]);
    }

    #[test]
    fn nan_and_inf_are_counted() {
        let mut frame = ramp_frame(20);
        frame.close[3] = f64::NAN;
        frame.close[4] = f64::NAN;
        frame.volume[0] = f64::INFINITY;
        let report = check_data_quality(&wrap(frame));
        let findings = &report["1h"];
        assert!(findings.iter().any(|f| f.contains("close: 2 NaN")));
        assert!(findings.iter().any(|f| f.contains("volume: 1 infinite")));
    }

    #[test]
    fn ohlc_violations_are_counted() {
        let mut frame = ramp_frame(20);
        frame.high[5] = frame.open[5].max(frame.close[5]) - 10.0;
        frame.low[6] = frame.open[6].min(frame.close[6]) + 10.0;
        let report = check_data_quality(&wrap(frame));
        let findings = &report["1h"];
        assert!(findings.iter().any(|f| f.contains("high < max(open, close)")));
        assert!(findings.iter().any(|f| f.contains("low > min(open, close)")));
    }

    #[test]
    fn extreme_moves_and_duplicates_are_counted() {
        let mut frame = ramp_frame(20);
        frame.close[10] = frame.close[9] * 2.0;
        frame.timestamps[7] = frame.timestamps[6];
        let report = check_data_quality(&wrap(frame));
        let findings = &report["1h"];
        assert!(findings.iter().any(|f| f.contains("close moves exceeding 50%")));
        assert!(findings.iter().any(|f| f.contains("1 duplicate timestamps")));
    }

    #[test]
    fn small_dataset_warning() {
        let report = check_data_quality(&wrap(ramp_frame(5)));
        assert!(report["1h"].iter().any(|f| f.contains("very small dataset")));
    }

    #[test]
    fn fix_nan_forward_then_backward_fills() {
        let mut frame = ramp_frame(6);
        frame.close[0] = f64::NAN; // leading gap -> backward fill
        frame.close[3] = f64::NAN; // interior gap -> forward fill
        let fixed = fix_data_quality_issues(&wrap(frame.clone()), FixOptions::default());
        let close = &fixed["1h"].close;
        assert!((close[0] - frame.close[1]).abs() < 1e-12);
        assert!((close[3] - frame.close[2]).abs() < 1e-12);
        assert!(close.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn fix_nan_all_missing_uses_default_price() {
        let mut frame = ramp_frame(4);
        frame.close = vec![f64::NAN; 4];
        let fixed = fix_data_quality_issues(&wrap(frame), FixOptions::default());
        assert!(fixed["1h"]
            .close
            .iter()
            .all(|v| (*v - DEFAULT_FILL_PRICE).abs() < 1e-12));
    }

    #[test]
    fn fix_inf_uses_median_of_finite() {
        let mut frame = ramp_frame(5);
        frame.volume = vec![1.0, 2.0, f64::INFINITY, 3.0, f64::NEG_INFINITY];
        let fixed = fix_data_quality_issues(&wrap(frame), FixOptions::default());
        let volume = &fixed["1h"].volume;
        assert!((volume[2] - 2.0).abs() < 1e-12);
        assert!((volume[4] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn fix_ohlc_restores_invariant() {
        let mut frame = ramp_frame(20);
        frame.high[2] = frame.open[2].max(frame.close[2]) - 5.0;
        frame.low[3] = frame.open[3].min(frame.close[3]) + 5.0;
        let fixed = fix_data_quality_issues(&wrap(frame), FixOptions::default());
        let f = &fixed["1h"];
        for i in 0..f.len() {
            assert!(f.high[i] >= f.open[i].max(f.close[i]));
            assert!(f.low[i] <= f.open[i].min(f.close[i]));
        }
    }

    #[test]
    fn fixes_are_independently_toggleable() {
        let mut frame = ramp_frame(6);
        frame.close[3] = f64::NAN;
        frame.high[2] = 0.0;
        let options = FixOptions {
            fix_nan: false,
            fix_inf: false,
            fix_ohlc: true,
        };
        let fixed = fix_data_quality_issues(&wrap(frame), options);
        let f = &fixed["1h"];
        assert!(f.close[3].is_nan()); // NaN fix was off
        assert!(f.high[2] >= f.open[2].max(f.close[2])); // OHLC fix was on
    }

    #[test]
    fn input_frames_are_untouched() {
        let mut frame = ramp_frame(6);
        frame.close[3] = f64::NAN;
        let data = wrap(frame);
        let _ = fix_data_quality_issues(&data, FixOptions::default());
        assert!(data["1h"].close[3].is_nan());
    }
}
