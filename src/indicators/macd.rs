// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
// A leading/lagging EMA pair plus a signal line:
//   MACD line = EMA(fast) - EMA(slow)
//   Signal    = EMA(signal_period) of the MACD line
//   Histogram = MACD line - Signal
//
// The MACD line exists from index `slow - 1`; the signal and histogram need
// another `signal_period - 1` MACD values on top of that.  All three output
// vectors are tail-aligned to the input closes.

use super::ema::calculate_ema;

/// MACD output series.  `macd` is longer than `signal`/`histogram` by
/// `signal_period - 1`; each vector is tail-aligned to the input.
#[derive(Debug, Clone)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// Compute MACD line, signal line, and histogram.
///
/// Returns `None` when:
/// - any period is zero, or `fast >= slow` (degenerate configuration);
/// - there are fewer than `slow + signal_period - 1` closes (no signal value
///   can be produced).
pub fn calculate_macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Option<MacdSeries> {
    if fast == 0 || slow == 0 || signal_period == 0 || fast >= slow {
        return None;
    }
    if closes.len() < slow + signal_period - 1 {
        return None;
    }

    let fast_ema = calculate_ema(closes, fast);
    let slow_ema = calculate_ema(closes, slow);
    if slow_ema.is_empty() {
        return None;
    }

    // Align the fast EMA to the slow EMA's start (both are tail-aligned, so
    // drop the fast EMA's extra leading values).
    let offset = fast_ema.len().checked_sub(slow_ema.len())?;
    let macd: Vec<f64> = fast_ema[offset..]
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect();

    let signal = calculate_ema(&macd, signal_period);
    if signal.is_empty() {
        return None;
    }

    let macd_tail = &macd[macd.len() - signal.len()..];
    let histogram: Vec<f64> = macd_tail
        .iter()
        .zip(signal.iter())
        .map(|(m, s)| m - s)
        .collect();

    Some(MacdSeries {
        macd,
        signal,
        histogram,
    })
}
