// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing Method
// =============================================================================
//
// ATR measures volatility by decomposing the entire range of a bar.
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is the smoothed average of TR using Wilder's method:
//   ATR_0 = SMA of first `period` TR values
//   ATR_t = (ATR_{t-1} * (period - 1) + TR_t) / period

/// Compute the ATR series from parallel high/low/close slices.
///
/// Returns one value per bar starting at index `period` (tail-aligned): the
/// first bar has no predecessor for the True Range, and `period` TR values
/// seed the smoothing.
///
/// # Edge cases
/// - `period == 0` => empty vec
/// - fewer than `period + 1` bars => empty vec
/// - mismatched slice lengths => empty vec
/// - A non-finite intermediate truncates the series.
pub fn calculate_atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    if period == 0 || n < period + 1 || high.len() != n || low.len() != n {
        return Vec::new();
    }

    // True Range per consecutive bar pair.
    let mut tr_values = Vec::with_capacity(n - 1);
    for i in 1..n {
        let hl = high[i] - low[i];
        let hc = (high[i] - close[i - 1]).abs();
        let lc = (low[i] - close[i - 1]).abs();
        tr_values.push(hl.max(hc).max(lc));
    }

    // Seed with the SMA of the first `period` TR values.
    let seed: f64 = tr_values[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(tr_values.len() - period + 1);
    result.push(seed);

    let period_f = period as f64;
    let mut atr = seed;
    for &tr in &tr_values[period..] {
        atr = (atr * (period_f - 1.0) + tr) / period_f;
        if !atr.is_finite() {
            break;
        }
        result.push(atr);
    }

    result
}
