// =============================================================================
// Rate of Change (ROC) — Momentum Indicator
// =============================================================================
//
// ROC measures the percentage change in price over a look-back period:
//   ROC = ((close - close_n) / close_n) * 100
//
// Positive ROC indicates upward momentum; negative indicates downward.

/// Calculate the ROC series for the given closing prices and period.
///
/// Returns one value per close starting at index `period` (tail-aligned).
/// A zero reference close yields 0.0 instead of a division blow-up.
pub fn calculate_roc(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() <= period {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period);
    for i in period..closes.len() {
        let prev = closes[i - period];
        if prev == 0.0 {
            result.push(0.0);
        } else {
            result.push(((closes[i] - prev) / prev) * 100.0);
        }
    }
    result
}
