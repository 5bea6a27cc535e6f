// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes.
//
// Step 1 — Compute price changes (deltas) from consecutive closes.
// Step 2 — Seed average gain / average loss with the SMA of the first
//          `period` gains / losses.
// Step 3 — Apply Wilder's exponential smoothing:
//            avg_gain = (prev_avg_gain * (period - 1) + current_gain) / period
//            avg_loss = (prev_avg_loss * (period - 1) + current_loss) / period
// Step 4 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)

/// Compute the full RSI series for the given `closes` and `period`.
///
/// Returns one value per close starting at index `period` (the first
/// `period` closes are consumed to seed the averages); tail-aligned.
///
/// # Edge cases
/// - `period == 0` => empty vec
/// - `closes.len() < period + 1` => empty vec (need at least `period` deltas)
/// - A flat series (zero gain and zero loss) yields a neutral 50.0.
/// - Zero average loss with gains clamps RSI to 100.0.
/// - A non-finite intermediate truncates the series.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    // Seed averages with the SMA of the first `period` deltas.
    let (sum_gain, sum_loss) = deltas[..period]
        .iter()
        .fold((0.0_f64, 0.0_f64), |(g, l), &d| {
            if d > 0.0 {
                (g + d, l)
            } else {
                (g, l + d.abs())
            }
        });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    let mut result = Vec::with_capacity(deltas.len() - period + 1);
    match rsi_from_averages(avg_gain, avg_loss) {
        Some(rsi) => result.push(rsi),
        None => return Vec::new(),
    }

    // Wilder's smoothing for subsequent values.
    for &delta in &deltas[period..] {
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { delta.abs() } else { 0.0 };

        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        match rsi_from_averages(avg_gain, avg_loss) {
            Some(rsi) => result.push(rsi),
            None => break,
        }
    }

    result
}

/// RSI from smoothed averages; `None` when the result is non-finite.
///
/// - Both averages zero (no movement at all) => 50.0, neutral.
/// - Zero average loss with gains => 100.0, pinned at the ceiling.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if !avg_gain.is_finite() || !avg_loss.is_finite() {
        return None;
    }
    if avg_loss == 0.0 && avg_gain == 0.0 {
        return Some(50.0);
    }
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rsi = 100.0 - 100.0 / (1.0 + avg_gain / avg_loss);
    rsi.is_finite().then_some(rsi)
}
