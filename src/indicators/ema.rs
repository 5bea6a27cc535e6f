// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average.
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The very first EMA value is seeded with the SMA of the first `period`
// closes.

/// Compute the EMA series for the given `closes` slice and look-back `period`.
///
/// Returns one value per close starting at index `period - 1` (tail-aligned).
///
/// # Edge cases
/// - `period == 0` => empty vec (division by zero guard)
/// - `closes.len() < period` => empty vec
/// - A non-finite intermediate value truncates the series; downstream
///   consumers should not trust a broken tail.
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period + 1) as f64;

    // Seed: SMA of the first `period` values.
    let seed: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period + 1);
    result.push(seed);

    let mut prev = seed;
    for &close in &closes[period..] {
        let ema = close * multiplier + prev * (1.0 - multiplier);
        if !ema.is_finite() {
            break;
        }
        result.push(ema);
        prev = ema;
    }

    result
}
