// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// The unweighted mean of the last `period` closes.  Computed with a running
// sum so the whole series costs O(n) regardless of period.

/// Compute the SMA series for the given `closes` and look-back `period`.
///
/// Returns one value per close starting at index `period - 1` (tail-aligned,
/// like every series function in this module).
///
/// # Edge cases
/// - `period == 0` => empty vec (division by zero guard)
/// - `closes.len() < period` => empty vec
pub fn calculate_sma(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period + 1);
    let mut window_sum: f64 = closes[..period].iter().sum();
    result.push(window_sum / period as f64);

    for i in period..closes.len() {
        window_sum += closes[i] - closes[i - period];
        result.push(window_sum / period as f64);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_empty_input() {
        assert!(calculate_sma(&[], 5).is_empty());
    }

    #[test]
    fn sma_period_zero() {
        assert!(calculate_sma(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn sma_insufficient_data() {
        assert!(calculate_sma(&[1.0, 2.0], 3).is_empty());
    }

    #[test]
    fn sma_known_values() {
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0];
        let sma = calculate_sma(&closes, 3);
        assert_eq!(sma.len(), 3);
        assert!((sma[0] - 2.0).abs() < 1e-12);
        assert!((sma[1] - 3.0).abs() < 1e-12);
        assert!((sma[2] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn sma_period_one_is_identity() {
        let closes = [3.5, 7.0, 1.25];
        let sma = calculate_sma(&closes, 1);
        assert_eq!(sma, closes.to_vec());
    }
}
