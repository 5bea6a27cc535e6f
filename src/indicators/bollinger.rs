// =============================================================================
// Bollinger Bands
// =============================================================================
//
// A middle band (SMA), an upper band (SMA + k*σ), and a lower band
// (SMA - k*σ), each computed over a rolling `period` window.

/// Rolling Bollinger Band series; the three vectors are the same length and
/// share the same tail alignment (one value per close from index
/// `period - 1`).
#[derive(Debug, Clone)]
pub struct BollingerSeries {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Calculate rolling Bollinger Bands for the given closing prices.
///
/// Returns `None` when `period` is zero or there are fewer than `period`
/// closes.  Population standard deviation is used (dividing by `period`).
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerSeries> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let out_len = closes.len() - period + 1;
    let mut upper = Vec::with_capacity(out_len);
    let mut middle = Vec::with_capacity(out_len);
    let mut lower = Vec::with_capacity(out_len);

    for window in closes.windows(period) {
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std_dev = variance.sqrt();

        upper.push(mean + num_std * std_dev);
        middle.push(mean);
        lower.push(mean - num_std * std_dev);
    }

    Some(BollingerSeries {
        upper,
        middle,
        lower,
    })
}
