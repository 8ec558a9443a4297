use serde::Serialize;

/// Response-time summary over successful requests, in milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResponseTimeStats {
    pub mean_ms: f64,
    pub median_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
}

impl ResponseTimeStats {
    /// Summarize `samples_ms`; all zeros when empty.
    pub fn from_samples(samples_ms: &[f64]) -> Self {
        if samples_ms.is_empty() {
            return Self::default();
        }
        let mut sorted = samples_ms.to_vec();
        sorted.sort_by(f64::total_cmp);
        let min_ms = sorted[0];
        let max_ms = sorted[sorted.len() - 1];
        let p95_ms = if sorted.len() >= 20 {
            exclusive_quantiles(&sorted, 20)[18]
        } else {
            max_ms
        };
        Self {
            mean_ms: sorted.iter().sum::<f64>() / sorted.len() as f64,
            median_ms: median(&sorted),
            min_ms,
            max_ms,
            p95_ms,
        }
    }
}

/// Median of sorted values; mean of the middle pair for even lengths.
fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// The `n - 1` cut points dividing sorted data into `n` equal-probability
/// groups, using the exclusive method (positions over `len + 1`).
///
/// Requires at least two samples.
fn exclusive_quantiles(sorted: &[f64], n: usize) -> Vec<f64> {
    let len = sorted.len();
    let m = len + 1;
    (1..n)
        .map(|i| {
            let j = (i * m / n).clamp(1, len - 1);
            let delta = (i * m) as f64 - (j * n) as f64;
            (sorted[j - 1] * (n as f64 - delta) + sorted[j] * delta) / n as f64
        })
        .collect()
}
