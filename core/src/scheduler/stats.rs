use super::types::Distribution;

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Nearest-rank percentile over an ascending-sorted, non-empty slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let idx = ((sorted.len() - 1) as f64 * p).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Summarize samples as `{avg, p50, p95, max}`.
///
/// Non-finite samples are dropped; an empty set yields all zeros.
pub fn distribution<I>(samples: I) -> Distribution
where
    I: IntoIterator<Item = f64>,
{
    let mut values: Vec<f64> = samples.into_iter().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return Distribution::default();
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let sum: f64 = values.iter().sum();
    Distribution {
        avg_ms: round2(sum / values.len() as f64),
        p50_ms: round2(percentile(&values, 0.5)),
        p95_ms: round2(percentile(&values, 0.95)),
        max_ms: round2(values[values.len() - 1]),
    }
}
