//! Cross-asset correlation and the worst-of penalty.

use tracing::warn;

/// Truncates every series to the length of the shortest one, keeping the
/// most recent observations of each.
///
/// Histories differ in length when listings or holiday calendars differ;
/// trailing windows keep the comparison on the latest shared stretch.
pub fn align_trailing<'a, S: AsRef<[f64]>>(series: &'a [S]) -> Vec<&'a [f64]> {
    let common = series.iter().map(|s| s.as_ref().len()).min().unwrap_or(0);
    series
        .iter()
        .map(|s| {
            let s = s.as_ref();
            &s[s.len() - common..]
        })
        .collect()
}

/// Sample Pearson correlation of two equal-length series.
///
/// Returns `None` when the coefficient is undefined: mismatched lengths,
/// fewer than two observations, or a series with no variance.
pub fn sample_correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (&a, &b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }

    let r = cov / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Correlations for every unordered pair (i < j), in pair order, computed on
/// trailing-aligned windows.
///
/// An undefined pair contributes 0.0 (no evidence of co-movement) and is
/// logged. A single series yields an empty set.
pub fn pairwise_correlations<S: AsRef<[f64]>>(returns: &[S]) -> Vec<f64> {
    let aligned = align_trailing(returns);
    let mut correlations = Vec::with_capacity(aligned.len() * aligned.len().saturating_sub(1) / 2);

    for i in 0..aligned.len() {
        for j in (i + 1)..aligned.len() {
            let value = match sample_correlation(aligned[i], aligned[j]) {
                Some(r) => r,
                None => {
                    warn!(
                        pair = ?(i, j),
                        window = aligned[i].len(),
                        "correlation undefined for return window; using 0.0"
                    );
                    0.0
                }
            };
            correlations.push(value);
        }
    }

    correlations
}

/// Worst-of penalty: `1 + (1 - mean(correlations)) * weight`.
///
/// The mean is floored at zero, so with the default weight of 0.5 the
/// penalty spans 1.0 (perfectly co-moving basket) to 1.5 (uncorrelated or
/// anti-correlated basket). An empty set, i.e. a single asset basket,
/// carries no penalty.
pub fn correlation_penalty(correlations: &[f64], weight: f64) -> f64 {
    if correlations.is_empty() {
        return 1.0;
    }

    let mean = correlations.iter().sum::<f64>() / correlations.len() as f64;
    1.0 + (1.0 - mean.clamp(0.0, 1.0)) * weight
}
