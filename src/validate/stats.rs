use std::collections::{BTreeMap, BTreeSet};

/// Expected points above which the gap scan refuses to enumerate.
pub const MAX_EXPECTED_POINTS: i128 = 1_000_000;

/// Successive differences `v[i] - v[i-1]`.
pub fn steps(values: &[i64]) -> Vec<i64> {
    values.windows(2).map(|w| w[1].wrapping_sub(w[0])).collect()
}

/// Most frequent step. Ties go to the smallest step.
pub fn modal_step(steps: &[i64]) -> Option<i64> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for &s in steps {
        *counts.entry(s).or_default() += 1;
    }
    // BTreeMap iterates ascending, so keeping the first maximum breaks
    // ties towards the smallest step.
    let mut best: Option<(i64, usize)> = None;
    for (step, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((step, count));
        }
    }
    best.map(|(step, _)| step)
}

/// Values of `min, min+step, …, <= max` absent from `observed`.
///
/// Returns `None` when the range would exceed [`MAX_EXPECTED_POINTS`].
pub fn missing_points(observed: &[i64], step: i64) -> Option<Vec<i64>> {
    let (Some(&min), Some(&max)) = (observed.iter().min(), observed.iter().max()) else {
        return Some(Vec::new());
    };
    let step = if step > 0 { step } else { 1 };
    let expected = (i128::from(max) - i128::from(min)) / i128::from(step) + 1;
    if expected > MAX_EXPECTED_POINTS {
        return None;
    }

    let seen: BTreeSet<i64> = observed.iter().copied().collect();
    let mut missing = Vec::new();
    let mut point = min;
    while point <= max {
        if !seen.contains(&point) {
            missing.push(point);
        }
        match point.checked_add(step) {
            Some(next) => point = next,
            None => break,
        }
    }
    Some(missing)
}

/// Sample standard deviation (n − 1). `None` below two samples.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}
