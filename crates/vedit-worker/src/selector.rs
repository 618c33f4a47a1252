//! Shot selection: tag filtering plus an exact 0/1 knapsack over whole seconds.

use std::collections::BTreeSet;

use tracing::{info, warn};
use vedit_models::{Interval, Scene};

/// Target used when the directive gives none: everything, up to a minute.
pub const DEFAULT_MAX_TARGET_SECS: f64 = 60.0;

/// Pick the highest-scoring set of scenes that fits `target` seconds.
///
/// The result is ordered by start time. A scene longer than the budget is
/// never cut down; it is simply left out.
pub fn select_shots(
    scenes: &[Scene],
    target: Option<f64>,
    include_tags: &BTreeSet<String>,
    exclude_tags: &BTreeSet<String>,
) -> Vec<Interval> {
    select_shot_indices(scenes, target, include_tags, exclude_tags)
        .into_iter()
        .map(|i| scenes[i].interval())
        .collect()
}

/// Same selection as [`select_shots`], returned as indices into `scenes`.
///
/// Callers that attach data to each scene (its source file) use this to keep
/// that association through selection.
pub fn select_shot_indices(
    scenes: &[Scene],
    target: Option<f64>,
    include_tags: &BTreeSet<String>,
    exclude_tags: &BTreeSet<String>,
) -> Vec<usize> {
    let mut eligible: Vec<(usize, &Scene)> = scenes
        .iter()
        .enumerate()
        .filter(|(_, s)| exclude_tags.is_empty() || !s.has_any_tag(exclude_tags))
        .filter(|(_, s)| include_tags.is_empty() || s.has_any_tag(include_tags))
        .collect();

    if eligible.is_empty() {
        if !scenes.is_empty() {
            warn!("No scenes match the tag filters, using all scenes");
        }
        eligible = scenes.iter().enumerate().collect();
    }

    let target = match target {
        Some(t) if t.is_finite() && t > 0.0 => t,
        _ => {
            let total: f64 = eligible.iter().map(|(_, s)| s.duration()).sum();
            total.trunc().min(DEFAULT_MAX_TARGET_SECS)
        }
    };
    let capacity = target.max(0.0).trunc() as usize;

    info!(
        candidates = eligible.len(),
        capacity, "Selecting shots"
    );

    if eligible.is_empty() || capacity == 0 {
        return Vec::new();
    }

    let weights: Vec<usize> = eligible
        .iter()
        .map(|(_, s)| {
            let d = s.duration();
            if d.is_finite() && d >= 0.0 {
                d.trunc() as usize
            } else {
                usize::MAX
            }
        })
        .collect();
    let values: Vec<f64> = eligible.iter().map(|(_, s)| s.score).collect();

    let mut chosen: Vec<(usize, &Scene)> = knapsack(&weights, &values, capacity)
        .into_iter()
        .map(|i| eligible[i])
        .collect();
    chosen.sort_by(|(ia, a), (ib, b)| a.start.total_cmp(&b.start).then(ia.cmp(ib)));

    let total: f64 = chosen.iter().map(|(_, s)| s.duration()).sum();
    info!(
        selected = chosen.len(),
        total_secs = format!("{:.1}", total),
        "Shots selected"
    );

    chosen.into_iter().map(|(i, _)| i).collect()
}

/// Exact 0/1 knapsack. Returns the chosen item indices in ascending order.
///
/// Backtracks from the last item and takes item `i` only when it changes the
/// optimum, so among equal-value alternatives the earlier item is kept.
pub fn knapsack(weights: &[usize], values: &[f64], capacity: usize) -> Vec<usize> {
    debug_assert_eq!(weights.len(), values.len());
    let n = weights.len();

    // Capacities past the total weight select the same set.
    let total_weight = weights
        .iter()
        .filter(|w| **w <= capacity)
        .fold(0usize, |acc, w| acc.saturating_add(*w));
    let capacity = capacity.min(total_weight);

    let width = capacity + 1;
    let mut dp = vec![0.0f64; (n + 1) * width];

    for i in 1..=n {
        let (weight, value) = (weights[i - 1], values[i - 1]);
        for w in 0..width {
            let skip = dp[(i - 1) * width + w];
            dp[i * width + w] = if weight <= w {
                skip.max(value + dp[(i - 1) * width + (w - weight)])
            } else {
                skip
            };
        }
    }

    let mut selected = Vec::new();
    let mut w = capacity;
    for i in (1..=n).rev() {
        if dp[i * width + w] != dp[(i - 1) * width + w] {
            selected.push(i - 1);
            w -= weights[i - 1];
        }
    }

    selected.reverse();
    selected
}
