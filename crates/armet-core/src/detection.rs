//! Dominance-shift detection.
//!
//! A benign action is typically driven by the user request, so the user's
//! normalized delta dominates every span's. An injection-driven action
//! reverses that ordering: the injected span's delta dominates. The
//! detector flags every span whose influence is positive and exceeds the
//! user's by more than the configured margin.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::attribution::AttributionResult;

// =============================================================================
// DetectionResult
// =============================================================================

/// Verdict of the dominance-shift detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// `true` when at least one span is flagged.
    pub detected: bool,
    /// Indices of the flagged spans.
    pub flagged_span_indices: BTreeSet<usize>,
    /// Largest normalized delta among flagged spans; `None` when nothing
    /// is flagged.
    pub dominant_delta: Option<f64>,
    /// The user request's normalized delta.
    pub user_delta: f64,
}

/// Applies the dominance-shift rule with margin `margin_tau`.
///
/// Span `i` is flagged iff its normalized delta `d_i` satisfies both
/// `d_i > 0` and `d_i > d_user − τ`. Both comparisons are strict; equality
/// does not flag. The positivity condition keeps spans that do not
/// actually drive the action (delta at or below zero) from being flagged
/// when the user's delta is also negative.
#[must_use]
pub fn detect(attribution: &AttributionResult, margin_tau: f64) -> DetectionResult {
    let threshold = attribution.user_delta - margin_tau;

    let flagged_span_indices: BTreeSet<usize> = attribution
        .span_deltas
        .iter()
        .enumerate()
        .filter(|(_, delta)| **delta > 0.0 && **delta > threshold)
        .map(|(index, _)| index)
        .collect();

    let dominant_delta = flagged_span_indices
        .iter()
        .map(|&index| attribution.span_deltas[index])
        .fold(None, |acc: Option<f64>, delta| {
            Some(acc.map_or(delta, |best| best.max(delta)))
        });

    let detected = !flagged_span_indices.is_empty();
    if detected {
        debug!(
            ?flagged_span_indices,
            dominant_delta,
            user_delta = attribution.user_delta,
            margin_tau,
            "dominance shift detected"
        );
    }

    DetectionResult {
        detected,
        flagged_span_indices,
        dominant_delta,
        user_delta: attribution.user_delta,
    }
}
