//! Wilson-score ranking of suggestions.
//!
//! Raw co-follow counts favour very popular accounts: 50 of your follows
//! following someone with a million followers says little about you. The lower
//! bound of the Wilson interval on `count / followers` rewards a high
//! proportion and discounts small samples.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::types::Suggestion;

pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// How a suggestion list is ordered for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Server order, i.e. descending co-follow count.
    #[default]
    Count,
    /// Descending Wilson lower bound of `count / followers`.
    Weighted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedSuggestion {
    /// 1-based position in the displayed list.
    pub rank: usize,
    pub suggestion: Suggestion,
    /// Present only in weighted mode.
    pub score: Option<f64>,
}

/// Two-sided standard normal quantile for `confidence` (1.96 for 0.95).
fn z_for(confidence: f64) -> f64 {
    let confidence = confidence.clamp(0.0, 0.999_999);
    let quantile = 1.0 - (1.0 - confidence) / 2.0;
    Normal::new(0.0, 1.0)
        .map(|normal| normal.inverse_cdf(quantile))
        .unwrap_or(1.96)
}

/// Lower bound of the Wilson score interval for `positive` successes out of
/// `total` trials. Always within `[0, 1]`; zero when `total` is zero.
pub fn wilson_lower_bound(positive: u64, total: u64, confidence: f64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    let n = total as f64;
    let p = positive.min(total) as f64 / n;
    let z = z_for(confidence);
    let z2 = z * z;

    let centre = p + z2 / (2.0 * n);
    let spread = z * ((p * (1.0 - p) + z2 / (4.0 * n)) / n).sqrt();
    let bound = (centre - spread) / (1.0 + z2 / n);

    bound.clamp(0.0, 1.0)
}

/// Wilson lower bound at 95% confidence.
pub fn score(positive: u64, total: u64) -> f64 {
    wilson_lower_bound(positive, total, DEFAULT_CONFIDENCE)
}

/// Order a snapshot for display. Never drops entries or touches counts.
pub fn rank(suggestions: &[Suggestion], mode: SortMode) -> Vec<RankedSuggestion> {
    let mut scored: Vec<(Suggestion, Option<f64>)> = match mode {
        SortMode::Count => suggestions.iter().cloned().map(|s| (s, None)).collect(),
        SortMode::Weighted => suggestions
            .iter()
            .cloned()
            .map(|s| {
                let score = score(s.count, s.followers.unwrap_or(0));
                (s, Some(score))
            })
            .collect(),
    };

    if mode == SortMode::Weighted {
        // sort_by is stable, so equal scores and counts keep server order
        scored.sort_by(|(a, sa), (b, sb)| {
            let (sa, sb) = (sa.unwrap_or(0.0), sb.unwrap_or(0.0));
            sb.partial_cmp(&sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.count.cmp(&a.count))
        });
    }

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (suggestion, score))| RankedSuggestion {
            rank: i + 1,
            suggestion,
            score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;

    fn suggestion(handle: &str, count: u64, followers: Option<u64>) -> Suggestion {
        Suggestion {
            handle: Handle::parse(handle).unwrap(),
            count,
            followers,
        }
    }

    #[test]
    fn zero_total_scores_zero() {
        for positive in [0, 1, 10, 1_000] {
            assert_eq!(score(positive, 0), 0.0);
        }
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        for total in 1..=60u64 {
            for positive in 0..=total {
                let s = score(positive, total);
                assert!((0.0..=1.0).contains(&s), "score({positive}, {total}) = {s}");
            }
        }
    }

    #[test]
    fn non_decreasing_in_positive_for_fixed_total() {
        for total in [1u64, 2, 7, 12, 100, 1_000] {
            let mut previous = -1.0;
            for positive in 0..=total {
                let s = score(positive, total);
                assert!(s >= previous, "score dropped at {positive}/{total}");
                previous = s;
            }
        }
    }

    #[test]
    fn larger_samples_approach_the_ratio() {
        let small = score(1, 2);
        let medium = score(50, 100);
        let large = score(5_000, 10_000);
        assert!(small < medium && medium < large);
        assert!(large < 0.5 && large > 0.49);
    }

    #[test]
    fn matches_the_closed_form_at_95_percent() {
        // 10 of 12: p = 0.8333, z = 1.95996
        let s = score(10, 12);
        assert!((s - 0.5520).abs() < 1e-3, "got {s}");
    }

    #[test]
    fn positive_above_total_is_clamped() {
        assert_eq!(score(20, 10), score(10, 10));
    }

    #[test]
    fn weighted_mode_prefers_higher_proportion() {
        let list = vec![
            suggestion("popular.bsky.social", 50, Some(1_000)),
            suggestion("niche.bsky.social", 10, Some(12)),
        ];

        let by_count = rank(&list, SortMode::Count);
        assert_eq!(by_count[0].suggestion.handle.as_str(), "popular.bsky.social");
        assert!(by_count[0].score.is_none());

        let weighted = rank(&list, SortMode::Weighted);
        assert_eq!(weighted[0].suggestion.handle.as_str(), "niche.bsky.social");
        assert_eq!(weighted[0].rank, 1);
        assert_eq!(weighted[1].rank, 2);
        assert!(weighted[0].score.unwrap() > weighted[1].score.unwrap());
    }

    #[test]
    fn weighting_never_drops_or_changes_entries() {
        let list = vec![
            suggestion("a.bsky.social", 9, None),
            suggestion("b.bsky.social", 7, Some(8)),
            suggestion("c.bsky.social", 7, Some(800)),
        ];
        let weighted = rank(&list, SortMode::Weighted);
        assert_eq!(weighted.len(), 3);
        assert_eq!(weighted[0].suggestion, list[1]);
        // no follower count scores zero, below any positive proportion
        assert_eq!(weighted[1].suggestion, list[2]);
        assert_eq!(weighted[2].suggestion, list[0]);
        assert_eq!(weighted[2].score, Some(0.0));
    }
}
