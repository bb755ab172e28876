use super::super::domain::{RawValue, ScoringRule};

/// Greatest threshold at or below `value` wins; equal thresholds keep declaration order.
pub(crate) fn score_threshold(value: f64, rules: &[ScoringRule]) -> f64 {
    let mut thresholds: Vec<(f64, f64)> = rules
        .iter()
        .filter_map(|rule| rule.threshold().map(|threshold| (threshold, rule.score())))
        .collect();
    thresholds.sort_by(|left, right| right.0.total_cmp(&left.0));

    thresholds
        .into_iter()
        .find(|(threshold, _)| *threshold <= value)
        .map_or(0.0, |(_, score)| score)
}

/// Range rules first, in declared order, then exact matches.
pub(crate) fn score_matching(value: &RawValue, rules: &[ScoringRule]) -> f64 {
    if let Some(number) = value.as_number() {
        let in_range = rules.iter().find_map(|rule| match rule {
            ScoringRule::Range { min, max, score } if *min <= number && number <= *max => {
                Some(*score)
            }
            _ => None,
        });
        if let Some(score) = in_range {
            return score;
        }
    }

    rules
        .iter()
        .find_map(|rule| match rule {
            ScoringRule::Exact {
                value: expected,
                score,
            } if expected == value => Some(*score),
            _ => None,
        })
        .unwrap_or(0.0)
}
