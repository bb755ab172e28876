mod rules;
mod validation;

pub use validation::{validate_template, TemplateError};

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::domain::{ItemKind, KpiTemplate, RawValue, ScoringRule, ValueEntry, ValueSubmission};
use super::error::KpiError;
use validation::check_type;

/// Maps one raw value to a score under the item's rules.
///
/// Callers validate the value's type first; a non-numeric value for a
/// numeric kind scores 0.
pub fn score(value: &RawValue, rules: &[ScoringRule], kind: ItemKind) -> f64 {
    match kind {
        ItemKind::Score => value.as_number().unwrap_or(0.0),
        ItemKind::Percentage => value
            .as_number()
            .map_or(0.0, |number| rules::score_threshold(number, rules)),
        ItemKind::Quantitative | ItemKind::Binary | ItemKind::Qualitative => {
            rules::score_matching(value, rules)
        }
    }
}

/// Values accepted for an entry together with their total.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredValues {
    pub values: Vec<ValueEntry>,
    pub total_score: f64,
}

/// Validates a submission against the template and scores every known item.
///
/// Names that match no template item are dropped, as are repeats of an item
/// already seen. Bypassed items keep the caller's score as-is.
pub fn score_submission(
    template: &KpiTemplate,
    submissions: &[ValueSubmission],
) -> Result<ScoredValues, ScoringError> {
    let submitted: HashMap<&str, &ValueSubmission> = submissions
        .iter()
        .map(|submission| (submission.name.as_str(), submission))
        .collect();

    let missing: Vec<String> = template
        .items
        .iter()
        .filter(|item| !item.is_dynamic && !submitted.contains_key(item.name.as_str()))
        .map(|item| item.name.clone())
        .collect();
    if !missing.is_empty() {
        return Err(ScoringError::MissingItems(missing));
    }

    let mut values = Vec::with_capacity(submissions.len());
    let mut total_score = 0.0;
    let mut seen = HashSet::new();

    for submission in submissions {
        let Some(item) = template.item(&submission.name) else {
            debug!(item = %submission.name, template = %template.id, "ignoring unknown item");
            continue;
        };
        if !seen.insert(item.name.as_str()) {
            debug!(item = %item.name, "ignoring repeated item");
            continue;
        }

        let item_score = if submission.is_by_passed {
            submission
                .score
                .ok_or_else(|| ScoringError::MissingScore(item.name.clone()))?
        } else {
            let value = submission
                .value
                .as_ref()
                .ok_or_else(|| ScoringError::MissingValue(item.name.clone()))?;
            check_type(item, value)?;
            score(value, &item.rules, item.kind)
        };

        total_score += item_score;
        values.push(ValueEntry {
            name: item.name.clone(),
            value: submission.value.clone(),
            score: item_score,
            comment: submission.comment.clone(),
            is_by_passed: submission.is_by_passed,
        });
    }

    Ok(ScoredValues {
        values,
        total_score,
    })
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("missing required items: {}", .0.join(", "))]
    MissingItems(Vec<String>),
    #[error("item '{item}' expects a {expected} value but received a {actual}")]
    TypeMismatch {
        item: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("item '{0}' is bypassed but carries no score")]
    MissingScore(String),
    #[error("item '{0}' has no value")]
    MissingValue(String),
}

impl From<ScoringError> for KpiError {
    fn from(value: ScoringError) -> Self {
        KpiError::Validation(value.to_string())
    }
}
