use std::collections::HashSet;

use super::super::domain::{ItemKind, KpiTemplate, RawValue, ScoringRule, TemplateItem};
use super::ScoringError;

pub(crate) fn check_type(item: &TemplateItem, value: &RawValue) -> Result<(), ScoringError> {
    let Some(expected) = item.kind.expected_type() else {
        return Ok(());
    };

    if value.type_name() == expected {
        Ok(())
    } else {
        Err(ScoringError::TypeMismatch {
            item: item.name.clone(),
            expected,
            actual: value.type_name(),
        })
    }
}

/// Authoring problems caught before a template is stored.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("template name must not be empty")]
    EmptyName,
    #[error("template '{0}' defines no items")]
    NoItems(String),
    #[error("item '{0}' is defined more than once")]
    DuplicateItem(String),
    #[error("item '{item}': {reason}")]
    RuleKindMismatch { item: String, reason: String },
    #[error("item '{item}': range {min}..{max} is inverted")]
    InvertedRange { item: String, min: f64, max: f64 },
    #[error("item '{item}': threshold {threshold} appears more than once")]
    DuplicateThreshold { item: String, threshold: f64 },
}

pub fn validate_template(template: &KpiTemplate) -> Result<(), TemplateError> {
    if template.name.trim().is_empty() {
        return Err(TemplateError::EmptyName);
    }
    if template.items.is_empty() {
        return Err(TemplateError::NoItems(template.name.clone()));
    }

    let mut names = HashSet::new();
    for item in &template.items {
        if !names.insert(item.name.as_str()) {
            return Err(TemplateError::DuplicateItem(item.name.clone()));
        }
        validate_rules(item)?;
    }

    Ok(())
}

fn validate_rules(item: &TemplateItem) -> Result<(), TemplateError> {
    let mismatch = |reason: &str| TemplateError::RuleKindMismatch {
        item: item.name.clone(),
        reason: reason.to_string(),
    };

    match item.kind {
        ItemKind::Score => Ok(()),
        ItemKind::Percentage => {
            let mut seen: Vec<f64> = Vec::new();
            for rule in &item.rules {
                let threshold = rule
                    .threshold()
                    .ok_or_else(|| mismatch("percentage items only accept numeric thresholds"))?;
                if seen.iter().any(|existing| *existing == threshold) {
                    return Err(TemplateError::DuplicateThreshold {
                        item: item.name.clone(),
                        threshold,
                    });
                }
                seen.push(threshold);
            }
            Ok(())
        }
        kind => {
            for rule in &item.rules {
                match rule {
                    ScoringRule::Range { min, max, .. } => {
                        if kind == ItemKind::Binary {
                            return Err(mismatch("binary items cannot use range rules"));
                        }
                        if min > max {
                            return Err(TemplateError::InvertedRange {
                                item: item.name.clone(),
                                min: *min,
                                max: *max,
                            });
                        }
                    }
                    ScoringRule::Exact { value, .. } => {
                        if kind == ItemKind::Binary && !matches!(value, RawValue::Boolean(_)) {
                            return Err(mismatch("binary items only match boolean values"));
                        }
                        if kind == ItemKind::Quantitative && value.as_number().is_none() {
                            return Err(mismatch("quantitative items only match numbers"));
                        }
                    }
                }
            }
            Ok(())
        }
    }
}
