use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::period::Period;

/// Identifier wrapper for KPI templates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(pub String);

/// Identifier wrapper for directory members.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Identifier wrapper for generated entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How an item's raw value is interpreted by the scoring evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Quantitative,
    Percentage,
    Binary,
    Qualitative,
    Score,
}

impl ItemKind {
    /// Raw value type the item accepts, `None` when any value is allowed.
    pub const fn expected_type(self) -> Option<&'static str> {
        match self {
            Self::Quantitative | Self::Percentage | Self::Score => Some("number"),
            Self::Binary => Some("boolean"),
            Self::Qualitative => None,
        }
    }
}

/// Raw value an officer submits for a template item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Boolean(bool),
    Text(String),
}

impl RawValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::Text(_) => "string",
        }
    }
}

/// Clause mapping a raw value to a score.
///
/// Numeric `Exact` rules double as thresholds for percentage items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoringRule {
    Range { min: f64, max: f64, score: f64 },
    Exact { value: RawValue, score: f64 },
}

impl ScoringRule {
    pub fn score(&self) -> f64 {
        match self {
            Self::Range { score, .. } | Self::Exact { score, .. } => *score,
        }
    }

    pub fn threshold(&self) -> Option<f64> {
        match self {
            Self::Exact {
                value: RawValue::Number(threshold),
                ..
            } => Some(*threshold),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateItem {
    pub name: String,
    pub max_marks: f64,
    pub kind: ItemKind,
    #[serde(default)]
    pub is_dynamic: bool,
    #[serde(default)]
    pub rules: Vec<ScoringRule>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportingFrequency {
    #[default]
    Monthly,
    Quarterly,
    Annually,
}

fn default_active() -> bool {
    true
}

/// Scorable item definitions for one department/role pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiTemplate {
    pub id: TemplateId,
    pub name: String,
    pub department: String,
    pub role: String,
    #[serde(default)]
    pub frequency: ReportingFrequency,
    #[serde(default = "default_active")]
    pub active: bool,
    pub items: Vec<TemplateItem>,
}

impl KpiTemplate {
    pub fn item(&self, name: &str) -> Option<&TemplateItem> {
        self.items.iter().find(|item| item.name == name)
    }
}

/// A sub-area a member is independently scored against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jurisdiction {
    pub id: String,
    pub name: String,
}

/// Role-specific member metadata, each variant carrying its own jurisdiction list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemberProfile {
    Circle {
        circles: Vec<Jurisdiction>,
    },
    Court {
        courts: Vec<Jurisdiction>,
    },
    Halka {
        halkas: Vec<Jurisdiction>,
    },
    Zone {
        zones: Vec<Jurisdiction>,
    },
    #[default]
    Unassigned,
}

/// Uniform view over a profile's jurisdictions used for entry fan-out and tagging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JurisdictionProjection {
    pub kpirefs: Vec<String>,
    pub jurisdiction: Vec<String>,
}

impl MemberProfile {
    pub fn references(&self) -> &[Jurisdiction] {
        match self {
            Self::Circle { circles } => circles,
            Self::Court { courts } => courts,
            Self::Halka { halkas } => halkas,
            Self::Zone { zones } => zones,
            Self::Unassigned => &[],
        }
    }

    /// Repeated reference ids collapse to their first occurrence so the
    /// (member, kpiref) pair stays unique.
    pub fn projection(&self) -> JurisdictionProjection {
        let mut projection = JurisdictionProjection::default();
        for reference in self.references() {
            if projection.kpirefs.contains(&reference.id) {
                continue;
            }
            projection.kpirefs.push(reference.id.clone());
            projection.jurisdiction.push(reference.name.clone());
        }
        projection
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: UserId,
    pub name: String,
    #[serde(alias = "departmentSlug")]
    pub department: String,
    pub role: String,
    #[serde(default)]
    pub profile: MemberProfile,
}

/// Identity of whoever is performing a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: UserId,
    pub department: String,
    pub role: String,
}

impl Actor {
    /// Actor recorded for scheduled sweeps.
    pub fn system() -> Self {
        Self {
            user_id: UserId("system".to_string()),
            department: String::new(),
            role: String::new(),
        }
    }
}

impl From<&Member> for Actor {
    fn from(member: &Member) -> Self {
        Self {
            user_id: member.user_id.clone(),
            department: member.department.clone(),
            role: member.role.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Created,
    Initiated,
    Generated,
}

impl EntryStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Initiated => "initiated",
            Self::Generated => "generated",
        }
    }

    pub const fn priority(self) -> u8 {
        match self {
            Self::Created => 1,
            Self::Initiated => 2,
            Self::Generated => 3,
        }
    }

    /// Placeholders do not count as a filed entry.
    pub const fn has_values(self) -> bool {
        matches!(self, Self::Initiated | Self::Generated)
    }
}

/// Scored value stored on an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<RawValue>,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub is_by_passed: bool,
}

/// Value as submitted by an officer, before scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSubmission {
    pub name: String,
    #[serde(default)]
    pub value: Option<RawValue>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub is_by_passed: bool,
}

impl ValueSubmission {
    pub fn new(name: impl Into<String>, value: RawValue) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            score: None,
            comment: None,
            is_by_passed: false,
        }
    }

    pub fn bypassed(name: impl Into<String>, score: f64) -> Self {
        Self {
            name: name.into(),
            value: None,
            score: Some(score),
            comment: None,
            is_by_passed: true,
        }
    }
}

/// One period's scorable record for one member and, if any, one jurisdiction reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiEntry {
    pub id: EntryId,
    pub template_id: TemplateId,
    pub created_for: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kpirefs: Option<String>,
    #[serde(default)]
    pub jurisdiction: Vec<String>,
    pub month: u32,
    pub year: i32,
    #[serde(default)]
    pub values: Vec<ValueEntry>,
    pub total_score: f64,
    pub status: EntryStatus,
    pub created_by: UserId,
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KpiEntry {
    /// Empty placeholder awaiting officer submission.
    pub fn placeholder(
        template_id: &TemplateId,
        member: &Member,
        kpiref: Option<String>,
        jurisdiction: Vec<String>,
        period: Period,
        created_by: &UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            template_id: template_id.clone(),
            created_for: member.user_id.clone(),
            kpirefs: kpiref,
            jurisdiction,
            month: period.month,
            year: period.year,
            values: Vec::new(),
            total_score: 0.0,
            status: EntryStatus::Created,
            created_by: created_by.clone(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn period(&self) -> Period {
        Period {
            year: self.year,
            month: self.month,
        }
    }
}
