use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{EntryId, EntryStatus, KpiEntry, KpiTemplate, Member, TemplateId, UserId};
use super::period::Period;

/// Offset/limit window for paginated collaborator reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self {
            offset: 0,
            limit: limit.max(1),
        }
    }

    pub fn next(self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T: Clone> Page<T> {
    /// Cuts one window out of an already filtered result set.
    pub fn slice(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();
        Self { items, total }
    }
}

impl<T> Page<T> {
    pub fn has_more(&self, request: PageRequest) -> bool {
        !self.items.is_empty() && request.offset + self.items.len() < self.total
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemplateFilter {
    pub department: Option<String>,
    pub role: Option<String>,
    pub active_only: bool,
}

impl TemplateFilter {
    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, template: &KpiTemplate) -> bool {
        (!self.active_only || template.active)
            && self
                .department
                .as_ref()
                .map_or(true, |department| &template.department == department)
            && self.role.as_ref().map_or(true, |role| &template.role == role)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberFilter {
    pub department: Option<String>,
    pub role: Option<String>,
}

impl MemberFilter {
    pub fn for_template(template: &KpiTemplate) -> Self {
        Self {
            department: Some(template.department.clone()),
            role: Some(template.role.clone()),
        }
    }

    pub fn matches(&self, member: &Member) -> bool {
        self.department
            .as_ref()
            .map_or(true, |department| &member.department == department)
            && self.role.as_ref().map_or(true, |role| &member.role == role)
    }
}

/// Entry selection criteria. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub template_id: Option<TemplateId>,
    pub period: Option<Period>,
    pub members: Option<BTreeSet<UserId>>,
    /// `Some(None)` selects entries without a jurisdiction reference.
    pub kpiref: Option<Option<String>>,
    pub statuses: Vec<EntryStatus>,
}

impl EntryFilter {
    pub fn for_template(mut self, template_id: Option<TemplateId>) -> Self {
        self.template_id = template_id;
        self
    }

    pub fn in_period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn for_members(mut self, members: impl IntoIterator<Item = UserId>) -> Self {
        self.members = Some(members.into_iter().collect());
        self
    }

    pub fn with_kpiref(mut self, kpiref: Option<String>) -> Self {
        self.kpiref = Some(kpiref);
        self
    }

    pub fn with_statuses(mut self, statuses: &[EntryStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn matches(&self, entry: &KpiEntry) -> bool {
        self.template_id
            .as_ref()
            .map_or(true, |id| &entry.template_id == id)
            && self.period.map_or(true, |period| entry.period() == period)
            && self
                .members
                .as_ref()
                .map_or(true, |members| members.contains(&entry.created_for))
            && self
                .kpiref
                .as_ref()
                .map_or(true, |kpiref| &entry.kpirefs == kpiref)
            && (self.statuses.is_empty() || self.statuses.contains(&entry.status))
    }
}

/// Read access to administrator-defined templates.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn get(&self, id: &TemplateId) -> Result<Option<KpiTemplate>, StoreError>;
    async fn list(
        &self,
        filter: &TemplateFilter,
        page: PageRequest,
    ) -> Result<Page<KpiTemplate>, StoreError>;
}

/// Read access to the organization's member directory.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn list(&self, filter: &MemberFilter, page: PageRequest)
        -> Result<Page<Member>, StoreError>;
    async fn get_by_user_id(&self, id: &UserId) -> Result<Option<Member>, StoreError>;
}

/// Persistent entry storage.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn insert_many(&self, entries: Vec<KpiEntry>) -> Result<usize, StoreError>;
    async fn fetch(&self, id: &EntryId) -> Result<Option<KpiEntry>, StoreError>;
    async fn find(&self, filter: &EntryFilter) -> Result<Vec<KpiEntry>, StoreError>;
    /// Replaces the entry when its stored version equals `expected_version`,
    /// returning the stored copy with the version bumped.
    async fn update(&self, entry: KpiEntry, expected_version: u64)
        -> Result<KpiEntry, StoreError>;
    /// Moves the given entries to `generated`, returning how many changed.
    async fn seal(&self, ids: &[EntryId], at: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Write-only sink for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Collaborators shared by the KPI services.
#[derive(Clone)]
pub struct KpiStores {
    pub templates: Arc<dyn TemplateStore>,
    pub directory: Arc<dyn MemberDirectory>,
    pub entries: Arc<dyn EntryStore>,
    pub audit: Arc<dyn AuditSink>,
}

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u64, found: u64 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    EntryValuesSubmitted,
    DefaultEntriesGenerated,
    FinalReportsGenerated,
}

impl AuditKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::EntryValuesSubmitted => "entry_values_submitted",
            Self::DefaultEntriesGenerated => "default_entries_generated",
            Self::FinalReportsGenerated => "final_reports_generated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditChange {
    pub field: String,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
}

impl AuditChange {
    pub fn new(
        field: impl Into<String>,
        before: impl Serialize,
        after: impl Serialize,
    ) -> Self {
        Self {
            field: field.into(),
            before: serde_json::to_value(before).unwrap_or(serde_json::Value::Null),
            after: serde_json::to_value(after).unwrap_or(serde_json::Value::Null),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub kind: AuditKind,
    pub actor: UserId,
    pub action: String,
    pub changes: Vec<AuditChange>,
    pub recorded_at: DateTime<Utc>,
}

/// Audit dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit transport unavailable: {0}")]
    Transport(String),
}
