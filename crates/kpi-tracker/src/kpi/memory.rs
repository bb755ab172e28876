//! In-process stores backing the demo, the API binary and the tests.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{EntryId, EntryStatus, KpiEntry, KpiTemplate, Member, TemplateId, UserId};
use super::repository::{
    AuditError, AuditRecord, AuditSink, EntryFilter, EntryStore, KpiStores, MemberDirectory,
    MemberFilter, Page, PageRequest, StoreError, TemplateFilter, TemplateStore,
};
use super::scoring::{validate_template, TemplateError};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("in-memory store poisoned".to_string()))
}

#[derive(Debug, Default)]
pub struct InMemoryTemplateStore {
    templates: Mutex<BTreeMap<TemplateId, KpiTemplate>>,
}

impl InMemoryTemplateStore {
    /// Validates and stores a template; names are unique across the store.
    pub fn insert(&self, template: KpiTemplate) -> Result<(), SeedError> {
        validate_template(&template)?;
        let mut guard = lock(&self.templates)?;
        if guard.contains_key(&template.id)
            || guard.values().any(|existing| existing.name == template.name)
        {
            return Err(SeedError::DuplicateTemplate(template.name));
        }
        guard.insert(template.id.clone(), template);
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn get(&self, id: &TemplateId) -> Result<Option<KpiTemplate>, StoreError> {
        Ok(lock(&self.templates)?.get(id).cloned())
    }

    async fn list(
        &self,
        filter: &TemplateFilter,
        page: PageRequest,
    ) -> Result<Page<KpiTemplate>, StoreError> {
        let matching: Vec<KpiTemplate> = lock(&self.templates)?
            .values()
            .filter(|template| filter.matches(template))
            .cloned()
            .collect();
        Ok(Page::slice(matching, page))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryMemberDirectory {
    members: Mutex<BTreeMap<UserId, Member>>,
}

impl InMemoryMemberDirectory {
    pub fn upsert(&self, member: Member) -> Result<(), StoreError> {
        lock(&self.members)?.insert(member.user_id.clone(), member);
        Ok(())
    }
}

#[async_trait]
impl MemberDirectory for InMemoryMemberDirectory {
    async fn list(
        &self,
        filter: &MemberFilter,
        page: PageRequest,
    ) -> Result<Page<Member>, StoreError> {
        let matching: Vec<Member> = lock(&self.members)?
            .values()
            .filter(|member| filter.matches(member))
            .cloned()
            .collect();
        Ok(Page::slice(matching, page))
    }

    async fn get_by_user_id(&self, id: &UserId) -> Result<Option<Member>, StoreError> {
        Ok(lock(&self.members)?.get(id).cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryEntryStore {
    entries: Mutex<HashMap<EntryId, KpiEntry>>,
}

impl InMemoryEntryStore {
    pub fn len(&self) -> usize {
        self.entries.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EntryStore for InMemoryEntryStore {
    async fn insert_many(&self, entries: Vec<KpiEntry>) -> Result<usize, StoreError> {
        let mut guard = lock(&self.entries)?;
        if entries.iter().any(|entry| guard.contains_key(&entry.id)) {
            return Err(StoreError::Conflict);
        }
        let count = entries.len();
        for entry in entries {
            guard.insert(entry.id.clone(), entry);
        }
        Ok(count)
    }

    async fn fetch(&self, id: &EntryId) -> Result<Option<KpiEntry>, StoreError> {
        Ok(lock(&self.entries)?.get(id).cloned())
    }

    async fn find(&self, filter: &EntryFilter) -> Result<Vec<KpiEntry>, StoreError> {
        let mut found: Vec<KpiEntry> = lock(&self.entries)?
            .values()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        found.sort_by(|left, right| {
            (&left.created_for, &left.kpirefs, &left.template_id).cmp(&(
                &right.created_for,
                &right.kpirefs,
                &right.template_id,
            ))
        });
        Ok(found)
    }

    async fn update(
        &self,
        mut entry: KpiEntry,
        expected_version: u64,
    ) -> Result<KpiEntry, StoreError> {
        let mut guard = lock(&self.entries)?;
        let stored = guard.get(&entry.id).ok_or(StoreError::NotFound)?;
        if stored.version != expected_version {
            return Err(StoreError::VersionMismatch {
                expected: expected_version,
                found: stored.version,
            });
        }
        entry.version = expected_version + 1;
        guard.insert(entry.id.clone(), entry.clone());
        Ok(entry)
    }

    async fn seal(&self, ids: &[EntryId], at: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut guard = lock(&self.entries)?;
        let mut sealed = 0;
        for id in ids {
            if let Some(entry) = guard.get_mut(id) {
                if entry.status != EntryStatus::Generated {
                    entry.status = EntryStatus::Generated;
                    entry.version += 1;
                    entry.updated_at = at;
                    sealed += 1;
                }
            }
        }
        Ok(sealed)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records
            .lock()
            .map_err(|_| AuditError::Transport("audit log poisoned".to_string()))?
            .push(record);
        Ok(())
    }
}

/// Templates and members used to hydrate the in-memory stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KpiSeed {
    #[serde(default)]
    pub templates: Vec<KpiTemplate>,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl KpiSeed {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SeedError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }
}

/// Concrete handles alongside the trait-object bundle the services consume.
#[derive(Clone, Default)]
pub struct InMemoryStores {
    pub templates: Arc<InMemoryTemplateStore>,
    pub directory: Arc<InMemoryMemberDirectory>,
    pub entries: Arc<InMemoryEntryStore>,
    pub audit: Arc<InMemoryAuditLog>,
}

impl InMemoryStores {
    pub fn seeded(seed: KpiSeed) -> Result<Self, SeedError> {
        let stores = Self::default();
        for template in seed.templates {
            stores.templates.insert(template)?;
        }
        for member in seed.members {
            stores.directory.upsert(member)?;
        }
        Ok(stores)
    }

    pub fn bundle(&self) -> KpiStores {
        KpiStores {
            templates: self.templates.clone(),
            directory: self.directory.clone(),
            entries: self.entries.clone(),
            audit: self.audit.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read seed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse seed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("template '{0}' already exists")]
    DuplicateTemplate(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
