use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::access::AccessPolicy;
use super::domain::{Actor, EntryId, EntryStatus, KpiEntry, TemplateId, UserId, ValueSubmission};
use super::error::KpiError;
use super::gateway::{bounded, emit_audit};
use super::period::{Clock, Period};
use super::repository::{AuditChange, AuditKind, AuditRecord, EntryFilter, KpiStores};
use super::scoring::score_submission;
use super::stats::NO_REFERENCE;
use crate::config::KpiConfig;

/// Selection for entry listings. Unset fields match everything; a month or
/// year at or below zero is relative to the current period.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryQuery {
    pub template_id: Option<TemplateId>,
    pub created_for: Option<UserId>,
    pub month: Option<i32>,
    pub year: Option<i32>,
    pub status: Option<EntryStatus>,
    pub kpiref: Option<String>,
}

/// Lookup of the single entry a member holds for one jurisdiction and period.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberEntryQuery {
    pub user_id: UserId,
    #[serde(default)]
    pub kpiref: Option<String>,
    #[serde(default)]
    pub month: i32,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub template_id: Option<TemplateId>,
}

/// Owns the `created -> initiated -> generated` transitions an officer can drive.
pub struct EntryLifecycleService {
    stores: KpiStores,
    policy: Arc<AccessPolicy>,
    clock: Arc<dyn Clock>,
    config: KpiConfig,
}

impl EntryLifecycleService {
    pub fn new(
        stores: KpiStores,
        policy: Arc<AccessPolicy>,
        clock: Arc<dyn Clock>,
        config: KpiConfig,
    ) -> Self {
        Self {
            stores,
            policy,
            clock,
            config,
        }
    }

    /// Scores and stores an officer's values, moving the entry to `initiated`.
    pub async fn submit_values(
        &self,
        entry_id: &EntryId,
        submissions: Vec<ValueSubmission>,
        actor: &Actor,
    ) -> Result<KpiEntry, KpiError> {
        let limit = self.config.external_timeout();
        let entry = bounded("entry store", limit, self.stores.entries.fetch(entry_id))
            .await?
            .ok_or_else(|| KpiError::NotFound(format!("entry {entry_id}")))?;

        if entry.status == EntryStatus::Generated {
            return Err(KpiError::Conflict(
                "entry finalized, cannot be modified".to_string(),
            ));
        }
        if self.clock.current_period() != entry.period() {
            return Err(KpiError::Conflict(
                "entries are only editable during their own reporting period".to_string(),
            ));
        }

        let subject = bounded(
            "member directory",
            limit,
            self.stores.directory.get_by_user_id(&entry.created_for),
        )
        .await?
        .ok_or_else(|| KpiError::NotFound(format!("member {}", entry.created_for)))?;
        self.policy.authorize_update(actor, &subject)?;

        let template = bounded(
            "template store",
            limit,
            self.stores.templates.get(&entry.template_id),
        )
        .await?
        .ok_or_else(|| KpiError::NotFound(format!("template {}", entry.template_id)))?;

        let scored = score_submission(&template, &submissions)?;

        let before = entry.clone();
        let mut updated = entry;
        updated.values = scored.values;
        updated.total_score = scored.total_score;
        updated.status = EntryStatus::Initiated;
        updated.updated_at = self.clock.now().with_timezone(&Utc);

        let stored = bounded(
            "entry store",
            limit,
            self.stores.entries.update(updated, before.version),
        )
        .await?;

        let record = AuditRecord {
            kind: AuditKind::EntryValuesSubmitted,
            actor: actor.user_id.clone(),
            action: format!("submitted values for entry {}", stored.id),
            changes: vec![
                AuditChange::new("status", before.status, stored.status),
                AuditChange::new("totalScore", before.total_score, stored.total_score),
                AuditChange::new("values", &before.values, &stored.values),
            ],
            recorded_at: stored.updated_at,
        };
        emit_audit(self.stores.audit.as_ref(), record, limit).await;

        info!(
            entry = %stored.id,
            member = %stored.created_for,
            actor = %actor.user_id,
            total_score = stored.total_score,
            "entry values submitted"
        );
        Ok(stored)
    }

    pub async fn get_entries(&self, query: &EntryQuery) -> Result<Vec<KpiEntry>, KpiError> {
        let mut filter = EntryFilter::default().for_template(query.template_id.clone());
        if query.month.is_some() || query.year.is_some() {
            let period = Period::resolve(
                query.month.unwrap_or(0),
                query.year.unwrap_or(0),
                self.clock.current_period(),
            )?
            .validate(self.config.min_year)?;
            filter = filter.in_period(period);
        }
        if let Some(member) = &query.created_for {
            filter = filter.for_members([member.clone()]);
        }
        if let Some(kpiref) = &query.kpiref {
            filter = filter.with_kpiref(Some(kpiref.clone()));
        }
        if let Some(status) = query.status {
            filter = filter.with_statuses(&[status]);
        }

        let mut entries = bounded(
            "entry store",
            self.config.external_timeout(),
            self.stores.entries.find(&filter),
        )
        .await?;
        entries.sort_by(|left, right| {
            (&left.created_for, &left.kpirefs).cmp(&(&right.created_for, &right.kpirefs))
        });
        Ok(entries)
    }

    /// Several templates or jurisdictions may cover the same member. When no
    /// template or kpiref narrows the lookup the most advanced entry wins.
    /// `N/A` selects the entry generated without a jurisdiction.
    pub async fn get_entry_for_member(
        &self,
        query: &MemberEntryQuery,
    ) -> Result<KpiEntry, KpiError> {
        let period = Period::resolve(query.month, query.year, self.clock.current_period())?
            .validate(self.config.min_year)?;
        let mut filter = EntryFilter::default()
            .for_template(query.template_id.clone())
            .in_period(period)
            .for_members([query.user_id.clone()]);
        match query.kpiref.as_deref() {
            None => {}
            Some(NO_REFERENCE) => filter = filter.with_kpiref(None),
            Some(kpiref) => filter = filter.with_kpiref(Some(kpiref.to_string())),
        }

        let entries = bounded(
            "entry store",
            self.config.external_timeout(),
            self.stores.entries.find(&filter),
        )
        .await?;

        entries
            .into_iter()
            .max_by(|left, right| {
                left.status
                    .priority()
                    .cmp(&right.status.priority())
                    .then(left.total_score.total_cmp(&right.total_score))
            })
            .ok_or_else(|| {
                KpiError::NotFound(format!(
                    "no entry for member {} in {period}",
                    query.user_id
                ))
            })
    }

    /// Maps a caller id onto a directory member; unknown callers are refused.
    pub async fn resolve_actor(&self, user_id: &UserId) -> Result<Actor, KpiError> {
        let member = bounded(
            "member directory",
            self.config.external_timeout(),
            self.stores.directory.get_by_user_id(user_id),
        )
        .await?
        .ok_or_else(|| KpiError::Forbidden(format!("unknown actor {user_id}")))?;
        Ok(Actor::from(&member))
    }
}
