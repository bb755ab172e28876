//! Monthly provisioning and sealing of KPI entries.
//!
//! Generation refuses to run when any eligible member already holds an entry
//! for the template and period. That check reads the store immediately before
//! inserting and is not atomic with the insert: two concurrent triggers for the
//! same template and period can both pass it. Callers serialize triggers per
//! template (the scheduler runs one sweep per job at a time).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::info;

use super::access::AccessPolicy;
use super::domain::{Actor, EntryId, EntryStatus, KpiEntry, Member, TemplateId, UserId};
use super::error::KpiError;
use super::gateway::{all_members, bounded, emit_audit};
use super::period::{Clock, Period};
use super::repository::{AuditChange, AuditKind, AuditRecord, EntryFilter, KpiStores, MemberFilter};
use crate::config::KpiConfig;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub template_id: TemplateId,
    pub period: Period,
    pub eligible_members: usize,
    pub excluded_members: usize,
    pub entries_created: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizationReport {
    pub template_id: TemplateId,
    pub period: Period,
    pub entries_sealed: usize,
}

/// Placeholder entries for every member: one per jurisdiction reference, or a
/// single unreferenced entry when the member has none.
pub fn default_entries_for(
    template_id: &TemplateId,
    members: &[Member],
    period: Period,
    created_by: &UserId,
    now: DateTime<Utc>,
) -> Vec<KpiEntry> {
    let mut entries = Vec::with_capacity(members.len());
    for member in members {
        let projection = member.profile.projection();
        if projection.kpirefs.is_empty() {
            entries.push(KpiEntry::placeholder(
                template_id,
                member,
                None,
                Vec::new(),
                period,
                created_by,
                now,
            ));
            continue;
        }
        for kpiref in &projection.kpirefs {
            entries.push(KpiEntry::placeholder(
                template_id,
                member,
                Some(kpiref.clone()),
                projection.jurisdiction.clone(),
                period,
                created_by,
                now,
            ));
        }
    }
    entries
}

pub struct BatchGenerator {
    stores: KpiStores,
    policy: Arc<AccessPolicy>,
    clock: Arc<dyn Clock>,
    config: KpiConfig,
}

impl BatchGenerator {
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

    fn now(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }

    /// Creates the period's placeholder entries for everyone the template covers.
    pub async fn generate_default_entries(
        &self,
        template_id: &TemplateId,
        period: Period,
        actor: &Actor,
    ) -> Result<GenerationReport, KpiError> {
        let limit = self.config.external_timeout();
        let template = bounded("template store", limit, self.stores.templates.get(template_id))
            .await?
            .ok_or_else(|| KpiError::NotFound(format!("template {template_id}")))?;
        let period = period.validate(self.config.min_year)?;

        let members = all_members(
            self.stores.directory.as_ref(),
            &MemberFilter::for_template(&template),
            self.config.directory_page_size,
            limit,
        )
        .await?;
        let (eligible, excluded): (Vec<Member>, Vec<Member>) = members
            .into_iter()
            .partition(|member| self.policy.is_scored(member));

        if eligible.is_empty() {
            return Err(KpiError::NotFound(format!(
                "no eligible members for template {template_id}"
            )));
        }

        let existing = EntryFilter::default()
            .for_template(Some(template_id.clone()))
            .in_period(period)
            .for_members(eligible.iter().map(|member| member.user_id.clone()));
        let existing = bounded("entry store", limit, self.stores.entries.find(&existing)).await?;
        if !existing.is_empty() {
            return Err(KpiError::Conflict(format!(
                "entries already exist for template {template_id} in {period}"
            )));
        }

        let now = self.now();
        let entries = default_entries_for(template_id, &eligible, period, &actor.user_id, now);
        let chunks: Vec<Vec<KpiEntry>> = entries
            .chunks(self.config.insert_batch_size.max(1))
            .map(<[KpiEntry]>::to_vec)
            .collect();

        let store = self.stores.entries.clone();
        let entries_created = stream::iter(chunks)
            .map(|chunk| {
                let store = store.clone();
                async move { bounded("entry store", limit, store.insert_many(chunk)).await }
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .try_fold(0usize, |total, inserted| async move { Ok(total + inserted) })
            .await?;

        let report = GenerationReport {
            template_id: template_id.clone(),
            period,
            eligible_members: eligible.len(),
            excluded_members: excluded.len(),
            entries_created,
        };

        let record = AuditRecord {
            kind: AuditKind::DefaultEntriesGenerated,
            actor: actor.user_id.clone(),
            action: format!("generated default entries for {template_id} in {period}"),
            changes: vec![
                AuditChange::new("members", 0, report.eligible_members),
                AuditChange::new("entries", 0, report.entries_created),
                AuditChange::new("excluded", 0, report.excluded_members),
            ],
            recorded_at: now,
        };
        emit_audit(self.stores.audit.as_ref(), record, limit).await;

        info!(
            template = %template_id,
            %period,
            members = report.eligible_members,
            excluded = report.excluded_members,
            entries = report.entries_created,
            "default entries generated"
        );
        Ok(report)
    }

    /// Seals every open entry of the period. Scores are not recomputed.
    pub async fn generate_final_reports(
        &self,
        template_id: &TemplateId,
        period: Period,
        actor: &Actor,
    ) -> Result<FinalizationReport, KpiError> {
        let limit = self.config.external_timeout();
        let period = period.validate(self.config.min_year)?;

        let open = EntryFilter::default()
            .for_template(Some(template_id.clone()))
            .in_period(period)
            .with_statuses(&[EntryStatus::Created, EntryStatus::Initiated]);
        let open = bounded("entry store", limit, self.stores.entries.find(&open)).await?;
        if open.is_empty() {
            return Err(KpiError::NotFound(format!(
                "no open entries for template {template_id} in {period}"
            )));
        }

        let now = self.now();
        let ids: Vec<EntryId> = open.into_iter().map(|entry| entry.id).collect();
        let chunks: Vec<Vec<EntryId>> = ids
            .chunks(self.config.insert_batch_size.max(1))
            .map(<[EntryId]>::to_vec)
            .collect();

        let store = self.stores.entries.clone();
        let entries_sealed = stream::iter(chunks)
            .map(|chunk| {
                let store = store.clone();
                async move { bounded("entry store", limit, store.seal(&chunk, now)).await }
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .try_fold(0usize, |total, sealed| async move { Ok(total + sealed) })
            .await?;

        let record = AuditRecord {
            kind: AuditKind::FinalReportsGenerated,
            actor: actor.user_id.clone(),
            action: format!("sealed entries for {template_id} in {period}"),
            changes: vec![AuditChange::new("sealed", 0, entries_sealed)],
            recorded_at: now,
        };
        emit_audit(self.stores.audit.as_ref(), record, limit).await;

        info!(template = %template_id, %period, sealed = entries_sealed, "final reports generated");
        Ok(FinalizationReport {
            template_id: template_id.clone(),
            period,
            entries_sealed,
        })
    }
}
