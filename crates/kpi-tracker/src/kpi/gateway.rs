//! Bounded calls into the external collaborators.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::domain::{KpiTemplate, Member};
use super::error::KpiError;
use super::repository::{
    AuditRecord, AuditSink, MemberDirectory, MemberFilter, PageRequest, StoreError,
    TemplateFilter, TemplateStore,
};

pub(crate) async fn bounded<T, F>(what: &'static str, limit: Duration, call: F) -> Result<T, KpiError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(KpiError::from),
        Err(_) => Err(KpiError::Timeout(what)),
    }
}

/// Drains every directory page matching `filter`.
pub(crate) async fn all_members(
    directory: &dyn MemberDirectory,
    filter: &MemberFilter,
    page_size: usize,
    limit: Duration,
) -> Result<Vec<Member>, KpiError> {
    let mut request = PageRequest::first(page_size);
    let mut members = Vec::new();
    loop {
        let page = bounded("member directory", limit, directory.list(filter, request)).await?;
        let more = page.has_more(request);
        members.extend(page.items);
        if !more {
            return Ok(members);
        }
        request = request.next();
    }
}

pub(crate) async fn all_templates(
    templates: &dyn TemplateStore,
    filter: &TemplateFilter,
    page_size: usize,
    limit: Duration,
) -> Result<Vec<KpiTemplate>, KpiError> {
    let mut request = PageRequest::first(page_size);
    let mut found = Vec::new();
    loop {
        let page = bounded("template store", limit, templates.list(filter, request)).await?;
        let more = page.has_more(request);
        found.extend(page.items);
        if !more {
            return Ok(found);
        }
        request = request.next();
    }
}

/// Audit delivery never fails the caller; problems are only logged.
pub(crate) async fn emit_audit(audit: &dyn AuditSink, record: AuditRecord, limit: Duration) {
    let kind = record.kind.label();
    match tokio::time::timeout(limit, audit.record(record)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(audit.kind = kind, error = %err, "audit record dropped"),
        Err(_) => warn!(audit.kind = kind, "audit sink timed out, record dropped"),
    }
}
