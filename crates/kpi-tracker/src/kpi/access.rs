use std::collections::{BTreeMap, BTreeSet};

use super::domain::{Actor, Member};
use super::error::KpiError;

/// Explicit supervising relation between roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleHierarchy {
    relations: BTreeMap<String, BTreeSet<String>>,
}

impl RoleHierarchy {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut hierarchy = Self::default();
        for (supervisor, target) in pairs {
            hierarchy.insert(supervisor, target);
        }
        hierarchy
    }

    pub fn insert(&mut self, supervisor: impl Into<String>, target: impl Into<String>) {
        self.relations
            .entry(supervisor.into())
            .or_default()
            .insert(target.into());
    }

    pub fn supervises(&self, supervisor: &str, target: &str) -> bool {
        self.relations
            .get(supervisor)
            .is_some_and(|targets| targets.contains(target))
    }

    pub fn is_supervisor(&self, role: &str) -> bool {
        self.relations
            .get(role)
            .is_some_and(|targets| !targets.is_empty())
    }
}

/// Decides who may edit entries and who is scored at all.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    admin_department: String,
    hierarchy: RoleHierarchy,
}

impl AccessPolicy {
    pub fn new(admin_department: impl Into<String>, hierarchy: RoleHierarchy) -> Self {
        Self {
            admin_department: admin_department.into(),
            hierarchy,
        }
    }

    pub fn is_admin(&self, actor: &Actor) -> bool {
        actor.department == self.admin_department
    }

    /// Administrators and supervising officers never receive entries.
    pub fn is_scored(&self, member: &Member) -> bool {
        member.department != self.admin_department && !self.hierarchy.is_supervisor(&member.role)
    }

    pub fn can_update(&self, actor: &Actor, subject: &Member) -> bool {
        self.is_admin(actor) || self.hierarchy.supervises(&actor.role, &subject.role)
    }

    pub fn authorize_update(&self, actor: &Actor, subject: &Member) -> Result<(), KpiError> {
        if self.can_update(actor, subject) {
            Ok(())
        } else {
            Err(KpiError::Forbidden(format!(
                "{} ({}) may not update entries for role {}",
                actor.user_id, actor.role, subject.role
            )))
        }
    }

    pub fn require_admin(&self, actor: &Actor) -> Result<(), KpiError> {
        if self.is_admin(actor) {
            Ok(())
        } else {
            Err(KpiError::Forbidden(format!(
                "{} is not in the {} department",
                actor.user_id, self.admin_department
            )))
        }
    }
}
