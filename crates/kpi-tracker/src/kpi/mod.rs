//! Periodic KPI tracking: templates, scored entries, monthly batches and leaderboards.

pub mod access;
pub mod batch;
pub mod domain;
pub mod entries;
mod error;
mod gateway;
pub mod memory;
pub mod period;
pub mod repository;
pub mod router;
pub mod scheduler;
pub mod scoring;
pub mod stats;

#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use access::{AccessPolicy, RoleHierarchy};
pub use batch::{BatchGenerator, FinalizationReport, GenerationReport};
pub use entries::{EntryLifecycleService, EntryQuery, MemberEntryQuery};
pub use error::KpiError;
pub use period::{Clock, FixedClock, Period, SystemClock};
pub use repository::KpiStores;
pub use router::kpi_router;
pub use scheduler::{JobName, SchedulerTrigger};
pub use stats::{StatisticsAggregator, StatisticsQuery};

use crate::config::KpiConfig;

/// The KPI services wired to one set of stores and one clock.
#[derive(Clone)]
pub struct KpiApi {
    pub entries: Arc<EntryLifecycleService>,
    pub batch: Arc<BatchGenerator>,
    pub statistics: Arc<StatisticsAggregator>,
    pub scheduler: Arc<SchedulerTrigger>,
    pub policy: Arc<AccessPolicy>,
    pub clock: Arc<dyn Clock>,
}

impl KpiApi {
    pub fn new(stores: KpiStores, config: &KpiConfig, clock: Arc<dyn Clock>) -> Self {
        let hierarchy = RoleHierarchy::from_pairs(config.supervisors.iter().cloned());
        let policy = Arc::new(AccessPolicy::new(config.admin_department.clone(), hierarchy));

        let entries = Arc::new(EntryLifecycleService::new(
            stores.clone(),
            policy.clone(),
            clock.clone(),
            config.clone(),
        ));
        let batch = Arc::new(BatchGenerator::new(
            stores.clone(),
            policy.clone(),
            clock.clone(),
            config.clone(),
        ));
        let statistics = Arc::new(StatisticsAggregator::new(
            stores.clone(),
            policy.clone(),
            clock.clone(),
            config.clone(),
        ));
        let mut scheduler =
            SchedulerTrigger::new(batch.clone(), stores, clock.clone(), config.clone());
        for job in JobName::ALL {
            if let Some(schedule) = config.schedule_override(job) {
                scheduler = scheduler.with_schedule(job, schedule);
            }
        }
        let scheduler = Arc::new(scheduler);

        Self {
            entries,
            batch,
            statistics,
            scheduler,
            policy,
            clock,
        }
    }
}
