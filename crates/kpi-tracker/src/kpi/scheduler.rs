//! In-process monthly jobs driving the batch generator.
//!
//! Each job owns at most one background task. Sweeps for the same job never
//! overlap: scheduled fires and manual triggers share a per-job lock.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::batch::BatchGenerator;
use super::domain::{Actor, KpiTemplate, TemplateId};
use super::error::KpiError;
use super::gateway::all_templates;
use super::period::{Clock, Period};
use super::repository::{KpiStores, TemplateFilter};
use crate::config::KpiConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobName {
    DefaultEntries,
    FinalReports,
}

impl JobName {
    pub const ALL: [JobName; 2] = [JobName::DefaultEntries, JobName::FinalReports];

    pub const fn label(self) -> &'static str {
        match self {
            Self::DefaultEntries => "default-entries",
            Self::FinalReports => "final-reports",
        }
    }

    /// Default entries open the running month; final reports close the one just ended.
    pub fn target_period(self, current: Period) -> Period {
        match self {
            Self::DefaultEntries => current,
            Self::FinalReports => current.previous(),
        }
    }

    pub const fn default_schedule(self) -> MonthlySchedule {
        match self {
            Self::DefaultEntries => MonthlySchedule::new(1, 0, 30),
            Self::FinalReports => MonthlySchedule::new(1, 0, 5),
        }
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for JobName {
    type Err = KpiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|job| job.label() == value)
            .ok_or_else(|| KpiError::NotFound(format!("scheduler job {value}")))
    }
}

/// Fires once a month at a wall-clock time in the configured offset. Days past
/// the end of a short month fire on its last day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthlySchedule {
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl MonthlySchedule {
    pub const fn new(day: u32, hour: u32, minute: u32) -> Self {
        Self { day, hour, minute }
    }

    pub fn next_after(&self, after: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        let offset = *after.offset();
        let period = Period::from_date(after.date_naive());
        for candidate in [period, period.next()] {
            let fire = self.fire_in(candidate, offset)?;
            if fire > after {
                return Some(fire);
            }
        }
        None
    }

    fn fire_in(&self, period: Period, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
        let day = self.day.max(1).min(period.days().max(1));
        let naive = NaiveDate::from_ymd_opt(period.year, period.month, day)?
            .and_hms_opt(self.hour, self.minute, 0)?;
        offset.from_local_datetime(&naive).single()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSuccess {
    pub template_id: TemplateId,
    /// Entries created or sealed for the template.
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepFailure {
    pub template_id: TemplateId,
    pub kind: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub job: JobName,
    pub period: Period,
    pub started_at: DateTime<FixedOffset>,
    pub successes: Vec<SweepSuccess>,
    pub failures: Vec<SweepFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub name: JobName,
    pub running: bool,
    pub schedule: MonthlySchedule,
    pub next_run: Option<DateTime<FixedOffset>>,
    pub last_run: Option<SweepReport>,
}

struct SweepRunner {
    batch: Arc<BatchGenerator>,
    stores: KpiStores,
    clock: Arc<dyn Clock>,
    config: KpiConfig,
    locks: HashMap<JobName, Mutex<()>>,
    last_runs: Mutex<HashMap<JobName, SweepReport>>,
}

impl SweepRunner {
    async fn sweep(&self, job: JobName) -> Result<SweepReport, KpiError> {
        let _exclusive = match self.locks.get(&job) {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let started_at = self.clock.now();
        let period = job.target_period(Period::from_date(started_at.date_naive()));
        let templates = all_templates(
            self.stores.templates.as_ref(),
            &TemplateFilter::active(),
            self.config.directory_page_size,
            self.config.external_timeout(),
        )
        .await?;

        let actor = Actor::system();
        let outcomes: Vec<(TemplateId, Result<usize, KpiError>)> = stream::iter(templates)
            .map(|template: KpiTemplate| {
                let actor = &actor;
                async move {
                    let result = match job {
                        JobName::DefaultEntries => self
                            .batch
                            .generate_default_entries(&template.id, period, actor)
                            .await
                            .map(|report| report.entries_created),
                        JobName::FinalReports => self
                            .batch
                            .generate_final_reports(&template.id, period, actor)
                            .await
                            .map(|report| report.entries_sealed),
                    };
                    (template.id, result)
                }
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .collect()
            .await;

        let mut report = SweepReport {
            job,
            period,
            started_at,
            successes: Vec::new(),
            failures: Vec::new(),
        };
        for (template_id, outcome) in outcomes {
            match outcome {
                Ok(entries) => report.successes.push(SweepSuccess {
                    template_id,
                    entries,
                }),
                Err(err) => {
                    warn!(%job, template = %template_id, error = %err, "sweep skipped template");
                    report.failures.push(SweepFailure {
                        template_id,
                        kind: err.kind(),
                        error: err.to_string(),
                    });
                }
            }
        }
        report
            .successes
            .sort_by(|left, right| left.template_id.cmp(&right.template_id));
        report
            .failures
            .sort_by(|left, right| left.template_id.cmp(&right.template_id));

        info!(
            %job,
            %period,
            succeeded = report.successes.len(),
            failed = report.failures.len(),
            "sweep finished"
        );
        self.last_runs.lock().await.insert(job, report.clone());
        Ok(report)
    }
}

async fn run_job(runner: Arc<SweepRunner>, job: JobName, schedule: MonthlySchedule) {
    let mut after = runner.clock.now();
    loop {
        let Some(next) = schedule.next_after(after) else {
            warn!(%job, "no further fire time, job stopping");
            return;
        };
        let wait = (next - runner.clock.now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        if let Err(err) = runner.sweep(job).await {
            warn!(%job, error = %err, "scheduled sweep failed");
        }
        after = next;
    }
}

struct JobSlot {
    schedule: MonthlySchedule,
    handle: Option<JoinHandle<()>>,
}

impl JobSlot {
    fn running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// Explicit job table for the monthly sweeps.
pub struct SchedulerTrigger {
    runner: Arc<SweepRunner>,
    jobs: Mutex<BTreeMap<JobName, JobSlot>>,
}

impl SchedulerTrigger {
    pub fn new(
        batch: Arc<BatchGenerator>,
        stores: KpiStores,
        clock: Arc<dyn Clock>,
        config: KpiConfig,
    ) -> Self {
        let runner = SweepRunner {
            batch,
            stores,
            clock,
            config,
            locks: JobName::ALL
                .into_iter()
                .map(|job| (job, Mutex::new(())))
                .collect(),
            last_runs: Mutex::new(HashMap::new()),
        };
        let jobs = JobName::ALL
            .into_iter()
            .map(|job| {
                let slot = JobSlot {
                    schedule: job.default_schedule(),
                    handle: None,
                };
                (job, slot)
            })
            .collect();
        Self {
            runner: Arc::new(runner),
            jobs: Mutex::new(jobs),
        }
    }

    /// Overrides a job's schedule; takes effect on the next start.
    pub fn with_schedule(mut self, job: JobName, schedule: MonthlySchedule) -> Self {
        if let Some(slot) = self.jobs.get_mut().get_mut(&job) {
            slot.schedule = schedule;
        }
        self
    }

    /// Starting a running job is a no-op.
    pub async fn start(&self, job: JobName) -> Result<JobStatus, KpiError> {
        {
            let mut jobs = self.jobs.lock().await;
            let slot = jobs
                .get_mut(&job)
                .ok_or_else(|| KpiError::NotFound(format!("scheduler job {job}")))?;
            if !slot.running() {
                let runner = self.runner.clone();
                slot.handle = Some(tokio::spawn(run_job(runner, job, slot.schedule)));
                info!(%job, "scheduler job started");
            }
        }
        self.job_status(job).await
    }

    pub async fn stop(&self, job: JobName) -> Result<JobStatus, KpiError> {
        {
            let mut jobs = self.jobs.lock().await;
            let slot = jobs
                .get_mut(&job)
                .ok_or_else(|| KpiError::NotFound(format!("scheduler job {job}")))?;
            if let Some(handle) = slot.handle.take() {
                handle.abort();
                info!(%job, "scheduler job stopped");
            }
        }
        self.job_status(job).await
    }

    pub async fn restart(&self, job: JobName) -> Result<JobStatus, KpiError> {
        self.stop(job).await?;
        self.start(job).await
    }

    pub async fn start_all(&self) -> Result<Vec<JobStatus>, KpiError> {
        for job in JobName::ALL {
            self.start(job).await?;
        }
        Ok(self.status().await)
    }

    /// Runs a sweep now, independent of whether the job is scheduled.
    pub async fn trigger(&self, job: JobName) -> Result<SweepReport, KpiError> {
        info!(%job, "sweep triggered manually");
        self.runner.sweep(job).await
    }

    pub async fn job_status(&self, job: JobName) -> Result<JobStatus, KpiError> {
        let (running, schedule) = {
            let jobs = self.jobs.lock().await;
            let slot = jobs
                .get(&job)
                .ok_or_else(|| KpiError::NotFound(format!("scheduler job {job}")))?;
            (slot.running(), slot.schedule)
        };
        let next_run = if running {
            schedule.next_after(self.runner.clock.now())
        } else {
            None
        };
        let last_run = self.runner.last_runs.lock().await.get(&job).cloned();
        Ok(JobStatus {
            name: job,
            running,
            schedule,
            next_run,
            last_run,
        })
    }

    pub async fn status(&self) -> Vec<JobStatus> {
        let mut statuses = Vec::with_capacity(JobName::ALL.len());
        for job in JobName::ALL {
            if let Ok(status) = self.job_status(job).await {
                statuses.push(status);
            }
        }
        statuses
    }
}

impl Drop for SchedulerTrigger {
    fn drop(&mut self) {
        for slot in self.jobs.get_mut().values_mut() {
            if let Some(handle) = slot.handle.take() {
                handle.abort();
            }
        }
    }
}
