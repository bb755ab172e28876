mod export;
mod ranking;
mod summary;
pub mod views;

pub use export::write_csv;
pub use ranking::rank_rows;
pub use views::{
    AvailableFilters, LeaderboardRow, RankingPolicy, RowStatus, Statistics, StatisticsSummary,
};

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::access::AccessPolicy;
use super::domain::{EntryStatus, Member, TemplateId};
use super::error::KpiError;
use super::gateway::{all_members, bounded};
use super::period::{Clock, Period};
use super::repository::{EntryFilter, KpiStores, MemberFilter};
use crate::config::KpiConfig;
use ranking::build_rows;

/// Reference recorded on rows for members scored as one undivided unit.
pub const NO_REFERENCE: &str = "N/A";

/// Leaderboard request. A month or year at or below zero is relative to the
/// current period.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsQuery {
    pub template_id: Option<TemplateId>,
    pub department: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub month: i32,
    #[serde(default)]
    pub year: i32,
}

pub struct StatisticsAggregator {
    stores: KpiStores,
    policy: Arc<AccessPolicy>,
    clock: Arc<dyn Clock>,
    config: KpiConfig,
}

impl StatisticsAggregator {
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

    pub async fn rank(&self, query: &StatisticsQuery) -> Result<Statistics, KpiError> {
        let limit = self.config.external_timeout();
        let current = self.clock.current_period();
        let period =
            Period::resolve(query.month, query.year, current)?.validate(self.config.min_year)?;

        let mut scope = MemberFilter {
            department: query.department.clone(),
            role: query.role.clone(),
        };
        if let Some(template_id) = &query.template_id {
            let template =
                bounded("template store", limit, self.stores.templates.get(template_id))
                    .await?
                    .ok_or_else(|| KpiError::NotFound(format!("template {template_id}")))?;
            if scope.department.is_none() {
                scope.department = Some(template.department);
            }
            if scope.role.is_none() {
                scope.role = Some(template.role);
            }
        }

        let eligible: Vec<Member> = all_members(
            self.stores.directory.as_ref(),
            &MemberFilter::default(),
            self.config.directory_page_size,
            limit,
        )
        .await?
        .into_iter()
        .filter(|member| self.policy.is_scored(member))
        .collect();
        let filters = available_filters(&eligible);
        let population: Vec<Member> = eligible
            .into_iter()
            .filter(|member| scope.matches(member))
            .collect();

        let filter = EntryFilter::default()
            .for_template(query.template_id.clone())
            .in_period(period);
        let entries = bounded("entry store", limit, self.stores.entries.find(&filter)).await?;
        if entries.is_empty() {
            return Err(KpiError::NotFound(
                "no entries for this period, generate entries first".to_string(),
            ));
        }

        let policy = RankingPolicy::for_period(period, current);
        if policy == RankingPolicy::Past
            && !entries
                .iter()
                .any(|entry| entry.status == EntryStatus::Generated)
        {
            return Err(KpiError::NotFound(
                "reports not yet generated for this period".to_string(),
            ));
        }

        let rows = rank_rows(build_rows(&population, &entries), policy);
        let summary = StatisticsSummary::from_rows(&rows);
        debug!(
            %period,
            ?policy,
            rows = summary.total_rows,
            with_entry = summary.with_entry,
            "statistics ranked"
        );

        Ok(Statistics {
            period,
            policy,
            template_id: query.template_id.clone(),
            rows,
            summary,
            filters,
        })
    }
}

fn available_filters(population: &[Member]) -> AvailableFilters {
    let departments: BTreeSet<&str> = population
        .iter()
        .map(|member| member.department.as_str())
        .collect();
    let roles: BTreeSet<&str> = population.iter().map(|member| member.role.as_str()).collect();
    AvailableFilters {
        departments: departments.into_iter().map(str::to_string).collect(),
        roles: roles.into_iter().map(str::to_string).collect(),
    }
}
