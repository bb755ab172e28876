use serde::Serialize;

use super::super::domain::{EntryId, EntryStatus, TemplateId, UserId};
use super::super::period::Period;

/// Row state on the leaderboard, including members who hold no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Generated,
    Initiated,
    Created,
    NoEntry,
}

impl RowStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Initiated => "initiated",
            Self::Created => "created",
            Self::NoEntry => "no_entry",
        }
    }

    pub const fn priority(self) -> u8 {
        match self {
            Self::Generated => 3,
            Self::Initiated => 2,
            Self::Created => 1,
            Self::NoEntry => 0,
        }
    }
}

impl From<EntryStatus> for RowStatus {
    fn from(status: EntryStatus) -> Self {
        match status {
            EntryStatus::Generated => Self::Generated,
            EntryStatus::Initiated => Self::Initiated,
            EntryStatus::Created => Self::Created,
        }
    }
}

/// Ranking behavior, chosen by comparing the requested period with today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingPolicy {
    Current,
    Past,
}

impl RankingPolicy {
    pub fn for_period(period: Period, current: Period) -> Self {
        if period < current {
            Self::Past
        } else {
            Self::Current
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    /// Zero for rows without a sealed entry.
    pub rank: u32,
    pub user_id: UserId,
    pub name: String,
    pub department: String,
    pub role: String,
    pub kpiref: String,
    pub jurisdiction: Option<String>,
    pub entry_id: Option<EntryId>,
    pub template_id: Option<TemplateId>,
    pub total_score: f64,
    pub status: RowStatus,
    pub status_label: &'static str,
    pub has_entry: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSummary {
    pub total_rows: usize,
    pub with_entry: usize,
    pub without_entry: usize,
    pub average_score: f64,
    pub highest_score: f64,
    pub lowest_score: f64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AvailableFilters {
    pub departments: Vec<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub period: Period,
    pub policy: RankingPolicy,
    pub template_id: Option<TemplateId>,
    pub rows: Vec<LeaderboardRow>,
    pub summary: StatisticsSummary,
    pub filters: AvailableFilters,
}
