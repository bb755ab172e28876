use super::views::{LeaderboardRow, StatisticsSummary};

impl StatisticsSummary {
    /// Score figures only consider rows with a filed entry and are 0 when none exist.
    pub fn from_rows(rows: &[LeaderboardRow]) -> Self {
        let scores: Vec<f64> = rows
            .iter()
            .filter(|row| row.has_entry)
            .map(|row| row.total_score)
            .collect();

        let total_rows = rows.len();
        let with_entry = scores.len();
        let (average_score, highest_score, lowest_score) = if scores.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let sum: f64 = scores.iter().sum();
            (
                sum / with_entry as f64,
                scores.iter().copied().fold(f64::MIN, f64::max),
                scores.iter().copied().fold(f64::MAX, f64::min),
            )
        };
        let completion_rate = if total_rows == 0 {
            0.0
        } else {
            with_entry as f64 / total_rows as f64
        };

        Self {
            total_rows,
            with_entry,
            without_entry: total_rows - with_entry,
            average_score,
            highest_score,
            lowest_score,
            completion_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::domain::UserId;
    use crate::kpi::stats::views::RowStatus;

    fn row(score: f64, status: RowStatus) -> LeaderboardRow {
        LeaderboardRow {
            rank: 0,
            user_id: UserId("u".to_string()),
            name: "U".to_string(),
            department: "revenue".to_string(),
            role: "tehsildar".to_string(),
            kpiref: "N/A".to_string(),
            jurisdiction: None,
            entry_id: None,
            template_id: None,
            total_score: score,
            status,
            status_label: status.label(),
            has_entry: matches!(status, RowStatus::Generated | RowStatus::Initiated),
        }
    }

    #[test]
    fn summarizes_filed_rows_only() {
        let summary = StatisticsSummary::from_rows(&[
            row(10.0, RowStatus::Generated),
            row(20.0, RowStatus::Initiated),
            row(0.0, RowStatus::Created),
            row(0.0, RowStatus::NoEntry),
        ]);
        assert_eq!(summary.total_rows, 4);
        assert_eq!(summary.with_entry, 2);
        assert_eq!(summary.without_entry, 2);
        assert_eq!(summary.average_score, 15.0);
        assert_eq!(summary.highest_score, 20.0);
        assert_eq!(summary.lowest_score, 10.0);
        assert_eq!(summary.completion_rate, 0.5);
    }

    #[test]
    fn empty_population_yields_zeroes() {
        let summary = StatisticsSummary::from_rows(&[]);
        assert_eq!(summary.total_rows, 0);
        assert_eq!(summary.completion_rate, 0.0);
        assert_eq!(summary.highest_score, 0.0);
    }
}
