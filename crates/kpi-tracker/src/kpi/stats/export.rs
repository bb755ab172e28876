use std::io::Write;

use super::views::LeaderboardRow;

const HEADER: [&str; 10] = [
    "rank",
    "user_id",
    "name",
    "department",
    "role",
    "kpiref",
    "jurisdiction",
    "status",
    "total_score",
    "has_entry",
];

/// Renders leaderboard rows as CSV with a header line.
pub fn write_csv<W: Write>(writer: W, rows: &[LeaderboardRow]) -> Result<(), csv::Error> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
    csv_writer.write_record(HEADER)?;
    for row in rows {
        csv_writer.write_record([
            row.rank.to_string(),
            row.user_id.0.clone(),
            row.name.clone(),
            row.department.clone(),
            row.role.clone(),
            row.kpiref.clone(),
            row.jurisdiction.clone().unwrap_or_default(),
            row.status_label.to_string(),
            format!("{:.2}", row.total_score),
            row.has_entry.to_string(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}
