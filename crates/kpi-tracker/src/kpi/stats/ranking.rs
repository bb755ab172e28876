use std::collections::HashMap;

use super::super::domain::{KpiEntry, Member, UserId};
use super::views::{LeaderboardRow, RankingPolicy, RowStatus};
use super::NO_REFERENCE;

/// Higher status wins, then higher score.
fn outranks(current: &KpiEntry, candidate: &KpiEntry) -> bool {
    (current.status.priority(), current.total_score)
        .partial_cmp(&(candidate.status.priority(), candidate.total_score))
        .is_some_and(|ordering| ordering.is_ge())
}

/// One row per (member, kpiref). Members without references get a single
/// row tagged [`NO_REFERENCE`].
pub(crate) fn build_rows(population: &[Member], entries: &[KpiEntry]) -> Vec<LeaderboardRow> {
    let mut best: HashMap<(&UserId, Option<&str>), &KpiEntry> = HashMap::new();
    for entry in entries {
        let key = (&entry.created_for, entry.kpirefs.as_deref());
        let replace = best
            .get(&key)
            .map_or(true, |current| !outranks(current, entry));
        if replace {
            best.insert(key, entry);
        }
    }

    let mut rows = Vec::with_capacity(population.len());
    for member in population {
        let projection = member.profile.projection();
        if projection.kpirefs.is_empty() {
            let entry = best.get(&(&member.user_id, None)).copied();
            rows.push(row(member, None, None, entry));
            continue;
        }
        for (kpiref, name) in projection.kpirefs.iter().zip(&projection.jurisdiction) {
            let entry = best.get(&(&member.user_id, Some(kpiref.as_str()))).copied();
            rows.push(row(member, Some(kpiref), Some(name), entry));
        }
    }
    rows
}

fn row(
    member: &Member,
    kpiref: Option<&String>,
    jurisdiction: Option<&String>,
    entry: Option<&KpiEntry>,
) -> LeaderboardRow {
    let status = entry.map_or(RowStatus::NoEntry, |entry| entry.status.into());
    LeaderboardRow {
        rank: 0,
        user_id: member.user_id.clone(),
        name: member.name.clone(),
        department: member.department.clone(),
        role: member.role.clone(),
        kpiref: kpiref.map_or_else(|| NO_REFERENCE.to_string(), |kpiref| kpiref.clone()),
        jurisdiction: jurisdiction.cloned(),
        entry_id: entry.map(|entry| entry.id.clone()),
        template_id: entry.map(|entry| entry.template_id.clone()),
        total_score: entry.map_or(0.0, |entry| entry.total_score),
        status,
        status_label: status.label(),
        has_entry: entry.is_some_and(|entry| entry.status.has_values()),
    }
}

/// Orders rows under `policy` and numbers the sealed ones from 1.
///
/// Current periods sort every row by status then descending score. Past
/// periods lead with sealed rows by descending score and leave the rest in
/// population order.
pub fn rank_rows(mut rows: Vec<LeaderboardRow>, policy: RankingPolicy) -> Vec<LeaderboardRow> {
    match policy {
        RankingPolicy::Current => {
            rows.sort_by(|left, right| {
                right
                    .status
                    .priority()
                    .cmp(&left.status.priority())
                    .then(right.total_score.total_cmp(&left.total_score))
            });
        }
        RankingPolicy::Past => {
            let (mut sealed, rest): (Vec<_>, Vec<_>) = rows
                .into_iter()
                .partition(|row| row.status == RowStatus::Generated);
            sealed.sort_by(|left, right| right.total_score.total_cmp(&left.total_score));
            sealed.extend(rest);
            rows = sealed;
        }
    }

    let mut next = 1;
    for row in &mut rows {
        if row.status == RowStatus::Generated {
            row.rank = next;
            next += 1;
        } else {
            row.rank = 0;
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::domain::{EntryId, EntryStatus, Jurisdiction, MemberProfile, TemplateId};
    use chrono::Utc;

    fn member(id: &str, refs: &[&str]) -> Member {
        let profile = if refs.is_empty() {
            MemberProfile::Unassigned
        } else {
            MemberProfile::Zone {
                zones: refs
                    .iter()
                    .map(|r| Jurisdiction {
                        id: r.to_string(),
                        name: format!("Zone {r}"),
                    })
                    .collect(),
            }
        };
        Member {
            user_id: UserId(id.to_string()),
            name: id.to_uppercase(),
            department: "revenue".to_string(),
            role: "tehsildar".to_string(),
            profile,
        }
    }

    fn entry(user: &str, kpiref: Option<&str>, status: EntryStatus, score: f64) -> KpiEntry {
        KpiEntry {
            id: EntryId(format!("{user}-{}", kpiref.unwrap_or("none"))),
            template_id: TemplateId("tpl".to_string()),
            created_for: UserId(user.to_string()),
            kpirefs: kpiref.map(str::to_string),
            jurisdiction: Vec::new(),
            month: 3,
            year: 2025,
            values: Vec::new(),
            total_score: score,
            status,
            created_by: UserId("admin".to_string()),
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rows_cover_every_reference_and_tag_missing_ones() {
        let population = vec![member("m1", &["A", "B"]), member("m2", &[])];
        let entries = vec![entry("m1", Some("A"), EntryStatus::Initiated, 12.0)];
        let rows = build_rows(&population, &entries);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].kpiref, "A");
        assert!(rows[0].has_entry);
        assert_eq!(rows[1].status, RowStatus::NoEntry);
        assert_eq!(rows[2].kpiref, NO_REFERENCE);
        assert_eq!(rows[2].jurisdiction, None);
    }

    #[test]
    fn created_entries_do_not_count_as_filed() {
        let rows = build_rows(
            &[member("m1", &[])],
            &[entry("m1", None, EntryStatus::Created, 0.0)],
        );
        assert_eq!(rows[0].status, RowStatus::Created);
        assert!(!rows[0].has_entry);
    }

    #[test]
    fn most_advanced_entry_represents_the_row() {
        let mut sealed = entry("m1", None, EntryStatus::Generated, 5.0);
        sealed.id = EntryId("sealed".to_string());
        let rows = build_rows(
            &[member("m1", &[])],
            &[entry("m1", None, EntryStatus::Initiated, 9.0), sealed],
        );
        assert_eq!(rows[0].entry_id, Some(EntryId("sealed".to_string())));
    }

    #[test]
    fn current_policy_ranks_only_generated_rows() {
        let population = vec![
            member("a", &[]),
            member("b", &[]),
            member("c", &[]),
            member("d", &[]),
        ];
        let entries = vec![
            entry("a", None, EntryStatus::Initiated, 30.0),
            entry("b", None, EntryStatus::Generated, 10.0),
            entry("c", None, EntryStatus::Generated, 20.0),
        ];
        let rows = rank_rows(build_rows(&population, &entries), RankingPolicy::Current);

        let order: Vec<(&str, u32)> = rows.iter().map(|r| (r.user_id.0.as_str(), r.rank)).collect();
        assert_eq!(order, vec![("c", 1), ("b", 2), ("a", 0), ("d", 0)]);
    }

    #[test]
    fn past_policy_leads_with_sealed_rows_and_keeps_the_rest_in_order() {
        let population = vec![member("a", &[]), member("b", &[]), member("c", &[])];
        let entries = vec![
            entry("a", None, EntryStatus::Initiated, 50.0),
            entry("c", None, EntryStatus::Generated, 20.0),
        ];
        let rows = rank_rows(build_rows(&population, &entries), RankingPolicy::Past);

        let order: Vec<(&str, u32)> = rows.iter().map(|r| (r.user_id.0.as_str(), r.rank)).collect();
        assert_eq!(order, vec![("c", 1), ("a", 0), ("b", 0)]);
    }
}
