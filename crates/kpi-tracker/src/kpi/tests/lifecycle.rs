use std::sync::Arc;

use super::common::*;
use crate::kpi::domain::{EntryId, EntryStatus, TemplateId, UserId, ValueSubmission};
use crate::kpi::repository::{AuditKind, EntryStore, KpiStores};
use crate::kpi::{EntryQuery, KpiError, MemberEntryQuery};

#[tokio::test]
async fn supervisor_submission_scores_and_initiates_entry() {
    let harness = harness();
    harness.generate_march().await;
    let entry = harness.entry_for("t1", Some("A")).await;

    let stored = harness
        .api
        .entries
        .submit_values(&entry.id, filled(80.0, true), &actor("s1"))
        .await
        .expect("sdm may update tehsildar entries");

    assert_eq!(stored.status, EntryStatus::Initiated);
    assert_eq!(stored.total_score, 10.0);
    assert_eq!(stored.values.len(), 2);
    assert_eq!(stored.version, entry.version + 1);

    let records = harness.stores.audit.records();
    let submitted = records
        .iter()
        .find(|record| record.kind == AuditKind::EntryValuesSubmitted)
        .expect("submission audited");
    assert_eq!(submitted.actor, UserId("s1".to_string()));
    let status_change = submitted
        .changes
        .iter()
        .find(|change| change.field == "status")
        .expect("status change recorded");
    assert_eq!(status_change.before, "created");
    assert_eq!(status_change.after, "initiated");
}

#[tokio::test]
async fn resubmission_recomputes_total() {
    let harness = harness();
    harness.generate_march().await;
    let entry = harness.entry_for("t2", None).await;
    let admin = actor("root");

    harness
        .api
        .entries
        .submit_values(&entry.id, filled(95.0, true), &admin)
        .await
        .expect("first submission");
    let mut second = filled(40.0, false);
    second.push(ValueSubmission::bypassed("special_drive", 2.5));
    let stored = harness
        .api
        .entries
        .submit_values(&entry.id, second, &admin)
        .await
        .expect("resubmission while initiated");

    assert_eq!(stored.status, EntryStatus::Initiated);
    assert_eq!(stored.total_score, 2.5);
}

#[tokio::test]
async fn sealed_entries_reject_every_actor() {
    let harness = harness();
    harness.generate_march().await;
    harness
        .api
        .batch
        .generate_final_reports(&TemplateId(RECOVERY.to_string()), march(), &actor("root"))
        .await
        .expect("sealing succeeds");
    let entry = harness.entry_for("t2", None).await;

    for caller in ["root", "s1", "t1"] {
        let result = harness
            .api
            .entries
            .submit_values(&entry.id, filled(99.0, true), &actor(caller))
            .await;
        match result {
            Err(KpiError::Conflict(message)) => {
                assert_eq!(message, "entry finalized, cannot be modified")
            }
            other => panic!("expected conflict for {caller}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn entries_are_read_only_outside_their_period() {
    let harness = harness();
    harness.generate_march().await;
    let entry = harness.entry_for("t2", None).await;
    harness.clock.set(moment(2025, 4, 2));

    let result = harness
        .api
        .entries
        .submit_values(&entry.id, filled(80.0, true), &actor("root"))
        .await;
    assert!(matches!(
        result,
        Err(KpiError::Conflict(message))
            if message == "entries are only editable during their own reporting period"
    ));
}

#[tokio::test]
async fn peers_and_unrelated_roles_are_forbidden() {
    let harness = harness();
    harness.generate_march().await;
    let entry = harness.entry_for("t1", Some("B")).await;

    for caller in ["t2", "p1"] {
        let result = harness
            .api
            .entries
            .submit_values(&entry.id, filled(80.0, true), &actor(caller))
            .await;
        assert!(
            matches!(result, Err(KpiError::Forbidden(_))),
            "{caller} must not update"
        );
    }
}

#[tokio::test]
async fn missing_required_item_is_a_validation_error() {
    let harness = harness();
    harness.generate_march().await;
    let entry = harness.entry_for("t2", None).await;

    let result = harness
        .api
        .entries
        .submit_values(
            &entry.id,
            vec![ValueSubmission::bypassed("special_drive", 1.0)],
            &actor("root"),
        )
        .await;
    assert!(matches!(result, Err(KpiError::Validation(message)) if message.contains("recovery")));

    let untouched = harness.entry_for("t2", None).await;
    assert_eq!(untouched.status, EntryStatus::Created);
}

#[tokio::test]
async fn unknown_entry_is_not_found() {
    let harness = harness();
    let result = harness
        .api
        .entries
        .submit_values(
            &EntryId("missing".to_string()),
            filled(80.0, true),
            &actor("root"),
        )
        .await;
    assert!(matches!(result, Err(KpiError::NotFound(_))));
}

#[tokio::test]
async fn stale_version_maps_to_conflict() {
    let harness = harness();
    harness.generate_march().await;
    let stale = harness.entry_for("t2", None).await;

    harness
        .api
        .entries
        .submit_values(&stale.id, filled(80.0, true), &actor("root"))
        .await
        .expect("submission");

    let result = harness
        .stores
        .entries
        .update(stale.clone(), stale.version)
        .await
        .map_err(KpiError::from);
    assert!(matches!(result, Err(KpiError::Conflict(_))));
}

#[tokio::test]
async fn audit_failures_do_not_fail_submission() {
    let harness = harness_with(config(), |stores| KpiStores {
        audit: Arc::new(FailingAudit),
        ..stores
    });
    harness.generate_march().await;
    let entry = harness.entry_for("t2", None).await;

    let stored = harness
        .api
        .entries
        .submit_values(&entry.id, filled(80.0, true), &actor("root"))
        .await
        .expect("audit errors are swallowed");
    assert_eq!(stored.status, EntryStatus::Initiated);
}

#[tokio::test]
async fn entry_listing_filters_and_orders_by_member() {
    let harness = harness();
    harness.generate_march().await;

    let all = harness
        .api
        .entries
        .get_entries(&EntryQuery {
            template_id: Some(TemplateId(RECOVERY.to_string())),
            month: Some(0),
            year: Some(0),
            ..EntryQuery::default()
        })
        .await
        .expect("listing");
    let keys: Vec<(String, Option<String>)> = all
        .iter()
        .map(|entry| (entry.created_for.0.clone(), entry.kpirefs.clone()))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("t1".to_string(), Some("A".to_string())),
            ("t1".to_string(), Some("B".to_string())),
            ("t2".to_string(), None),
        ]
    );

    let previous_month = harness
        .api
        .entries
        .get_entries(&EntryQuery {
            month: Some(-1),
            ..EntryQuery::default()
        })
        .await
        .expect("listing");
    assert!(previous_month.is_empty());

    let by_ref = harness
        .api
        .entries
        .get_entries(&EntryQuery {
            kpiref: Some("B".to_string()),
            status: Some(EntryStatus::Created),
            ..EntryQuery::default()
        })
        .await
        .expect("listing");
    assert_eq!(by_ref.len(), 1);
}

#[tokio::test]
async fn invalid_period_in_listing_is_rejected() {
    let harness = harness();
    let result = harness
        .api
        .entries
        .get_entries(&EntryQuery {
            month: Some(13),
            year: Some(2025),
            ..EntryQuery::default()
        })
        .await;
    assert!(matches!(result, Err(KpiError::Validation(_))));
}

#[tokio::test]
async fn member_entry_lookup_uses_reference_and_period() {
    let harness = harness();
    harness.generate_march().await;

    let found = harness
        .api
        .entries
        .get_entry_for_member(&MemberEntryQuery {
            user_id: UserId("t1".to_string()),
            kpiref: Some("B".to_string()),
            month: 3,
            year: 2025,
            template_id: None,
        })
        .await
        .expect("entry found");
    assert_eq!(found.kpirefs.as_deref(), Some("B"));

    let unreferenced = harness
        .api
        .entries
        .get_entry_for_member(&MemberEntryQuery {
            user_id: UserId("t2".to_string()),
            kpiref: Some("N/A".to_string()),
            month: 0,
            year: 0,
            template_id: Some(TemplateId(RECOVERY.to_string())),
        })
        .await
        .expect("unreferenced entry found");
    assert_eq!(unreferenced.kpirefs, None);

    let missing = harness
        .api
        .entries
        .get_entry_for_member(&MemberEntryQuery {
            user_id: UserId("t1".to_string()),
            kpiref: Some("A".to_string()),
            month: 2,
            year: 2025,
            template_id: None,
        })
        .await;
    assert!(matches!(missing, Err(KpiError::NotFound(_))));
}

#[tokio::test]
async fn member_lookup_without_kpiref_returns_the_most_advanced_jurisdiction() {
    let harness = harness();
    harness.generate_march().await;
    let circle_b = harness.entry_for("t1", Some("B")).await;
    harness
        .api
        .entries
        .submit_values(&circle_b.id, filled(80.0, true), &actor("s1"))
        .await
        .expect("submission for circle B");

    let query = |user: &str| MemberEntryQuery {
        user_id: UserId(user.to_string()),
        kpiref: None,
        month: 3,
        year: 2025,
        template_id: None,
    };
    let best = harness
        .api
        .entries
        .get_entry_for_member(&query("t1"))
        .await
        .expect("referenced member found without kpiref");
    assert_eq!(best.id, circle_b.id);
    assert_eq!(best.status, EntryStatus::Initiated);

    let unreferenced = harness
        .api
        .entries
        .get_entry_for_member(&query("t2"))
        .await
        .expect("unreferenced member found without kpiref");
    assert_eq!(unreferenced.kpirefs, None);
}

#[tokio::test]
async fn unknown_actor_is_forbidden() {
    let harness = harness();
    let result = harness
        .api
        .entries
        .resolve_actor(&UserId("ghost".to_string()))
        .await;
    assert!(matches!(result, Err(KpiError::Forbidden(_))));
}
