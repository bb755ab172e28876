use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::to_bytes;
use axum::response::Response;
use chrono::{DateTime, FixedOffset, TimeZone};
use serde_json::Value;

use crate::config::KpiConfig;
use crate::kpi::domain::{
    Actor, ItemKind, Jurisdiction, KpiEntry, KpiTemplate, Member, MemberProfile, RawValue,
    ReportingFrequency, ScoringRule, TemplateId, TemplateItem, UserId, ValueSubmission,
};
use crate::kpi::memory::{InMemoryStores, KpiSeed};
use crate::kpi::repository::{
    AuditError, AuditRecord, AuditSink, EntryFilter, EntryStore, KpiStores, MemberDirectory,
    MemberFilter, Page, PageRequest, StoreError,
};
use crate::kpi::{FixedClock, KpiApi, Period};

pub(super) const RECOVERY: &str = "tpl-recovery";
pub(super) const SDM_TEMPLATE: &str = "tpl-sdm";

pub(super) fn config() -> KpiConfig {
    KpiConfig {
        supervisors: vec![("sdm".to_string(), "tehsildar".to_string())],
        insert_batch_size: 2,
        directory_page_size: 2,
        batch_concurrency: 2,
        external_timeout_ms: 200,
        ..KpiConfig::default()
    }
}

pub(super) fn moment(year: i32, month: u32, day: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .and_then(|offset| offset.with_ymd_and_hms(year, month, day, 9, 0, 0).single())
        .expect("valid moment")
}

pub(super) fn march() -> Period {
    Period::new(3, 2025)
}

fn item(name: &str, kind: ItemKind, max_marks: f64, rules: Vec<ScoringRule>) -> TemplateItem {
    TemplateItem {
        name: name.to_string(),
        max_marks,
        kind,
        is_dynamic: false,
        rules,
    }
}

pub(super) fn recovery_template() -> KpiTemplate {
    let mut special_drive = item("special_drive", ItemKind::Score, 5.0, Vec::new());
    special_drive.is_dynamic = true;
    KpiTemplate {
        id: TemplateId(RECOVERY.to_string()),
        name: "Tehsildar monthly recovery".to_string(),
        department: "revenue".to_string(),
        role: "tehsildar".to_string(),
        frequency: ReportingFrequency::Monthly,
        active: true,
        items: vec![
            item(
                "recovery",
                ItemKind::Percentage,
                10.0,
                vec![
                    ScoringRule::Exact {
                        value: RawValue::Number(90.0),
                        score: 10.0,
                    },
                    ScoringRule::Exact {
                        value: RawValue::Number(75.0),
                        score: 7.0,
                    },
                    ScoringRule::Exact {
                        value: RawValue::Number(50.0),
                        score: 4.0,
                    },
                ],
            ),
            item(
                "inspection",
                ItemKind::Binary,
                3.0,
                vec![
                    ScoringRule::Exact {
                        value: RawValue::Boolean(true),
                        score: 3.0,
                    },
                    ScoringRule::Exact {
                        value: RawValue::Boolean(false),
                        score: 0.0,
                    },
                ],
            ),
            special_drive,
        ],
    }
}

/// Template aimed at a supervising role, so nobody it covers is scored.
pub(super) fn sdm_template() -> KpiTemplate {
    KpiTemplate {
        id: TemplateId(SDM_TEMPLATE.to_string()),
        name: "SDM review".to_string(),
        department: "revenue".to_string(),
        role: "sdm".to_string(),
        frequency: ReportingFrequency::Monthly,
        active: true,
        items: vec![item("reviews", ItemKind::Score, 10.0, Vec::new())],
    }
}

fn jurisdictions(prefix: &str, ids: &[&str]) -> Vec<Jurisdiction> {
    ids.iter()
        .map(|id| Jurisdiction {
            id: id.to_string(),
            name: format!("{prefix} {id}"),
        })
        .collect()
}

fn member(id: &str, department: &str, role: &str, profile: MemberProfile) -> Member {
    Member {
        user_id: UserId(id.to_string()),
        name: id.to_uppercase(),
        department: department.to_string(),
        role: role.to_string(),
        profile,
    }
}

pub(super) fn members() -> Vec<Member> {
    vec![
        member("root", "admin", "clerk", MemberProfile::Unassigned),
        member("s1", "revenue", "sdm", MemberProfile::Unassigned),
        member(
            "t1",
            "revenue",
            "tehsildar",
            MemberProfile::Circle {
                circles: jurisdictions("Circle", &["A", "B"]),
            },
        ),
        member("t2", "revenue", "tehsildar", MemberProfile::Unassigned),
        member(
            "p1",
            "revenue",
            "patwari",
            MemberProfile::Halka {
                halkas: jurisdictions("Halka", &["H1"]),
            },
        ),
        member(
            "h1",
            "health",
            "inspector",
            MemberProfile::Zone {
                zones: jurisdictions("Zone", &["Z1"]),
            },
        ),
    ]
}

pub(super) fn seed() -> KpiSeed {
    KpiSeed {
        templates: vec![recovery_template(), sdm_template()],
        members: members(),
    }
}

pub(super) fn actor(id: &str) -> Actor {
    members()
        .iter()
        .find(|member| member.user_id.0 == id)
        .map(Actor::from)
        .expect("fixture member")
}

pub(super) fn filled(recovery: f64, inspected: bool) -> Vec<ValueSubmission> {
    vec![
        ValueSubmission::new("recovery", RawValue::Number(recovery)),
        ValueSubmission::new("inspection", RawValue::Boolean(inspected)),
    ]
}

pub(super) struct Harness {
    pub(super) api: KpiApi,
    pub(super) stores: InMemoryStores,
    pub(super) clock: Arc<FixedClock>,
}

impl Harness {
    pub(super) async fn entries(&self, filter: EntryFilter) -> Vec<KpiEntry> {
        self.stores
            .entries
            .find(&filter)
            .await
            .expect("in-memory find")
    }

    pub(super) async fn entry_for(&self, user: &str, kpiref: Option<&str>) -> KpiEntry {
        let filter = EntryFilter::default()
            .for_members([UserId(user.to_string())])
            .with_kpiref(kpiref.map(str::to_string));
        self.entries(filter)
            .await
            .into_iter()
            .next()
            .expect("entry exists")
    }

    /// Generates March entries for the recovery template as the administrator.
    pub(super) async fn generate_march(&self) {
        self.api
            .batch
            .generate_default_entries(&TemplateId(RECOVERY.to_string()), march(), &actor("root"))
            .await
            .expect("generation succeeds");
    }
}

pub(super) fn harness() -> Harness {
    harness_with(config(), |stores| stores)
}

pub(super) fn harness_with(
    config: KpiConfig,
    customize: impl FnOnce(KpiStores) -> KpiStores,
) -> Harness {
    let stores = InMemoryStores::seeded(seed()).expect("seed loads");
    let clock = Arc::new(FixedClock::new(moment(2025, 3, 10)));
    let api = KpiApi::new(customize(stores.bundle()), &config, clock.clone());
    Harness { api, stores, clock }
}

pub(super) async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

pub(super) struct FailingAudit;

#[async_trait]
impl AuditSink for FailingAudit {
    async fn record(&self, _record: AuditRecord) -> Result<(), AuditError> {
        Err(AuditError::Transport("audit queue offline".to_string()))
    }
}

/// Directory whose listing never answers within the configured timeout.
pub(super) struct StalledDirectory;

#[async_trait]
impl MemberDirectory for StalledDirectory {
    async fn list(
        &self,
        _filter: &MemberFilter,
        _page: PageRequest,
    ) -> Result<Page<Member>, StoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Page {
            items: Vec::new(),
            total: 0,
        })
    }

    async fn get_by_user_id(&self, id: &UserId) -> Result<Option<Member>, StoreError> {
        Ok(members().into_iter().find(|member| &member.user_id == id))
    }
}
