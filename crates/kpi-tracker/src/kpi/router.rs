use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{Actor, EntryId, TemplateId, UserId, ValueSubmission};
use super::entries::{EntryQuery, MemberEntryQuery};
use super::error::KpiError;
use super::period::Period;
use super::scheduler::JobName;
use super::stats::StatisticsQuery;
use super::KpiApi;

/// Header carrying the acting member's user id.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Router builder exposing the KPI lifecycle, batch, statistics and scheduler endpoints.
pub fn kpi_router(api: KpiApi) -> Router {
    Router::new()
        .route(
            "/api/v1/kpi/templates/:template_id/entries",
            post(generate_entries_handler),
        )
        .route(
            "/api/v1/kpi/templates/:template_id/reports",
            post(final_reports_handler),
        )
        .route("/api/v1/kpi/entries", get(list_entries_handler))
        .route(
            "/api/v1/kpi/entries/:entry_id/values",
            put(submit_values_handler),
        )
        .route(
            "/api/v1/kpi/members/:user_id/entry",
            get(member_entry_handler),
        )
        .route("/api/v1/kpi/statistics", get(statistics_handler))
        .route("/api/v1/kpi/scheduler/jobs", get(scheduler_status_handler))
        .route(
            "/api/v1/kpi/scheduler/jobs/:job/:action",
            post(scheduler_action_handler),
        )
        .with_state(api)
}

impl IntoResponse for KpiError {
    fn into_response(self) -> Response {
        let status = match &self {
            KpiError::NotFound(_) => StatusCode::NOT_FOUND,
            KpiError::Conflict(_) => StatusCode::CONFLICT,
            KpiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            KpiError::Forbidden(_) => StatusCode::FORBIDDEN,
            KpiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            KpiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(kind = self.kind(), error = %self, "kpi request failed");
        }
        let payload = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (status, Json(payload)).into_response()
    }
}

/// Month and year for batch operations; zero or negative values are relative.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeriodRequest {
    #[serde(default)]
    pub month: i32,
    #[serde(default)]
    pub year: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitValuesRequest {
    pub values: Vec<ValueSubmission>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberEntryParams {
    pub kpiref: Option<String>,
    #[serde(default)]
    pub month: i32,
    #[serde(default)]
    pub year: i32,
    pub template_id: Option<TemplateId>,
}

async fn actor_from(api: &KpiApi, headers: &HeaderMap) -> Result<Actor, KpiError> {
    let user_id = headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| KpiError::Forbidden(format!("missing {ACTOR_HEADER} header")))?;
    api.entries.resolve_actor(&UserId(user_id.to_string())).await
}

async fn admin_from(api: &KpiApi, headers: &HeaderMap) -> Result<Actor, KpiError> {
    let actor = actor_from(api, headers).await?;
    api.policy.require_admin(&actor)?;
    Ok(actor)
}

/// An empty body targets the current period; anything else must parse.
fn resolve_period(api: &KpiApi, body: &[u8]) -> Result<Period, KpiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        PeriodRequest::default()
    } else {
        serde_json::from_slice::<PeriodRequest>(body)
            .map_err(|err| KpiError::Validation(format!("invalid period body: {err}")))?
    };
    Ok(Period::resolve(
        request.month,
        request.year,
        api.clock.current_period(),
    )?)
}

pub(crate) async fn generate_entries_handler(
    State(api): State<KpiApi>,
    Path(template_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, KpiError> {
    let actor = admin_from(&api, &headers).await?;
    let period = resolve_period(&api, &body)?;
    let report = api
        .batch
        .generate_default_entries(&TemplateId(template_id), period, &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(report)).into_response())
}

pub(crate) async fn final_reports_handler(
    State(api): State<KpiApi>,
    Path(template_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, KpiError> {
    let actor = admin_from(&api, &headers).await?;
    let period = resolve_period(&api, &body)?;
    let report = api
        .batch
        .generate_final_reports(&TemplateId(template_id), period, &actor)
        .await?;
    Ok((StatusCode::OK, Json(report)).into_response())
}

pub(crate) async fn submit_values_handler(
    State(api): State<KpiApi>,
    Path(entry_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SubmitValuesRequest>,
) -> Result<Response, KpiError> {
    let actor = actor_from(&api, &headers).await?;
    let entry = api
        .entries
        .submit_values(&EntryId(entry_id), request.values, &actor)
        .await?;
    Ok((StatusCode::OK, Json(entry)).into_response())
}

pub(crate) async fn list_entries_handler(
    State(api): State<KpiApi>,
    Query(query): Query<EntryQuery>,
) -> Result<Response, KpiError> {
    let entries = api.entries.get_entries(&query).await?;
    Ok((StatusCode::OK, Json(entries)).into_response())
}

pub(crate) async fn member_entry_handler(
    State(api): State<KpiApi>,
    Path(user_id): Path<String>,
    Query(params): Query<MemberEntryParams>,
) -> Result<Response, KpiError> {
    let query = MemberEntryQuery {
        user_id: UserId(user_id),
        kpiref: params.kpiref,
        month: params.month,
        year: params.year,
        template_id: params.template_id,
    };
    let entry = api.entries.get_entry_for_member(&query).await?;
    Ok((StatusCode::OK, Json(entry)).into_response())
}

pub(crate) async fn statistics_handler(
    State(api): State<KpiApi>,
    Query(query): Query<StatisticsQuery>,
) -> Result<Response, KpiError> {
    let statistics = api.statistics.rank(&query).await?;
    Ok((StatusCode::OK, Json(statistics)).into_response())
}

pub(crate) async fn scheduler_status_handler(State(api): State<KpiApi>) -> Response {
    let statuses = api.scheduler.status().await;
    (StatusCode::OK, Json(statuses)).into_response()
}

pub(crate) async fn scheduler_action_handler(
    State(api): State<KpiApi>,
    Path((job, action)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, KpiError> {
    admin_from(&api, &headers).await?;
    let job: JobName = job.parse()?;
    let response = match action.as_str() {
        "trigger" => Json(api.scheduler.trigger(job).await?).into_response(),
        "start" => Json(api.scheduler.start(job).await?).into_response(),
        "stop" => Json(api.scheduler.stop(job).await?).into_response(),
        "restart" => Json(api.scheduler.restart(job).await?).into_response(),
        other => {
            return Err(KpiError::NotFound(format!("scheduler action {other}")));
        }
    };
    Ok(response)
}
