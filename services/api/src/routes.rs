use crate::infra::{deserialize_optional_date, AppState};
use amo_report::config::parse_delimiter;
use amo_report::error::AppError;
use amo_report::report::{
    compute_report, tag_options, DealTable, Mode, ReportBundle, ReportPeriod, ReportRequest,
    Segment,
};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub(crate) struct ReportPayload {
    pub(crate) segment: String,
    #[serde(default)]
    pub(crate) funnel: Option<String>,
    pub(crate) mode: String,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub(crate) date_from: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub(crate) date_to: Option<NaiveDate>,
    #[serde(default)]
    pub(crate) tags: Vec<String>,
    #[serde(default)]
    pub(crate) tag_descriptions: HashMap<String, String>,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub(crate) today: Option<NaiveDate>,
    /// Raw deal export, header row included.
    pub(crate) deals_csv: String,
    #[serde(default)]
    pub(crate) delimiter: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReportResponse {
    pub(crate) segment: Segment,
    pub(crate) funnel: String,
    pub(crate) mode: Mode,
    pub(crate) today: NaiveDate,
    #[serde(flatten)]
    pub(crate) bundle: ReportBundle,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagsPayload {
    pub(crate) deals_csv: String,
    #[serde(default)]
    pub(crate) delimiter: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TagsResponse {
    pub(crate) tags: Vec<String>,
}

pub(crate) fn report_routes() -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/report", post(report_endpoint))
        .route("/api/v1/tags", post(tags_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn report_endpoint(
    Extension(state): Extension<AppState>,
    Json(payload): Json<ReportPayload>,
) -> Result<Json<ReportResponse>, AppError> {
    let ReportPayload {
        segment,
        funnel,
        mode,
        date_from,
        date_to,
        tags,
        tag_descriptions,
        today,
        deals_csv,
        delimiter,
    } = payload;

    let segment: Segment = segment.parse()?;
    let mode: Mode = mode.parse()?;
    let funnel = match funnel.filter(|funnel| !funnel.trim().is_empty()) {
        Some(funnel) => funnel,
        None => state.stage_config.default_funnel(segment, mode)?,
    };
    let today = today.unwrap_or_else(|| Local::now().date_naive());

    let mut request = ReportRequest::new(segment, funnel.clone(), mode, today)
        .with_tags(tags)
        .with_descriptions(tag_descriptions);
    if let Some(period) = ReportPeriod::from_bounds(date_from, date_to)? {
        request = request.with_period(period);
    }

    let table = load_table(&state, &deals_csv, delimiter.as_deref())?;
    let bundle = compute_report(&table, &state.stage_config, &request)?;

    Ok(Json(ReportResponse {
        segment,
        funnel,
        mode,
        today,
        bundle,
    }))
}

pub(crate) async fn tags_endpoint(
    Extension(state): Extension<AppState>,
    Json(payload): Json<TagsPayload>,
) -> Result<Json<TagsResponse>, AppError> {
    let table = load_table(&state, &payload.deals_csv, payload.delimiter.as_deref())?;
    let tags = tag_options(&table.deals()?);
    Ok(Json(TagsResponse { tags }))
}

fn load_table(
    state: &AppState,
    deals_csv: &str,
    delimiter: Option<&str>,
) -> Result<DealTable, AppError> {
    let delimiter = match delimiter {
        Some(raw) => parse_delimiter(raw)?,
        None => state.csv_delimiter,
    };
    Ok(DealTable::from_reader(deals_csv.as_bytes(), delimiter)?)
}
