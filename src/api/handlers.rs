//! Route handlers for the control surface

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::server::AppState;
use super::{ApiError, ApiResponse};
use crate::models::{Account, GainRecord, GainSample};
use crate::scheduler::{SchedulerError, WorkerStatus};

const DEFAULT_PAGE_SIZE: usize = 100;
const SAMPLE_CSV_HEADER: &str = "route_points,points_before,points_after";

type StatusMap = BTreeMap<String, WorkerStatus>;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Optional single-worker selector for start/stop
#[derive(Debug, Default, Deserialize)]
pub struct WorkerQuery {
    pub worker: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewAccountRequest {
    pub username: String,
    pub secret: String,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub username: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SampleQuery {
    pub limit: Option<usize>,
    pub format: Option<String>,
}

// ============================================================================
// Health
// ============================================================================

pub async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}

pub async fn metrics() -> Response {
    match crate::metrics::encode_metrics() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => ApiError::Internal(format!("Failed to encode metrics: {e}")).into_response(),
    }
}

// ============================================================================
// Workers
// ============================================================================

pub async fn worker_status(State(state): State<AppState>) -> Json<ApiResponse<StatusMap>> {
    Json(ApiResponse::success(state.group.status()))
}

/// Start every worker, or only `?worker=<id>`
pub async fn start_workers(
    State(state): State<AppState>,
    Query(query): Query<WorkerQuery>,
) -> Result<Json<ApiResponse<StatusMap>>, ApiError> {
    match query.worker {
        Some(name) => match state.group.start_worker(&name) {
            Ok(()) | Err(SchedulerError::AlreadyRunning { .. }) => {}
            Err(e) => return Err(e.into()),
        },
        None => {
            state.group.start();
        }
    }
    Ok(Json(ApiResponse::success(state.group.status())))
}

/// Stop every worker, or only `?worker=<id>`
pub async fn stop_workers(
    State(state): State<AppState>,
    Query(query): Query<WorkerQuery>,
) -> Result<Json<ApiResponse<StatusMap>>, ApiError> {
    match query.worker {
        Some(name) => {
            state.group.stop_worker(&name)?;
        }
        None => state.group.stop(),
    }
    Ok(Json(ApiResponse::success(state.group.status())))
}

// ============================================================================
// Credentials
// ============================================================================

pub async fn list_credentials(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    Ok(Json(ApiResponse::success(state.pool.usernames()?)))
}

pub async fn add_credential(
    State(state): State<AppState>,
    Json(request): Json<NewAccountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AccountResponse>>), ApiError> {
    let username = request.username.trim();
    if username.is_empty() || request.secret.is_empty() {
        return Err(ApiError::bad_request("username and secret are required"));
    }

    state.pool.add(&Account::new(username, request.secret))?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(AccountResponse {
            username: username.to_string(),
        })),
    ))
}

// ============================================================================
// Point gains
// ============================================================================

pub async fn list_point_gains(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ApiResponse<Vec<GainRecord>>>, ApiError> {
    let limit = page.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let records = state
        .stores
        .point_gains
        .list(Some(limit), page.skip.unwrap_or(0))?;
    Ok(Json(ApiResponse::success(records)))
}

pub async fn point_gains_for_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<GainRecord>>>, ApiError> {
    let event_id: i64 = event_id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid event id: {event_id}")))?;
    let records = state.stores.point_gains.list_by_event_id(event_id)?;
    Ok(Json(ApiResponse::success(records)))
}

/// Completed gains for model fitting, as JSON or a CSV attachment
pub async fn point_gain_sample(
    State(state): State<AppState>,
    Query(query): Query<SampleQuery>,
) -> Result<Response, ApiError> {
    let format = query.format.as_deref().unwrap_or("json");
    if format != "json" && format != "csv" {
        return Err(ApiError::bad_request(format!(
            "Unsupported format '{format}', expected json or csv"
        )));
    }

    let samples = state.stores.point_gains.list_completed_with_gain(query.limit)?;

    if format == "csv" {
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"point_gain_sample.csv\"",
                ),
            ],
            samples_to_csv(&samples),
        )
            .into_response());
    }

    Ok(Json(ApiResponse::success(samples)).into_response())
}

fn samples_to_csv(samples: &[GainSample]) -> String {
    let mut csv = String::with_capacity(SAMPLE_CSV_HEADER.len() + samples.len() * 16);
    csv.push_str(SAMPLE_CSV_HEADER);
    csv.push('\n');
    for s in samples {
        let _ = writeln!(csv, "{},{},{}", s.route_points, s.points_before, s.points_after);
    }
    csv
}
