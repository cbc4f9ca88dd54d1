//! HTTP admin API.
//!
//! Endpoints:
//! - GET    /api/health               - daemon status
//! - GET    /api/attendance           - all durable records
//! - GET    /api/attendance/recent    - in-memory recent-events buffer
//! - GET    /api/attendance/export    - CSV download of the durable log
//! - GET    /api/employees            - enrolled identities (no encodings)
//! - POST   /api/employees            - enroll or update an identity
//! - DELETE /api/employees/{id}       - remove an identity
//! - POST   /api/employees/reload     - reload encodings from the store

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{AttendanceEvent, AttendancePipeline, Encoding, EncodingRepository, Identity};

use crate::mqtt::TransportStatus;
use crate::sink::SqliteEventSink;
use crate::store::IdentityStore;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AttendancePipeline<SqliteEventSink>>,
    pub repository: Arc<EncodingRepository>,
    pub store: Arc<IdentityStore>,
    pub sink: SqliteEventSink,
    pub transport: Arc<TransportStatus>,
    pub db_path: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/attendance", get(list_attendance))
        .route("/api/attendance/recent", get(recent_attendance))
        .route("/api/attendance/export", get(export_attendance))
        .route("/api/employees", get(list_employees).post(enroll_employee))
        .route("/api/employees/{id}", delete(remove_employee))
        .route("/api/employees/reload", post(reload_encodings))
        .with_state(state)
}

pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "http api listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// JSON error body shaped like `{"detail": "..."}`.
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn not_found(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: detail.into(),
        }
    }

    fn unprocessable(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: detail.into(),
        }
    }

    fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            detail: detail.into(),
        }
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.detail });
        (self.status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    mqtt_connected: bool,
    identities_loaded: usize,
    last_detection: Option<DateTime<Utc>>,
    db_path: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        mqtt_connected: state.transport.is_connected(),
        identities_loaded: state.repository.len(),
        last_detection: state.pipeline.last_detection(),
        db_path: state.db_path.clone(),
    })
}

#[derive(Serialize)]
struct AttendanceList {
    total: usize,
    records: Vec<AttendanceEvent>,
}

async fn list_attendance(
    State(state): State<AppState>,
) -> Result<Json<AttendanceList>, ApiError> {
    let records = state.sink.read_all().await.map_err(ApiError::internal)?;
    Ok(Json(AttendanceList {
        total: records.len(),
        records,
    }))
}

async fn recent_attendance(State(state): State<AppState>) -> Json<AttendanceList> {
    let records = state.pipeline.recent_events();
    Json(AttendanceList {
        total: records.len(),
        records,
    })
}

async fn export_attendance(State(state): State<AppState>) -> Result<Response, ApiError> {
    let records = state.sink.read_all().await.map_err(ApiError::internal)?;
    let csv = records_to_csv(&records);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"attendance_log.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

#[derive(Serialize)]
struct EmployeeEntry {
    id: String,
    display_name: String,
}

#[derive(Serialize)]
struct EmployeeList {
    total: usize,
    employees: Vec<EmployeeEntry>,
}

async fn list_employees(State(state): State<AppState>) -> Json<EmployeeList> {
    let snapshot = state.repository.snapshot();
    let employees: Vec<_> = snapshot
        .identities()
        .map(|identity| EmployeeEntry {
            id: identity.id.clone(),
            display_name: identity.display_name.clone(),
        })
        .collect();
    Json(EmployeeList {
        total: employees.len(),
        employees,
    })
}

#[derive(Deserialize)]
struct EnrollRequest {
    id: String,
    display_name: String,
    encoding: Vec<f32>,
}

async fn enroll_employee(
    State(state): State<AppState>,
    Json(req): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let expected = state.repository.dim();
    if req.encoding.len() != expected {
        return Err(ApiError::unprocessable(format!(
            "encoding must have {expected} components, got {}",
            req.encoding.len()
        )));
    }

    let identity = Identity {
        id: req.id,
        display_name: req.display_name,
        encoding: Encoding::new(req.encoding),
    };
    state
        .store
        .upsert(&identity)
        .await
        .map_err(ApiError::internal)?;
    state.repository.upsert(identity.clone());
    tracing::info!(id = %identity.id, name = %identity.display_name, "identity enrolled");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "id": identity.id })),
    ))
}

async fn remove_employee(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let in_store = state.store.delete(&id).await.map_err(ApiError::internal)?;
    let in_repo = state.repository.remove(&id);
    state.pipeline.forget_identity(&id);

    if !in_store && !in_repo {
        return Err(ApiError::not_found(format!("identity '{id}' not found")));
    }
    tracing::info!(id = %id, "identity removed");
    Ok(Json(serde_json::json!({ "success": true, "id": id })))
}

async fn reload_encodings(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identities = state
        .store
        .list_all(state.repository.dim())
        .await
        .map_err(|err| ApiError::unavailable(err.to_string()))?;
    let loaded = identities.len();
    state.repository.load(identities);
    Ok(Json(serde_json::json!({ "success": true, "loaded": loaded })))
}

fn records_to_csv(records: &[AttendanceEvent]) -> String {
    let mut out = String::from("sr_no,identity_id,display_name,date,time,confidence\n");
    for (i, record) in records.iter().enumerate() {
        let date = record.recorded_at.format("%Y-%m-%d");
        let time = record.recorded_at.format("%H:%M:%S");
        out.push_str(&format!(
            "{},{},{},{},{},{:.2}\n",
            i + 1,
            csv_field(&record.identity_id),
            csv_field(&record.display_name),
            date,
            time,
            record.confidence,
        ));
    }
    out
}

/// Quote a field if it contains a comma, quote or newline.
fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, name: &str, secs: i64, confidence: f32) -> AttendanceEvent {
        AttendanceEvent {
            identity_id: id.into(),
            display_name: name.into(),
            recorded_at: DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap(),
            confidence,
        }
    }

    #[test]
    fn test_csv_has_header_and_rows() {
        let csv = records_to_csv(&[
            event("e1", "Ada Lovelace", 0, 98.5),
            event("e2", "Grace Hopper", 60, 91.25),
        ]);
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "sr_no,identity_id,display_name,date,time,confidence");
        assert!(lines[1].starts_with("1,e1,Ada Lovelace,2023-11-14,"));
        assert!(lines[1].ends_with(",98.50"));
        assert!(lines[2].starts_with("2,e2,Grace Hopper,"));
    }

    #[test]
    fn test_csv_quotes_awkward_names() {
        let csv = records_to_csv(&[event("e1", "Doe, Jane \"JD\"", 0, 80.0)]);
        assert!(csv.contains("\"Doe, Jane \"\"JD\"\"\""));
    }

    #[test]
    fn test_csv_empty_log_is_header_only() {
        let csv = records_to_csv(&[]);
        assert_eq!(csv.lines().count(), 1);
    }
}
