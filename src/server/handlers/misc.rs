//! Listing export and bulk notification.

use axum::{
    Json,
    extract::State,
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::{ApiError, api_error};
use crate::export::{Column, export_csv, export_records};
use crate::notify::{BulkEmail, EmailTemplate, NotifyResult, compose_bulk_body, email_templates};
use crate::server::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RecordExportRequest {
    pub columns: Vec<Column>,
}

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub recipient: String,
    pub subject: String,
    /// Drafted from `names` when empty.
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub names: Vec<String>,
    pub count: Option<usize>,
}

fn csv_response(csv: String) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"export.csv\""),
        ],
        csv,
    )
}

/// POST /api/export/csv - arbitrary rows.
pub async fn export_rows(Json(request): Json<ExportRequest>) -> Result<impl IntoResponse, ApiError> {
    let csv = export_csv(&request.columns, &request.rows).map_err(|e| api_error(e.into()))?;
    Ok(csv_response(csv))
}

/// POST /api/export/records - the current batch's records.
pub async fn export_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecordExportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.batch.lock().await;
    let csv = export_records(&request.columns, job.records()).map_err(|e| api_error(e.into()))?;
    Ok(csv_response(csv))
}

/// GET /api/notify/templates
pub async fn templates() -> Json<Vec<EmailTemplate>> {
    Json(email_templates())
}

/// POST /api/notify - send (simulated) bulk email.
pub async fn notify(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NotifyRequest>,
) -> Json<NotifyResult> {
    let body = if request.body.trim().is_empty() {
        compose_bulk_body(state.gemini.as_ref(), &request.names).await
    } else {
        request.body
    };
    let email = BulkEmail {
        recipient: request.recipient,
        subject: request.subject,
        body,
        count: request.count.unwrap_or(request.names.len()),
    };
    Json(state.notifier.send(&email).await)
}
