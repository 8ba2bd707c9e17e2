//! Bulk generation: import, review, configure, generate, download.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, api_error, download};
use crate::batch::import::sample_csv;
use crate::batch::{BatchSummary, EnhancementOptions, PlaceholderStyle};
use crate::error::CardError;
use crate::record::{ImageSource, Record, RecordKind};
use crate::server::state::AppState;
use crate::template::TemplateError;

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub kind: RecordKind,
    pub csv: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRequest {
    pub template_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PhotoRequest {
    /// `data:` URL or image URL
    pub image: ImageSource,
}

#[derive(Debug, Deserialize)]
pub struct KindQuery {
    #[serde(default = "default_kind")]
    pub kind: RecordKind,
}

fn default_kind() -> RecordKind {
    RecordKind::Student
}

/// POST /api/batch/import - start a new job from CSV text.
pub async fn import(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<BatchSummary>, ApiError> {
    let mut job = state.batch.lock().await;
    job.import(
        request.kind,
        &request.csv,
        &state.config.import_options(),
        state.loader.clone(),
    )
    .map_err(api_error)?;
    Ok(Json(job.summary()))
}

/// POST /api/batch/upload - multipart form with a `kind` field and the
/// CSV under `file`.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<BatchSummary>, ApiError> {
    let mut kind: Option<RecordKind> = None;
    let mut csv: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        let text = field
            .text()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read {}: {}", name, e)))?;
        match name.as_str() {
            "kind" => {
                kind = Some(
                    text.parse()
                        .map_err(|e: String| (StatusCode::BAD_REQUEST, e))?,
                )
            }
            "file" => csv = Some(text),
            _ => {}
        }
    }

    let kind = kind.ok_or((StatusCode::BAD_REQUEST, "No kind field found".to_string()))?;
    let csv = csv.ok_or((StatusCode::BAD_REQUEST, "No file field found".to_string()))?;
    import(State(state), Json(ImportRequest { kind, csv })).await
}

/// GET /api/batch - current state, photo and generation progress.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<BatchSummary> {
    let mut job = state.batch.lock().await;
    job.poll_photos();
    Json(job.summary())
}

/// GET /api/batch/records - imported records with their photos.
pub async fn records(State(state): State<Arc<AppState>>) -> Json<Vec<Record>> {
    let mut job = state.batch.lock().await;
    job.poll_photos();
    Json(job.records().to_vec())
}

/// POST /api/batch/review
pub async fn review(State(state): State<Arc<AppState>>) -> Result<Json<BatchSummary>, ApiError> {
    let mut job = state.batch.lock().await;
    job.begin_review().map_err(api_error)?;
    Ok(Json(job.summary()))
}

/// POST /api/batch/photo/:index - replace one record's photo by hand.
pub async fn replace_photo(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
    Json(request): Json<PhotoRequest>,
) -> Result<Json<BatchSummary>, ApiError> {
    let mut job = state.batch.lock().await;
    job.replace_photo(index, request.image).map_err(api_error)?;
    Ok(Json(job.summary()))
}

/// POST /api/batch/placeholders - change placeholder colours.
pub async fn placeholders(
    State(state): State<Arc<AppState>>,
    Json(style): Json<PlaceholderStyle>,
) -> Json<BatchSummary> {
    let mut job = state.batch.lock().await;
    let count = job.regenerate_placeholders(style);
    tracing::debug!(count, "Regenerated placeholders");
    Json(job.summary())
}

/// POST /api/batch/template
pub async fn select_template(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TemplateRequest>,
) -> Result<Json<BatchSummary>, ApiError> {
    let template = state
        .templates
        .read()
        .await
        .get(&request.template_id)
        .cloned()
        .ok_or_else(|| api_error(TemplateError::UnknownTemplate(request.template_id.clone()).into()))?;
    let mut job = state.batch.lock().await;
    job.select_template(template).map_err(api_error)?;
    Ok(Json(job.summary()))
}

/// POST /api/batch/options
pub async fn configure(
    State(state): State<Arc<AppState>>,
    Json(options): Json<EnhancementOptions>,
) -> Result<Json<BatchSummary>, ApiError> {
    let mut job = state.batch.lock().await;
    job.configure(options).map_err(api_error)?;
    Ok(Json(job.summary()))
}

/// POST /api/batch/generate - start the run in the background. Poll
/// `GET /api/batch` for progress.
pub async fn generate(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<BatchSummary>), ApiError> {
    // Wait for photo fetches without holding the job, so status polling
    // keeps working.
    let photos = state.batch.lock().await.photo_watch();
    if let Some(photos) = photos {
        photos.settled().await;
    }
    let mut job = state.batch.lock().await;
    let plan = job.confirm().map_err(api_error)?;
    let summary = job.summary();
    drop(job);

    let task_state = state.clone();
    tokio::spawn(async move {
        let result = task_state.generator.run(plan).await;
        let mut job = task_state.batch.lock().await;
        if let Err(e) = job.finish(result) {
            // The job was replaced while generating.
            tracing::warn!(error = %e, "Discarding generation result");
        }
    });
    Ok((StatusCode::ACCEPTED, Json(summary)))
}

/// GET /api/batch/download
pub async fn download_artifact(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let job = state.batch.lock().await;
    job.artifact().map(download).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            CardError::InvalidTransition {
                action: "download",
                state: job.state().name(),
            }
            .to_string(),
        )
    })
}

/// POST /api/batch/reset
pub async fn reset(State(state): State<Arc<AppState>>) -> Json<BatchSummary> {
    let mut job = state.batch.lock().await;
    job.reset();
    Json(job.summary())
}

/// GET /api/batch/csv-template?kind= - sample CSV for download.
pub async fn csv_template(Query(query): Query<KindQuery>) -> impl IntoResponse {
    let file_name = format!("{}_template.csv", query.kind);
    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        sample_csv(query.kind),
    )
}
