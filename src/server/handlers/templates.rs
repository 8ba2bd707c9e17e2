//! Template catalogue and editor persistence.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, api_error};
use crate::record::{Record, RecordKind};
use crate::server::state::AppState;
use crate::template::{ElementKind, ElementTypeMeta, TemplateDefinition, catalog};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub kind: Option<RecordKind>,
}

/// GET /api/templates - list templates, optionally for one record kind.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<TemplateDefinition>> {
    Json(state.templates.read().await.list(query.kind))
}

/// GET /api/templates/:id
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TemplateDefinition>, ApiError> {
    state
        .templates
        .read()
        .await
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("Unknown template '{}'", id)))
}

/// POST /api/templates - save an edited template.
pub async fn save(
    State(state): State<Arc<AppState>>,
    Json(template): Json<TemplateDefinition>,
) -> Result<Json<TemplateDefinition>, ApiError> {
    state
        .templates
        .write()
        .await
        .save(template.clone())
        .map_err(|e| api_error(e.into()))?;
    Ok(Json(template))
}

/// POST /api/templates/:id/duplicate
pub async fn duplicate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TemplateDefinition>, ApiError> {
    state
        .templates
        .write()
        .await
        .duplicate(&id)
        .map(Json)
        .map_err(|e| api_error(e.into()))
}

/// GET /api/templates/element-types - the editor's element palette.
pub async fn element_types() -> Json<Vec<ElementTypeMeta>> {
    Json(ElementKind::all_types())
}

/// POST /api/templates/recommended - catalogue picks for a record.
pub async fn recommended(Json(record): Json<Record>) -> Json<Vec<TemplateDefinition>> {
    Json(catalog::recommended(&record).into_iter().cloned().collect())
}
