//! Single-card rendering, preview and export.

use axum::{
    Json,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, api_error, download};
use crate::batch::package::{CardFormat, single_card};
use crate::error::CardError;
use crate::record::Record;
use crate::render::raster::encode_png;
use crate::render::{RenderedCard, render};
use crate::server::state::AppState;
use crate::template::TemplateDefinition;

/// A record plus the template to draw it with. An inline template (from
/// the editor) wins over `templateId`; an unknown id falls back to the
/// record kind's first template.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRequest {
    pub record: Record,
    pub template_id: Option<String>,
    pub template: Option<TemplateDefinition>,
}

impl CardRequest {
    async fn template(&self, state: &AppState) -> Result<TemplateDefinition, CardError> {
        match &self.template {
            Some(template) => {
                template.validate()?;
                Ok(template.clone())
            }
            None => Ok(state
                .templates
                .read()
                .await
                .resolve_or_default(self.template_id.as_deref(), self.record.kind())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: CardFormat,
}

/// POST /api/cards/render - the resolved visual tree as JSON.
pub async fn render_card(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CardRequest>,
) -> Result<Json<RenderedCard>, ApiError> {
    let template = request.template(&state).await.map_err(api_error)?;
    Ok(Json(render(&request.record, &template, state.generator.qr())))
}

/// POST /api/cards/preview - PNG at the configured pixel ratio.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let template = request.template(&state).await.map_err(api_error)?;
    let image = state
        .generator
        .capture_one(&request.record, &template)
        .await
        .map_err(api_error)?;
    let png = encode_png(&image).map_err(api_error)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// POST /api/cards/export?format=png|pdf - named download of one card.
pub async fn export(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
    Json(request): Json<CardRequest>,
) -> Result<Response, ApiError> {
    let template = request.template(&state).await.map_err(api_error)?;
    let image = state
        .generator
        .capture_one(&request.record, &template)
        .await
        .map_err(api_error)?;
    let artifact = single_card(
        query.format,
        &request.record,
        (template.width, template.height),
        &image,
    )
    .map_err(api_error)?;
    tracing::info!(file = %artifact.file_name, "Exported card");
    Ok(download(&artifact))
}
