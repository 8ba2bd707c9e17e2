//! Check-in station endpoints. The browser decodes QR codes from its own
//! camera and posts the decoded text here.

use axum::{Json, extract::State};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

use super::{ApiError, api_error};
use crate::server::state::AppState;
use crate::verify::ScanView;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub text: String,
}

/// GET /api/verify
pub async fn status(State(state): State<Arc<AppState>>) -> Json<ScanView> {
    let mut scanner = state.scanner.lock().await;
    scanner.tick(Instant::now());
    Json(scanner.view())
}

/// POST /api/verify/scan - verify decoded QR text.
pub async fn scan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScanRequest>,
) -> Json<ScanView> {
    let mut scanner = state.scanner.lock().await;
    scanner.handle_decoded(&request.text).await;
    Json(scanner.view())
}

/// POST /api/verify/check-in
pub async fn check_in(State(state): State<Arc<AppState>>) -> Result<Json<ScanView>, ApiError> {
    let mut scanner = state.scanner.lock().await;
    scanner
        .check_in(Instant::now())
        .map_err(api_error)?;
    Ok(Json(scanner.view()))
}

/// POST /api/verify/reset
pub async fn reset(State(state): State<Arc<AppState>>) -> Json<ScanView> {
    let mut scanner = state.scanner.lock().await;
    scanner.reset().await;
    Json(scanner.view())
}
