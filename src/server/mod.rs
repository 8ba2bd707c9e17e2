//! # HTTP Server for Card Generation and Check-in
//!
//! JSON API over the template catalogue, single-card rendering, the batch
//! generator and the verification station.
//!
//! ## Usage
//!
//! ```bash
//! cardsmith serve --listen 0.0.0.0:8080
//! ```

mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::CardError;

/// Upload limit for CSV imports and photos.
const UPLOAD_LIMIT: usize = 20 * 1024 * 1024;

/// Build the API router around shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Templates
        .route(
            "/api/templates",
            get(handlers::templates::list).post(handlers::templates::save),
        )
        .route(
            "/api/templates/element-types",
            get(handlers::templates::element_types),
        )
        .route(
            "/api/templates/recommended",
            post(handlers::templates::recommended),
        )
        .route("/api/templates/:id", get(handlers::templates::get))
        .route(
            "/api/templates/:id/duplicate",
            post(handlers::templates::duplicate),
        )
        // Single cards
        .route("/api/cards/render", post(handlers::cards::render_card))
        .route("/api/cards/preview", post(handlers::cards::preview))
        .route("/api/cards/export", post(handlers::cards::export))
        // Batch generation
        .route("/api/batch", get(handlers::batch::status))
        .route(
            "/api/batch/import",
            post(handlers::batch::import).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route(
            "/api/batch/upload",
            post(handlers::batch::upload).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route("/api/batch/csv-template", get(handlers::batch::csv_template))
        .route("/api/batch/records", get(handlers::batch::records))
        .route("/api/batch/review", post(handlers::batch::review))
        .route(
            "/api/batch/photo/:index",
            post(handlers::batch::replace_photo).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route("/api/batch/placeholders", post(handlers::batch::placeholders))
        .route("/api/batch/template", post(handlers::batch::select_template))
        .route("/api/batch/options", post(handlers::batch::configure))
        .route("/api/batch/generate", post(handlers::batch::generate))
        .route("/api/batch/download", get(handlers::batch::download_artifact))
        .route("/api/batch/reset", post(handlers::batch::reset))
        // Verification
        .route("/api/verify", get(handlers::verify::status))
        .route("/api/verify/scan", post(handlers::verify::scan))
        .route("/api/verify/check-in", post(handlers::verify::check_in))
        .route("/api/verify/reset", post(handlers::verify::reset))
        // Listings and notification
        .route("/api/export/csv", post(handlers::misc::export_rows))
        .route("/api/export/records", post(handlers::misc::export_batch))
        .route("/api/notify", post(handlers::misc::notify))
        .route("/api/notify/templates", get(handlers::misc::templates))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: AppConfig) -> Result<(), CardError> {
    let listen = config.listen.clone();
    let state = Arc::new(AppState::new(config)?);
    let app = router(state.clone());

    tracing::info!(
        listen = %listen,
        gemini = state.gemini.is_some(),
        "cardsmith HTTP server starting"
    );

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .map_err(|e| CardError::Transport(format!("Failed to bind to {}: {}", listen, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| CardError::Transport(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::config::QrMode;

    fn app() -> Router {
        let config = AppConfig {
            qr_service: QrMode::Local,
            ..AppConfig::default()
        };
        router(Arc::new(AppState::new(config).unwrap()))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_templates_by_kind() {
        let app = app();
        let (status, body) = send(
            &app,
            Request::get("/api/templates?kind=student")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let templates: Vec<Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(templates.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_template_is_404() {
        let app = app();
        let (status, _) = send(
            &app,
            Request::get("/api/templates/nope").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_render_card_resolves_placeholders() {
        let app = app();
        let record = json!({
            "kind": "student",
            "name": "Ada Lovelace",
            "regNo": "S-1",
            "dept": "Maths"
        });
        let (status, body) = send(
            &app,
            post_json(
                "/api/cards/render",
                json!({"record": record, "templateId": "generic-student"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("Ada Lovelace"));
        assert!(!text.contains("{name}"));
    }

    #[tokio::test]
    async fn test_oversized_inline_template_is_400() {
        let app = app();
        let mut template = serde_json::to_value(crate::template::catalog::by_id("modern").unwrap()).unwrap();
        template["width"] = json!(200_000);
        let record = json!({"kind": "event", "name": "Ada", "role": "Speaker"});
        let (status, body) = send(
            &app,
            post_json("/api/cards/preview", json!({"record": record, "template": template})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(body).unwrap().contains("exceeds"));
    }

    #[tokio::test]
    async fn test_batch_import_and_rejected_generate() {
        let app = app();
        let (status, body) = send(
            &app,
            post_json(
                "/api/batch/import",
                json!({
                    "kind": "event",
                    "csv": "name,role,eventName,eventDate\nAda,Speaker,Expo,2025-01-02\nGrace,Guest,Expo,2025-01-02"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let summary: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(summary["records"], json!(2));

        // No template selected yet.
        let (status, _) = send(&app, post_json("/api/batch/generate", json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &app,
            Request::get("/api/batch/download").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_import_without_header_is_400() {
        let app = app();
        let (status, body) = send(
            &app,
            post_json("/api/batch/import", json!({"kind": "student", "csv": "name"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.is_empty());
    }

    #[tokio::test]
    async fn test_verify_scan_and_check_in() {
        let app = app();
        let payload = json!({"id": "S-1", "name": "Ada", "org": "Analytical"}).to_string();
        let (status, body) = send(&app, post_json("/api/verify/scan", json!({"text": payload}))).await;
        assert_eq!(status, StatusCode::OK);
        let view: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(view["status"], json!("verified"));

        let (status, body) = send(&app, post_json("/api/verify/check-in", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        let view: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(view["status"], json!("checked-in"));

        // Nothing verified any more.
        let (status, _) = send(&app, post_json("/api/verify/reset", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, post_json("/api/verify/check-in", json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_export_csv_empty_rows_is_400() {
        let app = app();
        let (status, body) = send(
            &app,
            post_json(
                "/api/export/csv",
                json!({"columns": [{"label": "Name", "key": "name"}], "rows": []}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(String::from_utf8(body).unwrap(), "No data to export.");
    }
}
