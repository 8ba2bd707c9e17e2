//! HTTP request handlers.

pub mod batch;
pub mod cards;
pub mod misc;
pub mod templates;
pub mod verify;

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::batch::Artifact;
use crate::error::CardError;
use crate::template::TemplateError;

/// Error half of every handler result.
pub type ApiError = (StatusCode, String);

/// Map a crate error to a status code: caller mistakes are 4xx, everything
/// else is a 500.
pub fn api_error(e: CardError) -> ApiError {
    let status = match &e {
        CardError::Template(TemplateError::UnknownTemplate(_))
        | CardError::Template(TemplateError::UnknownElement(_))
        | CardError::UnknownRecord(_) => StatusCode::NOT_FOUND,
        CardError::Import(_)
        | CardError::Template(_)
        | CardError::Scan(_)
        | CardError::Export(_) => StatusCode::BAD_REQUEST,
        CardError::InvalidTransition { .. } => StatusCode::CONFLICT,
        _ => {
            tracing::error!(error = %e, "Request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

/// Serve a generated file as a download.
pub fn download(artifact: &Artifact) -> Response {
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(artifact.content_type)),
            (header::CONTENT_DISPOSITION, attachment(&artifact.file_name)),
        ],
        artifact.bytes.clone(),
    )
        .into_response()
}

/// `attachment` disposition with an ASCII `filename` fallback and the exact
/// name as RFC 5987 `filename*`.
fn attachment(file_name: &str) -> HeaderValue {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            ' '..='~' if c != '"' && c != '\\' => c,
            _ => '_',
        })
        .collect();
    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_attachment_ascii_name() {
        assert_eq!(
            attachment("Generated_event_IDs.zip"),
            "attachment; filename=\"Generated_event_IDs.zip\"; filename*=UTF-8''Generated_event_IDs.zip"
        );
    }

    #[test]
    fn test_attachment_non_ascii_name_is_kept() {
        let value = attachment("Zoë \"Café\".png");
        assert_eq!(
            value,
            "attachment; filename=\"Zo_ _Caf__.png\"; filename*=UTF-8''Zo%C3%AB%20%22Caf%C3%A9%22.png"
        );
    }

    #[test]
    fn test_download_sets_disposition() {
        let artifact = Artifact {
            file_name: "Señora.png".into(),
            content_type: "image/png",
            bytes: vec![1, 2, 3],
        };
        let response = download(&artifact);
        let disposition = response.headers().get(header::CONTENT_DISPOSITION).unwrap();
        assert!(disposition.to_str().unwrap().ends_with("filename*=UTF-8''Se%C3%B1ora.png"));
    }
}
