//! QR verification flow.
//!
//! ```text
//! Idle -> Scanning -> Verified -> CheckedIn -> (after 2s) Idle
//!              \----> Error
//! ```
//!
//! Decoding pixels into text is delegated to a [`QrDecoder`]; the camera is
//! a [`CameraSource`]. Only one camera session is open at a time and
//! [`Scanner::stop`] is a no-op when nothing is running.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::DynamicImage;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::error::CardError;
use crate::render::QrPayload;

/// A checked-in result stays on screen this long.
pub const CHECK_IN_RESET: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("No cameras found on this device.")]
    NoCamera,

    #[error("Could not access camera. Please grant permission and refresh.")]
    CameraAccess,

    #[error("Failed to start scanner. Please ensure camera permissions are granted.")]
    StartFailed,

    #[error("No QR code found in the uploaded image.")]
    NoQrCode,

    /// Valid JSON without a non-empty `id`, `name` and `org`.
    #[error("Invalid QR Code format.")]
    MissingFields,

    /// Decoded text is not JSON.
    #[error("Scanned QR Code does not contain valid data.")]
    NotJson,
}

/// Finds a QR code in an image and returns its text.
pub trait QrDecoder: Send + Sync {
    fn decode(&self, image: &DynamicImage) -> Option<String>;
}

/// Camera access.
#[async_trait]
pub trait CameraSource: Send + Sync {
    /// Ids of the available cameras, preferred first.
    async fn cameras(&self) -> Result<Vec<String>, ScanError>;
    async fn start(&self, camera_id: &str) -> Result<(), ScanError>;
    async fn stop(&self, camera_id: &str) -> Result<(), ScanError>;
}

/// For hosts without a camera; uploads still work.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCamera;

#[async_trait]
impl CameraSource for NoCamera {
    async fn cameras(&self) -> Result<Vec<String>, ScanError> {
        Ok(Vec::new())
    }

    async fn start(&self, _camera_id: &str) -> Result<(), ScanError> {
        Err(ScanError::NoCamera)
    }

    async fn stop(&self, _camera_id: &str) -> Result<(), ScanError> {
        Ok(())
    }
}

/// Decoder for hosts that receive already-decoded text; never finds a code
/// in pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDecoder;

impl QrDecoder for NoDecoder {
    fn decode(&self, _image: &DynamicImage) -> Option<String> {
        None
    }
}

/// Parse scanned text into a payload. Each field must be a non-empty
/// string, a non-zero number or `true`; numbers are kept as their JSON text.
pub fn decode_payload(text: &str) -> Result<QrPayload, ScanError> {
    let value: Value = serde_json::from_str(text).map_err(|_| ScanError::NotJson)?;
    let field = |key: &str| match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    };
    match (field("id"), field("name"), field("org")) {
        (Some(id), Some(name), Some(org)) => Ok(QrPayload { id, name, org }),
        _ => Err(ScanError::MissingFields),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanState {
    Idle,
    Scanning { camera_id: String },
    Verified(QrPayload),
    CheckedIn { payload: QrPayload, since: Instant },
    Error(ScanError),
}

impl ScanState {
    fn name(&self) -> &'static str {
        match self {
            ScanState::Idle => "idle",
            ScanState::Scanning { .. } => "scanning",
            ScanState::Verified(_) => "verified",
            ScanState::CheckedIn { .. } => "checked-in",
            ScanState::Error(_) => "error",
        }
    }
}

/// Serializable view of a [`ScanState`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanView {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<QrPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ScanState> for ScanView {
    fn from(state: &ScanState) -> Self {
        let mut view = ScanView {
            status: state.name(),
            camera: None,
            payload: None,
            error: None,
        };
        match state {
            ScanState::Idle => {}
            ScanState::Scanning { camera_id } => view.camera = Some(camera_id.clone()),
            ScanState::Verified(payload) | ScanState::CheckedIn { payload, .. } => {
                view.payload = Some(payload.clone())
            }
            ScanState::Error(e) => view.error = Some(e.to_string()),
        }
        view
    }
}

/// One verification station.
pub struct Scanner {
    camera: Arc<dyn CameraSource>,
    decoder: Arc<dyn QrDecoder>,
    state: ScanState,
}

impl Scanner {
    pub fn new(camera: Arc<dyn CameraSource>, decoder: Arc<dyn QrDecoder>) -> Self {
        Self {
            camera,
            decoder,
            state: ScanState::Idle,
        }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn view(&self) -> ScanView {
        ScanView::from(&self.state)
    }

    /// Open the first camera, closing any session already running.
    pub async fn start_camera(&mut self) -> Result<(), ScanError> {
        self.stop().await;
        let cameras = match self.camera.cameras().await {
            Ok(cameras) => cameras,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list cameras");
                return Err(self.fail(ScanError::CameraAccess));
            }
        };
        let Some(camera_id) = cameras.into_iter().next() else {
            return Err(self.fail(ScanError::NoCamera));
        };
        if let Err(e) = self.camera.start(&camera_id).await {
            tracing::warn!(camera = %camera_id, error = %e, "Camera failed to start");
            return Err(self.fail(ScanError::StartFailed));
        }
        tracing::info!(camera = %camera_id, "Scanning");
        self.state = ScanState::Scanning { camera_id };
        Ok(())
    }

    fn fail(&mut self, error: ScanError) -> ScanError {
        self.state = ScanState::Error(error.clone());
        error
    }

    /// Feed one camera frame. Frames without a code keep the session running.
    pub async fn on_frame(&mut self, frame: &DynamicImage) {
        if !matches!(self.state, ScanState::Scanning { .. }) {
            return;
        }
        if let Some(text) = self.decoder.decode(frame) {
            self.handle_decoded(&text).await;
        }
    }

    /// Scan an uploaded still image.
    pub async fn scan_image(&mut self, image: &DynamicImage) -> &ScanState {
        self.reset().await;
        match self.decoder.decode(image) {
            Some(text) => {
                self.handle_decoded(&text).await;
            }
            None => {
                self.fail(ScanError::NoQrCode);
            }
        }
        &self.state
    }

    /// Verify decoded QR text. A running camera session is closed first.
    pub async fn handle_decoded(&mut self, text: &str) -> &ScanState {
        self.stop().await;
        match decode_payload(text) {
            Ok(payload) => {
                tracing::info!(id = %payload.id, name = %payload.name, "Card verified");
                self.state = ScanState::Verified(payload);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Rejected scan");
                self.fail(e);
            }
        }
        &self.state
    }

    /// Mark the verified card as checked in.
    pub fn check_in(&mut self, now: Instant) -> Result<QrPayload, CardError> {
        let payload = match &self.state {
            ScanState::Verified(payload) => payload.clone(),
            other => {
                return Err(CardError::InvalidTransition {
                    action: "check in",
                    state: other.name(),
                });
            }
        };
        tracing::info!(id = %payload.id, "Checked in");
        self.state = ScanState::CheckedIn {
            payload: payload.clone(),
            since: now,
        };
        Ok(payload)
    }

    /// Return to `Idle` once a check-in has been shown long enough.
    pub fn tick(&mut self, now: Instant) {
        if let ScanState::CheckedIn { since, .. } = self.state {
            if now.saturating_duration_since(since) >= CHECK_IN_RESET {
                self.state = ScanState::Idle;
            }
        }
    }

    /// Clear any result and close the camera.
    pub async fn reset(&mut self) {
        self.stop().await;
        self.state = ScanState::Idle;
    }

    /// Close the camera session if one is open.
    pub async fn stop(&mut self) {
        let ScanState::Scanning { camera_id } = &self.state else {
            return;
        };
        if let Err(e) = self.camera.stop(camera_id).await {
            tracing::warn!(camera = %camera_id, error = %e, "Failed to stop scanner");
        }
        self.state = ScanState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, RecordKind};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    const GOOD: &str = r#"{"id":"23CS067","name":"AAKASH","org":"Nandha Engineering College"}"#;

    /// Records start/stop calls.
    #[derive(Default)]
    struct FakeCamera {
        ids: Vec<String>,
        log: Mutex<Vec<String>>,
    }

    impl FakeCamera {
        fn with(ids: &[&str]) -> Self {
            Self {
                ids: ids.iter().map(|s| s.to_string()).collect(),
                log: Mutex::new(Vec::new()),
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CameraSource for FakeCamera {
        async fn cameras(&self) -> Result<Vec<String>, ScanError> {
            Ok(self.ids.clone())
        }
        async fn start(&self, id: &str) -> Result<(), ScanError> {
            self.log.lock().unwrap().push(format!("start {}", id));
            Ok(())
        }
        async fn stop(&self, id: &str) -> Result<(), ScanError> {
            self.log.lock().unwrap().push(format!("stop {}", id));
            Ok(())
        }
    }

    /// Treats a 1x1 image's red channel as "has code".
    struct PixelDecoder;

    impl QrDecoder for PixelDecoder {
        fn decode(&self, image: &DynamicImage) -> Option<String> {
            (image.to_rgba8().get_pixel(0, 0).0[0] == 255).then(|| GOOD.to_string())
        }
    }

    fn frame(has_code: bool) -> DynamicImage {
        let v = if has_code { 255 } else { 0 };
        DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(1, 1, image::Rgba([v, 0, 0, 255])))
    }

    fn scanner(camera: Arc<FakeCamera>) -> Scanner {
        Scanner::new(camera, Arc::new(PixelDecoder))
    }

    #[test]
    fn test_payload_round_trip() {
        let mut record = Record::student("AAKASH", "23CS067", "CSE");
        record.set_field("organization", "Nandha Engineering College");
        let payload = QrPayload::for_record(&record);
        assert_eq!(payload.to_json(), GOOD);
        assert_eq!(decode_payload(&payload.to_json()).unwrap(), payload);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode_payload("hello"), Err(ScanError::NotJson));
        assert_eq!(decode_payload(r#"{"id":"1","name":"A"}"#), Err(ScanError::MissingFields));
        assert_eq!(decode_payload(r#"{"id":"","name":"A","org":"B"}"#), Err(ScanError::MissingFields));
        assert_eq!(decode_payload("[1,2]"), Err(ScanError::MissingFields));
        assert_eq!(ScanError::NotJson.to_string(), "Scanned QR Code does not contain valid data.");
    }

    #[test]
    fn test_decode_accepts_numeric_fields() {
        let payload = decode_payload(r#"{"id":1042,"name":"Ada","org":"Expo"}"#).unwrap();
        assert_eq!(payload.id, "1042");
        assert_eq!(payload.name, "Ada");
        assert_eq!(
            decode_payload(r#"{"id":0,"name":"Ada","org":"Expo"}"#),
            Err(ScanError::MissingFields)
        );
        assert_eq!(
            decode_payload(r#"{"id":null,"name":"Ada","org":"Expo"}"#),
            Err(ScanError::MissingFields)
        );
    }

    #[test]
    fn test_event_record_without_org_is_rejected() {
        let record = Record::sample(RecordKind::Event);
        assert!(decode_payload(&QrPayload::for_record(&record).to_json()).is_ok());
        let bare = Record::event("Ravi", "Guest", "Expo", "2025-01-01");
        assert_eq!(
            decode_payload(&QrPayload::for_record(&bare).to_json()),
            Err(ScanError::MissingFields)
        );
    }

    #[tokio::test]
    async fn test_camera_scan_verifies_and_stops() {
        let camera = Arc::new(FakeCamera::with(&["back", "front"]));
        let mut s = scanner(camera.clone());
        s.start_camera().await.unwrap();
        assert_eq!(s.state(), &ScanState::Scanning { camera_id: "back".into() });

        s.on_frame(&frame(false)).await;
        assert!(matches!(s.state(), ScanState::Scanning { .. }));
        s.on_frame(&frame(true)).await;
        assert!(matches!(s.state(), ScanState::Verified(p) if p.id == "23CS067"));
        assert_eq!(camera.log(), vec!["start back", "stop back"]);
    }

    #[tokio::test]
    async fn test_no_camera() {
        let mut s = scanner(Arc::new(FakeCamera::with(&[])));
        assert_eq!(s.start_camera().await, Err(ScanError::NoCamera));
        assert_eq!(s.view().error.as_deref(), Some("No cameras found on this device."));
    }

    #[tokio::test]
    async fn test_new_session_stops_previous() {
        let camera = Arc::new(FakeCamera::with(&["back"]));
        let mut s = scanner(camera.clone());
        s.start_camera().await.unwrap();
        s.start_camera().await.unwrap();
        assert_eq!(camera.log(), vec!["start back", "stop back", "start back"]);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let camera = Arc::new(FakeCamera::with(&["back"]));
        let mut s = scanner(camera.clone());
        s.stop().await;
        s.start_camera().await.unwrap();
        s.stop().await;
        s.stop().await;
        assert_eq!(s.state(), &ScanState::Idle);
        assert_eq!(camera.log(), vec!["start back", "stop back"]);
    }

    #[tokio::test]
    async fn test_upload_without_code() {
        let mut s = scanner(Arc::new(FakeCamera::default()));
        assert_eq!(s.scan_image(&frame(false)).await, &ScanState::Error(ScanError::NoQrCode));
        assert!(matches!(s.scan_image(&frame(true)).await, ScanState::Verified(_)));
    }

    #[tokio::test]
    async fn test_check_in_auto_resets() {
        let mut s = scanner(Arc::new(FakeCamera::default()));
        assert!(s.check_in(Instant::now()).is_err());
        s.handle_decoded(GOOD).await;
        let t0 = Instant::now();
        assert_eq!(s.check_in(t0).unwrap().name, "AAKASH");
        assert_eq!(s.view().status, "checked-in");

        s.tick(t0 + Duration::from_millis(1999));
        assert_eq!(s.view().status, "checked-in");
        s.tick(t0 + CHECK_IN_RESET);
        assert_eq!(s.state(), &ScanState::Idle);
    }

    #[tokio::test]
    async fn test_reset_from_error() {
        let mut s = scanner(Arc::new(FakeCamera::default()));
        s.handle_decoded("not json").await;
        assert_eq!(s.state(), &ScanState::Error(ScanError::NotJson));
        s.reset().await;
        assert_eq!(s.state(), &ScanState::Idle);
    }
}
