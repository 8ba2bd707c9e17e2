//! QR payload and QR image services.
//!
//! Every card's QR code carries the same wire contract:
//!
//! ```json
//! {"id": "23CS067", "name": "AAKASH", "org": "Nandha Engineering College"}
//! ```
//!
//! The payload is JSON-serialised, URL-encoded and handed to a
//! [`QrImageService`], which turns it into something an `<img src>` (or the
//! rasterizer) can load.

use image::{GrayImage, ImageEncoder, Luma};
use serde::{Deserialize, Serialize};

use crate::record::{ImageSource, Record};
use crate::template::EcLevel;

/// The `{id, name, org}` payload encoded in every card's QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPayload {
    pub id: String,
    pub name: String,
    pub org: String,
}

impl QrPayload {
    /// Payload for a record. Missing values become empty strings, which the
    /// scanner later rejects as incomplete.
    pub fn for_record(record: &Record) -> Self {
        Self {
            id: record.primary_id().unwrap_or_default().to_string(),
            name: record.field("name").unwrap_or_default().to_string(),
            org: record.organization().unwrap_or_default().to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({ "id": self.id, "name": self.name, "org": self.org }).to_string()
    }

    /// URL-encoded JSON, as placed in the QR request.
    pub fn encoded(&self) -> String {
        urlencoding::encode(&self.to_json()).into_owned()
    }
}

/// Parameters for one QR image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrRequest {
    /// Edge length in px. Taken from the element's width.
    pub size: u32,
    /// URL-encoded payload.
    pub data: String,
    pub ecc: EcLevel,
    /// Quiet zone in modules.
    pub margin: u32,
}

/// Turns a QR request into an image URL (remote URL or `data:` URL).
pub trait QrImageService: Send + Sync {
    fn image_url(&self, request: &QrRequest) -> String;
}

/// QR images from the public api.qrserver.com endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteQrService;

impl QrImageService for RemoteQrService {
    fn image_url(&self, request: &QrRequest) -> String {
        format!(
            "https://api.qrserver.com/v1/create-qr-code/?size={s}x{s}&data={}&ecc={}&margin={}",
            request.data,
            request.ecc.as_str(),
            request.margin,
            s = request.size,
        )
    }
}

/// Largest bitmap edge [`LocalQrService`] draws, in pixels.
const MAX_LOCAL_EDGE: u32 = 1024;
const MAX_LOCAL_MARGIN: u32 = 16;

/// In-process QR encoder producing PNG `data:` URLs. Works offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalQrService;

impl LocalQrService {
    /// Encode the request as a grayscale QR bitmap with its quiet zone.
    pub fn bitmap(&self, request: &QrRequest) -> Result<GrayImage, String> {
        use qrcode::QrCode;

        let ec_level = match request.ecc {
            EcLevel::L => qrcode::EcLevel::L,
            EcLevel::M => qrcode::EcLevel::M,
            EcLevel::Q => qrcode::EcLevel::Q,
            EcLevel::H => qrcode::EcLevel::H,
        };
        let data = urlencoding::decode(&request.data).map_err(|e| e.to_string())?;
        let code = QrCode::with_error_correction_level(data.as_bytes(), ec_level)
            .map_err(|e| format!("QR code generation failed: {}", e))?;

        // The rasterizer scales the bitmap to the element, so its edge is capped.
        let margin = request.margin.min(MAX_LOCAL_MARGIN);
        let modules = code.width() as u32;
        let total = modules + 2 * margin;
        let cell = (request.size.min(MAX_LOCAL_EDGE) / total).max(1);
        let mut img = GrayImage::from_pixel(total * cell, total * cell, Luma([255]));

        for qy in 0..modules {
            for qx in 0..modules {
                if code[(qx as usize, qy as usize)] != qrcode::Color::Dark {
                    continue;
                }
                let x0 = (qx + margin) * cell;
                let y0 = (qy + margin) * cell;
                for cy in 0..cell {
                    for cx in 0..cell {
                        img.put_pixel(x0 + cx, y0 + cy, Luma([0]));
                    }
                }
            }
        }
        Ok(img)
    }

    fn png(&self, request: &QrRequest) -> Result<Vec<u8>, String> {
        let img = self.bitmap(request)?;
        let mut png_bytes = Vec::new();
        image::codecs::png::PngEncoder::new(&mut png_bytes)
            .write_image(
                img.as_raw(),
                img.width(),
                img.height(),
                image::ExtendedColorType::L8,
            )
            .map_err(|e| e.to_string())?;
        Ok(png_bytes)
    }
}

impl QrImageService for LocalQrService {
    fn image_url(&self, request: &QrRequest) -> String {
        match self.png(request) {
            Ok(bytes) => ImageSource::embedded("image/png", bytes).to_src(),
            Err(e) => {
                tracing::warn!(error = %e, "Local QR encoding failed");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordKind;
    use pretty_assertions::assert_eq;

    fn request(size: u32) -> QrRequest {
        let payload = QrPayload::for_record(&Record::sample(RecordKind::Student));
        QrRequest {
            size,
            data: payload.encoded(),
            ecc: EcLevel::M,
            margin: 1,
        }
    }

    #[test]
    fn test_student_payload_json() {
        let payload = QrPayload::for_record(&Record::sample(RecordKind::Student));
        assert_eq!(
            payload.to_json(),
            r#"{"id":"23CS067","name":"AAKASH","org":"Nandha Engineering College"}"#
        );
        let back: QrPayload = serde_json::from_str(&payload.to_json()).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_event_payload_uses_participant_id() {
        let payload = QrPayload::for_record(&Record::sample(RecordKind::Event));
        assert_eq!(payload.id, "PID-12345");
        assert_eq!(payload.org, "Innovate Corp");
    }

    #[test]
    fn test_missing_org_is_empty() {
        let payload = QrPayload::for_record(&Record::student("A", "1", "CSE"));
        assert_eq!(payload.org, "");
    }

    #[test]
    fn test_remote_url() {
        let url = RemoteQrService.image_url(&request(80));
        assert!(url.starts_with("https://api.qrserver.com/v1/create-qr-code/?size=80x80&data=%7B%22id%22"));
        assert!(url.ends_with("&ecc=M&margin=1"));
    }

    #[test]
    fn test_local_bitmap_has_quiet_zone() {
        let img = LocalQrService.bitmap(&request(120)).unwrap();
        assert_eq!(img.width(), img.height());
        assert!(img.width() <= 120);
        // Corner is inside the margin, so it stays white.
        assert_eq!(img.get_pixel(0, 0), &Luma([255]));
        assert!(img.pixels().any(|p| p.0[0] == 0));
    }

    #[test]
    fn test_local_bitmap_edge_is_capped() {
        let mut huge = request(200_000);
        huge.margin = u32::MAX / 2;
        let img = LocalQrService.bitmap(&huge).unwrap();
        assert!(img.width() <= MAX_LOCAL_EDGE);
    }

    #[test]
    fn test_local_url_is_png_data_url() {
        let url = LocalQrService.image_url(&request(80));
        assert!(url.starts_with("data:image/png;base64,"));
    }
}
