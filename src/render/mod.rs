//! # Card Renderer
//!
//! Interprets a [`TemplateDefinition`] against a [`Record`] and produces a
//! [`RenderedCard`]: the card size, a resolved background and one
//! [`VisualNode`] per template element, in element order.
//!
//! Rendering is pure. It never fails on missing data and performs no I/O;
//! image sources are carried as strings and loaded later by [`raster`].
//!
//! ## Usage Example
//!
//! ```
//! use cardsmith::record::{Record, RecordKind};
//! use cardsmith::render::{render, RemoteQrService};
//! use cardsmith::template::catalog;
//!
//! let record = Record::sample(RecordKind::Event);
//! let template = catalog::by_id("modern").unwrap();
//! let card = render(&record, template, &RemoteQrService);
//! assert_eq!(card.nodes.len(), template.elements.len());
//! ```

pub mod font;
pub mod paint;
pub mod qr;
pub mod raster;

pub use qr::{LocalQrService, QrImageService, QrPayload, QrRequest, RemoteQrService};

use serde::Serialize;

use crate::record::{ImageField, Record};
use crate::resolve::resolve;
use crate::template::{
    Background, EcLevel, Element, ElementKind, FontWeight, Geometry, ObjectFit, TemplateDefinition,
    TextAlign,
};

/// A fully resolved card, ready to rasterize or serialize.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedCard {
    pub template_id: String,
    pub width: u32,
    pub height: u32,
    pub background: RenderedBackground,
    pub nodes: Vec<VisualNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RenderedBackground {
    Solid { color: String },
    Gradient { colors: [String; 2], angle: f32 },
    Image { src: String },
}

/// One element after resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualNode {
    pub id: String,
    #[serde(flatten)]
    pub geometry: Geometry,
    #[serde(flatten)]
    pub content: NodeContent,
}

/// Border styling shared by image, placeholder and shape nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Border {
    pub radius: u32,
    pub width: u32,
    pub color: Option<String>,
}

impl Border {
    fn new(radius: Option<u32>, width: Option<u32>, color: Option<&String>) -> Self {
        Self {
            radius: radius.unwrap_or(0),
            width: width.unwrap_or(0),
            color: color.cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeContent {
    #[serde(rename_all = "camelCase")]
    Text {
        text: String,
        font_family: String,
        font_size: f32,
        font_weight: FontWeight,
        color: String,
        text_align: TextAlign,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        src: String,
        image_type: ImageField,
        object_fit: ObjectFit,
        border: Border,
    },
    /// Silhouette shown where the record has no image for the slot.
    #[serde(rename_all = "camelCase")]
    Placeholder { image_type: ImageField, border: Border },
    Qr {
        src: String,
        payload: QrPayload,
        ecc: EcLevel,
        margin: u32,
    },
    #[serde(rename_all = "camelCase")]
    Shape {
        background_color: String,
        border: Border,
    },
}

/// Render `template` with `record`'s data.
pub fn render(
    record: &Record,
    template: &TemplateDefinition,
    qr: &dyn QrImageService,
) -> RenderedCard {
    RenderedCard {
        template_id: template.id.clone(),
        width: template.width,
        height: template.height,
        background: render_background(&template.background, record),
        nodes: template
            .elements
            .iter()
            .map(|el| render_element(el, record, qr))
            .collect(),
    }
}

fn render_background(background: &Background, record: &Record) -> RenderedBackground {
    match background {
        Background::Solid { color } => RenderedBackground::Solid {
            color: color.clone(),
        },
        Background::Gradient { colors, angle } => RenderedBackground::Gradient {
            colors: colors.clone(),
            angle: *angle,
        },
        Background::Image { src, subject_photo } => {
            let src = match record.photo() {
                Some(photo) if *subject_photo => photo.to_src(),
                _ => src.clone(),
            };
            RenderedBackground::Image { src }
        }
    }
}

fn render_element(element: &Element, record: &Record, qr: &dyn QrImageService) -> VisualNode {
    let content = match &element.kind {
        ElementKind::Text(t) => NodeContent::Text {
            text: resolve(&t.content, record),
            font_family: t.font_family.clone(),
            font_size: t.font_size,
            font_weight: t.font_weight,
            color: t.color.clone(),
            text_align: t.text_align,
        },
        ElementKind::Image(img) => {
            let border = Border::new(img.border_radius, img.border_width, img.border_color.as_ref());
            match record.image(img.image_type) {
                Some(source) => NodeContent::Image {
                    src: source.to_src(),
                    image_type: img.image_type,
                    object_fit: img.object_fit,
                    border,
                },
                None => NodeContent::Placeholder {
                    image_type: img.image_type,
                    border,
                },
            }
        }
        ElementKind::Qr(q) => {
            let payload = QrPayload::for_record(record);
            let request = QrRequest {
                size: element.geometry.width,
                data: payload.encoded(),
                ecc: q.error_correction_level,
                margin: q.margin,
            };
            NodeContent::Qr {
                src: qr.image_url(&request),
                payload,
                ecc: q.error_correction_level,
                margin: q.margin,
            }
        }
        ElementKind::Shape(s) => NodeContent::Shape {
            background_color: s.background_color.clone(),
            border: Border::new(s.border_radius, s.border_width, s.border_color.as_ref()),
        },
    };
    VisualNode {
        id: element.id.clone(),
        geometry: element.geometry,
        content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ImageSource, RecordKind};
    use crate::template::{Category, QrElement, catalog};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_one_node_per_element_in_order() {
        for template in catalog::all() {
            let record = Record::sample(template.kind);
            let card = render(&record, template, &RemoteQrService);
            let ids: Vec<&str> = card.nodes.iter().map(|n| n.id.as_str()).collect();
            let expected: Vec<&str> = template.elements.iter().map(|e| e.id.as_str()).collect();
            assert_eq!(ids, expected);
            assert_eq!((card.width, card.height), (template.width, template.height));
        }
    }

    #[test]
    fn test_text_is_resolved() {
        let record = Record::sample(RecordKind::Event);
        let card = render(&record, catalog::by_id("modern").unwrap(), &RemoteQrService);
        let date = card.nodes.iter().find(|n| n.id == "event-date").unwrap();
        match &date.content {
            NodeContent::Text { text, .. } => assert_eq!(text, "December 5, 2025"),
            other => panic!("expected text node, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_image_is_placeholder() {
        let record = Record::student("A", "1", "CSE");
        let card = render(&record, catalog::by_id("nandha-student").unwrap(), &RemoteQrService);
        let photo = card.nodes.iter().find(|n| n.id == "photo").unwrap();
        assert!(matches!(
            photo.content,
            NodeContent::Placeholder { image_type: ImageField::Photo, .. }
        ));
    }

    #[test]
    fn test_subject_photo_background() {
        let creative = catalog::by_id("creative").unwrap();
        let mut record = Record::sample(RecordKind::Event);
        record.set_image(ImageField::Photo, Some(ImageSource::Url("me.png".into())));
        let card = render(&record, creative, &RemoteQrService);
        assert_eq!(card.background, RenderedBackground::Image { src: "me.png".into() });

        record.set_image(ImageField::Photo, None);
        let card = render(&record, creative, &RemoteQrService);
        assert_eq!(
            card.background,
            RenderedBackground::Image { src: "https://i.imgur.com/8b23K1b.jpg".into() }
        );
    }

    #[test]
    fn test_qr_uses_width_for_size() {
        let template = TemplateDefinition {
            id: "wide-qr".into(),
            name: "Wide QR".into(),
            kind: RecordKind::Student,
            width: 200,
            height: 200,
            background: Background::default(),
            elements: vec![Element::new(
                "qr",
                Geometry { x: 0, y: 0, width: 90, height: 40 },
                ElementKind::Qr(QrElement { error_correction_level: EcLevel::H, margin: 2 }),
            )],
            category: Category::Student,
        };
        let card = render(&Record::sample(RecordKind::Student), &template, &RemoteQrService);
        match &card.nodes[0].content {
            NodeContent::Qr { src, payload, .. } => {
                assert!(src.contains("size=90x90"));
                assert!(src.ends_with("&ecc=H&margin=2"));
                assert_eq!(payload.id, "23CS067");
            }
            other => panic!("expected qr node, got {:?}", other),
        }
    }

    #[test]
    fn test_rendered_card_json_shape() {
        let card = render(
            &Record::sample(RecordKind::Event),
            catalog::by_id("minimal").unwrap(),
            &RemoteQrService,
        );
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["templateId"], "minimal");
        assert_eq!(json["nodes"][0]["type"], "text");
        assert_eq!(json["nodes"][0]["text"], "Priya Sharma");
        assert_eq!(json["nodes"][0]["fontWeight"], "600");
    }
}
