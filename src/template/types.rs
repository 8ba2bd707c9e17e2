//! Element struct types for the card layout model.
//!
//! All types derive `Serialize + Deserialize` with camelCase field names, so
//! the same types back both Rust construction and the card JSON format.
//!
//! Each element implements [`ElementMeta`] to declare its display label and
//! editor default.

use serde::{Deserialize, Serialize};

use crate::record::ImageField;

/// Metadata that every element struct must provide.
pub trait ElementMeta: Sized {
    /// Human-readable display label (e.g. "QR Code").
    fn label() -> &'static str;

    /// Starter value for a freshly added element in the editor.
    fn editor_default() -> Self;

    /// Starter size `(width, height)` for a freshly added element.
    fn editor_size() -> (u32, u32);
}

/// Position and size in card pixels. Positions may be negative or exceed the
/// card; such elements simply render (partly) off-card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FontWeight {
    #[default]
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "bold")]
    Bold,
    #[serde(rename = "500")]
    W500,
    #[serde(rename = "600")]
    W600,
    #[serde(rename = "700")]
    W700,
    #[serde(rename = "800")]
    W800,
}

impl FontWeight {
    /// Weights at or above 600 are drawn bold.
    pub fn is_bold(self) -> bool {
        matches!(
            self,
            FontWeight::Bold | FontWeight::W600 | FontWeight::W700 | FontWeight::W800
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectFit {
    #[default]
    Cover,
    Contain,
    Fill,
}

/// QR error correction level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EcLevel {
    L,
    #[default]
    M,
    Q,
    H,
}

impl EcLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            EcLevel::L => "L",
            EcLevel::M => "M",
            EcLevel::Q => "Q",
            EcLevel::H => "H",
        }
    }
}

// ============================================================================
// ELEMENTS
// ============================================================================

/// Text with `{field}` tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    pub content: String,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default)]
    pub font_weight: FontWeight,
    #[serde(default = "default_text_color")]
    pub color: String,
    #[serde(default)]
    pub text_align: TextAlign,
}

fn default_font_family() -> String {
    "Inter".into()
}

fn default_font_size() -> f32 {
    16.0
}

fn default_text_color() -> String {
    "#000000".into()
}

impl ElementMeta for TextElement {
    fn label() -> &'static str { "Text" }
    fn editor_default() -> Self {
        Self {
            content: "New Text".into(),
            font_family: default_font_family(),
            font_size: default_font_size(),
            font_weight: FontWeight::Normal,
            color: default_text_color(),
            text_align: TextAlign::Left,
        }
    }
    fn editor_size() -> (u32, u32) { (200, 24) }
}

/// Image bound to one of the record's image fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageElement {
    pub image_type: ImageField,
    #[serde(default)]
    pub object_fit: ObjectFit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_radius: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
}

impl ElementMeta for ImageElement {
    fn label() -> &'static str { "Image" }
    fn editor_default() -> Self {
        Self {
            image_type: ImageField::Photo,
            object_fit: ObjectFit::Cover,
            border_radius: Some(0),
            border_width: None,
            border_color: None,
        }
    }
    fn editor_size() -> (u32, u32) { (100, 100) }
}

/// QR code carrying the record's `{id, name, org}` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrElement {
    #[serde(default)]
    pub error_correction_level: EcLevel,
    #[serde(default = "default_qr_margin")]
    pub margin: u32,
}

fn default_qr_margin() -> u32 {
    1
}

impl ElementMeta for QrElement {
    fn label() -> &'static str { "QR Code" }
    fn editor_default() -> Self {
        Self {
            error_correction_level: EcLevel::M,
            margin: default_qr_margin(),
        }
    }
    fn editor_size() -> (u32, u32) { (80, 80) }
}

/// Filled rectangle, optionally rounded and bordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeElement {
    pub background_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_radius: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
}

impl ElementMeta for ShapeElement {
    fn label() -> &'static str { "Shape" }
    fn editor_default() -> Self {
        Self {
            background_color: "#3b82f6".into(),
            border_radius: Some(0),
            border_width: None,
            border_color: None,
        }
    }
    fn editor_size() -> (u32, u32) { (100, 50) }
}

// ============================================================================
// STYLE PATCHES
// ============================================================================

/// Partial update to a text element's style. `None` fields are left as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextPatch {
    pub content: Option<String>,
    pub font_family: Option<String>,
    pub font_size: Option<f32>,
    pub font_weight: Option<FontWeight>,
    pub color: Option<String>,
    pub text_align: Option<TextAlign>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImagePatch {
    pub image_type: Option<ImageField>,
    pub object_fit: Option<ObjectFit>,
    pub border_radius: Option<u32>,
    pub border_width: Option<u32>,
    pub border_color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QrPatch {
    pub error_correction_level: Option<EcLevel>,
    pub margin: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShapePatch {
    pub background_color: Option<String>,
    pub border_radius: Option<u32>,
    pub border_width: Option<u32>,
    pub border_color: Option<String>,
}

/// Typed style update, tagged like the element it applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StylePatch {
    Text(TextPatch),
    Image(ImagePatch),
    Qr(QrPatch),
    Shape(ShapePatch),
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn set_opt<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

impl TextElement {
    pub fn apply(&mut self, patch: TextPatch) {
        set(&mut self.content, patch.content);
        set(&mut self.font_family, patch.font_family);
        set(&mut self.font_size, patch.font_size);
        set(&mut self.font_weight, patch.font_weight);
        set(&mut self.color, patch.color);
        set(&mut self.text_align, patch.text_align);
    }
}

impl ImageElement {
    pub fn apply(&mut self, patch: ImagePatch) {
        set(&mut self.image_type, patch.image_type);
        set(&mut self.object_fit, patch.object_fit);
        set_opt(&mut self.border_radius, patch.border_radius);
        set_opt(&mut self.border_width, patch.border_width);
        set_opt(&mut self.border_color, patch.border_color);
    }
}

impl QrElement {
    pub fn apply(&mut self, patch: QrPatch) {
        set(&mut self.error_correction_level, patch.error_correction_level);
        set(&mut self.margin, patch.margin);
    }
}

impl ShapeElement {
    pub fn apply(&mut self, patch: ShapePatch) {
        set(&mut self.background_color, patch.background_color);
        set_opt(&mut self.border_radius, patch.border_radius);
        set_opt(&mut self.border_width, patch.border_width);
        set_opt(&mut self.border_color, patch.border_color);
    }
}
