//! # Card Templates
//!
//! A [`TemplateDefinition`] is a fixed-size canvas with a background and an
//! ordered list of positioned [`Element`]s. Render order is list order, so
//! later elements paint over earlier ones.
//!
//! ## JSON format
//!
//! ```json
//! {
//!   "id": "modern",
//!   "name": "Modern",
//!   "type": "event",
//!   "width": 350,
//!   "height": 520,
//!   "category": "tech",
//!   "background": { "type": "solid", "color": "#ffffff" },
//!   "elements": [
//!     { "id": "name", "type": "text", "x": 20, "y": 255, "width": 310, "height": 32,
//!       "content": "{name}", "fontSize": 24, "fontWeight": "bold", "textAlign": "center" },
//!     { "id": "qr-code", "type": "qr", "x": 246, "y": 24, "width": 80, "height": 80 }
//!   ]
//! }
//! ```

pub mod catalog;
pub mod editor;
pub mod types;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::RecordKind;
pub use types::*;

/// Largest accepted card width or height, in CSS pixels.
pub const MAX_CARD_SIDE: u32 = 2000;

/// Template lookup and validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("Template size must be positive, got {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("Template size {width}x{height} exceeds the {max}px limit")]
    TooLarge { width: u32, height: u32, max: u32 },

    #[error("Duplicate element id '{0}'")]
    DuplicateElementId(String),

    #[error("Unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("Unknown element '{0}'")]
    UnknownElement(String),

    #[error("Unknown element type '{0}'")]
    UnknownElementType(String),

    #[error("Cannot apply {patch} style to {element} element '{id}'")]
    StyleMismatch {
        id: String,
        element: &'static str,
        patch: &'static str,
    },

    #[error("Template '{id}' is for {actual} records, not {expected}")]
    KindMismatch {
        id: String,
        expected: RecordKind,
        actual: RecordKind,
    },
}

/// Define the element enum and its dispatch methods from a single list.
///
/// Adding an element type: add one line here, then define the struct in
/// `types.rs` with `impl ElementMeta`.
macro_rules! define_elements {
    ($($variant:ident($inner:ty) => $tag:literal),+ $(,)?) => {
        /// Element payload, tagged by `"type"`.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "type", rename_all = "lowercase")]
        pub enum ElementKind {
            $($variant($inner),)+
        }

        impl ElementKind {
            /// Human-readable display label (from [`ElementMeta::label`]).
            pub fn label(&self) -> &'static str {
                match self { $(ElementKind::$variant(_) => <$inner>::label(),)+ }
            }

            /// Wire tag (`"text"`, `"qr"`, ...).
            pub fn type_name(&self) -> &'static str {
                match self { $(ElementKind::$variant(_) => $tag,)+ }
            }

            /// Editor starter payload and size for a type tag.
            pub fn editor_default(type_name: &str) -> Option<(Self, (u32, u32))> {
                match type_name {
                    $($tag => Some((
                        ElementKind::$variant(<$inner>::editor_default()),
                        <$inner>::editor_size(),
                    )),)+
                    _ => None,
                }
            }

            /// Every element type, in palette order.
            pub fn all_types() -> Vec<ElementTypeMeta> {
                vec![$(ElementTypeMeta { type_name: $tag, label: <$inner>::label() },)+]
            }
        }
    };
}

define_elements! {
    Text(TextElement) => "text",
    Image(ImageElement) => "image",
    Qr(QrElement) => "qr",
    Shape(ShapeElement) => "shape",
}

/// Element type metadata for the editor palette.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementTypeMeta {
    #[serde(rename = "type")]
    pub type_name: &'static str,
    pub label: &'static str,
}

/// A positioned element on the card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    #[serde(flatten)]
    pub geometry: Geometry,
    #[serde(flatten)]
    pub kind: ElementKind,
}

impl Element {
    pub fn new(id: impl Into<String>, geometry: Geometry, kind: ElementKind) -> Self {
        Self {
            id: id.into(),
            geometry,
            kind,
        }
    }
}

/// Card background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Background {
    Solid {
        color: String,
    },
    Gradient {
        colors: [String; 2],
        angle: f32,
    },
    Image {
        src: String,
        /// When set, the record's photo replaces `src` as a full-bleed background.
        #[serde(default, rename = "subjectPhoto", skip_serializing_if = "is_false")]
        subject_photo: bool,
    },
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Default for Background {
    fn default() -> Self {
        Background::Solid {
            color: "#ffffff".into(),
        }
    }
}

/// Catalogue grouping used for recommendations and carousels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Tech,
    NonTech,
    #[default]
    Neutral,
    Student,
}

/// A complete card layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub background: Background,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub category: Category,
}

impl TemplateDefinition {
    /// Check structural validity: positive size no larger than
    /// [`MAX_CARD_SIDE`] and unique element ids.
    ///
    /// Out-of-bounds geometry is legal, as is a QR element with unequal sides.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.width == 0 || self.height == 0 {
            return Err(TemplateError::InvalidSize {
                width: self.width,
                height: self.height,
            });
        }
        if self.width > MAX_CARD_SIDE || self.height > MAX_CARD_SIDE {
            return Err(TemplateError::TooLarge {
                width: self.width,
                height: self.height,
                max: MAX_CARD_SIDE,
            });
        }
        let mut seen = HashSet::new();
        for element in &self.elements {
            if !seen.insert(element.id.as_str()) {
                return Err(TemplateError::DuplicateElementId(element.id.clone()));
            }
        }
        Ok(())
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn element_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    /// Fail unless this template is for `kind` records.
    pub fn ensure_kind(&self, kind: RecordKind) -> Result<(), TemplateError> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(TemplateError::KindMismatch {
                id: self.id.clone(),
                expected: kind,
                actual: self.kind,
            })
        }
    }
}

/// Templates available to the app: the built-in catalogue plus anything saved
/// from the editor. Saving under a catalogue id shadows the built-in entry.
#[derive(Debug, Default)]
pub struct TemplateStore {
    saved: HashMap<String, TemplateDefinition>,
    order: Vec<String>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&TemplateDefinition> {
        self.saved.get(id).or_else(|| catalog::by_id(id))
    }

    /// All templates (optionally only one kind): catalogue order first, then
    /// editor-created templates in creation order.
    pub fn list(&self, kind: Option<RecordKind>) -> Vec<TemplateDefinition> {
        let builtin = catalog::all().iter().map(|t| self.get(&t.id).unwrap_or(t));
        let custom = self
            .order
            .iter()
            .filter(|id| catalog::by_id(id).is_none())
            .filter_map(|id| self.saved.get(id));
        builtin
            .chain(custom)
            .filter(|t| kind.is_none_or(|k| t.kind == k))
            .cloned()
            .collect()
    }

    /// Validate and store a template, replacing any previous version.
    pub fn save(&mut self, template: TemplateDefinition) -> Result<(), TemplateError> {
        template.validate()?;
        if !self.saved.contains_key(&template.id) {
            self.order.push(template.id.clone());
        }
        tracing::info!(id = %template.id, "Saved template");
        self.saved.insert(template.id.clone(), template);
        Ok(())
    }

    /// Copy a template under a fresh id and store the copy.
    pub fn duplicate(&mut self, id: &str) -> Result<TemplateDefinition, TemplateError> {
        let mut copy = self
            .get(id)
            .cloned()
            .ok_or_else(|| TemplateError::UnknownTemplate(id.to_string()))?;
        copy.id = format!("{}-{}", id, short_id());
        copy.name = format!("{} (Copy)", copy.name);
        self.save(copy.clone())?;
        Ok(copy)
    }

    /// Resolve a template id for `kind`, falling back to the kind's first
    /// template when the id is unknown or for the other kind.
    pub fn resolve_or_default(&self, id: Option<&str>, kind: RecordKind) -> TemplateDefinition {
        id.and_then(|id| self.get(id))
            .filter(|t| t.kind == kind)
            .cloned()
            .unwrap_or_else(|| catalog::resolve_or_default(None, kind).clone())
    }
}

/// Eight hex digits of a fresh v4 uuid.
pub(crate) fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
