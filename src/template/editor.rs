//! Template editor.
//!
//! Holds a working copy of a template plus the current selection. Every
//! mutation works on the copy; nothing is visible elsewhere until [`save`]
//! writes it into a [`TemplateStore`].
//!
//! [`save`]: TemplateEditor::save

use super::{
    Element, ElementKind, Geometry, StylePatch, TemplateDefinition, TemplateError, TemplateStore,
};
use crate::record::Record;
use crate::render::{self, QrImageService, RenderedCard};

/// Where freshly added elements land.
const INSERT_AT: (i32, i32) = (20, 20);

#[derive(Debug, Clone)]
pub struct TemplateEditor {
    template: TemplateDefinition,
    selected: Option<String>,
}

impl TemplateEditor {
    pub fn new(template: TemplateDefinition) -> Self {
        Self {
            template,
            selected: None,
        }
    }

    pub fn template(&self) -> &TemplateDefinition {
        &self.template
    }

    pub fn selected(&self) -> Option<&Element> {
        self.selected.as_deref().and_then(|id| self.template.element(id))
    }

    /// Append an element of `type_name` with editor defaults and select it.
    pub fn add_element(&mut self, type_name: &str) -> Result<&Element, TemplateError> {
        let (kind, (width, height)) = ElementKind::editor_default(type_name)
            .ok_or_else(|| TemplateError::UnknownElementType(type_name.to_string()))?;
        let id = self.fresh_id();
        let geometry = Geometry {
            x: INSERT_AT.0,
            y: INSERT_AT.1,
            width,
            height,
        };
        self.template.elements.push(Element::new(id.clone(), geometry, kind));
        self.selected = Some(id);
        Ok(&self.template.elements[self.template.elements.len() - 1])
    }

    fn fresh_id(&self) -> String {
        loop {
            let id = format!("el-{}", super::short_id());
            if self.template.element(&id).is_none() {
                return id;
            }
        }
    }

    pub fn select(&mut self, id: &str) -> Result<(), TemplateError> {
        self.element_mut(id)?;
        self.selected = Some(id.to_string());
        Ok(())
    }

    pub fn deselect(&mut self) {
        self.selected = None;
    }

    pub fn move_to(&mut self, id: &str, x: i32, y: i32) -> Result<(), TemplateError> {
        let el = self.element_mut(id)?;
        el.geometry.x = x;
        el.geometry.y = y;
        Ok(())
    }

    /// Resize an element. QR codes stay square, sized by `width`.
    pub fn resize(&mut self, id: &str, width: u32, height: u32) -> Result<(), TemplateError> {
        let el = self.element_mut(id)?;
        el.geometry.width = width;
        el.geometry.height = match el.kind {
            ElementKind::Qr(_) => width,
            _ => height,
        };
        Ok(())
    }

    pub fn restyle(&mut self, id: &str, patch: StylePatch) -> Result<(), TemplateError> {
        let el = self.element_mut(id)?;
        match (&mut el.kind, patch) {
            (ElementKind::Text(t), StylePatch::Text(p)) => t.apply(p),
            (ElementKind::Image(i), StylePatch::Image(p)) => i.apply(p),
            (ElementKind::Qr(q), StylePatch::Qr(p)) => q.apply(p),
            (ElementKind::Shape(s), StylePatch::Shape(p)) => s.apply(p),
            (kind, patch) => {
                return Err(TemplateError::StyleMismatch {
                    id: id.to_string(),
                    element: kind.type_name(),
                    patch: patch_name(&patch),
                });
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<Element, TemplateError> {
        let index = self.index_of(id)?;
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
        Ok(self.template.elements.remove(index))
    }

    /// Move an element to a new position in the paint order (clamped).
    pub fn move_layer(&mut self, id: &str, to: usize) -> Result<(), TemplateError> {
        let from = self.index_of(id)?;
        let el = self.template.elements.remove(from);
        let to = to.min(self.template.elements.len());
        self.template.elements.insert(to, el);
        Ok(())
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.template.name = name.into();
    }

    pub fn set_size(&mut self, width: u32, height: u32) -> Result<(), TemplateError> {
        if width == 0 || height == 0 {
            return Err(TemplateError::InvalidSize { width, height });
        }
        self.template.width = width;
        self.template.height = height;
        Ok(())
    }

    /// Render the working copy against a record.
    pub fn preview(&self, record: &Record, qr: &dyn QrImageService) -> RenderedCard {
        render::render(record, &self.template, qr)
    }

    /// Validate and store the working copy under its id.
    pub fn save(&self, store: &mut TemplateStore) -> Result<TemplateDefinition, TemplateError> {
        store.save(self.template.clone())?;
        Ok(self.template.clone())
    }

    pub fn into_template(self) -> TemplateDefinition {
        self.template
    }

    fn index_of(&self, id: &str) -> Result<usize, TemplateError> {
        self.template
            .elements
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| TemplateError::UnknownElement(id.to_string()))
    }

    fn element_mut(&mut self, id: &str) -> Result<&mut Element, TemplateError> {
        self.template
            .element_mut(id)
            .ok_or_else(|| TemplateError::UnknownElement(id.to_string()))
    }
}

fn patch_name(patch: &StylePatch) -> &'static str {
    match patch {
        StylePatch::Text(_) => "text",
        StylePatch::Image(_) => "image",
        StylePatch::Qr(_) => "qr",
        StylePatch::Shape(_) => "shape",
    }
}
