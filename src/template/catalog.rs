//! Built-in template catalogue.
//!
//! The catalogue ships as JSON next to this file and is parsed once on first
//! use. Order matters: the first template of each kind is its fallback.

use std::sync::OnceLock;

use super::{Category, TemplateDefinition};
use crate::record::{Record, RecordKind};

const CATALOG_JSON: &str = include_str!("catalog.json");

/// Every built-in template, students first.
pub fn all() -> &'static [TemplateDefinition] {
    static CATALOG: OnceLock<Vec<TemplateDefinition>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        // The catalogue is compiled in; a parse failure is a build defect.
        serde_json::from_str(CATALOG_JSON).expect("built-in template catalogue is valid JSON")
    })
}

pub fn by_id(id: &str) -> Option<&'static TemplateDefinition> {
    all().iter().find(|t| t.id == id)
}

pub fn for_kind(kind: RecordKind) -> impl Iterator<Item = &'static TemplateDefinition> {
    all().iter().filter(move |t| t.kind == kind)
}

/// Id of the template preselected for a kind.
pub fn default_id(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Student => "nandha-student",
        RecordKind::Event => "modern",
    }
}

pub fn default_for(kind: RecordKind) -> &'static TemplateDefinition {
    resolve_or_default(Some(default_id(kind)), kind)
}

/// Look up `id` among the kind's templates, falling back to the kind's first
/// template when it is missing or belongs to the other kind.
pub fn resolve_or_default(id: Option<&str>, kind: RecordKind) -> &'static TemplateDefinition {
    let mut candidates = for_kind(kind);
    let first = candidates.next();
    id.and_then(by_id)
        .filter(|t| t.kind == kind)
        .or(first)
        .expect("catalogue has templates for every kind")
}

/// Templates suggested for a record: event records pick by `eventType`
/// (`Tech` or `Non-Tech`); everything else gets the kind's full list.
pub fn recommended(record: &Record) -> Vec<&'static TemplateDefinition> {
    let category = match (record.kind(), record.field("eventType")) {
        (RecordKind::Event, Some("Tech")) => Some(Category::Tech),
        (RecordKind::Event, Some("Non-Tech")) => Some(Category::NonTech),
        _ => None,
    };
    for_kind(record.kind())
        .filter(|t| category.is_none_or(|c| t.category == c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Background, ElementKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_catalogue_parses_and_validates() {
        let ids: Vec<&str> = all().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "nandha-student",
                "generic-student",
                "generic-student-classic",
                "modern",
                "classic",
                "minimal",
                "creative",
            ]
        );
        for t in all() {
            t.validate().unwrap();
        }
    }

    #[test]
    fn test_dimensions_by_kind() {
        for t in for_kind(RecordKind::Student) {
            assert_eq!((t.width, t.height), (450, 284));
        }
        for t in for_kind(RecordKind::Event) {
            assert_eq!((t.width, t.height), (350, 520));
        }
    }

    #[test]
    fn test_creative_uses_subject_photo() {
        let creative = by_id("creative").unwrap();
        assert!(matches!(
            creative.background,
            Background::Image { subject_photo: true, .. }
        ));
        assert!(matches!(
            by_id("modern").unwrap().background,
            Background::Solid { .. }
        ));
    }

    #[test]
    fn test_every_template_has_a_qr() {
        for t in all() {
            assert!(
                t.elements.iter().any(|e| matches!(e.kind, ElementKind::Qr(_))),
                "{} has no QR element",
                t.id
            );
        }
    }

    #[test]
    fn test_defaults_and_fallback() {
        assert_eq!(default_for(RecordKind::Student).id, "nandha-student");
        assert_eq!(default_for(RecordKind::Event).id, "modern");
        assert_eq!(resolve_or_default(Some("missing"), RecordKind::Event).id, "modern");
        assert_eq!(resolve_or_default(Some("classic"), RecordKind::Student).id, "nandha-student");
        assert_eq!(resolve_or_default(None, RecordKind::Student).id, "nandha-student");
    }

    #[test]
    fn test_recommendations() {
        let mut r = Record::sample(RecordKind::Event);
        let tech: Vec<&str> = recommended(&r).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(tech, vec!["modern", "creative"]);

        r.set_field("eventType", "Non-Tech");
        let non_tech: Vec<&str> = recommended(&r).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(non_tech, vec!["classic"]);

        r.set_field("eventType", "");
        assert_eq!(recommended(&r).len(), 4);

        let s = Record::sample(RecordKind::Student);
        assert_eq!(recommended(&s).len(), 3);
    }
}
