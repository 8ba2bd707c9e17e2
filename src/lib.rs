//! # Cardsmith - ID Card Templating and Check-in
//!
//! Cardsmith turns tabular records (students, event participants) into ID
//! cards. It provides:
//!
//! - **Templates**: declarative card layouts with text, image, QR and shape
//!   elements, a built-in catalogue and an editor model
//! - **Rendering**: placeholder resolution into a visual tree, then
//!   rasterization to RGBA
//! - **Batch generation**: CSV import, photo fetching, optional AI
//!   enrichment and ZIP/PDF packaging with weighted progress
//! - **Verification**: scanning a card's QR payload and checking it in
//!
//! ## Quick Start
//!
//! ```no_run
//! use cardsmith::{
//!     record::Record,
//!     render::{LocalQrService, render},
//!     template::catalog,
//! };
//!
//! let record = Record::student("Ada Lovelace", "23CS001", "CSE");
//! let template = catalog::by_id("generic-student").unwrap();
//! let card = render(&record, template, &LocalQrService);
//! println!("{}", serde_json::to_string_pretty(&card).unwrap());
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`template`] | Card layouts, catalogue, editor |
//! | [`record`] | Record data model |
//! | [`resolve`] | `{field}` placeholder resolution |
//! | [`render`] | Visual tree, QR images, rasterization |
//! | [`batch`] | Import, photos, generation pipeline, packaging |
//! | [`verify`] | QR scanning and check-in |
//! | [`enrich`] | Gemini tagline and photo collaborators |
//! | [`export`] | CSV listings |
//! | [`notify`] | Bulk notification |
//! | [`server`] | HTTP API |
//! | [`error`] | Error types |

pub mod batch;
pub mod config;
pub mod enrich;
pub mod error;
pub mod export;
pub mod notify;
pub mod record;
pub mod render;
pub mod resolve;
pub mod server;
pub mod template;
pub mod verify;

// Re-exports for convenience
pub use config::AppConfig;
pub use error::CardError;
pub use record::{Record, RecordKind};
pub use template::TemplateDefinition;
