//! # Error Types
//!
//! This module defines error types used throughout the cardsmith library.
//! Subsystems with a user-facing error vocabulary (import, scanning,
//! templates, export) have their own enums that fold into [`CardError`].

use thiserror::Error;

use crate::batch::import::ImportError;
use crate::export::ExportError;
use crate::template::TemplateError;
use crate::verify::ScanError;

/// Main error type for cardsmith operations
#[derive(Debug, Error)]
pub enum CardError {
    /// Tabular import failed (missing header, no rows, malformed CSV)
    #[error(transparent)]
    Import(#[from] ImportError),

    /// Template lookup or validation failure
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Image fetch or decode error
    #[error("Image error: {0}")]
    Image(String),

    /// Card rasterization error
    #[error("Render error: {0}")]
    Render(String),

    /// ZIP/PDF packaging error
    #[error("Packaging error: {0}")]
    Packaging(String),

    /// QR verification error
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Listing export error
    #[error(transparent)]
    Export(#[from] ExportError),

    /// AI enrichment collaborator error (tagline, photo enhancement)
    #[error("Enhancement error: {0}")]
    Enhance(String),

    /// Batch state machine was asked for a transition it cannot make
    #[error("Invalid batch transition: cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    /// Batch operation addressed a row that does not exist
    #[error("No record at row {0}")]
    UnknownRecord(usize),

    /// Network-level errors (HTTP client, listener)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
