//! Error types for the scan2txt library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`Scan2TxtError`]: **Document-scoped**: the run cannot produce a
//!   transcript at all (unsupported file, unreadable PDF, engine missing,
//!   output not writable). Returned as `Err(Scan2TxtError)` from
//!   [`crate::Pipeline::run`]. Every variant names the [`Stage`] it came from.
//!
//! * [`PageError`]: **Page-scoped**: one page could not be enhanced or
//!   recognised. The page degrades (raw raster, or empty text) and the error
//!   is recorded on the [`crate::output::PageText`]; the run continues.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage a fatal error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Capability probing before any run is accepted.
    Startup,
    /// Pre-pipeline checks on the submitted file (kind, size, readability).
    Intake,
    /// Page Source Resolver: decoding or rasterising pages.
    Resolve,
    /// Image enhancement. Never fatal; listed for page-level reporting.
    Enhance,
    /// Recognition engine invocation.
    Recognize,
    /// Aggregation into one transcript.
    Aggregate,
    /// Result Store write.
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Startup => "startup",
            Stage::Intake => "intake",
            Stage::Resolve => "resolve",
            Stage::Enhance => "enhance",
            Stage::Recognize => "recognize",
            Stage::Aggregate => "aggregate",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All document-scoped errors returned by the scan2txt library.
///
/// Page-level failures use [`PageError`] and never surface here.
#[derive(Debug, Error)]
pub enum Scan2TxtError {
    // ── Intake errors ─────────────────────────────────────────────────────
    /// The file extension is not one of png, jpg, jpeg, tif, tiff, bmp, gif, pdf.
    #[error("Unsupported file type '{name}'\nAccepted: png, jpg, jpeg, tif, tiff, bmp, gif, pdf.")]
    UnsupportedKind { name: String },

    /// The submitted document exceeds the configured size limit.
    #[error("Input '{name}' is {size} bytes, over the {limit}-byte limit")]
    InputTooLarge { name: String, size: u64, limit: u64 },

    /// The submitted path could not be read.
    #[error("Cannot read input '{path}': {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Resolve errors ────────────────────────────────────────────────────
    /// Image bytes could not be decoded (corrupt data or unsupported codec).
    #[error("Image '{name}' could not be decoded: {detail}")]
    UnreadableImage { name: String, detail: String },

    /// No PDF renderer could be bound at startup.
    #[error(
        "PDF renderer unavailable: {reason}\n\n\
Install pdfium and either place libpdfium next to the binary, on the system\n\
library path, or set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    RendererUnavailable { reason: String },

    /// The PDF could not be opened, has no pages, or a page failed to render.
    #[error("PDF '{name}' is unreadable: {detail}")]
    UnreadablePdf { name: String, detail: String },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The recognition engine could not be located or started.
    #[error("Recognition engine '{engine}' is unavailable: {detail}\n{hint}")]
    EngineUnavailable {
        engine: String,
        detail: String,
        hint: String,
    },

    // ── Store errors ──────────────────────────────────────────────────────
    /// Could not create or write the transcript file.
    #[error("Failed to write transcript '{path}': {source}")]
    StorageWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A locator did not name a transcript in the store.
    #[error("Unknown transcript locator '{locator}'")]
    LocatorNotFound { locator: String },

    // ── Run control ───────────────────────────────────────────────────────
    /// A document-level operation exceeded its time budget.
    #[error("{stage} stage timed out after {elapsed_ms}ms")]
    Timeout { stage: Stage, elapsed_ms: u64 },

    /// The caller cancelled the run before it completed.
    #[error("Run cancelled during {stage} stage")]
    Cancelled { stage: Stage },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error in {stage} stage: {detail}")]
    Internal { stage: Stage, detail: String },
}

impl Scan2TxtError {
    /// The stage this error is attributed to.
    pub fn stage(&self) -> Stage {
        match self {
            Scan2TxtError::UnsupportedKind { .. }
            | Scan2TxtError::InputTooLarge { .. }
            | Scan2TxtError::InputUnreadable { .. }
            | Scan2TxtError::InvalidConfig(_) => Stage::Intake,
            Scan2TxtError::UnreadableImage { .. }
            | Scan2TxtError::RendererUnavailable { .. }
            | Scan2TxtError::UnreadablePdf { .. } => Stage::Resolve,
            Scan2TxtError::EngineUnavailable { .. } => Stage::Startup,
            Scan2TxtError::StorageWriteError { .. } | Scan2TxtError::LocatorNotFound { .. } => {
                Stage::Persist
            }
            Scan2TxtError::Timeout { stage, .. }
            | Scan2TxtError::Cancelled { stage }
            | Scan2TxtError::Internal { stage, .. } => *stage,
        }
    }
}

/// A non-fatal error for a single page.
///
/// Stored on [`crate::output::PageText`] when a page degrades. The run
/// always continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PageError {
    /// Enhancement failed; the raw raster was recognised instead.
    #[error("Page {page}: enhancement failed, using original image: {detail}")]
    EnhancementFailed { page: usize, detail: String },

    /// The engine invocation failed for this page.
    #[error("Page {page}: recognition failed: {detail}")]
    RecognitionFailed { page: usize, detail: String },

    /// The engine did not answer within the per-page budget.
    #[error("Page {page}: recognition timed out after {elapsed_ms}ms")]
    Timeout { page: usize, elapsed_ms: u64 },
}

impl PageError {
    pub fn page(&self) -> usize {
        match self {
            PageError::EnhancementFailed { page, .. }
            | PageError::RecognitionFailed { page, .. }
            | PageError::Timeout { page, .. } => *page,
        }
    }
}
