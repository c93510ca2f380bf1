//! # scan2txt
//!
//! Turn scanned documents (single images or multi-page PDFs) into plain text
//! with tesseract, optionally cleaning each page up first.
//!
//! ## Why this crate?
//!
//! Calling an OCR engine on one image is easy. Doing it for a 40-page scan
//! reliably is not: pages must be rasterised at a sensible DPI, phone
//! photos need binarisation before the engine can read them, one bad page
//! must not sink the other 39, results must come back in page order even
//! when pages finish out of order, and two uploads called `scan.pdf` must
//! not overwrite each other. This crate packages that pipeline.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image / PDF
//!  │
//!  ├─ 1. Intake     extension allow-list, size limit
//!  ├─ 2. Resolve    decode image or rasterise PDF pages via pdfium (spawn_blocking)
//!  ├─ 3. Enhance    grayscale → smooth → binarise → despeckle → upscale (optional, best effort)
//!  ├─ 4. Recognise  tesseract per page, bounded concurrency, per-page timeout
//!  ├─ 5. Aggregate  "--- Page N ---" delimiters, placeholder when nothing was read
//!  └─ 6. Persist    <stem>_<timestamp>_<random>.txt, never overwriting
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scan2txt::{Capabilities, Pipeline, PipelineConfig, ProbeOptions, ResultStore, SubmittedDocument};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let caps = Capabilities::init(&ProbeOptions::default());
//!     let store = ResultStore::open("outputs").await?;
//!     let pipeline = Pipeline::from_capabilities(caps, store)?;
//!
//!     let config = PipelineConfig::builder().language("eng").enhance(true).build()?;
//!     let document = SubmittedDocument::from_path("scan.pdf")?;
//!     let transcript = pipeline.run(document, &config).await?;
//!
//!     println!("{}", transcript.text);
//!     eprintln!("saved as {}", transcript.locator);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `scan2txt` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `enhance` | on      | Image enhancement filters (imageproc). Without it enhancement always falls back |
//!
//! ## External dependencies
//!
//! * `tesseract` on `PATH` (or `TESSERACT_PATH`) with the traineddata for
//!   the languages you request.
//! * A pdfium shared library for PDF input (next to the binary, on the
//!   system library path, or `PDFIUM_LIB_PATH`). Image input works without it.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod capabilities;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod state;
pub mod store;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use capabilities::{Capabilities, CapabilityReport, EngineStatus, ProbeOptions};
pub use config::{EngineMode, EnhancementPolicy, PipelineConfig, PipelineConfigBuilder, ThresholdPolicy};
pub use error::{PageError, Scan2TxtError, Stage};
pub use orchestrator::Pipeline;
pub use output::{EnhancedPage, PageText, RasterPage, RunStats, Transcript};
pub use pipeline::aggregate::PLACEHOLDER;
pub use pipeline::enhance::Enhancer;
pub use pipeline::input::{DocumentKind, SubmittedDocument};
pub use pipeline::recognize::{RecognitionError, Recognizer, TesseractCli};
pub use pipeline::render::{PdfRasterizer, PdfRenderer, PdfiumRasterizer};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use state::RunState;
pub use store::{Locator, ResultStore};
pub use stream::{collect_ordered, PageStream};
