//! Pipeline stages for scanned-document recognition.
//!
//! Each submodule implements exactly one transformation step. Keeping
//! stages separate makes each independently testable and lets us swap
//! implementations (another PDF backend, another engine) without touching
//! the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ enhance ──▶ recognize ──▶ postprocess ──▶ aggregate
//! (kind)    (pages)    (optional)  (tesseract)    (cleanup)       (one string)
//! ```
//!
//! 1. [`input`]: classify by extension, enforce the size limit, load bytes
//! 2. [`render`]: decode an image or rasterise every PDF page; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`enhance`]: grayscale, smooth, binarise, despeckle, upscale; falls
//!    back to the raw raster on any failure
//! 4. [`recognize`]: PNG-encode the page ([`encode`]) and run the engine
//! 5. [`postprocess`]: deterministic cleanup of engine output
//! 6. [`aggregate`]: join pages in index order with delimiters

pub mod aggregate;
pub mod encode;
pub mod enhance;
pub mod input;
pub mod postprocess;
pub mod recognize;
pub mod render;
