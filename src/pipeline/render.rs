//! Page Source Resolver: turn a submitted document into ordered raster pages.
//!
//! Images decode to exactly one page. PDFs are rasterised page by page
//! through a [`PdfRasterizer`]; the default implementation binds pdfium.
//!
//! ## Why spawn_blocking?
//!
//! Both image decoding and pdfium rendering are CPU-bound and pdfium is not
//! async-aware. The work runs on Tokio's blocking pool so the async workers
//! stay responsive, and the whole step is bounded by the resolve timeout.
//!
//! ## Capability, not probe
//!
//! Whether a PDF renderer exists is decided once, when [`PdfRenderer::detect`]
//! runs at startup. A run against an [`PdfRenderer::Unavailable`] renderer
//! fails immediately with `RendererUnavailable` instead of trying to bind
//! pdfium again.

use crate::config::PipelineConfig;
use crate::error::{Scan2TxtError, Stage};
use crate::output::RasterPage;
use crate::pipeline::input::{has_pdf_magic, DocumentKind, SubmittedDocument};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit pdfium library file.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Rasterises every page of a PDF, in document order.
///
/// Implementations run on a blocking thread and may take as long as they
/// need; the caller enforces the timeout.
pub trait PdfRasterizer: Send + Sync {
    /// Short backend identifier used in logs.
    fn name(&self) -> &str;

    /// Render all pages of `bytes` at `dpi`, capping either edge at `max_edge`.
    ///
    /// Errors should be `UnreadablePdf`; the first image is page 1.
    fn rasterize(
        &self,
        name: &str,
        bytes: &[u8],
        dpi: u32,
        max_edge: u32,
    ) -> Result<Vec<DynamicImage>, Scan2TxtError>;
}

/// The PDF rendering capability, resolved once at startup.
#[derive(Clone)]
pub enum PdfRenderer {
    Available(Arc<dyn PdfRasterizer>),
    Unavailable { reason: String },
}

impl fmt::Debug for PdfRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdfRenderer::Available(r) => f.debug_tuple("Available").field(&r.name()).finish(),
            PdfRenderer::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

impl PdfRenderer {
    /// Bind pdfium, preferring an explicit path, then `PDFIUM_LIB_PATH`,
    /// then a library next to the working directory, then the system one.
    pub fn detect(explicit: Option<&Path>) -> Self {
        match PdfiumRasterizer::bind(explicit) {
            Ok(r) => {
                info!("PDF renderer ready: pdfium");
                PdfRenderer::Available(Arc::new(r))
            }
            Err(reason) => {
                warn!("PDF renderer unavailable: {}", reason);
                PdfRenderer::Unavailable { reason }
            }
        }
    }

    /// Wrap a custom rasteriser.
    pub fn with_rasterizer(r: Arc<dyn PdfRasterizer>) -> Self {
        PdfRenderer::Available(r)
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        PdfRenderer::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, PdfRenderer::Available(_))
    }
}

/// Resolve a document into raster pages numbered 1..=N.
pub async fn resolve_pages(
    document: &SubmittedDocument,
    bytes: Arc<[u8]>,
    renderer: &PdfRenderer,
    config: &PipelineConfig,
) -> Result<Vec<RasterPage>, Scan2TxtError> {
    let name = document.original_name.clone();
    let kind = document.kind;
    let dpi = config.dpi;
    let max_edge = config.max_rendered_pixels;

    let rasterizer = match (kind, renderer) {
        (DocumentKind::Pdf, PdfRenderer::Unavailable { reason }) => {
            return Err(Scan2TxtError::RendererUnavailable {
                reason: reason.clone(),
            });
        }
        (DocumentKind::Pdf, PdfRenderer::Available(r)) => Some(Arc::clone(r)),
        (DocumentKind::Image, _) => None,
    };

    let start = Instant::now();
    let task = tokio::task::spawn_blocking(move || match rasterizer {
        Some(r) => rasterize_pdf(r.as_ref(), &name, &bytes, dpi, max_edge),
        None => decode_image(&name, &bytes).map(|img| vec![img]),
    });

    let images = tokio::time::timeout(config.resolve_timeout, task)
        .await
        .map_err(|_| Scan2TxtError::Timeout {
            stage: Stage::Resolve,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })?
        .map_err(|e| Scan2TxtError::Internal {
            stage: Stage::Resolve,
            detail: format!("Resolve task panicked: {}", e),
        })??;

    let pages: Vec<RasterPage> = images
        .into_iter()
        .enumerate()
        .map(|(i, img)| RasterPage::new(i + 1, img))
        .collect();

    info!(
        "Resolved '{}' into {} page(s) in {}ms",
        document.original_name,
        pages.len(),
        start.elapsed().as_millis()
    );
    Ok(pages)
}

/// Decode a single image file into one page.
fn decode_image(name: &str, bytes: &[u8]) -> Result<DynamicImage, Scan2TxtError> {
    let image = image::load_from_memory(bytes).map_err(|e| Scan2TxtError::UnreadableImage {
        name: name.to_string(),
        detail: e.to_string(),
    })?;
    if image.width() == 0 || image.height() == 0 {
        return Err(Scan2TxtError::UnreadableImage {
            name: name.to_string(),
            detail: "image has zero width or height".into(),
        });
    }
    debug!("Decoded image → {}x{} px", image.width(), image.height());
    Ok(image)
}

fn rasterize_pdf(
    rasterizer: &dyn PdfRasterizer,
    name: &str,
    bytes: &[u8],
    dpi: u32,
    max_edge: u32,
) -> Result<Vec<DynamicImage>, Scan2TxtError> {
    if !has_pdf_magic(bytes) {
        return Err(Scan2TxtError::UnreadablePdf {
            name: name.to_string(),
            detail: "missing %PDF header".into(),
        });
    }
    let images = rasterizer.rasterize(name, bytes, dpi, max_edge)?;
    if images.is_empty() {
        return Err(Scan2TxtError::UnreadablePdf {
            name: name.to_string(),
            detail: "document has no pages".into(),
        });
    }
    Ok(images)
}

// ── pdfium backend ───────────────────────────────────────────────────────

/// [`PdfRasterizer`] backed by a pdfium library bound once per process.
pub struct PdfiumRasterizer {
    pdfium: Pdfium,
    library: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// Bind pdfium. Returns a human-readable reason on failure.
    pub fn bind(explicit: Option<&Path>) -> Result<Self, String> {
        let configured = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from));

        if let Some(path) = configured {
            return Pdfium::bind_to_library(&path)
                .map(|bindings| Self {
                    pdfium: Pdfium::new(bindings),
                    library: Some(path.clone()),
                })
                .map_err(|e| format!("cannot load '{}': {:?}", path.display(), e));
        }

        let local = Pdfium::pdfium_platform_library_name_at_path("./");
        Pdfium::bind_to_library(&local)
            .map(|bindings| Self {
                pdfium: Pdfium::new(bindings),
                library: Some(local.clone()),
            })
            .or_else(|_| {
                Pdfium::bind_to_system_library().map(|bindings| Self {
                    pdfium: Pdfium::new(bindings),
                    library: None,
                })
            })
            .map_err(|e| format!("no pdfium library found on the system: {:?}", e))
    }

    /// The library file that was bound, when not the system default.
    pub fn library(&self) -> Option<&Path> {
        self.library.as_deref()
    }
}

impl PdfRasterizer for PdfiumRasterizer {
    fn name(&self) -> &str {
        "pdfium"
    }

    fn rasterize(
        &self,
        name: &str,
        bytes: &[u8],
        dpi: u32,
        max_edge: u32,
    ) -> Result<Vec<DynamicImage>, Scan2TxtError> {
        let unreadable = |detail: String| Scan2TxtError::UnreadablePdf {
            name: name.to_string(),
            detail,
        };

        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| unreadable(format!("{:?}", e)))?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);

        // PDF user space is 72 units per inch.
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(dpi as f32 / 72.0)
            .set_maximum_width(max_edge as i32)
            .set_maximum_height(max_edge as i32);

        let mut images = Vec::with_capacity(total_pages);
        for idx in 0..total_pages {
            let page = pages
                .get(idx as u16)
                .map_err(|e| unreadable(format!("page {}: {:?}", idx + 1, e)))?;

            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| unreadable(format!("page {} render failed: {:?}", idx + 1, e)))?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    struct StripeRasterizer {
        pages: usize,
    }

    impl PdfRasterizer for StripeRasterizer {
        fn name(&self) -> &str {
            "stripes"
        }

        fn rasterize(
            &self,
            _name: &str,
            _bytes: &[u8],
            _dpi: u32,
            _max_edge: u32,
        ) -> Result<Vec<DynamicImage>, Scan2TxtError> {
            Ok((1..=self.pages)
                .map(|i| DynamicImage::ImageRgb8(RgbImage::new(10 * i as u32, 5)))
                .collect())
        }
    }

    #[tokio::test]
    async fn image_resolves_to_single_page() {
        let doc = SubmittedDocument::from_bytes("scan.png", png_bytes(12, 8)).unwrap();
        let bytes = doc.load(u64::MAX).await.unwrap();
        let renderer = PdfRenderer::unavailable("not needed for images");
        let pages = resolve_pages(&doc, bytes, &renderer, &PipelineConfig::default())
            .await
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].index, 1);
        assert_eq!((pages[0].width(), pages[0].height()), (12, 8));
    }

    #[tokio::test]
    async fn corrupt_image_is_unreadable() {
        let doc = SubmittedDocument::from_bytes("scan.jpg", vec![0xFF, 0xD8, 0x00, 0x01]).unwrap();
        let bytes = doc.load(u64::MAX).await.unwrap();
        let err = resolve_pages(
            &doc,
            bytes,
            &PdfRenderer::unavailable("n/a"),
            &PipelineConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Scan2TxtError::UnreadableImage { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn pdf_without_renderer_fails_fast() {
        let doc = SubmittedDocument::from_bytes("doc.pdf", b"%PDF-1.7".to_vec()).unwrap();
        let bytes = doc.load(u64::MAX).await.unwrap();
        let err = resolve_pages(
            &doc,
            bytes,
            &PdfRenderer::unavailable("libpdfium.so missing"),
            &PipelineConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Scan2TxtError::RendererUnavailable { .. }));
    }

    #[tokio::test]
    async fn pdf_without_header_is_unreadable() {
        let doc = SubmittedDocument::from_bytes("doc.pdf", b"garbage bytes".to_vec()).unwrap();
        let bytes = doc.load(u64::MAX).await.unwrap();
        let renderer = PdfRenderer::with_rasterizer(Arc::new(StripeRasterizer { pages: 2 }));
        let err = resolve_pages(&doc, bytes, &renderer, &PipelineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Scan2TxtError::UnreadablePdf { .. }));
    }

    #[tokio::test]
    async fn pdf_pages_keep_document_order() {
        let doc = SubmittedDocument::from_bytes("doc.pdf", b"%PDF-1.7 ...".to_vec()).unwrap();
        let bytes = doc.load(u64::MAX).await.unwrap();
        let renderer = PdfRenderer::with_rasterizer(Arc::new(StripeRasterizer { pages: 4 }));
        let pages = resolve_pages(&doc, bytes, &renderer, &PipelineConfig::default())
            .await
            .unwrap();
        let indices: Vec<usize> = pages.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
        let widths: Vec<u32> = pages.iter().map(|p| p.width()).collect();
        assert_eq!(widths, vec![10, 20, 30, 40]);
    }

    #[tokio::test]
    async fn empty_pdf_is_unreadable() {
        let doc = SubmittedDocument::from_bytes("doc.pdf", b"%PDF-1.7".to_vec()).unwrap();
        let bytes = doc.load(u64::MAX).await.unwrap();
        let renderer = PdfRenderer::with_rasterizer(Arc::new(StripeRasterizer { pages: 0 }));
        let err = resolve_pages(&doc, bytes, &renderer, &PipelineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Scan2TxtError::UnreadablePdf { .. }));
    }
}
