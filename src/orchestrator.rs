//! Pipeline Orchestrator: one submitted document in, one transcript out.
//!
//! A [`Pipeline`] owns the resolved capabilities (renderer, enhancer,
//! recogniser) and the [`ResultStore`]. Each call to [`Pipeline::run`] is an
//! independent run with its own [`PipelineConfig`] and its own
//! [`RunTracker`]; runs share nothing but the store directory.
//!
//! ## Failure policy
//!
//! * Intake and resolve failures are fatal: no pages, no transcript.
//! * Enhancement never fails a run; a page that cannot be enhanced is
//!   recognised from its raw raster.
//! * A page whose recognition fails or times out contributes empty text.
//! * A store write failure is fatal; nothing half-written is returned.
//! * Cancellation is checked between stages and raced against page work.
//!   Once observed, the run returns `Cancelled` and the store is untouched.

use crate::capabilities::Capabilities;
use crate::config::PipelineConfig;
use crate::error::{PageError, Scan2TxtError, Stage};
use crate::output::{EnhancedPage, PageText, RasterPage, RunStats, Transcript};
use crate::pipeline::aggregate::aggregate;
use crate::pipeline::enhance::{EnhanceOutcome, Enhancer};
use crate::pipeline::input::{DocumentKind, SubmittedDocument};
use crate::pipeline::postprocess::clean_page_text;
use crate::pipeline::recognize::Recognizer;
use crate::pipeline::render::{resolve_pages, PdfRenderer};
use crate::state::{RunState, RunTracker};
use crate::store::ResultStore;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The document OCR pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub(crate) renderer: PdfRenderer,
    pub(crate) enhancer: Enhancer,
    pub(crate) recognizer: Arc<dyn Recognizer>,
    store: ResultStore,
}

impl Pipeline {
    /// Build from probed capabilities. Fails with `EngineUnavailable` when
    /// no recogniser exists, before any document is accepted.
    pub fn from_capabilities(caps: &Capabilities, store: ResultStore) -> Result<Self, Scan2TxtError> {
        let recognizer = caps.recognizer()?;
        Ok(Self {
            renderer: caps.renderer.clone(),
            enhancer: caps.enhancer.clone(),
            recognizer,
            store,
        })
    }

    /// Build around a custom recogniser. No PDF renderer is attached until
    /// [`Pipeline::with_renderer`] is called.
    pub fn new(recognizer: Arc<dyn Recognizer>, store: ResultStore) -> Self {
        Self {
            renderer: PdfRenderer::unavailable("no PDF renderer configured"),
            enhancer: Enhancer::detect(),
            recognizer,
            store,
        }
    }

    pub fn with_renderer(mut self, renderer: PdfRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_enhancer(mut self, enhancer: Enhancer) -> Self {
        self.enhancer = enhancer;
        self
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Run one document to completion.
    ///
    /// # Errors
    /// Returns `Err(Scan2TxtError)` only for document-scoped failures; pages
    /// that fail recognition are recorded on the transcript instead.
    pub async fn run(
        &self,
        document: SubmittedDocument,
        config: &PipelineConfig,
    ) -> Result<Transcript, Scan2TxtError> {
        self.run_with_cancel(document, config, CancellationToken::new())
            .await
    }

    /// Like [`Pipeline::run`], abandoning work when `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        document: SubmittedDocument,
        config: &PipelineConfig,
        cancel: CancellationToken,
    ) -> Result<Transcript, Scan2TxtError> {
        let total_start = Instant::now();
        info!(
            run = %document.id,
            "Starting run: {} ({:?})",
            document.original_name,
            document.kind
        );

        // ── Intake ───────────────────────────────────────────────────────
        let bytes = document.load(config.max_input_bytes).await?;
        let mut run = RunTracker::new(document.id);

        // ── Step 1: Resolve pages ────────────────────────────────────────
        let resolve_start = Instant::now();
        let pages = match guarded(
            &cancel,
            Stage::Resolve,
            resolve_pages(&document, bytes, &self.renderer, config),
        )
        .await
        {
            Ok(pages) => pages,
            Err(e) => return Err(run.fail(e)),
        };
        let resolve_duration_ms = resolve_start.elapsed().as_millis() as u64;
        let total_pages = pages.len();
        run.advance(RunState::Resolved)?;

        if let Some(ref cb) = config.progress_callback {
            cb.on_run_start(total_pages);
        }

        // ── Step 2: Enhance (best effort) ────────────────────────────────
        let enhanced = match guarded(&cancel, Stage::Enhance, async {
            stream::iter(
                pages
                    .into_iter()
                    .map(|page| enhance_page(&self.enhancer, page, config)),
            )
            .buffer_unordered(config.concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
        })
        .await
        {
            Ok(outcomes) => outcomes,
            Err(e) => return Err(run.fail(e)),
        };
        let enhancement_fallbacks = enhanced.iter().filter(|o| o.fallback.is_some()).count();
        run.advance(RunState::Enhanced)?;

        // ── Step 3: Recognise ────────────────────────────────────────────
        let recognize_start = Instant::now();
        let recognizer = self.recognizer.as_ref();
        let recognized = guarded(&cancel, Stage::Recognize, async {
            Ok(stream::iter(
                enhanced
                    .into_iter()
                    .map(|o| recognize_page(recognizer, o.page, total_pages, config)),
            )
            .buffer_unordered(config.concurrency)
            .collect::<Vec<PageText>>()
            .await)
        })
        .await;
        let mut page_texts = match recognized {
            Ok(texts) => texts,
            Err(e) => return Err(run.fail(e)),
        };
        let recognize_duration_ms = recognize_start.elapsed().as_millis() as u64;

        // Completion order is arbitrary; page order is not.
        page_texts.sort_by_key(|p| p.index);
        if page_texts.len() != total_pages {
            return Err(run.fail(Scan2TxtError::Internal {
                stage: Stage::Recognize,
                detail: format!(
                    "{} page texts for {} pages",
                    page_texts.len(),
                    total_pages
                ),
            }));
        }
        run.advance(RunState::Recognized)?;

        // ── Step 4: Aggregate ────────────────────────────────────────────
        let text = aggregate(&page_texts, document.kind == DocumentKind::Pdf);
        run.advance(RunState::Aggregated)?;

        // ── Step 5: Persist ──────────────────────────────────────────────
        // Not raced against cancellation: a write that has started finishes.
        if cancel.is_cancelled() {
            return Err(run.fail(Scan2TxtError::Cancelled {
                stage: Stage::Persist,
            }));
        }
        let locator = match self.store.persist(document.base_name(), &text).await {
            Ok(locator) => locator,
            Err(e) => return Err(run.fail(e)),
        };
        run.advance(RunState::Persisted)?;

        // ── Step 6: Done ─────────────────────────────────────────────────
        let pages_with_text = page_texts.iter().filter(|p| !p.text.is_empty()).count();
        let failed_pages = page_texts.iter().filter(|p| p.error.is_some()).count();
        let stats = RunStats {
            total_pages,
            pages_with_text,
            failed_pages,
            enhancement_fallbacks,
            resolve_duration_ms,
            recognize_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };

        if let Some(ref cb) = config.progress_callback {
            cb.on_run_complete(total_pages, pages_with_text);
        }

        run.advance(RunState::Done)?;
        info!(
            run = %document.id,
            "Run complete: {}/{} pages with text, {} failed, {}ms total",
            pages_with_text,
            total_pages,
            failed_pages,
            stats.total_duration_ms
        );

        Ok(Transcript {
            document_id: document.id,
            original_name: document.original_name,
            pages: page_texts,
            text,
            created_at: Utc::now(),
            locator,
            stats,
        })
    }

    /// Synchronous wrapper around [`Pipeline::run`].
    ///
    /// Creates a temporary tokio runtime internally.
    pub fn run_blocking(
        &self,
        document: SubmittedDocument,
        config: &PipelineConfig,
    ) -> Result<Transcript, Scan2TxtError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| Scan2TxtError::Internal {
                stage: Stage::Startup,
                detail: format!("Failed to create tokio runtime: {}", e),
            })?
            .block_on(self.run(document, config))
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Race `fut` against cancellation, attributing a cancel to `stage`.
pub(crate) async fn guarded<T>(
    cancel: &CancellationToken,
    stage: Stage,
    fut: impl Future<Output = Result<T, Scan2TxtError>>,
) -> Result<T, Scan2TxtError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Scan2TxtError::Cancelled { stage }),
        result = fut => result,
    }
}

/// Enhance one page on the blocking pool, or pass it through untouched.
pub(crate) async fn enhance_page(
    enhancer: &Enhancer,
    page: RasterPage,
    config: &PipelineConfig,
) -> Result<EnhanceOutcome, Scan2TxtError> {
    if !config.enhance {
        return Ok(EnhanceOutcome {
            page: EnhancedPage::from(page),
            fallback: None,
        });
    }

    let index = page.index;
    let enhancer = enhancer.clone();
    let policy = config.enhancement;
    let outcome = tokio::task::spawn_blocking(move || enhancer.apply(page, &policy))
        .await
        .map_err(|e| Scan2TxtError::Internal {
            stage: Stage::Enhance,
            detail: format!("Enhancement task for page {} panicked: {}", index, e),
        })?;

    if let (Some(err), Some(cb)) = (&outcome.fallback, &config.progress_callback) {
        let reason = match err {
            PageError::EnhancementFailed { detail, .. } => detail.as_str(),
            _ => "enhancement failed",
        };
        cb.on_enhancement_fallback(index, reason);
    }
    Ok(outcome)
}

/// Recognise one page. Never fails: errors and timeouts degrade the page.
pub(crate) async fn recognize_page(
    recognizer: &dyn Recognizer,
    page: EnhancedPage,
    total_pages: usize,
    config: &PipelineConfig,
) -> PageText {
    let index = page.index;
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(index, total_pages);
    }

    let start = Instant::now();
    let attempt = tokio::time::timeout(
        config.page_timeout,
        recognizer.recognize(&page.image, &config.language, &config.engine_mode),
    )
    .await;

    let result = match attempt {
        Ok(Ok(raw)) => {
            let text = clean_page_text(&raw);
            debug!(
                "Page {}: {} chars in {}ms",
                index,
                text.len(),
                start.elapsed().as_millis()
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_complete(index, total_pages, text.len());
            }
            return PageText::recognized(index, text);
        }
        Ok(Err(e)) => PageError::RecognitionFailed {
            page: index,
            detail: e.to_string(),
        },
        Err(_) => PageError::Timeout {
            page: index,
            elapsed_ms: start.elapsed().as_millis() as u64,
        },
    };

    warn!("{}", result);
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_error(index, total_pages, &result.to_string());
    }
    PageText::degraded(index, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineMode;
    use crate::pipeline::recognize::RecognitionError;
    use async_trait::async_trait;
    use image::{DynamicImage, RgbImage};
    use std::time::Duration;

    struct Fixed(&'static str);

    #[async_trait]
    impl Recognizer for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn recognize(
            &self,
            _image: &DynamicImage,
            _language: &str,
            _mode: &EngineMode,
        ) -> Result<String, RecognitionError> {
            Ok(self.0.to_string())
        }
    }

    struct Stalls;

    #[async_trait]
    impl Recognizer for Stalls {
        fn name(&self) -> &str {
            "stalls"
        }

        async fn recognize(
            &self,
            _image: &DynamicImage,
            _language: &str,
            _mode: &EngineMode,
        ) -> Result<String, RecognitionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    fn blank_page(index: usize) -> EnhancedPage {
        EnhancedPage {
            index,
            image: DynamicImage::ImageRgb8(RgbImage::new(8, 8)),
        }
    }

    #[tokio::test]
    async fn recognize_page_cleans_output() {
        let text = recognize_page(
            &Fixed("Hello  \r\n\x0c"),
            blank_page(1),
            1,
            &PipelineConfig::default(),
        )
        .await;
        assert_eq!(text, PageText::recognized(1, "Hello"));
    }

    #[tokio::test]
    async fn recognize_page_timeout_degrades() {
        let config = PipelineConfig::builder()
            .page_timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        let text = recognize_page(&Stalls, blank_page(2), 3, &config).await;
        assert_eq!(text.index, 2);
        assert!(text.text.is_empty());
        assert!(matches!(text.error, Some(PageError::Timeout { page: 2, .. })));
    }

    #[tokio::test]
    async fn enhance_disabled_passes_through() {
        let page = RasterPage::new(1, DynamicImage::ImageRgb8(RgbImage::new(5, 5)));
        let outcome = enhance_page(&Enhancer::Available, page, &PipelineConfig::default())
            .await
            .unwrap();
        assert!(outcome.fallback.is_none());
        assert_eq!(outcome.page.image.width(), 5);
    }

    #[tokio::test]
    async fn guarded_reports_cancel_stage() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), _> = guarded(&cancel, Stage::Recognize, async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        })
        .await;
        assert!(matches!(
            result,
            Err(Scan2TxtError::Cancelled {
                stage: Stage::Recognize
            })
        ));
    }
}
