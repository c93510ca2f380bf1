//! Streaming API: emit page texts as they complete.
//!
//! ## Why stream?
//!
//! A 200-page scan takes minutes. A stream lets callers show partial text
//! immediately or feed pages into an index as they arrive, instead of
//! waiting for the whole transcript.
//!
//! Unlike [`crate::Pipeline::run`], [`Pipeline::recognize_stream`] neither
//! aggregates nor persists. Pages arrive in completion order, each tagged
//! with its index; sort by `index` if order matters.

use crate::config::PipelineConfig;
use crate::error::{PageError, Scan2TxtError};
use crate::orchestrator::{enhance_page, recognize_page, Pipeline};
use crate::output::PageText;
use crate::pipeline::input::SubmittedDocument;
use crate::pipeline::render::resolve_pages;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{info, warn};

/// A boxed stream of page texts.
pub type PageStream = Pin<Box<dyn Stream<Item = PageText> + Send>>;

impl Pipeline {
    /// Resolve `document`, then stream each page's text as soon as it is
    /// recognised.
    ///
    /// # Returns
    /// - `Ok(PageStream)`: one [`PageText`] per page, in completion order
    /// - `Err(Scan2TxtError)`: intake or resolve failure
    pub async fn recognize_stream(
        &self,
        document: SubmittedDocument,
        config: &PipelineConfig,
    ) -> Result<PageStream, Scan2TxtError> {
        info!(run = %document.id, "Starting streaming run: {}", document.original_name);

        let bytes = document.load(config.max_input_bytes).await?;
        let pages = resolve_pages(&document, bytes, &self.renderer, config).await?;
        let total_pages = pages.len();

        if let Some(ref cb) = config.progress_callback {
            cb.on_run_start(total_pages);
        }

        let concurrency = config.concurrency;
        let config = Arc::new(config.clone());
        let enhancer = self.enhancer.clone();
        let recognizer = Arc::clone(&self.recognizer);

        let s = stream::iter(pages.into_iter().map(move |page| {
            let config = Arc::clone(&config);
            let enhancer = enhancer.clone();
            let recognizer = Arc::clone(&recognizer);
            async move {
                let index = page.index;
                let enhanced = match enhance_page(&enhancer, page, &config).await {
                    Ok(outcome) => outcome.page,
                    Err(e) => {
                        // The raster moved into the failed task; nothing left to read.
                        warn!("Page {}: {}", index, e);
                        return PageText::degraded(
                            index,
                            PageError::EnhancementFailed {
                                page: index,
                                detail: e.to_string(),
                            },
                        );
                    }
                };
                recognize_page(recognizer.as_ref(), enhanced, total_pages, &config).await
            }
        }))
        .buffer_unordered(concurrency);

        Ok(Box::pin(s))
    }
}

/// Collect a stream back into page order.
pub async fn collect_ordered(stream: PageStream) -> Vec<PageText> {
    let mut pages: Vec<PageText> = stream.collect().await;
    pages.sort_by_key(|p| p.index);
    pages
}
