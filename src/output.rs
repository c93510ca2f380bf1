//! Data model flowing between pipeline stages and back to the caller.

use crate::error::PageError;
use crate::store::Locator;
use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One decoded or rasterised page. `index` is 1-based.
#[derive(Debug, Clone)]
pub struct RasterPage {
    pub index: usize,
    pub image: DynamicImage,
}

impl RasterPage {
    pub fn new(index: usize, image: DynamicImage) -> Self {
        Self { index, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// The buffer handed to the recogniser: enhanced, or the raster unchanged.
#[derive(Debug, Clone)]
pub struct EnhancedPage {
    pub index: usize,
    pub image: DynamicImage,
}

impl From<RasterPage> for EnhancedPage {
    fn from(page: RasterPage) -> Self {
        Self {
            index: page.index,
            image: page.image,
        }
    }
}

/// Recognised text of a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-indexed page number.
    pub index: usize,
    /// Normalised engine output. Empty when nothing was read or the page degraded.
    pub text: String,
    /// Set when recognition failed or timed out for this page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PageError>,
}

impl PageText {
    pub fn recognized(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            error: None,
        }
    }

    pub fn degraded(index: usize, error: PageError) -> Self {
        Self {
            index,
            text: String::new(),
            error: Some(error),
        }
    }
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_pages: usize,
    /// Pages whose recognised text is non-empty.
    pub pages_with_text: usize,
    /// Pages that degraded to empty text after a recognition failure or timeout.
    pub failed_pages: usize,
    /// Pages recognised from the raw raster although enhancement was requested.
    pub enhancement_fallbacks: usize,
    pub resolve_duration_ms: u64,
    pub recognize_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// The immutable result of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub document_id: Uuid,
    pub original_name: String,
    /// One entry per page, in page order.
    pub pages: Vec<PageText>,
    /// Assembled document text; never empty.
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Where the persisted copy of `text` can be fetched.
    pub locator: Locator,
    pub stats: RunStats,
}

impl Transcript {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}
