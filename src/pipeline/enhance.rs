//! Image Enhancement Stage: grayscale → smooth → binarise → despeckle → upscale.
//!
//! Enhancement is best-effort. Whenever it cannot run for a page (the
//! capability is missing, the image is empty, the upscaled page would be too
//! large, or a filter panics) the raw raster goes to the recogniser instead.
//! The substitution is invisible in the transcript; it is reported through a
//! `warn!` event, the progress callback and [`crate::RunStats`].
//!
//! ## Why binarise at all?
//!
//! Tesseract runs its own Otsu pass internally, but photographed pages with
//! uneven lighting defeat a single global threshold. A Gaussian-weighted
//! local mean adapts to shadows across the page, which is where most of the
//! accuracy gain on phone scans comes from.

use crate::config::EnhancementPolicy;
#[cfg(feature = "enhance")]
use crate::config::ThresholdPolicy;
use crate::error::PageError;
use crate::output::{EnhancedPage, RasterPage};
use image::DynamicImage;
use tracing::{debug, warn};

#[cfg(feature = "enhance")]
use image::{imageops::FilterType, GrayImage};
#[cfg(feature = "enhance")]
use imageproc::filter::{gaussian_blur_f32, median_filter};
#[cfg(feature = "enhance")]
use std::panic::{catch_unwind, AssertUnwindSafe};

/// The enhancement capability, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enhancer {
    Available,
    Unavailable { reason: String },
}

/// Result of enhancing one page.
#[derive(Debug)]
pub struct EnhanceOutcome {
    pub page: EnhancedPage,
    /// Set when the raw raster was substituted.
    pub fallback: Option<PageError>,
}

impl Enhancer {
    /// Available when the crate was built with the `enhance` feature.
    pub fn detect() -> Self {
        if cfg!(feature = "enhance") {
            Enhancer::Available
        } else {
            Enhancer::unavailable("built without the `enhance` feature")
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Enhancer::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Enhancer::Available)
    }

    /// Enhance one page, falling back to the raw raster on any failure.
    ///
    /// CPU-bound; call from a blocking thread.
    pub fn apply(&self, page: RasterPage, policy: &EnhancementPolicy) -> EnhanceOutcome {
        let index = page.index;
        let reason = match self {
            Enhancer::Unavailable { reason } => reason.clone(),
            Enhancer::Available => match transform(&page.image, policy) {
                Ok(image) => {
                    debug!(
                        "Enhanced page {} → {}x{} px",
                        index,
                        image.width(),
                        image.height()
                    );
                    return EnhanceOutcome {
                        page: EnhancedPage { index, image },
                        fallback: None,
                    };
                }
                Err(detail) => detail,
            },
        };

        warn!("Page {}: enhancement skipped, using original image: {}", index, reason);
        EnhanceOutcome {
            page: EnhancedPage::from(page),
            fallback: Some(PageError::EnhancementFailed {
                page: index,
                detail: reason,
            }),
        }
    }
}

#[cfg(not(feature = "enhance"))]
fn transform(_image: &DynamicImage, _policy: &EnhancementPolicy) -> Result<DynamicImage, String> {
    Err("enhancement support not compiled in".into())
}

#[cfg(feature = "enhance")]
fn transform(image: &DynamicImage, policy: &EnhancementPolicy) -> Result<DynamicImage, String> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err("empty image".into());
    }

    let target_w = (width as f32 * policy.upscale_factor).round() as u32;
    let target_h = (height as f32 * policy.upscale_factor).round() as u32;
    if target_w.max(target_h) > policy.max_upscaled_edge {
        return Err(format!(
            "upscaled size {}x{} exceeds the {} px edge limit",
            target_w, target_h, policy.max_upscaled_edge
        ));
    }

    catch_unwind(AssertUnwindSafe(|| {
        let gray = image.to_luma8();
        let smoothed = gaussian_blur_f32(&gray, policy.denoise_sigma);
        let binary = binarize(&smoothed, policy.threshold);
        let despeckled = if policy.median_radius > 0 {
            median_filter(&binary, policy.median_radius, policy.median_radius)
        } else {
            binary
        };
        let upscaled = image::imageops::resize(&despeckled, target_w, target_h, FilterType::CatmullRom);
        DynamicImage::ImageLuma8(upscaled)
    }))
    .map_err(|payload| format!("filter panicked: {}", panic_message(payload.as_ref())))
}

#[cfg(feature = "enhance")]
fn binarize(gray: &GrayImage, policy: ThresholdPolicy) -> GrayImage {
    match policy {
        ThresholdPolicy::Otsu => {
            let level = imageproc::contrast::otsu_level(gray);
            let mut out = gray.clone();
            for p in out.pixels_mut() {
                p.0[0] = if p.0[0] > level { 255 } else { 0 };
            }
            out
        }
        ThresholdPolicy::Adaptive { block_size, offset } => {
            // Sigma of the Gaussian kernel that a `block_size` window implies.
            let sigma = 0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
            let local_mean = gaussian_blur_f32(gray, sigma);
            let mut out = gray.clone();
            for (p, mean) in out.pixels_mut().zip(local_mean.pixels()) {
                let threshold = i32::from(mean.0[0]) - i32::from(offset);
                p.0[0] = if i32::from(p.0[0]) > threshold { 255 } else { 0 };
            }
            out
        }
    }
}

#[cfg(feature = "enhance")]
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn page(index: usize, w: u32, h: u32) -> RasterPage {
        let mut img = RgbImage::from_pixel(w, h, Rgb([230, 230, 230]));
        // A dark block standing in for a glyph.
        for y in h / 4..h / 2 {
            for x in w / 4..w / 2 {
                img.put_pixel(x, y, Rgb([20, 20, 20]));
            }
        }
        RasterPage::new(index, DynamicImage::ImageRgb8(img))
    }

    #[test]
    fn unavailable_returns_raw_raster() {
        let enhancer = Enhancer::unavailable("disabled for test");
        let original = page(3, 40, 20);
        let out = enhancer.apply(original.clone(), &EnhancementPolicy::default());
        assert_eq!(out.page.index, 3);
        assert_eq!(out.page.image.as_bytes(), original.image.as_bytes());
        assert!(matches!(
            out.fallback,
            Some(PageError::EnhancementFailed { page: 3, .. })
        ));
    }

    #[cfg(feature = "enhance")]
    #[test]
    fn enhancement_binarises_and_upscales() {
        let out = Enhancer::Available.apply(page(1, 40, 20), &EnhancementPolicy::default());
        assert!(out.fallback.is_none());
        assert_eq!((out.page.image.width(), out.page.image.height()), (60, 30));
        assert!(out.page.image.as_luma8().is_some());
    }

    #[cfg(feature = "enhance")]
    #[test]
    fn otsu_produces_two_levels_before_upscale() {
        let policy = EnhancementPolicy {
            threshold: ThresholdPolicy::Otsu,
            upscale_factor: 1.0,
            ..EnhancementPolicy::default()
        };
        let out = Enhancer::Available.apply(page(1, 32, 32), &policy);
        assert!(out.fallback.is_none());
        let gray = out.page.image.to_luma8();
        assert!(gray.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert!(gray.pixels().any(|p| p.0[0] == 0));
    }

    #[cfg(feature = "enhance")]
    #[test]
    fn empty_image_falls_back() {
        let empty = RasterPage::new(2, DynamicImage::new_rgb8(0, 0));
        let out = Enhancer::Available.apply(empty, &EnhancementPolicy::default());
        assert!(out.fallback.is_some());
        assert_eq!(out.page.index, 2);
    }

    #[cfg(feature = "enhance")]
    #[test]
    fn oversized_upscale_falls_back() {
        let policy = EnhancementPolicy {
            max_upscaled_edge: 50,
            ..EnhancementPolicy::default()
        };
        let out = Enhancer::Available.apply(page(1, 40, 20), &policy);
        assert!(out.fallback.is_some());
        assert_eq!(out.page.image.width(), 40);
    }

    #[cfg(feature = "enhance")]
    #[test]
    fn filter_panic_returns_raw_raster() {
        // Unvalidated policy: imageproc asserts on a non-positive sigma.
        let policy = EnhancementPolicy {
            denoise_sigma: -1.0,
            ..EnhancementPolicy::default()
        };
        let original = page(4, 40, 20);
        let out = Enhancer::Available.apply(original.clone(), &policy);
        assert_eq!(out.page.index, 4);
        assert_eq!(out.page.image.as_bytes(), original.image.as_bytes());
        match out.fallback {
            Some(PageError::EnhancementFailed { page, detail }) => {
                assert_eq!(page, 4);
                assert!(detail.contains("panicked"), "got {detail}");
            }
            other => panic!("expected EnhancementFailed, got {other:?}"),
        }
    }

    #[cfg(feature = "enhance")]
    #[test]
    fn extreme_adaptive_offset_does_not_wrap() {
        let policy = EnhancementPolicy {
            threshold: ThresholdPolicy::Adaptive {
                block_size: 3,
                offset: i16::MIN,
            },
            upscale_factor: 1.0,
            ..EnhancementPolicy::default()
        };
        let out = Enhancer::Available.apply(page(1, 16, 16), &policy);
        assert!(out.fallback.is_none());
        // Threshold far above every pixel: the whole page turns black.
        assert!(out.page.image.to_luma8().pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn detect_matches_feature() {
        assert_eq!(Enhancer::detect().is_available(), cfg!(feature = "enhance"));
    }
}
