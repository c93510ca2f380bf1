//! Configuration types for one OCR pipeline run.
//!
//! Every per-run knob lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The config is passed explicitly into each
//! [`crate::Pipeline::run`]; nothing here is global, so two runs with
//! different languages or DPI can execute side by side.

use crate::error::Scan2TxtError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default recognition language (tesseract traineddata code).
pub const DEFAULT_LANGUAGE: &str = "eng";

/// Configuration for a single document run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use scan2txt::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .language("eng+deu")
///     .enhance(true)
///     .dpi(300)
///     .build()
///     .unwrap();
/// assert_eq!(config.language, "eng+deu");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Recognition language code, e.g. "eng", "deu", or "eng+fra". Default: "eng".
    pub language: String,

    /// Run the image enhancement stage before recognition. Default: false.
    pub enhance: bool,

    /// Rasterisation DPI for PDF pages. Range: 72–600. Default: 300.
    ///
    /// Tesseract is tuned for roughly 300 DPI glyphs; lower values lose
    /// small print, higher ones mostly cost memory.
    pub dpi: u32,

    /// Engine mode flags passed straight through to the recogniser.
    pub engine_mode: EngineMode,

    /// Tunable enhancement policy. Only consulted when `enhance` is true.
    pub enhancement: EnhancementPolicy,

    /// Pages enhanced and recognised at once. Default: 4.
    pub concurrency: usize,

    /// Budget for one page's recognition call. Default: 60 s.
    pub page_timeout: Duration,

    /// Budget for decoding/rasterising the whole document. Default: 120 s.
    pub resolve_timeout: Duration,

    /// Longest edge of a rendered PDF page in pixels. Default: 8000.
    ///
    /// An A0 poster at 300 DPI would otherwise allocate ~14 000 × 10 000 px.
    pub max_rendered_pixels: u32,

    /// Largest accepted input in bytes. Default: 16 MiB.
    pub max_input_bytes: u64,

    /// Optional per-page instrumentation hook.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            enhance: false,
            dpi: 300,
            engine_mode: EngineMode::default(),
            enhancement: EnhancementPolicy::default(),
            concurrency: 4,
            page_timeout: Duration::from_secs(60),
            resolve_timeout: Duration::from_secs(120),
            max_rendered_pixels: 8000,
            max_input_bytes: 16 * 1024 * 1024,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("language", &self.language)
            .field("enhance", &self.enhance)
            .field("dpi", &self.dpi)
            .field("engine_mode", &self.engine_mode)
            .field("enhancement", &self.enhancement)
            .field("concurrency", &self.concurrency)
            .field("page_timeout", &self.page_timeout)
            .field("resolve_timeout", &self.resolve_timeout)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_input_bytes", &self.max_input_bytes)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn enhance(mut self, v: bool) -> Self {
        self.config.enhance = v;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn engine_mode(mut self, mode: EngineMode) -> Self {
        self.config.engine_mode = mode;
        self
    }

    pub fn page_segmentation(mut self, psm: u8) -> Self {
        self.config.engine_mode.page_segmentation = Some(psm);
        self
    }

    pub fn ocr_engine(mut self, oem: u8) -> Self {
        self.config.engine_mode.engine = Some(oem);
        self
    }

    pub fn enhancement(mut self, policy: EnhancementPolicy) -> Self {
        self.config.enhancement = policy;
        self
    }

    pub fn threshold(mut self, threshold: ThresholdPolicy) -> Self {
        self.config.enhancement.threshold = threshold;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn page_timeout(mut self, timeout: Duration) -> Self {
        self.config.page_timeout = timeout;
        self
    }

    pub fn resolve_timeout(mut self, timeout: Duration) -> Self {
        self.config.resolve_timeout = timeout;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_input_bytes(mut self, bytes: u64) -> Self {
        self.config.max_input_bytes = bytes;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Scan2TxtError> {
        let c = &self.config;
        validate_language(&c.language)?;
        c.engine_mode.validate()?;
        c.enhancement.validate()?;
        if c.page_timeout.is_zero() || c.resolve_timeout.is_zero() {
            return Err(Scan2TxtError::InvalidConfig(
                "Timeouts must be greater than zero".into(),
            ));
        }
        if c.max_input_bytes == 0 {
            return Err(Scan2TxtError::InvalidConfig(
                "max_input_bytes must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Language codes are handed to the engine as an argument, so only
/// traineddata-style names joined by `+` are accepted.
fn validate_language(lang: &str) -> Result<(), Scan2TxtError> {
    let valid = !lang.is_empty()
        && lang.split('+').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(Scan2TxtError::InvalidConfig(format!(
            "Invalid language code '{lang}' (expected e.g. 'eng' or 'eng+deu')"
        )))
    }
}

// ── Engine mode ──────────────────────────────────────────────────────────

/// Recogniser mode flags, forwarded verbatim to the engine.
///
/// `None` leaves the engine's own default in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineMode {
    /// Page segmentation mode (tesseract `--psm`, 0–13).
    pub page_segmentation: Option<u8>,
    /// OCR engine mode (tesseract `--oem`, 0–3).
    pub engine: Option<u8>,
}

impl EngineMode {
    fn validate(&self) -> Result<(), Scan2TxtError> {
        if let Some(psm) = self.page_segmentation {
            if psm > 13 {
                return Err(Scan2TxtError::InvalidConfig(format!(
                    "Page segmentation mode must be 0–13, got {psm}"
                )));
            }
        }
        if let Some(oem) = self.engine {
            if oem > 3 {
                return Err(Scan2TxtError::InvalidConfig(format!(
                    "OCR engine mode must be 0–3, got {oem}"
                )));
            }
        }
        Ok(())
    }

    /// Render the mode as command-line arguments.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(psm) = self.page_segmentation {
            args.push("--psm".to_string());
            args.push(psm.to_string());
        }
        if let Some(oem) = self.engine {
            args.push("--oem".to_string());
            args.push(oem.to_string());
        }
        args
    }
}

// ── Enhancement policy ───────────────────────────────────────────────────

/// How the enhancement stage binarises a page.
///
/// Callers never depend on which one ran; the choice only trades accuracy
/// on uneven lighting (adaptive) against speed and stability (Otsu).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ThresholdPolicy {
    /// Gaussian-weighted local mean over a `block_size` window, minus `offset`.
    Adaptive { block_size: u32, offset: i16 },
    /// One global threshold chosen by Otsu's method.
    Otsu,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        ThresholdPolicy::Adaptive {
            block_size: 31,
            offset: 15,
        }
    }
}

/// Tunable parameters of the enhancement stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnhancementPolicy {
    /// Gaussian sigma of the smoothing pass. Default: 0.7.
    pub denoise_sigma: f32,
    /// Binarisation method. Default: adaptive, block 31, offset 15.
    pub threshold: ThresholdPolicy,
    /// Radius of the despeckle median filter (1 → 3×3). Default: 1.
    pub median_radius: u32,
    /// Final upscale factor. Default: 1.5.
    pub upscale_factor: f32,
    /// Longest edge allowed after upscaling; larger pages fall back. Default: 12 000.
    pub max_upscaled_edge: u32,
}

impl Default for EnhancementPolicy {
    fn default() -> Self {
        Self {
            denoise_sigma: 0.7,
            threshold: ThresholdPolicy::default(),
            median_radius: 1,
            upscale_factor: 1.5,
            max_upscaled_edge: 12_000,
        }
    }
}

impl EnhancementPolicy {
    fn validate(&self) -> Result<(), Scan2TxtError> {
        if self.denoise_sigma.is_nan() || self.denoise_sigma <= 0.0 {
            return Err(Scan2TxtError::InvalidConfig(
                "denoise_sigma must be positive".into(),
            ));
        }
        if !(1.0..=4.0).contains(&self.upscale_factor) {
            return Err(Scan2TxtError::InvalidConfig(format!(
                "upscale_factor must be 1.0–4.0, got {}",
                self.upscale_factor
            )));
        }
        if let ThresholdPolicy::Adaptive { block_size, offset } = self.threshold {
            if block_size < 3 || block_size % 2 == 0 {
                return Err(Scan2TxtError::InvalidConfig(format!(
                    "Adaptive block_size must be odd and ≥ 3, got {block_size}"
                )));
            }
            if !(-255..=255).contains(&offset) {
                return Err(Scan2TxtError::InvalidConfig(format!(
                    "Adaptive offset must be within ±255, got {offset}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_intake_contract() {
        let c = PipelineConfig::default();
        assert_eq!(c.language, "eng");
        assert_eq!(c.dpi, 300);
        assert!(!c.enhance);
        assert_eq!(c.max_input_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn dpi_is_clamped() {
        let c = PipelineConfig::builder().dpi(10).build().unwrap();
        assert_eq!(c.dpi, 72);
        let c = PipelineConfig::builder().dpi(5000).build().unwrap();
        assert_eq!(c.dpi, 600);
    }

    #[test]
    fn language_validation() {
        assert!(PipelineConfig::builder().language("eng+deu").build().is_ok());
        assert!(PipelineConfig::builder().language("chi_sim").build().is_ok());
        assert!(PipelineConfig::builder().language("").build().is_err());
        assert!(PipelineConfig::builder().language("--psm").build().is_err());
        assert!(PipelineConfig::builder().language("eng+").build().is_err());
    }

    #[test]
    fn engine_mode_args_pass_through() {
        let mode = EngineMode {
            page_segmentation: Some(6),
            engine: Some(1),
        };
        assert_eq!(mode.to_args(), vec!["--psm", "6", "--oem", "1"]);
        assert!(EngineMode::default().to_args().is_empty());
    }

    #[test]
    fn engine_mode_out_of_range_rejected() {
        assert!(PipelineConfig::builder()
            .page_segmentation(14)
            .build()
            .is_err());
        assert!(PipelineConfig::builder().ocr_engine(4).build().is_err());
    }

    #[test]
    fn even_adaptive_block_rejected() {
        let result = PipelineConfig::builder()
            .threshold(ThresholdPolicy::Adaptive {
                block_size: 30,
                offset: 10,
            })
            .build();
        assert!(result.is_err());
        assert!(PipelineConfig::builder()
            .threshold(ThresholdPolicy::Otsu)
            .build()
            .is_ok());
    }

    #[test]
    fn adaptive_offset_out_of_range_rejected() {
        let with_offset = |offset| {
            PipelineConfig::builder()
                .threshold(ThresholdPolicy::Adaptive {
                    block_size: 31,
                    offset,
                })
                .build()
        };
        assert!(with_offset(i16::MIN).is_err());
        assert!(with_offset(256).is_err());
        assert!(with_offset(-255).is_ok());
        assert!(with_offset(255).is_ok());
    }

    #[test]
    fn zero_timeout_rejected() {
        let result = PipelineConfig::builder()
            .page_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn debug_hides_callback() {
        let dbg = format!("{:?}", PipelineConfig::default());
        assert!(dbg.contains("language"));
        assert!(dbg.contains("progress_callback: None"));
    }
}
