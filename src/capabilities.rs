//! Process-wide capability probe.
//!
//! Which optional pieces exist (a pdfium library, the enhancement filters,
//! a tesseract executable) is decided once at startup and never changes for
//! the life of the process. [`Capabilities::init`] runs the probe and stores
//! the result in a `OnceLock`; every later run reads the same answer instead
//! of hunting for binaries again.
//!
//! Tests and embedders that need a different answer build a value with
//! [`Capabilities::new`] and hand it to [`crate::Pipeline::from_capabilities`]
//! directly; the global is only a convenience.

use crate::error::Scan2TxtError;
use crate::pipeline::enhance::Enhancer;
use crate::pipeline::recognize::{Recognizer, TesseractCli};
use crate::pipeline::render::PdfRenderer;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::info;

static CAPABILITIES: OnceLock<Capabilities> = OnceLock::new();

/// Where to look for external dependencies. Unset fields fall back to the
/// environment (`TESSERACT_PATH`, `PDFIUM_LIB_PATH`) and then the system.
#[derive(Debug, Clone, Default)]
pub struct ProbeOptions {
    pub tesseract: Option<PathBuf>,
    pub pdfium: Option<PathBuf>,
}

/// Whether a recognition engine can be used.
#[derive(Clone)]
pub enum EngineStatus {
    Available(Arc<dyn Recognizer>),
    Unavailable {
        engine: String,
        detail: String,
        hint: String,
    },
}

impl fmt::Debug for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineStatus::Available(r) => f.debug_tuple("Available").field(&r.name()).finish(),
            EngineStatus::Unavailable { engine, detail, .. } => f
                .debug_struct("Unavailable")
                .field("engine", engine)
                .field("detail", detail)
                .finish(),
        }
    }
}

impl EngineStatus {
    fn from_error(err: Scan2TxtError) -> Self {
        match err {
            Scan2TxtError::EngineUnavailable {
                engine,
                detail,
                hint,
            } => EngineStatus::Unavailable {
                engine,
                detail,
                hint,
            },
            other => EngineStatus::Unavailable {
                engine: "tesseract".into(),
                detail: other.to_string(),
                hint: String::new(),
            },
        }
    }
}

/// Resolved optional dependencies.
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub renderer: PdfRenderer,
    pub enhancer: Enhancer,
    pub engine: EngineStatus,
    /// Traineddata languages the engine reported, when it could be asked.
    pub languages: Option<Vec<String>>,
}

impl Capabilities {
    /// Assemble capabilities by hand.
    pub fn new(renderer: PdfRenderer, enhancer: Enhancer, engine: EngineStatus) -> Self {
        Self {
            renderer,
            enhancer,
            engine,
            languages: None,
        }
    }

    /// Probe the system without touching the process-wide cache.
    pub fn probe(options: &ProbeOptions) -> Self {
        let renderer = PdfRenderer::detect(options.pdfium.as_deref());
        let enhancer = Enhancer::detect();
        let (engine, languages) = match TesseractCli::locate(options.tesseract.as_deref()) {
            Ok(cli) => {
                let languages = cli.list_languages().ok();
                (EngineStatus::Available(Arc::new(cli)), languages)
            }
            Err(e) => (EngineStatus::from_error(e), None),
        };

        let caps = Self {
            renderer,
            enhancer,
            engine,
            languages,
        };
        info!(
            "Capabilities: pdf={} enhance={} engine={}",
            caps.renderer.is_available(),
            caps.enhancer.is_available(),
            matches!(caps.engine, EngineStatus::Available(_))
        );
        caps
    }

    /// Probe once per process. Later calls return the first result and
    /// ignore `options`.
    pub fn init(options: &ProbeOptions) -> &'static Capabilities {
        CAPABILITIES.get_or_init(|| Self::probe(options))
    }

    /// The cached capabilities, if [`Capabilities::init`] has run.
    pub fn get() -> Option<&'static Capabilities> {
        CAPABILITIES.get()
    }

    /// The engine, or `EngineUnavailable`.
    pub fn recognizer(&self) -> Result<Arc<dyn Recognizer>, Scan2TxtError> {
        match &self.engine {
            EngineStatus::Available(r) => Ok(Arc::clone(r)),
            EngineStatus::Unavailable {
                engine,
                detail,
                hint,
            } => Err(Scan2TxtError::EngineUnavailable {
                engine: engine.clone(),
                detail: detail.clone(),
                hint: hint.clone(),
            }),
        }
    }

    /// A serialisable summary for `--check` and health output.
    pub fn report(&self) -> CapabilityReport {
        let (engine, engine_version, engine_error) = match &self.engine {
            EngineStatus::Available(r) => (
                r.name().to_string(),
                r.version().map(str::to_string),
                None,
            ),
            EngineStatus::Unavailable { engine, detail, .. } => {
                (engine.clone(), None, Some(detail.clone()))
            }
        };
        CapabilityReport {
            pdf_renderer: match &self.renderer {
                PdfRenderer::Available(r) => Status::ok(r.name()),
                PdfRenderer::Unavailable { reason } => Status::missing(reason),
            },
            enhancement: match &self.enhancer {
                Enhancer::Available => Status::ok("imageproc"),
                Enhancer::Unavailable { reason } => Status::missing(reason),
            },
            engine: match engine_error {
                None => Status::ok(&engine),
                Some(detail) => Status::missing(&detail),
            },
            engine_version,
            languages: self.languages.clone(),
        }
    }
}

/// One row of the capability report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub available: bool,
    pub detail: String,
}

impl Status {
    fn ok(detail: &str) -> Self {
        Self {
            available: true,
            detail: detail.to_string(),
        }
    }

    fn missing(detail: &str) -> Self {
        Self {
            available: false,
            detail: detail.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityReport {
    pub pdf_renderer: Status,
    pub enhancement: Status,
    pub engine: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<String>>,
}

impl CapabilityReport {
    /// Runs can be accepted only when the engine is present.
    pub fn ready(&self) -> bool {
        self.engine.available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_engine_surfaces_as_error() {
        let caps = Capabilities::new(
            PdfRenderer::unavailable("no pdfium"),
            Enhancer::unavailable("off"),
            EngineStatus::Unavailable {
                engine: "tesseract".into(),
                detail: "not found on PATH".into(),
                hint: "install it".into(),
            },
        );
        let err = caps.recognizer().err().unwrap();
        assert!(matches!(err, Scan2TxtError::EngineUnavailable { .. }));

        let report = caps.report();
        assert!(!report.ready());
        assert!(!report.pdf_renderer.available);
        assert_eq!(report.engine.detail, "not found on PATH");
    }

    #[test]
    fn probe_with_bogus_paths_reports_missing() {
        let caps = Capabilities::probe(&ProbeOptions {
            tesseract: Some("/nonexistent/tesseract".into()),
            pdfium: Some("/nonexistent/libpdfium.so".into()),
        });
        assert!(caps.recognizer().is_err());
        assert!(!caps.renderer.is_available());
        let json = serde_json::to_value(caps.report()).unwrap();
        assert_eq!(json["engine"]["available"], false);
    }
}
