//! Recognition Adapter: one page in, one string out.
//!
//! The engine sits behind the [`Recognizer`] trait. The shipped
//! implementation, [`TesseractCli`], pipes a PNG into the `tesseract`
//! executable and reads plain text back from stdout.
//!
//! ## Why the CLI and not libtesseract bindings?
//!
//! Bindings need leptonica and tesseract headers at build time and pin the
//! crate to one library ABI. The executable is what every distribution
//! packages, it accepts `stdin`/`stdout` as file names, and a child process
//! gives hard isolation: a crash on one malformed page costs that page only,
//! and `kill_on_drop` reclaims it when a timeout or cancellation abandons the
//! call.

use crate::config::EngineMode;
use crate::error::Scan2TxtError;
use crate::pipeline::encode::encode_png;
use async_trait::async_trait;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Environment variable naming an explicit tesseract executable.
pub const TESSERACT_PATH_ENV: &str = "TESSERACT_PATH";

const INSTALL_HINT: &str = "Install tesseract (apt install tesseract-ocr, brew install tesseract, \
or the UB Mannheim build on Windows) or set TESSERACT_PATH=/path/to/tesseract.";

/// A page-scoped engine failure. The page degrades to empty text.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct RecognitionError(pub String);

/// Text recognition over a single page image.
///
/// Returned strings are raw engine output; cleanup happens in
/// [`crate::pipeline::postprocess`]. An empty string is a valid answer.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Short engine identifier used in logs and reports.
    fn name(&self) -> &str;

    /// Human-readable engine version, if known.
    fn version(&self) -> Option<&str> {
        None
    }

    async fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
        mode: &EngineMode,
    ) -> Result<String, RecognitionError>;
}

impl std::fmt::Debug for dyn Recognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// [`Recognizer`] backed by the `tesseract` executable.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: PathBuf,
    version: String,
}

impl TesseractCli {
    /// Locate the executable and confirm it runs.
    ///
    /// Search order: `explicit`, then `TESSERACT_PATH`, then every `PATH`
    /// entry. Blocking; call once at startup.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, Scan2TxtError> {
        let configured = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(TESSERACT_PATH_ENV).map(PathBuf::from));

        let program = match configured {
            Some(p) => p,
            None => search_path().ok_or_else(|| unavailable("not found on PATH"))?,
        };

        let output = std::process::Command::new(&program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| unavailable(format!("cannot run '{}': {}", program.display(), e)))?;

        if !output.status.success() {
            return Err(unavailable(format!(
                "'{} --version' exited with {}",
                program.display(),
                output.status
            )));
        }

        // Older releases print the banner on stderr.
        let banner = if output.stdout.is_empty() {
            &output.stderr
        } else {
            &output.stdout
        };
        let version = String::from_utf8_lossy(banner)
            .lines()
            .next()
            .unwrap_or("tesseract (unknown version)")
            .trim()
            .to_string();

        info!("Recognition engine ready: {} ({})", version, program.display());
        Ok(Self { program, version })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Installed traineddata languages, as reported by `--list-langs`.
    pub fn list_languages(&self) -> Result<Vec<String>, Scan2TxtError> {
        let output = std::process::Command::new(&self.program)
            .arg("--list-langs")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| unavailable(format!("cannot run '{}': {}", self.program.display(), e)))?;

        let listing = if output.stdout.is_empty() {
            &output.stderr
        } else {
            &output.stdout
        };
        // First line is the "List of available languages in ..." header.
        Ok(String::from_utf8_lossy(listing)
            .lines()
            .skip(1)
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl Recognizer for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn version(&self) -> Option<&str> {
        Some(&self.version)
    }

    async fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
        mode: &EngineMode,
    ) -> Result<String, RecognitionError> {
        let png = encode_png(image)
            .map_err(|e| RecognitionError(format!("PNG encoding failed: {}", e)))?;

        let mut child = tokio::process::Command::new(&self.program)
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .args(mode.to_args())
            // Pages already run in parallel; one OpenMP thread per process.
            .env("OMP_THREAD_LIMIT", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecognitionError(format!("failed to start tesseract: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecognitionError("tesseract stdin unavailable".into()))?;

        // Feed stdin while draining stdout so neither pipe fills up.
        let feed = async move {
            let result = stdin.write_all(&png).await;
            drop(stdin);
            result
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output =
            output.map_err(|e| RecognitionError(format!("tesseract I/O error: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if let Err(e) = fed {
            return Err(RecognitionError(format!("writing page to tesseract failed: {}", e)));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("tesseract returned {} bytes", text.len());
        Ok(text)
    }
}

fn unavailable(detail: impl Into<String>) -> Scan2TxtError {
    Scan2TxtError::EngineUnavailable {
        engine: "tesseract".into(),
        detail: detail.into(),
        hint: INSTALL_HINT.into(),
    }
}

fn search_path() -> Option<PathBuf> {
    let exe = if cfg!(windows) {
        "tesseract.exe"
    } else {
        "tesseract"
    };
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(exe))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_missing_explicit_path_is_unavailable() {
        let err = TesseractCli::locate(Some(Path::new("/nonexistent/bin/tesseract"))).unwrap_err();
        match err {
            Scan2TxtError::EngineUnavailable { engine, hint, .. } => {
                assert_eq!(engine, "tesseract");
                assert!(hint.contains("TESSERACT_PATH"));
            }
            other => panic!("expected EngineUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn recognition_error_displays_detail() {
        let e = RecognitionError("tesseract exited with 1".into());
        assert_eq!(e.to_string(), "tesseract exited with 1");
    }

    #[tokio::test]
    async fn real_engine_reads_blank_page_as_empty() {
        if std::env::var("E2E_ENABLED").is_err() {
            eprintln!("Skipping: set E2E_ENABLED=1 to run");
            return;
        }
        let engine = TesseractCli::locate(None).expect("tesseract installed");
        let blank = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(200, 80, image::Luma([255])));
        let text = engine
            .recognize(&blank, "eng", &EngineMode::default())
            .await
            .unwrap();
        assert!(crate::pipeline::postprocess::clean_page_text(&text).is_empty());
    }
}
