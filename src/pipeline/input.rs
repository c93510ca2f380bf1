//! Intake: classify a submitted file and load its bytes.
//!
//! The caller hands over either an in-memory buffer (an upload) or a path.
//! The file kind is decided from the name's extension against a fixed
//! allow-list before the document is accepted, so anything reaching the
//! resolver is already known to be an image or a PDF.

use crate::error::Scan2TxtError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Extensions accepted at intake (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "tif", "tiff", "bmp", "gif", "pdf"];

/// Declared kind of a submitted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// A single raster image; always exactly one page.
    Image,
    /// A paginated PDF; one page per PDF page.
    Pdf,
}

impl DocumentKind {
    /// Classify a file name by its extension.
    pub fn from_name(name: &str) -> Result<Self, Scan2TxtError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| Scan2TxtError::UnsupportedKind {
                name: name.to_string(),
            })?;

        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(Scan2TxtError::UnsupportedKind {
                name: name.to_string(),
            });
        }

        Ok(if ext == "pdf" {
            DocumentKind::Pdf
        } else {
            DocumentKind::Image
        })
    }
}

/// Where the document's bytes live.
#[derive(Debug, Clone)]
enum DocumentSource {
    Bytes(Arc<[u8]>),
    Path(PathBuf),
}

/// A document accepted for one pipeline run.
#[derive(Debug, Clone)]
pub struct SubmittedDocument {
    pub id: Uuid,
    pub original_name: String,
    pub kind: DocumentKind,
    source: DocumentSource,
}

impl SubmittedDocument {
    /// Accept an in-memory upload. `name` supplies the extension.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Result<Self, Scan2TxtError> {
        let original_name = name.into();
        let kind = DocumentKind::from_name(&original_name)?;
        Ok(Self {
            id: Uuid::new_v4(),
            original_name,
            kind,
            source: DocumentSource::Bytes(bytes.into()),
        })
    }

    /// Accept a file on disk. The file is not read until the run starts.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Scan2TxtError> {
        let path = path.as_ref();
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let kind = DocumentKind::from_name(&original_name)?;
        Ok(Self {
            id: Uuid::new_v4(),
            original_name,
            kind,
            source: DocumentSource::Path(path.to_path_buf()),
        })
    }

    /// The original name without its extension.
    pub fn base_name(&self) -> &str {
        Path::new(&self.original_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.original_name)
    }

    /// Load the document bytes, enforcing the size limit.
    pub async fn load(&self, max_bytes: u64) -> Result<Arc<[u8]>, Scan2TxtError> {
        match &self.source {
            DocumentSource::Bytes(bytes) => {
                check_size(&self.original_name, bytes.len() as u64, max_bytes)?;
                Ok(Arc::clone(bytes))
            }
            DocumentSource::Path(path) => {
                let meta = tokio::fs::metadata(path)
                    .await
                    .map_err(|e| Scan2TxtError::InputUnreadable {
                        path: path.clone(),
                        source: e,
                    })?;
                check_size(&self.original_name, meta.len(), max_bytes)?;

                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| Scan2TxtError::InputUnreadable {
                        path: path.clone(),
                        source: e,
                    })?;
                debug!("Loaded {} bytes from {}", bytes.len(), path.display());
                Ok(Arc::from(bytes))
            }
        }
    }
}

fn check_size(name: &str, size: u64, limit: u64) -> Result<(), Scan2TxtError> {
    if size > limit {
        return Err(Scan2TxtError::InputTooLarge {
            name: name.to_string(),
            size,
            limit,
        });
    }
    Ok(())
}

/// True when the `%PDF-` header appears within the first KiB.
///
/// pdfium tolerates a little leading garbage before the header, so the
/// check is a window search rather than a strict prefix match.
pub fn has_pdf_magic(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(1024)];
    window.windows(5).any(|w| w == b"%PDF-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_allowed_extensions() {
        assert_eq!(DocumentKind::from_name("scan.PNG").unwrap(), DocumentKind::Image);
        assert_eq!(DocumentKind::from_name("a.b.tiff").unwrap(), DocumentKind::Image);
        assert_eq!(DocumentKind::from_name("report.pdf").unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_name("Report.PDF").unwrap(), DocumentKind::Pdf);
    }

    #[test]
    fn classify_rejects_others() {
        for name in ["notes.docx", "archive.tar.gz", "README", "", "image.webp"] {
            let err = DocumentKind::from_name(name).unwrap_err();
            assert!(
                matches!(err, Scan2TxtError::UnsupportedKind { .. }),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn base_name_strips_extension() {
        let doc = SubmittedDocument::from_bytes("invoice 2024.jpeg", vec![1u8, 2, 3]).unwrap();
        assert_eq!(doc.base_name(), "invoice 2024");
        assert_eq!(doc.kind, DocumentKind::Image);
    }

    #[test]
    fn documents_get_distinct_ids() {
        let a = SubmittedDocument::from_bytes("a.png", vec![0u8]).unwrap();
        let b = SubmittedDocument::from_bytes("a.png", vec![0u8]).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn pdf_magic_detection() {
        assert!(has_pdf_magic(b"%PDF-1.7\n%..."));
        assert!(has_pdf_magic(b"\xef\xbb\xbf%PDF-1.4"));
        assert!(!has_pdf_magic(b"\x89PNG\r\n\x1a\n"));
        assert!(!has_pdf_magic(b""));
    }

    #[tokio::test]
    async fn load_enforces_size_limit() {
        let doc = SubmittedDocument::from_bytes("big.png", vec![0u8; 64]).unwrap();
        let err = doc.load(32).await.unwrap_err();
        assert!(matches!(err, Scan2TxtError::InputTooLarge { size: 64, limit: 32, .. }));
        assert!(doc.load(64).await.is_ok());
    }

    #[tokio::test]
    async fn load_missing_path_is_unreadable() {
        let doc = SubmittedDocument::from_path("/nonexistent/dir/scan.png").unwrap();
        let err = doc.load(1024).await.unwrap_err();
        assert!(matches!(err, Scan2TxtError::InputUnreadable { .. }));
    }

    #[tokio::test]
    async fn load_reads_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.gif");
        std::fs::write(&path, b"GIF89a").unwrap();
        let doc = SubmittedDocument::from_path(&path).unwrap();
        assert_eq!(doc.original_name, "page.gif");
        assert_eq!(&*doc.load(1024).await.unwrap(), b"GIF89a");
    }
}
