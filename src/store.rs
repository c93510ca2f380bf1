//! Result Store: durable, collision-safe transcript files.
//!
//! Every completed run writes one UTF-8 text file named
//!
//! ```text
//! <sanitized stem>_<YYYYMMDD_HHMMSS_micros>_<8 hex>.txt
//! ```
//!
//! The microsecond timestamp keeps listings chronological; the random
//! suffix makes two runs that start in the same microsecond with the same
//! file name still land on different names.
//!
//! ## Why temp file + persist_noclobber?
//!
//! The text is written to a hidden temp file in the store directory and then
//! linked into place with a no-clobber rename. Readers never observe a
//! half-written transcript, an existing file is never replaced, and a write
//! that fails midway leaves nothing behind (the temp file is deleted on
//! drop). No locks are needed between concurrent runs.

use crate::error::{Scan2TxtError, Stage};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Longest sanitised stem kept in a file name.
const MAX_STEM_LEN: usize = 64;

/// Stem used when nothing survives sanitisation.
const FALLBACK_STEM: &str = "document";

const EXTENSION: &str = "txt";

/// Attempts before giving up on name collisions.
const MAX_NAME_ATTEMPTS: usize = 3;

/// Opaque reference to a persisted transcript: its file name in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    /// Validate a caller-supplied locator (e.g. from a download request).
    pub fn parse(raw: &str) -> Result<Self, Scan2TxtError> {
        let valid = !raw.is_empty()
            && !raw.starts_with('.')
            && !raw.contains("..")
            && !raw.contains(['/', '\\', '\0'])
            && raw.ends_with(".txt");
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(Scan2TxtError::LocatorNotFound {
                locator: raw.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A directory of transcripts shared by every run in the process.
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, Scan2TxtError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| Scan2TxtError::StorageWriteError {
                path: root.clone(),
                source: e,
            })?;
        debug!("Result store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `text` under a fresh name derived from `base_name`.
    pub async fn persist(&self, base_name: &str, text: &str) -> Result<Locator, Scan2TxtError> {
        let root = self.root.clone();
        let stem = sanitize_stem(base_name);
        let bytes = text.as_bytes().to_vec();

        let locator = tokio::task::spawn_blocking(move || write_unique(&root, &stem, &bytes))
            .await
            .map_err(|e| Scan2TxtError::Internal {
                stage: Stage::Persist,
                detail: format!("Store task panicked: {}", e),
            })??;

        info!("Transcript saved as {}", locator);
        Ok(locator)
    }

    /// Map a locator to its file, failing if it does not exist.
    pub fn resolve(&self, locator: &Locator) -> Result<PathBuf, Scan2TxtError> {
        // Re-validate: a Locator may have been deserialised from anywhere.
        let checked = Locator::parse(locator.as_str())?;
        let path = self.root.join(checked.as_str());
        if path.is_file() {
            Ok(path)
        } else {
            Err(Scan2TxtError::LocatorNotFound {
                locator: locator.to_string(),
            })
        }
    }

    /// Read a persisted transcript back.
    pub async fn read(&self, locator: &Locator) -> Result<String, Scan2TxtError> {
        let path = self.resolve(locator)?;
        tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Scan2TxtError::LocatorNotFound {
                locator: locator.to_string(),
            },
            _ => Scan2TxtError::Internal {
                stage: Stage::Persist,
                detail: format!("Cannot read '{}': {}", path.display(), e),
            },
        })
    }
}

fn write_unique(root: &Path, stem: &str, bytes: &[u8]) -> Result<Locator, Scan2TxtError> {
    let write_err = |path: &Path, source: std::io::Error| Scan2TxtError::StorageWriteError {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".partial-")
        .suffix(".tmp")
        .tempfile_in(root)
        .map_err(|e| write_err(root, e))?;
    tmp.write_all(bytes).map_err(|e| write_err(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| write_err(tmp.path(), e))?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        let name = unique_name(stem);
        let target = root.join(&name);
        match tmp.persist_noclobber(&target) {
            Ok(_) => return Ok(Locator(name)),
            Err(e)
                if e.error.kind() == std::io::ErrorKind::AlreadyExists
                    && attempt < MAX_NAME_ATTEMPTS =>
            {
                debug!("Name collision on {}, retrying", name);
                tmp = e.file;
            }
            Err(e) => return Err(write_err(&target, e.error)),
        }
    }
}

fn unique_name(stem: &str) -> String {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S_%6f");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}.{}", stem, stamp, &suffix[..8], EXTENSION)
}

/// Reduce an arbitrary base name to a safe file-name stem.
///
/// Keeps ASCII alphanumerics and `-_.`, maps whitespace to `_`, drops
/// everything else (path separators included), removes `..` runs and
/// leading dots, and caps the length. Never returns an empty string.
pub fn sanitize_stem(name: &str) -> String {
    let mut out: String = name
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .collect();

    while out.contains("..") {
        out = out.replace("..", ".");
    }

    let trimmed = out.trim_start_matches('.');
    let mut stem: String = trimmed.chars().take(MAX_STEM_LEN).collect();
    while stem.ends_with('.') {
        stem.pop();
    }

    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn sanitize_keeps_safe_characters() {
        assert_eq!(sanitize_stem("invoice-2024_v2"), "invoice-2024_v2");
        assert_eq!(sanitize_stem("my scan 01"), "my_scan_01");
        assert_eq!(sanitize_stem("report.final"), "report.final");
    }

    #[test]
    fn sanitize_strips_traversal_and_separators() {
        assert_eq!(sanitize_stem("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_stem("..\\windows\\system32"), "windowssystem32");
        assert_eq!(sanitize_stem(".hidden"), "hidden");
        assert_eq!(sanitize_stem("a..b"), "a.b");
    }

    #[test]
    fn sanitize_falls_back_when_empty() {
        assert_eq!(sanitize_stem(""), "document");
        assert_eq!(sanitize_stem("..."), "document");
        assert_eq!(sanitize_stem("請求書"), "document");
    }

    #[test]
    fn sanitize_truncates() {
        let long = "x".repeat(200);
        assert_eq!(sanitize_stem(&long).len(), 64);
    }

    #[test]
    fn unique_name_shape() {
        let name = unique_name("scan");
        assert!(name.starts_with("scan_"));
        assert!(name.ends_with(".txt"));
        // scan_ + 8 date + _ + 6 time + _ + 6 micros + _ + 8 hex + .txt
        assert_eq!(name.len(), 5 + 8 + 1 + 6 + 1 + 6 + 1 + 8 + 4);
    }

    #[test]
    fn locator_parse_rejects_unsafe() {
        for bad in ["", "../x.txt", "a/b.txt", "a\\b.txt", ".partial-x.txt", "x.pdf", "a..txt"] {
            assert!(Locator::parse(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(Locator::parse("scan_20240101_000000_000000_abcdef01.txt").is_ok());
    }

    #[tokio::test]
    async fn persist_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path().join("outputs")).await.unwrap();
        let locator = store.persist("page one", "Hello").await.unwrap();

        assert!(locator.as_str().starts_with("page_one_"));
        assert_eq!(store.read(&locator).await.unwrap(), "Hello");
        assert!(store.resolve(&locator).unwrap().starts_with(store.root()));
    }

    #[tokio::test]
    async fn same_base_name_never_collides() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let text = format!("run {i}");
                let loc = store.persist("scan", &text).await.unwrap();
                (loc, text)
            }));
        }

        let mut seen = HashSet::new();
        for h in handles {
            let (loc, text) = h.await.unwrap();
            assert!(seen.insert(loc.clone()), "duplicate locator {loc}");
            assert_eq!(store.read(&loc).await.unwrap(), text);
        }
    }

    #[tokio::test]
    async fn no_partial_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path()).await.unwrap();
        store.persist("a", "text").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].starts_with(".partial-"));
    }

    #[tokio::test]
    async fn unknown_locator_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path()).await.unwrap();
        let missing = Locator::parse("ghost_20240101_000000_000000_00000000.txt").unwrap();
        assert!(matches!(
            store.read(&missing).await,
            Err(Scan2TxtError::LocatorNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn unwritable_root_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let err = ResultStore::open(&file).await.unwrap_err();
        assert!(matches!(err, Scan2TxtError::StorageWriteError { .. }));
        assert_eq!(err.stage(), Stage::Persist);
    }
}
