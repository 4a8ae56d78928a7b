//! Output directory as the record of progress.
//!
//! Each company maps to exactly one `<stem>.png` (see [`sanitize_id`]). Its presence means the company
//! is done; nothing else is consulted when resuming. Artifacts are written to
//! `<id>.png.tmp`, synced, and renamed, so an interrupted write never leaves a
//! file that looks complete.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::processor::SetupError;

const ARTIFACT_EXTENSION: &str = "png";
const TEMP_SUFFIX: &str = ".tmp";

/// Separator before the hash suffix. It is outside the safe set, so a stem
/// carrying it can never come from an identifier that was already safe.
const HASH_SEPARATOR: char = '~';
const HASH_HEX_CHARS: usize = 16;

/// Map an identifier to a file stem, one stem per identifier.
///
/// Identifiers made only of `[A-Za-z0-9._-]` (and not just dots) are used
/// as-is. Anything else has the unsafe characters replaced by `_` and a
/// SHA-256 prefix of the raw identifier appended, so `a/b` and `a_b`, or
/// two Japanese names, never share a file.
pub fn sanitize_id(id: &str) -> String {
    let is_safe = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
    let dots_only = id.chars().all(|c| c == '.');

    if !dots_only && id.chars().all(is_safe) {
        return id.to_string();
    }

    let readable: String = if dots_only {
        "_".repeat(id.chars().count().max(1))
    } else {
        id.chars().map(|c| if is_safe(c) { c } else { '_' }).collect()
    };
    let hex: String = Sha256::digest(id.as_bytes())
        .iter()
        .take(HASH_HEX_CHARS / 2)
        .map(|b| format!("{:02x}", b))
        .collect();

    format!("{}{}{}", readable, HASH_SEPARATOR, hex)
}

#[derive(Debug, Clone)]
pub struct ProgressStore {
    dir: PathBuf,
}

impl ProgressStore {
    /// Create the output directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SetupError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| SetupError::OutputDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", sanitize_id(id), ARTIFACT_EXTENSION))
    }

    fn temp_path(&self, id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}{}", sanitize_id(id), ARTIFACT_EXTENSION, TEMP_SUFFIX))
    }

    /// Sanitized stems of every completed artifact. Stale temp files are removed.
    pub fn scan(&self) -> Result<HashSet<String>, SetupError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| SetupError::OutputDir {
            path: self.dir.clone(),
            source,
        })?;

        let mut completed = HashSet::new();
        let mut removed = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if file_name.ends_with(TEMP_SUFFIX) {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Could not remove stale temp file {}: {}", path.display(), e),
                }
                continue;
            }

            let is_artifact = path.extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXTENSION);
            if is_artifact && path.is_file() {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    completed.insert(stem.to_string());
                }
            }
        }

        if removed > 0 {
            debug!("Removed {} stale temp file(s) from {}", removed, self.dir.display());
        }
        Ok(completed)
    }

    /// Write `png` for `id` atomically (temp file, fsync, rename)
    pub fn write_atomic(&self, id: &str, png: &[u8]) -> io::Result<PathBuf> {
        let path = self.artifact_path(id);
        let temp_path = self.temp_path(id);

        let written = (|| {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(png)?;
            file.sync_all()
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        fs::rename(&temp_path, &path)?;
        Ok(path)
    }
}
