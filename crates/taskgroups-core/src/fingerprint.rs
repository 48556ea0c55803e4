//! Stable cache keys for referents.
//!
//! File-backed referents are keyed by normalized absolute path, size and
//! modification time, so replacing an executable in place produces a new key
//! and the stale cache row is simply never looked up again. Packaged apps and
//! plain URLs are keyed by their normalized identifier alone.

use crate::config::CacheConfig;
use crate::error::{IconError, Result};
use crate::referent::Referent;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Opaque cache key derived from a referent's fingerprint inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an already-derived key (e.g. one read back from the cache file).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe stem used to name the extracted icon for this key.
    pub fn file_stem(&self) -> String {
        short_hash(self.0.as_bytes())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The raw inputs a file-backed key is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    pub path: PathBuf,
    pub size: u64,
    pub modified_nanos: u128,
}

impl FileFingerprint {
    /// Stat a file and capture its fingerprint inputs.
    pub fn read(path: &Path) -> Result<Self> {
        let normalized = normalize_path(path);
        let metadata = std::fs::metadata(&normalized).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IconError::ReferentNotFound(path.display().to_string())
            } else {
                IconError::io_with_path(e, &normalized)
            }
        })?;
        let modified_nanos = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);

        Ok(Self {
            path: normalized,
            size: metadata.len(),
            modified_nanos,
        })
    }

    pub fn key(&self) -> CacheKey {
        let sep = CacheConfig::KEY_SEPARATOR;
        let input = format!(
            "file{sep}{}{sep}{}{sep}{}",
            self.path.display(),
            self.size,
            self.modified_nanos
        );
        CacheKey(short_hash(input.as_bytes()))
    }
}

/// Compute the cache key for a referent.
///
/// Fails only when a file-backed referent cannot be stat'ed; callers fall back
/// to [`path_only_key`] in that case.
pub fn compute_key(referent: &Referent) -> Result<CacheKey> {
    match referent {
        Referent::FilePath(path) | Referent::ShortcutPath(path) | Referent::WebUrlFile(path) => {
            Ok(FileFingerprint::read(path)?.key())
        }
        Referent::PackagedAppId { aumid, .. } => {
            Ok(CacheKey(format!("aumid:{}", aumid.trim().to_lowercase())))
        }
        Referent::PlainUrl(raw) => Ok(CacheKey(format!("url:{}", normalize_url(raw)))),
    }
}

/// Key derived from the path alone, used when the file cannot be stat'ed.
pub fn path_only_key(path: &Path) -> CacheKey {
    let sep = CacheConfig::KEY_SEPARATOR;
    let input = format!("path{sep}{}", normalize_path(path).display());
    CacheKey(short_hash(input.as_bytes()))
}

/// Compute a key, falling back to a path-only key for unreadable files.
pub fn compute_key_or_fallback(referent: &Referent) -> CacheKey {
    match compute_key(referent) {
        Ok(key) => key,
        Err(_) => match referent.file_path() {
            Some(path) => path_only_key(path),
            None => CacheKey(format!("raw:{}", referent.describe())),
        },
    }
}

/// Absolute form of a path; case-folded on Windows where paths are
/// case-insensitive.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    if cfg!(windows) {
        PathBuf::from(absolute.to_string_lossy().to_lowercase())
    } else {
        absolute
    }
}

fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match url::Url::parse(trimmed) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Truncated BLAKE3 hex digest.
pub(crate) fn short_hash(bytes: &[u8]) -> String {
    let mut hex = blake3::hash(bytes).to_hex().to_string();
    hex.truncate(CacheConfig::KEY_HEX_LEN);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[test]
    fn test_identical_inputs_yield_identical_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tool.exe");
        std::fs::write(&path, vec![0u8; 10 * 1024]).unwrap();

        let a = compute_key(&Referent::FilePath(path.clone())).unwrap();
        let b = compute_key(&Referent::FilePath(path)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), CacheConfig::KEY_HEX_LEN);
    }

    #[test]
    fn test_mtime_change_changes_key() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tool.exe");
        std::fs::write(&path, b"MZ").unwrap();

        let t1 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        File::options().write(true).open(&path).unwrap().set_modified(t1).unwrap();
        let before = compute_key(&Referent::FilePath(path.clone())).unwrap();

        let t2 = t1 + Duration::from_secs(60);
        File::options().write(true).open(&path).unwrap().set_modified(t2).unwrap();
        let after = compute_key(&Referent::FilePath(path)).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn test_size_change_changes_key() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.txt");
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);

        std::fs::write(&path, b"short").unwrap();
        File::options().write(true).open(&path).unwrap().set_modified(t).unwrap();
        let before = compute_key(&Referent::FilePath(path.clone())).unwrap();

        std::fs::write(&path, b"a little longer").unwrap();
        File::options().write(true).open(&path).unwrap().set_modified(t).unwrap();
        let after = compute_key(&Referent::FilePath(path)).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn test_missing_file_is_an_error_with_path_fallback() {
        let referent = Referent::FilePath(PathBuf::from("/definitely/not/here.exe"));
        let err = compute_key(&referent).unwrap_err();
        assert!(err.is_not_found());

        let fallback = compute_key_or_fallback(&referent);
        assert_eq!(fallback, path_only_key(Path::new("/definitely/not/here.exe")));
    }

    #[test]
    fn test_identifier_keys() {
        let a = compute_key(&Referent::packaged("Contoso.App_abc!Main", "Main")).unwrap();
        let b = compute_key(&Referent::packaged(" contoso.app_ABC!main ", "Other")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "aumid:contoso.app_abc!main");

        let url = compute_key(&Referent::PlainUrl("HTTPS://Example.com".into())).unwrap();
        assert_eq!(url.as_str(), "url:https://example.com/");
    }

    #[test]
    fn test_file_stem_is_filesystem_safe() {
        let key = CacheKey::from_raw("aumid:contoso.app_abc!main");
        let stem = key.file_stem();
        assert_eq!(stem.len(), CacheConfig::KEY_HEX_LEN);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
