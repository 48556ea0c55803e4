//! Atomic file writes.
//!
//! Every file the engine publishes (cache document, extracted icons, grid
//! composites, variants) is written to a sibling temp file, synced, and then
//! renamed over the target. A reader therefore sees either the previous file
//! or the complete new one, never a partial write.

use crate::error::{IconError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or an error if parsing fails.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(IconError::io_with_path(e, path)),
    };

    let data: T = serde_json::from_str(&contents).map_err(|e| IconError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(Some(data))
}

/// Serialize `data` as pretty JSON and publish it atomically at `path`.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let serialized = serde_json::to_vec_pretty(data).map_err(|e| IconError::Json {
        message: format!("Failed to serialize data: {}", e),
        source: Some(e),
    })?;
    atomic_write_bytes(path, &serialized)
}

/// Publish `bytes` atomically at `path`, creating parent directories.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    atomic_write_with(path, |file| file.write_all(bytes))
}

/// Encode `image` as PNG and publish it atomically at `path`.
pub fn atomic_write_png(path: &Path, image: &image::RgbaImage) -> Result<()> {
    atomic_write_with(path, |file| {
        image
            .write_to(file, image::ImageFormat::Png)
            .map_err(std::io::Error::other)
    })
}

/// Publish a file atomically, letting `write` fill the temp file.
///
/// If `write` fails the temp file is removed and `path` is left untouched.
pub fn atomic_write_with<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut fs::File) -> std::io::Result<()>,
{
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| IconError::io_with_path(e, parent))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".tg-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| IconError::io_with_path(e, parent))?;

    write(temp.as_file_mut()).map_err(|e| IconError::io_with_path(e, temp.path()))?;
    sync(&temp)?;

    temp.persist(path)
        .map_err(|e| IconError::io_with_path(e.error, path))?;

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

fn sync(temp: &NamedTempFile) -> Result<()> {
    temp.as_file()
        .sync_all()
        .map_err(|e| IconError::io_with_path(e, temp.path()))
}
