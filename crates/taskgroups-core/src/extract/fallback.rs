//! Bundled default icons.
//!
//! Each category ships as an SVG embedded in the binary. It is rasterised at
//! the configured icon size and written to the fallback directory the first
//! time it is needed, so a fallback can never be "missing".

use crate::cache::atomic_write_png;
use crate::error::{IconError, Result};
use crate::referent::extension_of;
use image::{Rgba, RgbaImage};
use resvg::usvg;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default icon categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackKind {
    Folder,
    Document,
    Image,
    Archive,
    Video,
    Audio,
    /// The generic globe used for URLs and `.url` files.
    Url,
    Application,
    Default,
}

impl FallbackKind {
    pub const ALL: [FallbackKind; 9] = [
        FallbackKind::Folder,
        FallbackKind::Document,
        FallbackKind::Image,
        FallbackKind::Archive,
        FallbackKind::Video,
        FallbackKind::Audio,
        FallbackKind::Url,
        FallbackKind::Application,
        FallbackKind::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackKind::Folder => "folder",
            FallbackKind::Document => "document",
            FallbackKind::Image => "image",
            FallbackKind::Archive => "archive",
            FallbackKind::Video => "video",
            FallbackKind::Audio => "audio",
            FallbackKind::Url => "url",
            FallbackKind::Application => "application",
            FallbackKind::Default => "default",
        }
    }

    /// The embedded SVG source for this category.
    fn svg(&self) -> &'static str {
        match self {
            FallbackKind::Folder => include_str!("../../assets/fallback/folder.svg"),
            FallbackKind::Document => include_str!("../../assets/fallback/document.svg"),
            FallbackKind::Image => include_str!("../../assets/fallback/image.svg"),
            FallbackKind::Archive => include_str!("../../assets/fallback/archive.svg"),
            FallbackKind::Video => include_str!("../../assets/fallback/video.svg"),
            FallbackKind::Audio => include_str!("../../assets/fallback/audio.svg"),
            FallbackKind::Url => include_str!("../../assets/fallback/url.svg"),
            FallbackKind::Application => include_str!("../../assets/fallback/application.svg"),
            FallbackKind::Default => include_str!("../../assets/fallback/default.svg"),
        }
    }

    /// Category of a lower-case extension.
    pub fn for_extension(ext: &str) -> Self {
        match ext {
            "txt" | "md" | "pdf" | "doc" | "docx" | "rtf" | "odt" | "xls" | "xlsx" | "ods"
            | "csv" | "ppt" | "pptx" | "odp" | "json" | "xml" | "yaml" | "yml" | "log"
            | "ini" | "htm" | "html" => FallbackKind::Document,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "ico" | "webp" | "tif" | "tiff" | "svg" => {
                FallbackKind::Image
            }
            "zip" | "rar" | "7z" | "tar" | "gz" | "tgz" | "bz2" | "xz" | "zst" | "cab" => {
                FallbackKind::Archive
            }
            "mp4" | "mkv" | "avi" | "mov" | "wmv" | "webm" | "flv" | "m4v" => FallbackKind::Video,
            "mp3" | "wav" | "flac" | "ogg" | "m4a" | "aac" | "wma" | "opus" => {
                FallbackKind::Audio
            }
            "url" => FallbackKind::Url,
            "exe" | "dll" | "com" | "bat" | "cmd" | "msi" | "ps1" | "lnk" | "appref-ms" => {
                FallbackKind::Application
            }
            _ => FallbackKind::Default,
        }
    }

    /// Category of a path: directories are folders, files go by extension.
    pub fn for_path(path: &Path) -> Self {
        if path.is_dir() {
            return FallbackKind::Folder;
        }
        extension_of(path)
            .map(|ext| Self::for_extension(&ext))
            .unwrap_or(FallbackKind::Default)
    }
}

impl fmt::Display for FallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Materialises default icons in a directory.
#[derive(Debug, Clone)]
pub struct FallbackIcons {
    dir: PathBuf,
    size: u32,
}

impl FallbackIcons {
    pub fn new(dir: impl Into<PathBuf>, size: u32) -> Self {
        Self {
            dir: dir.into(),
            size,
        }
    }

    pub fn path_for(&self, kind: FallbackKind) -> PathBuf {
        self.dir.join(format!("{}.png", kind.as_str()))
    }

    /// Path of the icon for `kind`, rendering it first if it isn't on disk.
    pub fn materialize(&self, kind: FallbackKind) -> Result<PathBuf> {
        let path = self.path_for(kind);
        if path.is_file() {
            return Ok(path);
        }
        atomic_write_png(&path, &render(kind, self.size)?)?;
        debug!("Materialised {} fallback icon at {}", kind, path.display());
        Ok(path)
    }
}

/// Rasterise the icon for `kind` onto a `size`×`size` transparent canvas.
pub fn render(kind: FallbackKind, size: u32) -> Result<RgbaImage> {
    let tree = usvg::Tree::from_str(kind.svg(), &usvg::Options::default())
        .map_err(|e| IconError::invalid("SVG", format!("{} icon: {}", kind, e)))?;
    let mut pixmap = tiny_skia::Pixmap::new(size, size)
        .ok_or_else(|| IconError::Other(format!("Cannot allocate a {}px canvas", size)))?;

    let source = tree.size();
    let transform = tiny_skia::Transform::from_scale(
        size as f32 / source.width(),
        size as f32 / source.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    // The pixmap is premultiplied; PNG wants straight alpha.
    let mut image = RgbaImage::new(size, size);
    for (pixel, colour) in image.pixels_mut().zip(pixmap.pixels()) {
        let colour = colour.demultiply();
        *pixel = Rgba([colour.red(), colour.green(), colour.blue(), colour.alpha()]);
    }
    Ok(image)
}
