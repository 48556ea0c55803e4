//! Icon extraction strategies.
//!
//! Each referent kind has a fixed chain of strategies. A strategy either
//! publishes an icon and returns its path, or fails and hands over to the
//! next one in the chain:
//!
//! | Referent        | Chain                                   |
//! |-----------------|-----------------------------------------|
//! | file            | direct → extension fallback             |
//! | shortcut        | shortcut target → extension fallback    |
//! | packaged app    | packaged app                            |
//! | `.url` file     | url file → extension fallback (globe)   |
//! | plain URL       | extension fallback (globe)              |
//!
//! All strategies are blocking and run on the blocking thread pool.

pub mod fallback;
pub mod namespace;
pub mod pe;
pub mod shortcut;
pub mod url_file;

pub use fallback::{FallbackIcons, FallbackKind};
pub use namespace::{AppNamespace, EmptyNamespace, PackagedApp, StaticNamespace};
pub use shortcut::ShellLink;
pub use url_file::UrlFile;

use crate::cache::atomic_write_png;
use crate::config::EngineConfig;
use crate::error::{IconError, Result};
use crate::referent::{extension_of, Referent, ReferentKind};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Produces an icon file for a referent.
#[async_trait]
pub trait IconExtractor: Send + Sync {
    /// Extract an icon for `referent`.
    ///
    /// Extracted bitmaps are published at `dest`; strategies that settle on a
    /// bundled default return that icon's path instead.
    async fn extract(&self, referent: &Referent, dest: &Path) -> Result<PathBuf>;
}

/// One link of a strategy chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Decode the embedded or native icon of a file.
    Direct,
    /// Follow a shortcut to its icon location or target.
    ShortcutTarget,
    /// Look the app up in the packaged-app namespace.
    PackagedApp,
    /// Use a `.url` document's `IconFile`.
    UrlFile,
    /// Bundled default by category.
    ExtensionFallback,
}

impl Strategy {
    /// The chain tried for a referent kind, in priority order.
    pub fn chain(kind: ReferentKind) -> &'static [Strategy] {
        match kind {
            ReferentKind::File => &[Strategy::Direct, Strategy::ExtensionFallback],
            ReferentKind::Shortcut => &[Strategy::ShortcutTarget, Strategy::ExtensionFallback],
            ReferentKind::PackagedApp => &[Strategy::PackagedApp],
            ReferentKind::UrlFile => &[Strategy::UrlFile, Strategy::ExtensionFallback],
            ReferentKind::Url => &[Strategy::ExtensionFallback],
        }
    }
}

/// Extensions decoded as images in their own right.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff"];

/// The production extractor: runs the strategy chains against the file system
/// and the packaged-app namespace.
#[derive(Clone)]
pub struct StrategySet {
    namespace: Arc<dyn AppNamespace>,
    fallback: FallbackIcons,
    temp_dir: PathBuf,
    icon_size: u32,
}

impl StrategySet {
    pub fn new(config: &EngineConfig, namespace: Arc<dyn AppNamespace>) -> Self {
        Self {
            namespace,
            fallback: FallbackIcons::new(&config.fallback_dir, config.icon_size),
            temp_dir: config.temp_dir.clone(),
            icon_size: config.icon_size,
        }
    }

    pub fn fallback(&self) -> &FallbackIcons {
        &self.fallback
    }

    /// Run the chain for `referent` on the current thread.
    pub fn extract_blocking(&self, referent: &Referent, dest: &Path) -> Result<PathBuf> {
        for strategy in Strategy::chain(referent.kind()) {
            match self.try_strategy(*strategy, referent, dest) {
                Ok(path) => {
                    debug!("{:?} produced {} for {}", strategy, path.display(), referent);
                    return Ok(path);
                }
                Err(e) => debug!("{:?} failed for {}: {}", strategy, referent, e),
            }
        }
        Err(IconError::ExtractionUnsupported {
            referent: referent.describe(),
        })
    }

    fn try_strategy(&self, strategy: Strategy, referent: &Referent, dest: &Path) -> Result<PathBuf> {
        match (strategy, referent) {
            (Strategy::Direct, Referent::FilePath(path)) => self.direct(path, 0, dest),
            (Strategy::ShortcutTarget, Referent::ShortcutPath(path)) => {
                self.shortcut_target(path, dest)
            }
            (Strategy::PackagedApp, Referent::PackagedAppId { aumid, .. }) => {
                self.packaged_app(aumid, dest)
            }
            (Strategy::UrlFile, Referent::WebUrlFile(path)) => self.url_file(path, dest),
            (Strategy::ExtensionFallback, _) => {
                self.fallback.materialize(self.fallback_kind(referent))
            }
            _ => Err(IconError::ExtractionUnsupported {
                referent: referent.describe(),
            }),
        }
    }

    /// Strategy 1: decode the icon of a file and publish it at `dest`.
    fn direct(&self, path: &Path, index: i32, dest: &Path) -> Result<PathBuf> {
        if !path.exists() {
            return Err(IconError::ReferentNotFound(path.display().to_string()));
        }
        let image = match extension_of(path).as_deref() {
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => image::open(path)?,
            Some("ico") => {
                let bytes = std::fs::read(path).map_err(|e| IconError::io_with_path(e, path))?;
                pe::decode_ico(&bytes)?
            }
            _ if path.is_dir() => {
                return Err(IconError::ExtractionUnsupported {
                    referent: path.display().to_string(),
                })
            }
            _ => pe::extract_icon(path, index)?,
        };
        self.publish(image, dest)
    }

    /// Strategy 2: prefer the link's explicit icon, then its target. Never the
    /// `.lnk` itself, which would carry the shortcut overlay.
    fn shortcut_target(&self, link_path: &Path, dest: &Path) -> Result<PathBuf> {
        let link = ShellLink::read(link_path)?;
        let base = link_path.parent().unwrap_or(Path::new(""));

        if let Some((icon, index)) = link.icon_source(base) {
            match self.direct(&icon, index, dest) {
                Ok(path) => return Ok(path),
                Err(e) => debug!("Icon location {} unusable: {}", icon.display(), e),
            }
        }

        let target = link.target_path(base).ok_or_else(|| {
            IconError::invalid("shell link", "link has neither icon location nor target")
        })?;
        self.direct(&target, 0, dest)
    }

    /// Strategy 3: backing executable, else a scoped temporary shortcut.
    fn packaged_app(&self, aumid: &str, dest: &Path) -> Result<PathBuf> {
        let app = self
            .namespace
            .lookup(aumid)?
            .ok_or_else(|| IconError::ReferentNotFound(aumid.to_string()))?;

        if let Some(exe) = app.executable.as_deref().filter(|p| p.is_file()) {
            return self.direct(exe, 0, dest);
        }

        std::fs::create_dir_all(&self.temp_dir)
            .map_err(|e| IconError::io_with_path(e, &self.temp_dir))?;
        // Deleted when dropped, on every exit path.
        let link = tempfile::Builder::new()
            .prefix("pkg-")
            .suffix(".lnk")
            .tempfile_in(&self.temp_dir)
            .map_err(|e| IconError::io_with_path(e, &self.temp_dir))?
            .into_temp_path();

        self.namespace.write_shortcut(&app, &link)?;
        self.shortcut_target(&link, dest)
    }

    /// Strategy 4: the document's `IconFile`, if it names something usable.
    fn url_file(&self, path: &Path, dest: &Path) -> Result<PathBuf> {
        let document = UrlFile::read(path)?;
        let base = path.parent().unwrap_or(Path::new(""));
        let (icon, index) = document.icon_source(base).ok_or_else(|| {
            IconError::ExtractionUnsupported {
                referent: format!("{} (no IconFile)", path.display()),
            }
        })?;
        self.direct(&icon, index, dest)
    }

    fn fallback_kind(&self, referent: &Referent) -> FallbackKind {
        match referent {
            Referent::FilePath(path) => FallbackKind::for_path(path),
            Referent::ShortcutPath(path) => {
                let base = path.parent().unwrap_or(Path::new(""));
                ShellLink::read(path)
                    .ok()
                    .and_then(|link| link.target_path(base))
                    .map(|target| FallbackKind::for_path(&target))
                    .unwrap_or(FallbackKind::Application)
            }
            Referent::PackagedAppId { .. } => FallbackKind::Application,
            Referent::WebUrlFile(_) | Referent::PlainUrl(_) => FallbackKind::Url,
        }
    }

    /// Scale down (never up) to the configured edge and write as PNG.
    fn publish(&self, image: DynamicImage, dest: &Path) -> Result<PathBuf> {
        let image = if image.width() > self.icon_size || image.height() > self.icon_size {
            image.resize(self.icon_size, self.icon_size, FilterType::Lanczos3)
        } else {
            image
        };
        atomic_write_png(dest, &image.to_rgba8())?;
        Ok(dest.to_path_buf())
    }
}

#[async_trait]
impl IconExtractor for StrategySet {
    async fn extract(&self, referent: &Referent, dest: &Path) -> Result<PathBuf> {
        let strategies = self.clone();
        let referent = referent.clone();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || strategies.extract_blocking(&referent, &dest))
            .await
            .map_err(|e| IconError::Other(format!("Extraction task failed: {}", e)))?
    }
}
