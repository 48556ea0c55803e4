//! Centralized configuration for the icon engine.
//!
//! Constant tables hold the built-in defaults; [`EngineConfig`] carries the
//! runtime values, derived from a data directory and optionally overridden by
//! an `engine-settings.json` file in that directory.

use crate::cache::atomic_read_json;
use crate::error::{IconError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const DATA_DIR_NAME: &'static str = "Taskgroups";
    pub const SETTINGS_FILENAME: &'static str = "engine-settings.json";
}

/// Persistent cache store configuration.
pub struct CacheConfig;

impl CacheConfig {
    pub const CACHE_FILENAME: &'static str = "icon-cache.json";
    pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(500);
    /// How long shutdown waits for in-flight extractions before the final save.
    pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
    /// Field separator used when building fingerprint input strings.
    pub const KEY_SEPARATOR: char = '|';
    /// Hex characters kept from the BLAKE3 digest for keys and file stems.
    pub const KEY_HEX_LEN: usize = 32;
}

/// Extracted icon configuration.
pub struct IconConfig;

impl IconConfig {
    /// Edge length extracted bitmaps are scaled down to (never up).
    pub const ICON_SIZE: u32 = 256;
    pub const MIN_ICON_SIZE: u32 = 16;
    pub const MAX_ICON_SIZE: u32 = 1024;
}

/// Grid composer configuration.
pub struct GridConfig;

impl GridConfig {
    pub const CANVAS_SIZE: u32 = 256;
    pub const PADDING: u32 = 8;
    /// Images stored in the composite icon container, largest first.
    pub const CONTAINER_SIZES: [u32; 5] = [256, 64, 48, 32, 16];
}

/// Directory and file names below the data directory.
pub struct PathsConfig;

impl PathsConfig {
    pub const ICONS_DIR_NAME: &'static str = "icons";
    pub const GRIDS_DIR_NAME: &'static str = "grids";
    pub const VARIANTS_DIR_NAME: &'static str = "variants";
    pub const FALLBACK_DIR_NAME: &'static str = "fallback";
    pub const TEMP_DIR_NAME: &'static str = "tmp";
}

/// Runtime configuration for an [`crate::IconEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of all engine state.
    pub data_dir: PathBuf,
    /// Extracted icons, one PNG per cache key.
    pub icons_dir: PathBuf,
    /// Composite grid icons.
    pub grids_dir: PathBuf,
    /// Desaturated variants.
    pub variants_dir: PathBuf,
    /// Bundled default icons, materialised on first use.
    pub fallback_dir: PathBuf,
    /// Scoped temporary files (packaged-app shortcuts).
    pub temp_dir: PathBuf,
    /// The persisted key → icon path mapping.
    pub cache_file: PathBuf,
    pub icon_size: u32,
    pub save_debounce: Duration,
    pub grid_canvas_size: u32,
    pub grid_padding: u32,
}

impl EngineConfig {
    /// Derive every path from a single data directory, with default tunables.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            icons_dir: data_dir.join(PathsConfig::ICONS_DIR_NAME),
            grids_dir: data_dir.join(PathsConfig::GRIDS_DIR_NAME),
            variants_dir: data_dir.join(PathsConfig::VARIANTS_DIR_NAME),
            fallback_dir: data_dir.join(PathsConfig::FALLBACK_DIR_NAME),
            temp_dir: data_dir.join(PathsConfig::TEMP_DIR_NAME),
            cache_file: data_dir.join(CacheConfig::CACHE_FILENAME),
            icon_size: IconConfig::ICON_SIZE,
            save_debounce: CacheConfig::SAVE_DEBOUNCE,
            grid_canvas_size: GridConfig::CANVAS_SIZE,
            grid_padding: GridConfig::PADDING,
            data_dir,
        }
    }

    /// Configuration rooted at the per-user data directory.
    pub fn user_default() -> Result<Self> {
        let base = dirs::data_dir().ok_or_else(|| {
            IconError::Other("Could not determine the per-user data directory".to_string())
        })?;
        Ok(Self::for_data_dir(base.join(AppConfig::DATA_DIR_NAME)).with_settings_file())
    }

    /// Apply overrides from `engine-settings.json` in the data directory.
    ///
    /// A missing file leaves the defaults; a corrupt one is logged and ignored.
    pub fn with_settings_file(self) -> Self {
        let path = self.data_dir.join(AppConfig::SETTINGS_FILENAME);
        match atomic_read_json::<EngineSettings>(&path) {
            Ok(Some(settings)) => {
                debug!("Loaded engine settings from {}", path.display());
                self.with_settings(&settings)
            }
            Ok(None) => self,
            Err(e) => {
                warn!("Ignoring unreadable engine settings {}: {}", path.display(), e);
                self
            }
        }
    }

    /// Apply a set of overrides, clamping values to sane ranges.
    pub fn with_settings(mut self, settings: &EngineSettings) -> Self {
        if let Some(size) = settings.icon_size {
            self.icon_size = size.clamp(IconConfig::MIN_ICON_SIZE, IconConfig::MAX_ICON_SIZE);
        }
        if let Some(ms) = settings.save_debounce_ms {
            self.save_debounce = Duration::from_millis(ms);
        }
        if let Some(size) = settings.grid_canvas_size {
            self.grid_canvas_size =
                size.clamp(IconConfig::MIN_ICON_SIZE, IconConfig::MAX_ICON_SIZE);
        }
        if let Some(padding) = settings.grid_padding {
            self.grid_padding = padding;
        }
        // Keeps a 3x3 grid's padding below half the canvas.
        self.grid_padding = self.grid_padding.min(self.grid_canvas_size / 8);
        self
    }

    /// Create every directory the engine writes into.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.data_dir,
            &self.icons_dir,
            &self.grids_dir,
            &self.variants_dir,
            &self.fallback_dir,
            &self.temp_dir,
        ] {
            create_dir(dir)?;
        }
        Ok(())
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| IconError::io_with_path(e, dir))
}

/// User-editable overrides stored in `engine-settings.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct EngineSettings {
    pub icon_size: Option<u32>,
    pub save_debounce_ms: Option<u64>,
    pub grid_canvas_size: Option<u32>,
    pub grid_padding: Option<u32>,
}
