//! Grid composition and variant methods for IconEngine.

use std::path::{Path, PathBuf};

use super::run_blocking;
use crate::error::Result;
use crate::grid::GridIconSpec;
use crate::IconEngine;
use tracing::warn;

impl IconEngine {
    /// Compose up to N² icons into one grid icon under the grids directory.
    ///
    /// The target name is derived from the ordered member list and `dimension`,
    /// so recomposing an unchanged group rewrites the same file with the same
    /// bytes. `None` on failure; any previous composite is left intact.
    pub async fn compose_grid_icon(&self, icons: &[PathBuf], dimension: u32) -> Option<PathBuf> {
        let grid = self.inner.grid.clone();
        let icons = icons.to_vec();
        absorb(
            "compose grid icon",
            run_blocking(move || grid.compose(&icons, dimension)).await,
        )
    }

    /// Compose into a caller-chosen target.
    pub async fn compose_grid_into(&self, spec: GridIconSpec) -> Option<PathBuf> {
        let grid = self.inner.grid.clone();
        absorb(
            "compose grid icon",
            run_blocking(move || grid.compose_into(&spec)).await,
        )
    }

    /// Desaturated copy of an icon, for taskbar theming.
    ///
    /// The caller owns the returned file and deletes it when done.
    pub async fn make_grayscale_variant(&self, icon: &Path) -> Option<PathBuf> {
        let variants = self.inner.variants.clone();
        let icon = icon.to_path_buf();
        absorb(
            "make grayscale variant",
            run_blocking(move || variants.make_grayscale(&icon)).await,
        )
    }
}

pub(crate) fn absorb(operation: &str, result: Result<PathBuf>) -> Option<PathBuf> {
    match result {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Failed to {}: {}", operation, e);
            None
        }
    }
}
