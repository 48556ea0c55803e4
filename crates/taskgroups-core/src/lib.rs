//! Taskgroups Core - icon resolution and caching for launcher groups.
//!
//! Every launch target in a group (executable, shortcut, packaged app,
//! folder, URL) needs a displayable bitmap, and many UI surfaces ask for the
//! same target at once. This crate turns a [`Referent`] into a durable PNG on
//! disk, extracting at most once per distinct target and serving everyone
//! else from a persisted cache. It also composes grid icons from several
//! resolved icons and derives grayscale variants.
//!
//! No error crosses the [`IconEngine`] boundary: failures are logged and the
//! operation yields `None`, for which callers show [`IconEngine::default_icon`].
//!
//! # Example
//!
//! ```rust,ignore
//! use taskgroups_core::{IconEngine, Referent};
//!
//! #[tokio::main]
//! async fn main() -> taskgroups_core::Result<()> {
//!     let engine = IconEngine::user_default()?;
//!
//!     let icon = engine
//!         .resolve_icon_or_default(&Referent::classify(r"C:\Apps\tool.exe"))
//!         .await;
//!     println!("{:?}", icon);
//!
//!     engine.shutdown().await
//! }
//! ```

pub mod cache;
pub mod cancel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod grid;
pub mod referent;
pub mod variant;

mod api;

// Re-export commonly used types
pub use api::{EngineStats, IconEngineBuilder, PruneReport};
pub use cache::{CacheEntry, PersistentCacheStore, StoreStats};
pub use cancel::CancellationToken;
pub use config::{EngineConfig, EngineSettings};
pub use coordinator::{ResolutionCoordinator, ResolverStats};
pub use error::{IconError, Result};
pub use extract::{
    AppNamespace, EmptyNamespace, FallbackKind, IconExtractor, PackagedApp, StaticNamespace,
    StrategySet,
};
pub use fingerprint::{compute_key, CacheKey};
pub use grid::{GridComposer, GridIconSpec};
pub use referent::{Referent, ReferentKind};
pub use variant::VariantGenerator;

use std::path::PathBuf;
use std::sync::Arc;

use api::EngineState;

/// The icon resolution and caching engine.
///
/// Cheap to clone; clones share the cache, the in-flight table and the
/// counters. Construct one per process and hand clones to every UI surface.
#[derive(Clone)]
pub struct IconEngine {
    inner: Arc<EngineState>,
}

impl IconEngine {
    /// Create a builder for IconEngine.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let engine = IconEngine::builder("./data")
    ///     .read_settings_file(false)
    ///     .build()?;
    /// ```
    pub fn builder(data_dir: impl Into<PathBuf>) -> IconEngineBuilder {
        IconEngineBuilder::new(data_dir)
    }

    /// Create an engine rooted at `data_dir` with default options.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::builder(data_dir).build()
    }

    /// Create an engine in the per-user data directory.
    pub fn user_default() -> Result<Self> {
        IconEngineBuilder::from_config(EngineConfig::user_default()?).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_new_creates_layout() {
        let temp_dir = TempDir::new().unwrap();
        let engine = IconEngine::new(temp_dir.path().join("data")).unwrap();

        let config = engine.config();
        assert!(config.icons_dir.is_dir());
        assert!(config.grids_dir.is_dir());
        assert!(config.variants_dir.is_dir());
        assert_eq!(engine.stats(), EngineStats::default());
    }

    #[tokio::test]
    async fn test_default_icon_is_materialised_once() {
        let temp_dir = TempDir::new().unwrap();
        let engine = IconEngine::new(temp_dir.path()).unwrap();

        let first = engine.default_icon().await.unwrap();
        let second = engine.default_icon().await.unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with(&engine.config().fallback_dir));
    }
}
