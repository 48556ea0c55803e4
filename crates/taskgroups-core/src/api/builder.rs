//! Builder for configuring IconEngine initialization.

use std::path::PathBuf;
use std::sync::Arc;

use crate::api::state::EngineState;
use crate::cache::PersistentCacheStore;
use crate::config::EngineConfig;
use crate::coordinator::ResolutionCoordinator;
use crate::error::Result;
use crate::extract::{AppNamespace, EmptyNamespace, IconExtractor, StrategySet};
use crate::grid::GridComposer;
use crate::variant::VariantGenerator;
use crate::IconEngine;
use tracing::info;

/// Builder for configuring IconEngine initialization.
///
/// # Example
///
/// ```rust,ignore
/// use taskgroups_core::{IconEngine, StaticNamespace};
///
/// let engine = IconEngine::builder("/var/lib/taskgroups")
///     .with_namespace(StaticNamespace::from_json(&apps_json)?)
///     .build()?;
/// ```
pub struct IconEngineBuilder {
    config: EngineConfig,
    namespace: Arc<dyn AppNamespace>,
    extractor: Option<Arc<dyn IconExtractor>>,
    read_settings: bool,
}

impl IconEngineBuilder {
    /// Create a builder with every path derived from `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self::from_config(EngineConfig::for_data_dir(data_dir))
    }

    /// Create a builder from a prepared configuration.
    pub fn from_config(config: EngineConfig) -> Self {
        Self {
            config,
            namespace: Arc::new(EmptyNamespace),
            extractor: None,
            read_settings: true,
        }
    }

    /// Packaged-app namespace used for AUMID referents.
    ///
    /// Default: [`EmptyNamespace`]
    pub fn with_namespace(self, namespace: impl AppNamespace + 'static) -> Self {
        self.with_shared_namespace(Arc::new(namespace))
    }

    pub fn with_shared_namespace(mut self, namespace: Arc<dyn AppNamespace>) -> Self {
        self.namespace = namespace;
        self
    }

    /// Replace the strategy chains with a custom extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn IconExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Whether to apply `engine-settings.json` from the data directory.
    ///
    /// Default: `true`
    pub fn read_settings_file(mut self, enable: bool) -> Self {
        self.read_settings = enable;
        self
    }

    /// Create the directory layout, load the persisted cache and wire up
    /// the components.
    pub fn build(self) -> Result<IconEngine> {
        let config = if self.read_settings {
            self.config.with_settings_file()
        } else {
            self.config
        };
        config.ensure_dirs()?;

        let store = PersistentCacheStore::load(&config.cache_file, config.save_debounce);
        let strategies = StrategySet::new(&config, self.namespace);
        let fallback = strategies.fallback().clone();
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(strategies) as Arc<dyn IconExtractor>);

        let coordinator = ResolutionCoordinator::new(store, extractor, &config.icons_dir);
        let grid = GridComposer::new(&config);
        let variants = VariantGenerator::new(&config.variants_dir);

        info!(
            "Icon engine ready at {} ({} cached icons)",
            config.data_dir.display(),
            coordinator.store().len()
        );

        Ok(IconEngine {
            inner: Arc::new(EngineState {
                config,
                coordinator,
                fallback,
                grid,
                variants,
            }),
        })
    }
}
