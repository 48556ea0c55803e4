//! Shared engine state.

use crate::config::EngineConfig;
use crate::coordinator::ResolutionCoordinator;
use crate::extract::FallbackIcons;
use crate::grid::GridComposer;
use crate::variant::VariantGenerator;

/// Everything an [`crate::IconEngine`] owns. Wrapped in `Arc` so clones of the
/// engine and blocking tasks can share it.
pub(crate) struct EngineState {
    pub(crate) config: EngineConfig,
    pub(crate) coordinator: ResolutionCoordinator,
    pub(crate) fallback: FallbackIcons,
    pub(crate) grid: GridComposer,
    pub(crate) variants: VariantGenerator,
}
