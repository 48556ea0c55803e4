//! IconEngine operations, grouped by concern.
//!
//! - `builder`: construction and wiring
//! - `icons`: resolution, regeneration, default icon
//! - `composite`: grid icons and grayscale variants
//! - `maintenance`: statistics, pruning, flushing, shutdown

mod builder;
mod composite;
mod icons;
mod maintenance;
mod state;

pub use builder::IconEngineBuilder;
pub use maintenance::{EngineStats, PruneReport};
pub(crate) use state::EngineState;

use crate::error::{IconError, Result};

/// Run blocking file work off the async worker threads.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| IconError::Other(format!("Blocking task failed: {}", e)))?
}
