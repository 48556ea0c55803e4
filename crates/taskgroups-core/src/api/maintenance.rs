//! Statistics, cache maintenance and lifecycle methods for IconEngine.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::run_blocking;
use crate::cache::StoreStats;
use crate::config::CacheConfig;
use crate::coordinator::ResolverStats;
use crate::error::Result;
use crate::IconEngine;

/// Engine-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub resolver: ResolverStats,
    pub store: StoreStats,
    pub in_flight: usize,
}

/// What a prune pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Cache entries whose icon file was gone.
    pub entries_removed: usize,
    /// Files in the icons directory no entry referenced.
    pub files_removed: usize,
}

impl IconEngine {
    pub fn stats(&self) -> EngineStats {
        let coordinator = &self.inner.coordinator;
        EngineStats {
            resolver: coordinator.stats(),
            store: coordinator.store().stats(),
            in_flight: coordinator.in_flight(),
        }
    }

    /// Drop entries whose icon is gone, then delete extracted icons that no
    /// entry points at. Files of extractions still running are kept.
    pub async fn prune(&self) -> PruneReport {
        let inner = self.inner.clone();
        let result = run_blocking(move || {
            let store = inner.coordinator.store();
            // Taken before the store snapshot: an extraction that finishes in
            // between is then either still running or already referenced.
            let running: HashSet<String> = inner
                .coordinator
                .in_flight_keys()
                .iter()
                .map(|key| key.file_stem())
                .collect();

            let entries_removed = store.prune_missing();
            let referenced: HashSet<PathBuf> =
                store.entries().into_iter().map(|e| e.icon_path).collect();

            let mut files_removed = 0;
            for entry in WalkDir::new(&inner.config.icons_dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy();
                // Atomic-write temp files belong to writes in progress.
                if name.ends_with(".tmp") || referenced.contains(path) {
                    continue;
                }
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if running.contains(&stem) {
                    continue;
                }
                match std::fs::remove_file(path) {
                    Ok(()) => {
                        debug!("Removed orphaned icon {}", path.display());
                        files_removed += 1;
                    }
                    Err(e) => warn!("Failed to remove orphaned icon {}: {}", path.display(), e),
                }
            }

            Ok(PruneReport {
                entries_removed,
                files_removed,
            })
        })
        .await;

        match result {
            Ok(report) => {
                info!(
                    "Pruned {} stale entries and {} orphaned icons",
                    report.entries_removed, report.files_removed
                );
                report
            }
            Err(e) => {
                warn!("Icon cache prune failed: {}", e);
                PruneReport::default()
            }
        }
    }

    /// Write pending cache changes now instead of at the end of the debounce
    /// window.
    pub async fn flush(&self) -> Result<()> {
        self.inner.coordinator.store().flush().await
    }

    /// Wait briefly for running extractions, then flush. Call on application
    /// exit so the last results survive the restart.
    pub async fn shutdown(&self) -> Result<()> {
        let started = Instant::now();
        while self.inner.coordinator.in_flight() > 0 {
            if started.elapsed() >= CacheConfig::SHUTDOWN_GRACE {
                warn!(
                    "Shutting down with {} icon extractions still running",
                    self.inner.coordinator.in_flight()
                );
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        self.flush().await?;
        info!("Icon engine shut down");
        Ok(())
    }
}
