//! Persistent key → icon path store.
//!
//! The in-memory map is the source of truth while the process runs; the JSON
//! document on disk is a mirror that is rewritten in full, at most once per
//! debounce window, no matter how many entries change in that window.
//!
//! Lock discipline: the map's `RwLock` is only ever held to copy, insert or
//! remove entries. Serialization and disk I/O happen on a snapshot taken under
//! the separate `save_lock`, so readers never wait on the disk.

use super::atomic::{atomic_read_json, atomic_write_json};
use crate::error::{IconError, Result};
use crate::fingerprint::CacheKey;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// On-disk representation: flat mapping of cache key to absolute icon path.
type CacheDocument = BTreeMap<String, PathBuf>;

/// One resolved icon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub icon_path: PathBuf,
    /// Description of the referent that produced the icon. Only known for
    /// entries created in this process; the cache file stores paths alone.
    pub source: Option<String>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, icon_path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            key,
            icon_path: icon_path.into(),
            source: Some(source.into()),
        }
    }

    /// Whether the icon file this entry points at is still on disk.
    pub fn icon_exists(&self) -> bool {
        self.icon_path.is_file()
    }
}

/// Snapshot of store counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub entries: usize,
    pub saves: u64,
    pub last_saved: Option<DateTime<Utc>>,
}

/// Key → icon mapping mirrored to a JSON file.
///
/// Cloning is cheap; all clones share the same map.
#[derive(Clone)]
pub struct PersistentCacheStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    path: PathBuf,
    debounce: Duration,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    dirty: AtomicBool,
    flush_scheduled: AtomicBool,
    save_lock: Mutex<()>,
    saves: AtomicU64,
    last_saved: Mutex<Option<DateTime<Utc>>>,
}

impl PersistentCacheStore {
    /// An empty store that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self::from_entries(path.into(), debounce, HashMap::new())
    }

    /// Load the store from `path`.
    ///
    /// Never fails: a missing file yields an empty store, and a corrupt one is
    /// moved aside to `<name>.corrupt` before starting empty.
    pub fn load(path: impl Into<PathBuf>, debounce: Duration) -> Self {
        let path = path.into();
        let entries = match read_document(&path) {
            Ok(Some(document)) => {
                let entries: HashMap<_, _> = document
                    .into_iter()
                    .map(|(raw, icon_path)| {
                        let key = CacheKey::from_raw(raw);
                        let entry = CacheEntry {
                            key: key.clone(),
                            icon_path,
                            source: None,
                        };
                        (key, entry)
                    })
                    .collect();
                info!("Loaded {} icon cache entries from {}", entries.len(), path.display());
                entries
            }
            Ok(None) => {
                debug!("No icon cache at {}, starting empty", path.display());
                HashMap::new()
            }
            Err(e) => {
                warn!("{}; starting with an empty icon cache", e);
                quarantine(&path);
                HashMap::new()
            }
        };
        Self::from_entries(path, debounce, entries)
    }

    fn from_entries(
        path: PathBuf,
        debounce: Duration,
        entries: HashMap<CacheKey, CacheEntry>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                path,
                debounce,
                entries: RwLock::new(entries),
                dirty: AtomicBool::new(false),
                flush_scheduled: AtomicBool::new(false),
                save_lock: Mutex::new(()),
                saves: AtomicU64::new(0),
                last_saved: Mutex::new(None),
            }),
        }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Copy of the entry for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.read_entries().get(key).cloned()
    }

    /// Insert or overwrite an entry and schedule a debounced save.
    pub fn put(&self, entry: CacheEntry) {
        self.write_entries().insert(entry.key.clone(), entry);
        self.schedule_save();
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every entry.
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.read_entries().values().cloned().collect()
    }

    /// Drop entries whose icon file no longer exists.
    ///
    /// Existence is checked outside the lock; an entry overwritten in between
    /// is left alone.
    pub fn prune_missing(&self) -> usize {
        let missing: Vec<CacheEntry> = self
            .entries()
            .into_iter()
            .filter(|entry| !entry.icon_exists())
            .collect();

        let mut removed = 0;
        {
            let mut entries = self.write_entries();
            for stale in &missing {
                if entries.get(&stale.key).map(|e| &e.icon_path) == Some(&stale.icon_path) {
                    entries.remove(&stale.key);
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!("Pruned {} icon cache entries with missing files", removed);
            self.schedule_save();
        }
        removed
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            entries: self.len(),
            saves: self.inner.saves.load(Ordering::SeqCst),
            last_saved: *self
                .inner
                .last_saved
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Whether there are changes not yet written to disk.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Write the full map to disk now, regardless of the dirty flag.
    ///
    /// Blocking; call from a blocking context.
    pub fn save(&self) -> Result<()> {
        let _guard = self
            .inner
            .save_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Cleared before the snapshot so a put racing with this save re-dirties.
        self.inner.dirty.store(false, Ordering::SeqCst);
        let document: CacheDocument = self
            .read_entries()
            .values()
            .map(|entry| (entry.key.as_str().to_string(), entry.icon_path.clone()))
            .collect();

        if let Err(e) = atomic_write_json(&self.inner.path, &document) {
            self.inner.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }

        self.inner.saves.fetch_add(1, Ordering::SeqCst);
        *self
            .inner
            .last_saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        debug!(
            "Saved {} icon cache entries to {}",
            document.len(),
            self.inner.path.display()
        );
        Ok(())
    }

    /// Write to disk if anything changed since the last save.
    pub fn save_if_dirty(&self) -> Result<()> {
        if self.is_dirty() {
            self.save()
        } else {
            Ok(())
        }
    }

    /// Flush pending changes from async code.
    pub async fn flush(&self) -> Result<()> {
        if !self.is_dirty() {
            return Ok(());
        }
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.save())
            .await
            .map_err(|e| IconError::Other(format!("Cache save task failed: {}", e)))?
    }

    /// Coalesce saves: the first change in a window arms a timer, later ones
    /// only mark the map dirty.
    fn schedule_save(&self) {
        self.inner.dirty.store(true, Ordering::SeqCst);
        if self.inner.flush_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.clone();
                handle.spawn(async move {
                    tokio::time::sleep(store.inner.debounce).await;
                    store.inner.flush_scheduled.store(false, Ordering::SeqCst);
                    if let Err(e) = store.flush().await {
                        warn!("Debounced icon cache save failed: {}", e);
                    }
                });
            }
            Err(_) => {
                // No runtime to debounce on: write through.
                self.inner.flush_scheduled.store(false, Ordering::SeqCst);
                if let Err(e) = self.save_if_dirty() {
                    warn!("Icon cache save failed: {}", e);
                }
            }
        }
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_document(path: &Path) -> Result<Option<CacheDocument>> {
    atomic_read_json::<CacheDocument>(path).map_err(|e| IconError::CacheCorrupted {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Move an unreadable cache file out of the way so the next save succeeds and
/// the original stays available for inspection.
fn quarantine(path: &Path) {
    let mut aside = path.as_os_str().to_owned();
    aside.push(".corrupt");
    if let Err(e) = std::fs::rename(path, &aside) {
        warn!("Failed to move corrupt icon cache aside: {}", e);
    }
}
