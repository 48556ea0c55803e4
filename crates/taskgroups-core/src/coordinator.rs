//! Request deduplication in front of the extractor.
//!
//! For every cache key at most one extraction runs at a time. The first caller
//! to miss the cache becomes the leader: it registers an in-flight entry and
//! spawns the extraction as an independent task. Everyone else arriving for
//! the same key subscribes to that entry and receives the same outcome.
//!
//! The extraction task owns the work, not the caller. A caller that cancels
//! stops waiting, but the task still runs to completion and populates the
//! cache for whoever asks next.

use crate::cache::{CacheEntry, PersistentCacheStore};
use crate::cancel::CancellationToken;
use crate::extract::IconExtractor;
use crate::fingerprint::{compute_key_or_fallback, CacheKey};
use crate::referent::Referent;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Result of one extraction, shared by every waiter. `None` means no usable
/// icon was produced.
type Outcome = Option<PathBuf>;

/// `None` while the extraction is running.
type OutcomeReceiver = watch::Receiver<Option<Outcome>>;

/// Counters describing coordinator activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    /// Served from the store without extraction.
    pub hits: u64,
    /// Misses that started a new extraction (including forced ones).
    pub misses: u64,
    /// Callers that joined an extraction already in flight.
    pub joined: u64,
    pub extractions: u64,
    pub failures: u64,
    /// Callers that stopped waiting because their token fired.
    pub cancellations: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    joined: AtomicU64,
    extractions: AtomicU64,
    failures: AtomicU64,
    cancellations: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ResolverStats {
        ResolverStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            extractions: self.extractions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
        }
    }
}

/// Resolves referents to icon files, extracting at most once per key.
#[derive(Clone)]
pub struct ResolutionCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: PersistentCacheStore,
    extractor: Arc<dyn IconExtractor>,
    icons_dir: PathBuf,
    in_flight: Mutex<HashMap<CacheKey, OutcomeReceiver>>,
    counters: Counters,
}

impl ResolutionCoordinator {
    pub fn new(
        store: PersistentCacheStore,
        extractor: Arc<dyn IconExtractor>,
        icons_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                extractor,
                icons_dir: icons_dir.into(),
                in_flight: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
        }
    }

    pub fn store(&self) -> &PersistentCacheStore {
        &self.inner.store
    }

    pub fn stats(&self) -> ResolverStats {
        self.inner.counters.snapshot()
    }

    /// Number of extractions currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.lock_in_flight().len()
    }

    /// Keys with an extraction currently running.
    pub fn in_flight_keys(&self) -> Vec<CacheKey> {
        self.inner.lock_in_flight().keys().cloned().collect()
    }

    /// Resolve `referent`, serving a valid cache entry when there is one.
    pub async fn resolve(&self, referent: &Referent, token: &CancellationToken) -> Option<PathBuf> {
        self.resolve_with(referent, token, false).await
    }

    /// Resolve `referent`, ignoring any cached entry.
    ///
    /// An extraction already in flight for the key is joined rather than
    /// duplicated; it is fresh by definition.
    pub async fn regenerate(
        &self,
        referent: &Referent,
        token: &CancellationToken,
    ) -> Option<PathBuf> {
        self.resolve_with(referent, token, true).await
    }

    async fn resolve_with(
        &self,
        referent: &Referent,
        token: &CancellationToken,
        force: bool,
    ) -> Option<PathBuf> {
        let counters = &self.inner.counters;
        if token.is_cancelled() {
            Counters::bump(&counters.cancellations);
            return None;
        }

        let key = compute_key_or_fallback(referent);

        // The stat happens without the in-flight lock held.
        let mut seen_entry = false;
        if !force {
            if let Some(entry) = self.inner.store.get(&key) {
                if entry.icon_exists() {
                    Counters::bump(&counters.hits);
                    debug!("Icon cache hit for {}", referent);
                    return Some(entry.icon_path);
                }
                seen_entry = true;
                debug!(
                    "Cached icon {} for {} is gone, re-extracting",
                    entry.icon_path.display(),
                    referent
                );
            }
        }

        let receiver = {
            let mut in_flight = self.inner.lock_in_flight();

            // An extraction may have finished between the lookup and the lock.
            if !force && !seen_entry && !in_flight.contains_key(&key) {
                if let Some(entry) = self.inner.store.get(&key) {
                    Counters::bump(&counters.hits);
                    debug!("Icon cache hit for {} after a concurrent extraction", referent);
                    return Some(entry.icon_path);
                }
            }

            match in_flight.get(&key) {
                Some(receiver) => {
                    Counters::bump(&counters.joined);
                    debug!("Joining in-flight extraction for {}", referent);
                    receiver.clone()
                }
                None => {
                    Counters::bump(&counters.misses);
                    let (sender, receiver) = watch::channel(None);
                    in_flight.insert(key.clone(), receiver.clone());
                    self.spawn_extraction(key, referent.clone(), sender);
                    receiver
                }
            }
        };

        tokio::select! {
            outcome = wait_for_outcome(receiver) => outcome,
            _ = token.cancelled() => {
                Counters::bump(&counters.cancellations);
                debug!("Stopped waiting for {} (cancelled)", referent);
                None
            }
        }
    }

    fn spawn_extraction(
        &self,
        key: CacheKey,
        referent: Referent,
        sender: watch::Sender<Option<Outcome>>,
    ) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            // Removes the in-flight entry after the outcome is published,
            // including when the extractor panics.
            let _registration = Registration {
                inner: Arc::clone(&inner),
                key: key.clone(),
            };

            Counters::bump(&inner.counters.extractions);
            let dest = inner.icons_dir.join(format!("{}.png", key.file_stem()));
            let outcome = match inner.extractor.extract(&referent, &dest).await {
                Ok(path) => {
                    inner
                        .store
                        .put(CacheEntry::new(key, &path, referent.describe()));
                    Some(path)
                }
                Err(e) => {
                    Counters::bump(&inner.counters.failures);
                    warn!("Icon extraction failed for {}: {}", referent, e);
                    None
                }
            };
            sender.send_replace(Some(outcome));
        });
    }
}

async fn wait_for_outcome(mut receiver: OutcomeReceiver) -> Outcome {
    match receiver.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone().flatten(),
        // Sender dropped without publishing: the task panicked.
        Err(_) => None,
    }
}

impl Inner {
    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<CacheKey, OutcomeReceiver>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Registration {
    inner: Arc<Inner>,
    key: CacheKey,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.inner.lock_in_flight().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IconError, Result};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;

    struct CountingExtractor {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingExtractor {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(10),
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IconExtractor for CountingExtractor {
        async fn extract(&self, referent: &Referent, dest: &Path) -> Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(IconError::ExtractionUnsupported {
                    referent: referent.describe(),
                });
            }
            std::fs::create_dir_all(dest.parent().unwrap())?;
            std::fs::write(dest, b"icon")?;
            Ok(dest.to_path_buf())
        }
    }

    struct Fixture {
        temp_dir: TempDir,
        coordinator: ResolutionCoordinator,
    }

    fn fixture(extractor: Arc<CountingExtractor>) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let store = PersistentCacheStore::new(
            temp_dir.path().join("icon-cache.json"),
            Duration::from_millis(20),
        );
        let coordinator =
            ResolutionCoordinator::new(store, extractor, temp_dir.path().join("icons"));
        Fixture {
            temp_dir,
            coordinator,
        }
    }

    fn url(n: u32) -> Referent {
        Referent::PlainUrl(format!("https://example.com/{}", n))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_share_one_extraction() {
        let extractor = CountingExtractor::new(Duration::from_millis(100));
        let fx = fixture(Arc::clone(&extractor));
        let referent = url(1);

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let coordinator = fx.coordinator.clone();
                let referent = referent.clone();
                tokio::spawn(async move {
                    coordinator
                        .resolve(&referent, &CancellationToken::new())
                        .await
                })
            })
            .collect();
        let results: Vec<Option<PathBuf>> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(extractor.calls(), 1);
        let first = results[0].clone().unwrap();
        assert!(results.iter().all(|r| r.as_ref() == Some(&first)));

        let stats = fx.coordinator.stats();
        assert_eq!(stats.extractions, 1);
        assert_eq!(stats.misses + stats.joined + stats.hits, 50);
        assert_eq!(fx.coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_resolution_is_idempotent() {
        let extractor = CountingExtractor::new(Duration::from_millis(1));
        let fx = fixture(Arc::clone(&extractor));
        let token = CancellationToken::new();

        let first = fx.coordinator.resolve(&url(2), &token).await.unwrap();
        let second = fx.coordinator.resolve(&url(2), &token).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(extractor.calls(), 1);
        assert_eq!(fx.coordinator.stats().hits, 1);
        assert!(first.starts_with(fx.temp_dir.path().join("icons")));
    }

    #[tokio::test]
    async fn test_missing_icon_file_is_a_miss() {
        let extractor = CountingExtractor::new(Duration::from_millis(1));
        let fx = fixture(Arc::clone(&extractor));
        let token = CancellationToken::new();

        let path = fx.coordinator.resolve(&url(3), &token).await.unwrap();
        std::fs::remove_file(&path).unwrap();
        let again = fx.coordinator.resolve(&url(3), &token).await.unwrap();

        assert_eq!(again, path);
        assert!(again.is_file());
        assert_eq!(extractor.calls(), 2);
    }

    #[tokio::test]
    async fn test_stored_entry_is_served_without_extraction() {
        let extractor = CountingExtractor::new(Duration::from_millis(1));
        let fx = fixture(Arc::clone(&extractor));
        let referent = url(8);
        let icon = fx.temp_dir.path().join("stored.png");
        std::fs::write(&icon, b"icon").unwrap();
        fx.coordinator.store().put(CacheEntry::new(
            compute_key_or_fallback(&referent),
            &icon,
            referent.describe(),
        ));

        let result = fx.coordinator.resolve(&referent, &CancellationToken::new()).await;

        assert_eq!(result, Some(icon));
        assert_eq!(extractor.calls(), 0);
        assert_eq!(fx.coordinator.stats().hits, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stale_entry_callers_share_one_extraction() {
        let extractor = CountingExtractor::new(Duration::from_millis(100));
        let fx = fixture(Arc::clone(&extractor));
        let token = CancellationToken::new();
        let path = fx.coordinator.resolve(&url(9), &token).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let coordinator = fx.coordinator.clone();
                tokio::spawn(async move {
                    coordinator.resolve(&url(9), &CancellationToken::new()).await
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            assert_eq!(result.unwrap(), Some(path.clone()));
        }

        assert_eq!(extractor.calls(), 2);
        assert_eq!(fx.coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_regenerate_bypasses_cache() {
        let extractor = CountingExtractor::new(Duration::from_millis(1));
        let fx = fixture(Arc::clone(&extractor));
        let token = CancellationToken::new();

        fx.coordinator.resolve(&url(4), &token).await.unwrap();
        fx.coordinator.regenerate(&url(4), &token).await.unwrap();

        assert_eq!(extractor.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_returns_none_and_caches_nothing() {
        let extractor = CountingExtractor::failing();
        let fx = fixture(Arc::clone(&extractor));

        let result = fx.coordinator.resolve(&url(5), &CancellationToken::new()).await;

        assert!(result.is_none());
        assert!(fx.coordinator.store().is_empty());
        assert_eq!(fx.coordinator.stats().failures, 1);
        assert_eq!(fx.coordinator.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_caller_does_not_abort_extraction() {
        let extractor = CountingExtractor::new(Duration::from_millis(200));
        let fx = fixture(Arc::clone(&extractor));
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        let result = fx.coordinator.resolve(&url(6), &token).await;
        assert!(result.is_none());
        assert_eq!(fx.coordinator.stats().cancellations, 1);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(fx.coordinator.store().len(), 1);

        let cached = fx
            .coordinator
            .resolve(&url(6), &CancellationToken::new())
            .await;
        assert!(cached.is_some());
        assert_eq!(extractor.calls(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_short_circuits() {
        let extractor = CountingExtractor::new(Duration::from_millis(1));
        let fx = fixture(Arc::clone(&extractor));
        let token = CancellationToken::new();
        token.cancel();

        assert!(fx.coordinator.resolve(&url(7), &token).await.is_none());
        assert_eq!(extractor.calls(), 0);
    }
}
