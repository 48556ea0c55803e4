//! Icon resolution methods for IconEngine.

use std::path::PathBuf;

use super::composite::absorb;
use super::run_blocking;
use crate::cancel::CancellationToken;
use crate::extract::FallbackKind;
use crate::fingerprint::{compute_key_or_fallback, CacheKey};
use crate::referent::Referent;
use crate::IconEngine;

impl IconEngine {
    /// Icon file for a launch target.
    ///
    /// Served from the cache when a valid entry exists; otherwise extracted
    /// once, however many callers ask concurrently. `None` means no icon
    /// could be produced; callers show [`IconEngine::default_icon`].
    pub async fn resolve_icon(&self, referent: &Referent) -> Option<PathBuf> {
        self.resolve_icon_with(referent, &CancellationToken::new())
            .await
    }

    /// [`IconEngine::resolve_icon`] with a cancellation token.
    ///
    /// Cancelling stops this caller from waiting; the extraction itself runs
    /// on and still populates the cache.
    pub async fn resolve_icon_with(
        &self,
        referent: &Referent,
        token: &CancellationToken,
    ) -> Option<PathBuf> {
        self.inner.coordinator.resolve(referent, token).await
    }

    /// Resolve, substituting the generic default icon on failure.
    pub async fn resolve_icon_or_default(&self, referent: &Referent) -> Option<PathBuf> {
        match self.resolve_icon(referent).await {
            Some(path) => Some(path),
            None => self.default_icon().await,
        }
    }

    /// Re-extract even when a cached entry exists.
    ///
    /// For callers with independent evidence that the cached file is wrong.
    pub async fn invalidate_and_regenerate(&self, referent: &Referent) -> Option<PathBuf> {
        self.inner
            .coordinator
            .regenerate(referent, &CancellationToken::new())
            .await
    }

    /// The generic icon shown when nothing better is available.
    pub async fn default_icon(&self) -> Option<PathBuf> {
        let fallback = self.inner.fallback.clone();
        absorb(
            "materialise default icon",
            run_blocking(move || fallback.materialize(FallbackKind::Default)).await,
        )
    }

    /// Cache key a referent currently maps to.
    pub fn cache_key(&self, referent: &Referent) -> CacheKey {
        compute_key_or_fallback(referent)
    }
}
