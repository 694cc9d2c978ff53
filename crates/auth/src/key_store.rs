//! Cached, single-flight resolution of signing keys by key id.
//!
//! ```text
//! resolve(kid)
//!   → snapshot fresh and contains kid? → hit
//!   → miss: join (or start) the one in-flight fetch
//!   → re-check the fetched set → hit | KeyNotFound
//!   → fetch failed / timed out → KeyResolutionFailed (previous snapshot kept)
//! ```
//!
//! Reads of a fresh snapshot only touch an [`ArcSwapOption`]. Refreshes are
//! serialized through a `tokio::sync::Mutex` slot tagged with a generation
//! counter: a caller that observed generation `g` before missing and finds
//! the slot at a later generation reuses that outcome instead of fetching.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;

use crate::config::{DEFAULT_KEY_CACHE_TTL, DEFAULT_KEY_FETCH_TIMEOUT};
use crate::{AuthFailure, KeyDescriptor, KeyFetchError, KeySet, KeySetProvider};

type FetchOutcome = Result<Arc<KeySet>, KeyFetchError>;

#[derive(Default)]
struct RefreshSlot {
    generation: u64,
    outcome: Option<FetchOutcome>,
}

/// Process-wide key cache, owned by the service and injected where needed.
pub struct KeyStore {
    provider: Arc<dyn KeySetProvider>,
    ttl: Duration,
    fetch_timeout: Duration,
    current: ArcSwapOption<KeySet>,
    generation: AtomicU64,
    refresh: Mutex<RefreshSlot>,
}

impl KeyStore {
    pub fn new(provider: Arc<dyn KeySetProvider>) -> Self {
        Self::with_settings(provider, DEFAULT_KEY_CACHE_TTL, DEFAULT_KEY_FETCH_TIMEOUT)
    }

    pub fn with_settings(
        provider: Arc<dyn KeySetProvider>,
        ttl: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            ttl,
            fetch_timeout,
            current: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            refresh: Mutex::new(RefreshSlot::default()),
        }
    }

    /// Current key set, fresh or not.
    pub fn snapshot(&self) -> Option<Arc<KeySet>> {
        self.current.load_full()
    }

    /// Resolve the key published under `kid`.
    ///
    /// Returns a copy; callers never hold a reference into the cache.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, kid: &str) -> Result<KeyDescriptor, AuthFailure> {
        // Load the generation before reading the snapshot: a refresh that
        // completes after this point is guaranteed to be seen as newer.
        let observed = self.generation.load(Ordering::Acquire);

        if let Some(key) = self.cached(kid) {
            tracing::trace!("key set cache hit");
            return Ok(key);
        }
        tracing::debug!("key set cache miss");

        let set = self
            .refresh_after(observed)
            .await
            .map_err(AuthFailure::key_resolution_failed)?;

        set.find(kid)
            .cloned()
            .ok_or_else(|| AuthFailure::key_not_found(kid))
    }

    /// Force a refresh, coalescing with any fetch already in flight.
    pub async fn refresh(&self) -> Result<Arc<KeySet>, KeyFetchError> {
        let observed = self.generation.load(Ordering::Acquire);
        self.refresh_after(observed).await
    }

    fn cached(&self, kid: &str) -> Option<KeyDescriptor> {
        let set = self.current.load_full()?;
        if !set.is_fresh(self.ttl) {
            return None;
        }
        set.find(kid).cloned()
    }

    async fn refresh_after(&self, observed: u64) -> FetchOutcome {
        let mut slot = self.refresh.lock().await;

        if slot.generation != observed {
            if let Some(outcome) = &slot.outcome {
                tracing::debug!(generation = slot.generation, "joined completed key set fetch");
                return outcome.clone();
            }
        }

        let outcome = self.fetch().await;
        if let Ok(set) = &outcome {
            self.current.store(Some(Arc::clone(set)));
        }

        slot.generation += 1;
        slot.outcome = Some(outcome.clone());
        self.generation.store(slot.generation, Ordering::Release);

        outcome
    }

    async fn fetch(&self) -> FetchOutcome {
        match tokio::time::timeout(self.fetch_timeout, self.provider.fetch_key_set()).await {
            Ok(Ok(keys)) => {
                let set = KeySet::new(keys);
                tracing::info!(keys = set.len(), "key set refreshed");
                Ok(Arc::new(set))
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "key set fetch failed; keeping previous key set");
                Err(err)
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.fetch_timeout, "key set fetch timed out");
                Err(KeyFetchError::Timeout(self.fetch_timeout))
            }
        }
    }
}

impl core::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyStore")
            .field("ttl", &self.ttl)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("cached_keys", &self.snapshot().map(|set| set.len()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::AuthFailureKind;
    use crate::testutil::{ScriptedKeySetProvider, TestKey};

    fn store(provider: &Arc<ScriptedKeySetProvider>, ttl: Duration) -> Arc<KeyStore> {
        Arc::new(KeyStore::with_settings(
            provider.clone(),
            ttl,
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn fresh_cache_is_served_without_fetching() {
        let provider = Arc::new(ScriptedKeySetProvider::new(vec![TestKey::primary().descriptor()]));
        let store = store(&provider, Duration::from_secs(600));

        let first = store.resolve(TestKey::PRIMARY_KID).await.unwrap();
        let second = store.resolve(TestKey::PRIMARY_KID).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.fetch_count(), 1);
    }

    #[tokio::test]
    async fn unknown_kid_refetches_once_then_fails() {
        let provider = Arc::new(ScriptedKeySetProvider::new(vec![TestKey::primary().descriptor()]));
        let store = store(&provider, Duration::from_secs(600));

        store.resolve(TestKey::PRIMARY_KID).await.unwrap();
        let err = store.resolve("rotated-away").await.unwrap_err();

        assert_eq!(err.kind(), AuthFailureKind::KeyNotFound);
        assert_eq!(err.status(), 400);
        assert_eq!(provider.fetch_count(), 2);
    }

    #[tokio::test]
    async fn newly_published_key_is_picked_up_on_miss() {
        let provider = Arc::new(ScriptedKeySetProvider::new(vec![TestKey::primary().descriptor()]));
        let store = store(&provider, Duration::from_secs(600));
        store.resolve(TestKey::PRIMARY_KID).await.unwrap();

        provider.publish(vec![TestKey::primary().descriptor(), TestKey::rogue().descriptor()]);

        let key = store.resolve(TestKey::ROGUE_KID).await.unwrap();
        assert_eq!(key.kid, TestKey::ROGUE_KID);
        assert_eq!(provider.fetch_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_share_one_fetch() {
        let provider = Arc::new(
            ScriptedKeySetProvider::new(vec![TestKey::primary().descriptor()])
                .with_delay(Duration::from_millis(100)),
        );
        let store = store(&provider, Duration::from_secs(600));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.resolve("unknown-kid").await })
            })
            .collect();

        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert_eq!(err.kind(), AuthFailureKind::KeyNotFound);
        }
        assert_eq!(provider.fetch_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_waiters_observe_the_same_failure() {
        let provider = Arc::new(
            ScriptedKeySetProvider::failing().with_delay(Duration::from_millis(100)),
        );
        let store = store(&provider, Duration::from_secs(600));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.resolve(TestKey::PRIMARY_KID).await })
            })
            .collect();

        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert_eq!(err.kind(), AuthFailureKind::KeyResolutionFailed);
        }
        assert_eq!(provider.fetch_count(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_does_not_poison_cache() {
        let provider = Arc::new(ScriptedKeySetProvider::new(vec![TestKey::primary().descriptor()]));
        let store = store(&provider, Duration::from_secs(600));
        store.resolve(TestKey::PRIMARY_KID).await.unwrap();

        provider.fail_next_fetches();

        let err = store.resolve("unknown-kid").await.unwrap_err();
        assert_eq!(err.kind(), AuthFailureKind::KeyResolutionFailed);
        assert!(err.cause().is_some());

        let key = store.resolve(TestKey::PRIMARY_KID).await.unwrap();
        assert_eq!(key.kid, TestKey::PRIMARY_KID);
        assert_eq!(store.snapshot().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_snapshot_is_refreshed() {
        let provider = Arc::new(ScriptedKeySetProvider::new(vec![TestKey::primary().descriptor()]));
        let store = store(&provider, Duration::from_secs(60));

        store.resolve(TestKey::PRIMARY_KID).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        store.resolve(TestKey::PRIMARY_KID).await.unwrap();
        assert_eq!(provider.fetch_count(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        store.resolve(TestKey::PRIMARY_KID).await.unwrap();
        assert_eq!(provider.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_snapshot_is_not_used_when_refresh_fails() {
        let provider = Arc::new(ScriptedKeySetProvider::new(vec![TestKey::primary().descriptor()]));
        let store = store(&provider, Duration::from_secs(60));
        store.resolve(TestKey::PRIMARY_KID).await.unwrap();

        provider.fail_next_fetches();
        tokio::time::advance(Duration::from_secs(61)).await;

        let err = store.resolve(TestKey::PRIMARY_KID).await.unwrap_err();
        assert_eq!(err.kind(), AuthFailureKind::KeyResolutionFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out() {
        let provider = Arc::new(
            ScriptedKeySetProvider::new(vec![TestKey::primary().descriptor()])
                .with_delay(Duration::from_secs(30)),
        );
        let store = Arc::new(KeyStore::with_settings(
            provider.clone(),
            Duration::from_secs(600),
            Duration::from_secs(2),
        ));

        let err = store.resolve(TestKey::PRIMARY_KID).await.unwrap_err();

        assert_eq!(err.kind(), AuthFailureKind::KeyResolutionFailed);
        let cause = err.cause().expect("timeout retained");
        assert!(cause.to_string().contains("timed out"));
        assert!(store.snapshot().is_none());
    }
}
