//! Stale-while-revalidate reads.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chorus_core::{ChorusError, ChorusResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;

use super::freshness::CacheRead;
use super::ttl_store::{TtlCache, WriteOutcome};

/// How a background refresh ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Fresh data was fetched and handed to the consumer.
    Updated,
    /// A newer write to the key happened while fetching; the result was dropped.
    Superseded,
    /// The fetch failed or timed out; the stale entry stays in place.
    Failed(ChorusError),
    /// The refresh task was aborted before it finished.
    Cancelled,
}

/// Handle to a detached background refresh.
///
/// Dropping the handle does not stop the refresh.
#[derive(Debug)]
pub struct RefreshHandle {
    task: JoinHandle<RefreshOutcome>,
}

impl RefreshHandle {
    /// Wait for the refresh to finish.
    pub async fn outcome(self) -> RefreshOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_panic() {
                    tracing::error!(error = %e, "background refresh panicked");
                }
                RefreshOutcome::Cancelled
            }
        }
    }

    /// Stop the refresh. A fetch still in flight is dropped.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Value returned by [`RevalidatingFetcher::fetch_with_cache`].
#[derive(Debug)]
pub struct Fetched<T> {
    read: CacheRead<T>,
    refresh: Option<RefreshHandle>,
}

impl<T> Fetched<T> {
    pub(crate) fn uncached(read: CacheRead<T>) -> Self {
        Self {
            read,
            refresh: None,
        }
    }

    pub fn read(&self) -> &CacheRead<T> {
        &self.read
    }

    pub fn value(&self) -> &T {
        self.read.value()
    }

    pub fn into_value(self) -> T {
        self.read.into_value()
    }

    /// The background refresh, present only when the value came from the cache.
    pub fn refresh(&self) -> Option<&RefreshHandle> {
        self.refresh.as_ref()
    }

    pub fn into_parts(self) -> (CacheRead<T>, Option<RefreshHandle>) {
        (self.read, self.refresh)
    }
}

/// Serves cached values immediately and refreshes them in the background.
///
/// Conflict policy: a refresh only stores its result if no other write to
/// the key happened since the refresh started. Otherwise the newer write
/// wins and the refresh reports [`RefreshOutcome::Superseded`].
#[derive(Debug, Clone)]
pub struct RevalidatingFetcher {
    cache: Arc<TtlCache>,
    refresh_timeout: Duration,
}

impl RevalidatingFetcher {
    pub fn new(cache: Arc<TtlCache>, refresh_timeout: Duration) -> Self {
        Self {
            cache,
            refresh_timeout,
        }
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub fn refresh_timeout(&self) -> Duration {
        self.refresh_timeout
    }

    /// Read `key` through the cache.
    ///
    /// On a hit the cached value is returned at once and `fetch` runs in a
    /// detached task. On a miss `fetch` is awaited (bounded by the refresh
    /// timeout), its result cached for `ttl` and returned; its error
    /// propagates.
    pub async fn fetch_with_cache<T, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        ttl: Duration,
    ) -> ChorusResult<Fetched<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ChorusResult<T>> + Send + 'static,
    {
        self.fetch_with_cache_then(key, fetch, ttl, |_| {}).await
    }

    /// Like [`fetch_with_cache`](Self::fetch_with_cache), and hands a
    /// successful, non-superseded background refresh result to `on_refresh`.
    pub async fn fetch_with_cache_then<T, F, Fut, R>(
        &self,
        key: &str,
        fetch: F,
        ttl: Duration,
        on_refresh: R,
    ) -> ChorusResult<Fetched<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ChorusResult<T>> + Send + 'static,
        R: FnOnce(T) + Send + 'static,
    {
        if let Some(read) = self.cache.read::<T>(key) {
            let refresh = self.spawn_refresh(key, fetch, ttl, on_refresh);
            return Ok(Fetched {
                read,
                refresh: Some(refresh),
            });
        }

        let value = match tokio::time::timeout(self.refresh_timeout, fetch()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(key, timeout_ms = self.refresh_timeout.as_millis() as u64, "fetch timed out with no cached value");
                return Err(ChorusError::timeout(format!("fetch {key}"), self.refresh_timeout));
            }
        };

        let stored_at = self.cache.clock().now_millis();
        self.cache.set(key, &value, ttl);
        let expires_at = stored_at.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));
        Ok(Fetched::uncached(CacheRead::from_remote(
            value, stored_at, expires_at,
        )))
    }

    fn spawn_refresh<T, F, Fut, R>(
        &self,
        key: &str,
        fetch: F,
        ttl: Duration,
        on_refresh: R,
    ) -> RefreshHandle
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ChorusResult<T>> + Send + 'static,
        R: FnOnce(T) + Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        let key = key.to_string();
        let timeout = self.refresh_timeout;
        let version = cache.version(&key);

        let task = tokio::spawn(async move {
            let value = match tokio::time::timeout(timeout, fetch()).await {
                Ok(Ok(value)) => value,
                Ok(Err(e)) => {
                    tracing::warn!(key = %key, error = %e, "background refresh failed, keeping stale entry");
                    return RefreshOutcome::Failed(e);
                }
                Err(_) => {
                    tracing::warn!(key = %key, timeout_ms = timeout.as_millis() as u64, "background refresh timed out");
                    return RefreshOutcome::Failed(ChorusError::timeout(
                        format!("refresh {key}"),
                        timeout,
                    ));
                }
            };

            match cache.set_if_version(&key, &value, ttl, version) {
                WriteOutcome::Superseded => RefreshOutcome::Superseded,
                // A failed cache write still produced fresh data.
                WriteOutcome::Written | WriteOutcome::Failed => {
                    on_refresh(value);
                    RefreshOutcome::Updated
                }
            }
        });

        RefreshHandle { task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::medium::MemoryMedium;
    use chorus_core::{ManualClock, RemoteFetchError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(600);

    fn fetcher() -> RevalidatingFetcher {
        let cache = TtlCache::new(
            Arc::new(MemoryMedium::new()),
            Arc::new(ManualClock::new(0)),
            "chorus",
        );
        RevalidatingFetcher::new(Arc::new(cache), Duration::from_millis(200))
    }

    fn network_error() -> ChorusError {
        RemoteFetchError::Transport {
            resource: "clients".to_string(),
            reason: "network".to_string(),
        }
        .into()
    }

    #[tokio::test]
    async fn test_miss_fetches_and_caches() {
        let fetcher = fetcher();
        let fetched = fetcher
            .fetch_with_cache("clients", || async { Ok(vec!["Acme".to_string()]) }, TTL)
            .await
            .unwrap();

        assert!(fetched.read().was_cache_miss());
        assert!(fetched.refresh().is_none());
        assert_eq!(
            fetcher.cache().get::<Vec<String>>("clients"),
            Some(vec!["Acme".to_string()])
        );
    }

    #[tokio::test]
    async fn test_miss_propagates_fetch_error() {
        let fetcher = fetcher();
        let err = fetcher
            .fetch_with_cache::<Vec<String>, _, _>("clients", || async { Err(network_error()) }, TTL)
            .await
            .unwrap_err();
        assert_eq!(err, network_error());
        assert!(fetcher.cache().keys().is_empty());
    }

    #[tokio::test]
    async fn test_hit_with_failing_refresh_returns_stale_value() {
        let fetcher = fetcher();
        fetcher.cache().set("clients", &vec!["Stale".to_string()], TTL);

        let fetched = fetcher
            .fetch_with_cache::<Vec<String>, _, _>("clients", || async { Err(network_error()) }, TTL)
            .await
            .unwrap();
        assert!(fetched.read().was_cache_hit());

        let (read, refresh) = fetched.into_parts();
        assert_eq!(read.into_value(), vec!["Stale".to_string()]);
        let outcome = refresh.unwrap().outcome().await;
        assert_eq!(outcome, RefreshOutcome::Failed(network_error()));
        assert_eq!(
            fetcher.cache().get::<Vec<String>>("clients"),
            Some(vec!["Stale".to_string()])
        );
    }

    #[tokio::test]
    async fn test_hit_refresh_overwrites_and_notifies() {
        let fetcher = fetcher();
        fetcher.cache().set("clients", &vec!["Old".to_string()], TTL);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_callback = Arc::clone(&seen);

        let fetched = fetcher
            .fetch_with_cache_then(
                "clients",
                || async { Ok(vec!["New".to_string(), "Newer".to_string()]) },
                TTL,
                move |v: Vec<String>| {
                    seen_in_callback.store(v.len(), Ordering::SeqCst);
                },
            )
            .await
            .unwrap();
        assert_eq!(fetched.value(), &vec!["Old".to_string()]);

        let (_, refresh) = fetched.into_parts();
        assert_eq!(refresh.unwrap().outcome().await, RefreshOutcome::Updated);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(
            fetcher.cache().get::<Vec<String>>("clients").unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_write_during_refresh_wins() {
        let fetcher = fetcher();
        fetcher.cache().set("clients", &vec!["Old".to_string()], TTL);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let fetched = fetcher
            .fetch_with_cache(
                "clients",
                move || async move {
                    let _ = release_rx.await;
                    Ok(vec!["FromServer".to_string()])
                },
                TTL,
            )
            .await
            .unwrap();

        fetcher.cache().set("clients", &vec!["Local".to_string()], TTL);
        release_tx.send(()).unwrap();

        let (_, refresh) = fetched.into_parts();
        assert_eq!(refresh.unwrap().outcome().await, RefreshOutcome::Superseded);
        assert_eq!(
            fetcher.cache().get::<Vec<String>>("clients"),
            Some(vec!["Local".to_string()])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_timeout_keeps_stale_entry() {
        let fetcher = fetcher();
        fetcher.cache().set("clients", &vec!["Stale".to_string()], TTL);

        let fetched = fetcher
            .fetch_with_cache::<Vec<String>, _, _>(
                "clients",
                || async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(vec!["Late".to_string()])
                },
                TTL,
            )
            .await
            .unwrap();

        let (_, refresh) = fetched.into_parts();
        match refresh.unwrap().outcome().await {
            RefreshOutcome::Failed(e) => assert!(e.is_timeout()),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            fetcher.cache().get::<Vec<String>>("clients"),
            Some(vec!["Stale".to_string()])
        );
    }

    #[tokio::test]
    async fn test_abort_cancels_refresh() {
        let fetcher = fetcher();
        fetcher.cache().set("clients", &vec!["Stale".to_string()], TTL);

        let fetched = fetcher
            .fetch_with_cache::<Vec<String>, _, _>(
                "clients",
                || std::future::pending(),
                TTL,
            )
            .await
            .unwrap();
        let (_, refresh) = fetched.into_parts();
        let refresh = refresh.unwrap();
        refresh.abort();
        assert_eq!(refresh.outcome().await, RefreshOutcome::Cancelled);
    }
}
