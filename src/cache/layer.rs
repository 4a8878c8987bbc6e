//! Cache layer that orchestrates caching logic with network fetching.

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use super::inflight::{FlightRole, InFlightGuard};
use super::result::CacheResult;
use super::store::RequestCache;
use crate::error::ApiResult;

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the resource client and the network, combining
/// the TTL cache with single-flight request sharing. Clones share the same
/// cache and in-flight registry.
#[derive(Clone)]
pub struct CacheLayer {
  cache: Arc<RequestCache>,
  in_flight: InFlightGuard,
}

impl Default for CacheLayer {
  fn default() -> Self {
    Self::new(RequestCache::default())
  }
}

impl CacheLayer {
  /// Create a new cache layer around the given cache.
  pub fn new(cache: RequestCache) -> Self {
    Self {
      cache: Arc::new(cache),
      in_flight: InFlightGuard::new(),
    }
  }

  /// Create a cache layer whose entries live for `ttl`.
  pub fn with_ttl(ttl: Duration) -> Self {
    Self::new(RequestCache::new(ttl))
  }

  pub fn cache(&self) -> &RequestCache {
    &self.cache
  }

  pub fn in_flight(&self) -> &InFlightGuard {
    &self.in_flight
  }

  /// Fetch with cache-first, single-flight strategy.
  ///
  /// 1. Fresh cache entry: return it, no request
  /// 2. Request already in flight for `key`: wait for it and share its outcome
  /// 3. Otherwise lead a request; store the result on success, release the
  ///    in-flight marker either way, and propagate any error
  pub async fn fetch<F, Fut>(&self, key: &str, fetcher: F) -> ApiResult<CacheResult<Arc<Value>>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<Value>> + Send + 'static,
  {
    if let Some(entry) = self.cache.get_entry(key) {
      return Ok(CacheResult::from_cache(entry.data, entry.cached_at));
    }

    let cache = Arc::clone(&self.cache);
    let owned_key = key.to_string();
    let flight = self.in_flight.begin(key, move || {
      let fetch = fetcher();
      async move {
        let epoch = cache.epoch(&owned_key);

        // A request that settled between our miss and our registration
        if let Some(data) = cache.get(&owned_key) {
          return Ok(data);
        }

        info!(key = %owned_key, "fetching from network");
        match fetch.await {
          Ok(value) => {
            let data = Arc::new(value);
            cache.set_if_current(&owned_key, epoch, Arc::clone(&data));
            Ok(data)
          }
          Err(e) => {
            warn!(key = %owned_key, error = %e, "fetch failed");
            Err(e)
          }
        }
      }
    });

    let role = flight.role();
    let data = flight.resolve().await?;

    Ok(match role {
      FlightRole::Leader => CacheResult::from_network(data),
      FlightRole::Follower => CacheResult::joined(data),
    })
  }

  /// Drop the cached value for `key` and detach any request in flight for
  /// it, so the next read goes to the network.
  pub fn invalidate(&self, key: &str) {
    self.cache.invalidate(key);
    self.in_flight.detach(key);
    debug!(key, "invalidated");
  }

  /// Invalidate every key that starts with `prefix`.
  pub fn invalidate_namespace(&self, prefix: &str) {
    let removed = self.cache.invalidate_namespace(prefix);
    let detached = self.in_flight.detach_namespace(prefix);
    debug!(prefix, removed, detached, "namespace invalidated");
  }

  /// Cancel the request in flight for `key`, if any.
  pub fn cancel(&self, key: &str) -> bool {
    self.in_flight.cancel(key)
  }

  /// Drop all cached data. Requests still in flight will not write back.
  pub fn clear(&self) {
    self.cache.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use crate::error::ApiError;
  use serde_json::json;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn fetcher(
    calls: &Arc<AtomicU32>,
    result: ApiResult<Value>,
  ) -> impl FnOnce() -> futures::future::BoxFuture<'static, ApiResult<Value>> {
    use futures::FutureExt;
    let calls = Arc::clone(calls);
    move || {
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        result
      }
      .boxed()
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_fetch_then_cache_hit() {
    let layer = CacheLayer::default();
    let calls = Arc::new(AtomicU32::new(0));

    let first = layer
      .fetch("project-p1", fetcher(&calls, Ok(json!({ "id": "p1" }))))
      .await
      .unwrap();
    assert_eq!(first.source, CacheSource::Network);

    let second = layer
      .fetch("project-p1", fetcher(&calls, Ok(json!({ "id": "other" }))))
      .await
      .unwrap();
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(*second.data, json!({ "id": "p1" }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_fetches_share_one_request() {
    let layer = CacheLayer::default();
    let calls = Arc::new(AtomicU32::new(0));

    let (a, b) = tokio::join!(
      layer.fetch("tasks-p1", fetcher(&calls, Ok(json!([{ "id": "t1" }])))),
      layer.fetch("tasks-p1", fetcher(&calls, Ok(json!([])))),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.data, b.data);
    assert_eq!(a.source, CacheSource::Network);
    assert_eq!(b.source, CacheSource::Joined);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failure_is_not_cached() {
    let layer = CacheLayer::default();
    let calls = Arc::new(AtomicU32::new(0));
    let error = ApiError::Http {
      status: 500,
      message: "Internal Server Error".to_string(),
    };

    let result = layer
      .fetch("events-p1", fetcher(&calls, Err(error.clone())))
      .await;
    assert_eq!(result.unwrap_err(), error);
    assert!(layer.cache().get("events-p1").is_none());
    assert!(!layer.in_flight().is_in_flight("events-p1"));

    // Next read retries
    let retry = layer
      .fetch("events-p1", fetcher(&calls, Ok(json!({ "events": [] }))))
      .await
      .unwrap();
    assert_eq!(retry.source, CacheSource::Network);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidation_during_fetch_is_not_overwritten() {
    let layer = CacheLayer::default();
    let calls = Arc::new(AtomicU32::new(0));

    let pending = {
      let layer = layer.clone();
      let fetch = fetcher(&calls, Ok(json!(["stale"])));
      tokio::spawn(async move { layer.fetch("tasks-p1", fetch).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    layer.invalidate("tasks-p1");

    let stale = pending.await.unwrap().unwrap();
    assert_eq!(*stale.data, json!(["stale"]));
    assert!(layer.cache().get("tasks-p1").is_none());

    let fresh = layer
      .fetch("tasks-p1", fetcher(&calls, Ok(json!(["fresh"]))))
      .await
      .unwrap();
    assert_eq!(*fresh.data, json!(["fresh"]));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_expired_entry_is_refetched() {
    let layer = CacheLayer::with_ttl(Duration::from_millis(30_000));
    let calls = Arc::new(AtomicU32::new(0));

    layer
      .fetch("project-p1", fetcher(&calls, Ok(json!({ "v": 1 }))))
      .await
      .unwrap();
    tokio::time::advance(Duration::from_millis(30_001)).await;

    let refreshed = layer
      .fetch("project-p1", fetcher(&calls, Ok(json!({ "v": 2 }))))
      .await
      .unwrap();
    assert_eq!(refreshed.source, CacheSource::Network);
    assert_eq!(*refreshed.data, json!({ "v": 2 }));
  }
}
