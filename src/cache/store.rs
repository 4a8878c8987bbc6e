//! In-memory request cache with a fixed time-to-live.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Default time-to-live for cached responses.
pub const DEFAULT_TTL: Duration = Duration::from_millis(30_000);

/// A single cached response.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  /// The cached JSON body
  pub data: Arc<Value>,
  /// When the entry was stored
  pub cached_at: Instant,
}

#[derive(Default)]
struct Entries {
  values: HashMap<String, CachedEntry>,
  /// Bumped on every invalidation of a key. Never pruned: dropping a key
  /// would reset it to 0 and let a fetch that raced the invalidation write
  /// back. One counter per resource key the process has touched, so three per
  /// project.
  epochs: HashMap<String, u64>,
}

/// Key → (data, timestamp) map shared by every view of one application
/// instance.
///
/// An entry is served only while `now - cached_at < ttl`. Expired entries are
/// dropped on the lookup that finds them; there is no background sweep.
pub struct RequestCache {
  entries: Mutex<Entries>,
  ttl: Duration,
}

impl Default for RequestCache {
  fn default() -> Self {
    Self::new(DEFAULT_TTL)
  }
}

impl RequestCache {
  pub fn new(ttl: Duration) -> Self {
    Self {
      entries: Mutex::new(Entries::default()),
      ttl,
    }
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  fn lock(&self) -> MutexGuard<'_, Entries> {
    self
      .entries
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn is_fresh(&self, entry: &CachedEntry, now: Instant) -> bool {
    now.saturating_duration_since(entry.cached_at) < self.ttl
  }

  /// Get the cached value for `key` if it is still fresh.
  pub fn get(&self, key: &str) -> Option<Arc<Value>> {
    self.get_entry(key).map(|entry| entry.data)
  }

  /// Get the cached entry for `key` if it is still fresh, removing it if it
  /// has expired.
  pub fn get_entry(&self, key: &str) -> Option<CachedEntry> {
    let now = Instant::now();
    let mut entries = self.lock();

    let found = entries
      .values
      .get(key)
      .map(|entry| (self.is_fresh(entry, now), entry.clone()));

    match found {
      Some((true, entry)) => {
        debug!(key, "cache hit");
        Some(entry)
      }
      Some((false, _)) => {
        debug!(key, "cache entry expired");
        entries.values.remove(key);
        None
      }
      None => {
        debug!(key, "cache miss");
        None
      }
    }
  }

  /// Store `data` under `key`, replacing any existing entry.
  pub fn set(&self, key: &str, data: Arc<Value>) {
    let mut entries = self.lock();
    entries.values.insert(
      key.to_string(),
      CachedEntry {
        data,
        cached_at: Instant::now(),
      },
    );
  }

  /// Current invalidation epoch of `key`.
  ///
  /// Capture this before starting a fetch and hand it to
  /// [`set_if_current`](Self::set_if_current) when the fetch completes.
  pub fn epoch(&self, key: &str) -> u64 {
    self.lock().epochs.get(key).copied().unwrap_or(0)
  }

  /// Store `data` only if `key` has not been invalidated since `epoch` was
  /// read. Returns whether the value was stored.
  pub fn set_if_current(&self, key: &str, epoch: u64, data: Arc<Value>) -> bool {
    let mut entries = self.lock();
    let current = entries.epochs.get(key).copied().unwrap_or(0);
    if current != epoch {
      debug!(key, epoch, current, "discarding result of a fetch that raced an invalidation");
      return false;
    }
    entries.values.insert(
      key.to_string(),
      CachedEntry {
        data,
        cached_at: Instant::now(),
      },
    );
    true
  }

  /// Remove `key` regardless of freshness. Returns whether an entry existed.
  pub fn invalidate(&self, key: &str) -> bool {
    let mut entries = self.lock();
    *entries.epochs.entry(key.to_string()).or_insert(0) += 1;
    let removed = entries.values.remove(key).is_some();
    debug!(key, removed, "cache invalidated");
    removed
  }

  /// Remove every key that starts with `prefix`. Returns the number of
  /// entries removed.
  pub fn invalidate_namespace(&self, prefix: &str) -> usize {
    let mut entries = self.lock();
    let Entries { values, epochs } = &mut *entries;

    let mut keys: Vec<String> = values
      .keys()
      .filter(|k| k.starts_with(prefix))
      .cloned()
      .collect();
    keys.extend(
      epochs
        .keys()
        .filter(|k| k.starts_with(prefix) && !values.contains_key(*k))
        .cloned(),
    );

    let mut removed = 0;
    for key in keys {
      if values.remove(&key).is_some() {
        removed += 1;
      }
      *epochs.entry(key).or_insert(0) += 1;
    }
    debug!(prefix, removed, "cache namespace invalidated");
    removed
  }

  /// Number of stored entries, fresh or not.
  pub fn len(&self) -> usize {
    self.lock().values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drop every entry. Pending fetches will not write their results back.
  pub fn clear(&self) {
    let mut entries = self.lock();
    let Entries { values, epochs } = &mut *entries;
    for key in values.keys() {
      epochs.entry(key.clone()).or_insert(0);
    }
    for epoch in epochs.values_mut() {
      *epoch += 1;
    }
    values.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn project() -> Arc<Value> {
    Arc::new(json!({ "id": "p1", "name": "Collavo" }))
  }

  #[tokio::test(start_paused = true)]
  async fn test_entry_fresh_until_ttl() {
    let cache = RequestCache::new(Duration::from_millis(30_000));
    cache.set("project-p1", project());

    tokio::time::advance(Duration::from_millis(29_999)).await;
    assert_eq!(cache.get("project-p1"), Some(project()));

    tokio::time::advance(Duration::from_millis(2)).await;
    assert_eq!(cache.get("project-p1"), None);
    // The expired entry is gone, not just hidden
    assert!(cache.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_entry_expires_exactly_at_ttl() {
    let cache = RequestCache::new(Duration::from_millis(100));
    cache.set("tasks-p1", Arc::new(json!([])));

    tokio::time::advance(Duration::from_millis(100)).await;
    assert!(cache.get("tasks-p1").is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_set_overwrites_and_restarts_ttl() {
    let cache = RequestCache::new(Duration::from_millis(100));
    cache.set("tasks-p1", Arc::new(json!([1])));
    tokio::time::advance(Duration::from_millis(80)).await;
    cache.set("tasks-p1", Arc::new(json!([2])));
    tokio::time::advance(Duration::from_millis(80)).await;

    assert_eq!(cache.get("tasks-p1"), Some(Arc::new(json!([2]))));
  }

  #[test]
  fn test_invalidate_removes_fresh_entry() {
    let cache = RequestCache::default();
    cache.set("project-p1", project());

    assert!(cache.invalidate("project-p1"));
    assert!(cache.get("project-p1").is_none());
    assert!(!cache.invalidate("project-p1"));
  }

  #[test]
  fn test_invalidate_namespace() {
    let cache = RequestCache::default();
    cache.set("tasks-p1", Arc::new(json!([])));
    cache.set("tasks-p2", Arc::new(json!([])));
    cache.set("events-p1", Arc::new(json!({ "events": [] })));

    assert_eq!(cache.invalidate_namespace("tasks-"), 2);
    assert!(cache.get("tasks-p1").is_none());
    assert!(cache.get("tasks-p2").is_none());
    assert!(cache.get("events-p1").is_some());
  }

  #[test]
  fn test_set_if_current_rejects_stale_epoch() {
    let cache = RequestCache::default();
    let epoch = cache.epoch("tasks-p1");

    cache.invalidate("tasks-p1");
    assert!(!cache.set_if_current("tasks-p1", epoch, Arc::new(json!([]))));
    assert!(cache.get("tasks-p1").is_none());

    let epoch = cache.epoch("tasks-p1");
    assert!(cache.set_if_current("tasks-p1", epoch, Arc::new(json!([]))));
    assert!(cache.get("tasks-p1").is_some());
  }

  #[test]
  fn test_namespace_invalidation_bumps_uncached_keys() {
    let cache = RequestCache::default();
    let epoch = cache.epoch("events-p1");
    cache.invalidate("events-p1");
    let after_first = cache.epoch("events-p1");
    assert_ne!(epoch, after_first);

    cache.invalidate_namespace("events-");
    assert_ne!(cache.epoch("events-p1"), after_first);
  }

  #[test]
  fn test_clear() {
    let cache = RequestCache::default();
    let epoch = cache.epoch("project-p1");
    cache.set("project-p1", project());
    cache.clear();

    assert!(cache.is_empty());
    assert!(!cache.set_if_current("project-p1", epoch, project()));
  }
}
