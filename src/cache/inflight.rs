//! Single-flight coordination for requests that share a cache key.
//!
//! The first caller for a key becomes the leader: its fetch is wrapped in a
//! shared future and registered under the key. Later callers join that
//! future instead of issuing their own request, so every waiter observes the
//! same outcome, success or failure.
//!
//! The registry only holds a weak handle. Once every waiter has dropped its
//! [`Flight`], the request itself is dropped and the key is released.

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};

/// Outcome shared by every waiter of one request.
pub type FetchOutput = ApiResult<Arc<Value>>;

type SharedFetch = Shared<BoxFuture<'static, FetchOutput>>;

/// Which part a caller plays in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightRole {
  /// Started the request
  Leader,
  /// Joined a request that was already running
  Follower,
}

/// A caller's handle on an in-flight request.
///
/// Dropping the handle abandons interest. When the last handle for a key is
/// dropped the underlying request is dropped with it.
pub struct Flight {
  role: FlightRole,
  future: SharedFetch,
}

impl Flight {
  pub fn role(&self) -> FlightRole {
    self.role
  }

  pub fn is_leader(&self) -> bool {
    self.role == FlightRole::Leader
  }

  /// Wait for the request to settle.
  pub async fn resolve(self) -> FetchOutput {
    self.future.await
  }
}

struct Entry {
  id: u64,
  handle: WeakShared<BoxFuture<'static, FetchOutput>>,
  cancel: watch::Sender<bool>,
}

#[derive(Default)]
struct Registry {
  entries: Mutex<HashMap<String, Entry>>,
  next_id: AtomicU64,
}

impl Registry {
  fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
    self
      .entries
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

/// Removes the in-flight marker when the request settles or is dropped.
///
/// Only the entry this marker registered is removed; a newer request that
/// reused the key after a detach is left alone.
struct Marker {
  registry: Arc<Registry>,
  key: String,
  id: u64,
}

impl Drop for Marker {
  fn drop(&mut self) {
    let mut entries = self.registry.lock();
    let owned = entries
      .get(&self.key)
      .is_some_and(|entry| entry.id == self.id);
    let removed = if owned {
      entries.remove(&self.key)
    } else {
      None
    };
    drop(entries);

    if removed.is_some() {
      debug!(key = %self.key, "in-flight request released");
    }
  }
}

/// Per-key registry of requests currently on the wire.
#[derive(Clone, Default)]
pub struct InFlightGuard {
  registry: Arc<Registry>,
}

impl InFlightGuard {
  pub fn new() -> Self {
    Self::default()
  }

  /// Join the live request for `key`, or start one with `make_fetch`.
  ///
  /// `make_fetch` is only called when this caller becomes the leader. It
  /// runs while the registry is locked, so it must only build the future and
  /// never call back into the guard.
  pub fn begin<F, Fut>(&self, key: &str, make_fetch: F) -> Flight
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = FetchOutput> + Send + 'static,
  {
    let mut entries = self.registry.lock();

    let existing = entries.get(key).and_then(|entry| entry.handle.upgrade());
    if let Some(future) = existing {
      drop(entries);
      debug!(key, "joining in-flight request");
      return Flight {
        role: FlightRole::Follower,
        future,
      };
    }

    let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
    let (cancel, mut cancelled) = watch::channel(false);
    let marker = Marker {
      registry: Arc::clone(&self.registry),
      key: key.to_string(),
      id,
    };
    let fetch = make_fetch();

    let future = async move {
      let marker = marker;
      tokio::select! {
        result = fetch => result,
        () = wait_cancelled(&mut cancelled) => {
          warn!(key = %marker.key, "in-flight request cancelled");
          Err(ApiError::Cancelled(marker.key.clone()))
        }
      }
    }
    .boxed()
    .shared();

    if let Some(handle) = future.downgrade() {
      entries.insert(key.to_string(), Entry { id, handle, cancel });
    }
    drop(entries);

    debug!(key, id, "request started");
    Flight {
      role: FlightRole::Leader,
      future,
    }
  }

  /// Whether a request for `key` is currently registered.
  pub fn is_in_flight(&self, key: &str) -> bool {
    self.registry.lock().contains_key(key)
  }

  /// Number of registered requests.
  pub fn len(&self) -> usize {
    self.registry.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Wait for the request registered under `key`.
  ///
  /// Returns `None` if nothing is in flight; otherwise the same outcome the
  /// leader receives, including its error.
  pub async fn await_resolution(&self, key: &str) -> Option<FetchOutput> {
    let future = self.live(key)?;
    Some(future.await)
  }

  /// Cancel the request for `key`. Every waiter resolves to
  /// [`ApiError::Cancelled`] and the key is free for a new request right
  /// away. Returns whether a request was registered.
  pub fn cancel(&self, key: &str) -> bool {
    let mut entries = self.registry.lock();
    let removed = entries.remove(key);
    drop(entries);

    match removed {
      Some(entry) => {
        entry.cancel.send_replace(true);
        true
      }
      None => false,
    }
  }

  /// Forget the request for `key` without cancelling it. Current waiters
  /// still receive its result; the next caller starts a fresh request.
  pub fn detach(&self, key: &str) -> bool {
    let mut entries = self.registry.lock();
    let removed = entries.remove(key);
    drop(entries);

    if removed.is_some() {
      debug!(key, "in-flight request detached");
    }
    removed.is_some()
  }

  /// Detach every request whose key starts with `prefix`.
  pub fn detach_namespace(&self, prefix: &str) -> usize {
    let mut entries = self.registry.lock();
    let keys: Vec<String> = entries
      .keys()
      .filter(|k| k.starts_with(prefix))
      .cloned()
      .collect();
    let removed: Vec<Entry> = keys.iter().filter_map(|k| entries.remove(k)).collect();
    drop(entries);

    removed.len()
  }

  fn live(&self, key: &str) -> Option<SharedFetch> {
    let entries = self.registry.lock();
    let future = entries.get(key).and_then(|entry| entry.handle.upgrade());
    drop(entries);
    future
  }
}

/// Resolves once the flag flips to `true`. A dropped sender means the entry
/// was detached, which is not a cancellation.
async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
  if rx.wait_for(|cancelled| *cancelled).await.is_err() {
    std::future::pending::<()>().await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::atomic::AtomicU32;
  use std::time::Duration;

  fn counting_fetch(
    calls: &Arc<AtomicU32>,
    result: FetchOutput,
  ) -> impl Future<Output = FetchOutput> + Send + 'static {
    let calls = Arc::clone(calls);
    async move {
      calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(50)).await;
      result
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_second_caller_joins_first() {
    let guard = InFlightGuard::new();
    let calls = Arc::new(AtomicU32::new(0));
    let tasks = Arc::new(json!([{ "id": "t1" }]));

    let first = guard.begin("tasks-p1", || counting_fetch(&calls, Ok(Arc::clone(&tasks))));
    let second = guard.begin("tasks-p1", || counting_fetch(&calls, Ok(Arc::new(json!([])))));

    assert_eq!(first.role(), FlightRole::Leader);
    assert_eq!(second.role(), FlightRole::Follower);
    assert!(guard.is_in_flight("tasks-p1"));

    let (a, b) = tokio::join!(first.resolve(), second.resolve());
    assert_eq!(a, Ok(Arc::clone(&tasks)));
    assert_eq!(b, Ok(tasks));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!guard.is_in_flight("tasks-p1"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_failure_reaches_every_waiter() {
    let guard = InFlightGuard::new();
    let calls = Arc::new(AtomicU32::new(0));
    let error = ApiError::Http {
      status: 500,
      message: "Internal Server Error".to_string(),
    };

    let first = guard.begin("events-p1", || counting_fetch(&calls, Err(error.clone())));
    let waiter = {
      let guard = guard.clone();
      tokio::spawn(async move { guard.await_resolution("events-p1").await })
    };

    let result = first.resolve().await;
    let waited = waiter.await.unwrap();

    assert_eq!(result, Err(error.clone()));
    assert_eq!(waited, Some(Err(error)));
    assert!(!guard.is_in_flight("events-p1"));
  }

  #[tokio::test]
  async fn test_await_resolution_without_request() {
    let guard = InFlightGuard::new();
    assert!(guard.await_resolution("project-p1").await.is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancel_resolves_waiters_and_frees_key() {
    let guard = InFlightGuard::new();
    let calls = Arc::new(AtomicU32::new(0));

    let first = guard.begin("tasks-p1", || {
      let calls = Arc::clone(&calls);
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<FetchOutput>().await
      }
    });
    let second = guard.begin("tasks-p1", || counting_fetch(&calls, Ok(Arc::new(json!([])))));

    let waiters = tokio::spawn(async move { tokio::join!(first.resolve(), second.resolve()) });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(guard.cancel("tasks-p1"));
    assert!(!guard.is_in_flight("tasks-p1"));

    let (a, b) = waiters.await.unwrap();
    assert_eq!(a, Err(ApiError::Cancelled("tasks-p1".to_string())));
    assert_eq!(b, Err(ApiError::Cancelled("tasks-p1".to_string())));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_abandoned_request_releases_key() {
    let guard = InFlightGuard::new();
    let flight = guard.begin("project-p1", || std::future::pending::<FetchOutput>());
    assert!(guard.is_in_flight("project-p1"));

    drop(flight);
    assert!(!guard.is_in_flight("project-p1"));
    assert!(guard.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_detach_starts_fresh_request() {
    let guard = InFlightGuard::new();
    let calls = Arc::new(AtomicU32::new(0));

    let old = guard.begin("tasks-p1", || counting_fetch(&calls, Ok(Arc::new(json!(["old"])))));
    assert!(guard.detach("tasks-p1"));

    let new = guard.begin("tasks-p1", || counting_fetch(&calls, Ok(Arc::new(json!(["new"])))));
    assert!(new.is_leader());

    let (a, b) = tokio::join!(old.resolve(), new.resolve());
    assert_eq!(a, Ok(Arc::new(json!(["old"]))));
    assert_eq!(b, Ok(Arc::new(json!(["new"]))));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(guard.is_empty());
  }

  #[tokio::test]
  async fn test_detach_namespace() {
    let guard = InFlightGuard::new();
    let _a = guard.begin("tasks-p1", || std::future::pending::<FetchOutput>());
    let _b = guard.begin("tasks-p2", || std::future::pending::<FetchOutput>());
    let _c = guard.begin("events-p1", || std::future::pending::<FetchOutput>());

    assert_eq!(guard.detach_namespace("tasks-"), 2);
    assert_eq!(guard.len(), 1);
    assert!(guard.is_in_flight("events-p1"));
  }
}
