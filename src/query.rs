//! `{data, is_loading, error}` state for views that fetch through the
//! resource client.
//!
//! A [`Query`] owns a fetcher closure and drives it on the tokio runtime. The
//! view calls [`Query::poll`] from its tick handler and renders from
//! [`Query::state`].
//!
//! ```ignore
//! let mut tasks = client.tasks_query("p1");
//! tasks.fetch();
//!
//! // In the event loop tick
//! if tasks.poll() {
//!     // State changed, re-render
//! }
//!
//! match tasks.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(list) => render_tasks(list),
//!     QueryState::Error(e) => render_error_page(e),
//!     QueryState::Idle => {}
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{ApiError, ApiResult};

/// The state of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(ApiError),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&ApiError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = ApiResult<T>> + Send>>;

type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

/// Async query with loading state.
///
/// Dropping the query, or calling [`refetch`](Query::refetch), aborts the
/// task driving the previous fetch. Since the resource client shares
/// requests between callers, aborting only withdraws this query's interest;
/// the request itself stops once no one else is waiting on it.
pub struct Query<T> {
  state: QueryState<T>,
  fetcher: FetcherFn<T>,
  pending: Option<Pending<T>>,
}

struct Pending<T> {
  receiver: oneshot::Receiver<ApiResult<T>>,
  task: JoinHandle<()>,
}

impl<T: Send + 'static> Query<T> {
  /// Create a new query. The fetcher is called each time `fetch()` or
  /// `refetch()` starts a request.
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      fetcher: Box::new(move || Box::pin(fetcher())),
      pending: None,
    }
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn is_success(&self) -> bool {
    self.state.is_success()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.state.error()
  }

  /// Start fetching unless a fetch is already running.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Abort any running fetch and start a new one.
  pub fn refetch(&mut self) {
    self.abort();
    self.start_fetch();
  }

  /// Pick up the result of a running fetch, if it has arrived.
  ///
  /// Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let Some(pending) = &mut self.pending else {
      return false;
    };

    match pending.receiver.try_recv() {
      Ok(Ok(data)) => {
        self.state = QueryState::Success(data);
        self.pending = None;
        true
      }
      Ok(Err(error)) => {
        self.state = QueryState::Error(error);
        self.pending = None;
        true
      }
      Err(oneshot::error::TryRecvError::Empty) => false,
      Err(oneshot::error::TryRecvError::Closed) => {
        self.state = QueryState::Error(ApiError::Cancelled("query".to_string()));
        self.pending = None;
        true
      }
    }
  }

  /// Wait for the running fetch to finish and return the new state.
  pub async fn settled(&mut self) -> &QueryState<T> {
    if let Some(pending) = self.pending.take() {
      self.state = match pending.receiver.await {
        Ok(Ok(data)) => QueryState::Success(data),
        Ok(Err(error)) => QueryState::Error(error),
        Err(_) => QueryState::Error(ApiError::Cancelled("query".to_string())),
      };
    }
    &self.state
  }

  fn abort(&mut self) {
    if let Some(pending) = self.pending.take() {
      pending.task.abort();
    }
  }

  fn start_fetch(&mut self) {
    let (tx, receiver) = oneshot::channel();
    self.state = QueryState::Loading;

    let future = (self.fetcher)();
    let task = tokio::spawn(async move {
      // Receiver may have been dropped
      let _ = tx.send(future.await);
    });
    self.pending = Some(Pending { receiver, task });
  }
}

impl<T> Drop for Query<T> {
  fn drop(&mut self) {
    if let Some(pending) = self.pending.take() {
      pending.task.abort();
    }
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("pending", &self.pending.is_some())
      .finish_non_exhaustive()
  }
}
