//! In-memory [`Backend`] for tests.

use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::backend::Backend;
use crate::error::{ApiError, ApiResult};

type Route = (Method, String);

#[derive(Clone)]
enum Reply {
  Json(Value),
  Status(u16, String),
}

/// Serves canned replies per (method, path) and records every request.
#[derive(Default)]
pub struct FakeBackend {
  replies: Mutex<HashMap<Route, Reply>>,
  requests: Mutex<Vec<(Method, String, Option<Value>)>>,
  latency: Duration,
}

impl FakeBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Delay every reply by `latency` (use with a paused clock).
  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = latency;
    self
  }

  pub fn reply(self, method: Method, path: &str, body: Value) -> Self {
    self
      .replies
      .lock()
      .unwrap()
      .insert((method, path.to_string()), Reply::Json(body));
    self
  }

  pub fn fail(self, method: Method, path: &str, status: u16, message: &str) -> Self {
    self
      .replies
      .lock()
      .unwrap()
      .insert((method, path.to_string()), Reply::Status(status, message.to_string()));
    self
  }

  /// Number of requests received for (method, path).
  pub fn calls(&self, method: &Method, path: &str) -> usize {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .filter(|(m, p, _)| m == method && p == path)
      .count()
  }

  pub fn total_calls(&self) -> usize {
    self.requests.lock().unwrap().len()
  }

  /// Body of the last request sent to (method, path).
  pub fn last_body(&self, method: &Method, path: &str) -> Option<Value> {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .rev()
      .find(|(m, p, _)| m == method && p == path)
      .and_then(|(_, _, body)| body.clone())
  }
}

impl Backend for FakeBackend {
  async fn request(&self, method: Method, path: String, body: Option<Value>) -> ApiResult<Value> {
    let reply = {
      self
        .requests
        .lock()
        .unwrap()
        .push((method.clone(), path.clone(), body));
      self.replies.lock().unwrap().get(&(method, path.clone())).cloned()
    };

    if !self.latency.is_zero() {
      tokio::time::sleep(self.latency).await;
    }

    match reply {
      Some(Reply::Json(value)) => Ok(value),
      Some(Reply::Status(status, message)) => Err(ApiError::Http { status, message }),
      None => Err(ApiError::Http {
        status: 404,
        message: format!("No route for {}", path),
      }),
    }
  }
}
