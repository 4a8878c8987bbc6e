//! HTTP transport for the Collavo REST API.

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};

/// Sends one request and returns the decoded JSON body.
///
/// Implementations map any non-2xx status to [`ApiError::Http`]. An empty
/// success body decodes to `Value::Null`.
pub trait Backend: Send + Sync + 'static {
  fn request(
    &self,
    method: Method,
    path: String,
    body: Option<Value>,
  ) -> impl Future<Output = ApiResult<Value>> + Send;
}

/// Failure body returned by the API
#[derive(Debug, Deserialize)]
struct ErrorBody {
  error: String,
}

/// [`Backend`] over `reqwest`
#[derive(Clone)]
pub struct HttpBackend {
  client: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl HttpBackend {
  pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> ApiResult<Self> {
    let base_url =
      Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("collavo/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self {
      client,
      base_url,
      token,
    })
  }

  pub fn from_config(config: &Config) -> ApiResult<Self> {
    Self::new(
      &config.api.url,
      Config::get_api_token(),
      Duration::from_secs(config.api.timeout_secs),
    )
  }

  fn url(&self, path: &str) -> ApiResult<Url> {
    self
      .base_url
      .join(path)
      .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))
  }
}

impl Backend for HttpBackend {
  async fn request(&self, method: Method, path: String, body: Option<Value>) -> ApiResult<Value> {
    let url = self.url(&path)?;
    debug!(%method, %url, "sending request");

    let mut request = self.client.request(method, url);
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }
    if let Some(body) = &body {
      request = request.json(body);
    }

    let response = request.send().await?;
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
      return Err(http_error(status, &bytes));
    }
    if bytes.is_empty() {
      return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(ApiError::decode)
  }
}

/// Build the error for a failed response: the body's `error` string if it
/// has one, otherwise the status text.
fn http_error(status: StatusCode, body: &[u8]) -> ApiError {
  let message = serde_json::from_slice::<ErrorBody>(body)
    .map(|b| b.error)
    .unwrap_or_else(|_| {
      status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string()
    });

  ApiError::Http {
    status: status.as_u16(),
    message,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_error_body_message_wins() {
    let err = http_error(StatusCode::FORBIDDEN, br#"{"error":"Not a project member"}"#);
    assert_eq!(
      err,
      ApiError::Http {
        status: 403,
        message: "Not a project member".to_string()
      }
    );
  }

  #[test]
  fn test_status_text_fallback() {
    let err = http_error(StatusCode::INTERNAL_SERVER_ERROR, b"<html>oops</html>");
    assert!(err.to_string().contains("Internal Server Error"));
  }

  #[test]
  fn test_paths_join_onto_base() {
    let backend =
      HttpBackend::new("https://collavo.example.com/", None, Duration::from_secs(5)).unwrap();
    assert_eq!(
      backend.url("/api/projects/p1/tasks").unwrap().as_str(),
      "https://collavo.example.com/api/projects/p1/tasks"
    );
  }

  #[test]
  fn test_invalid_base_url() {
    assert!(matches!(
      HttpBackend::new("not a url", None, Duration::from_secs(5)),
      Err(ApiError::InvalidUrl(_))
    ));
  }
}
