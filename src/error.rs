//! Errors raised at the fetch boundary.
//!
//! Application-level code (config, logging, the binary) uses `color_eyre`.
//! Everything that crosses the HTTP boundary uses [`ApiError`] instead, since a
//! single failed request has to be handed to every caller that joined it.

use thiserror::Error;

use crate::validation::ValidationError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
  /// Server answered with a non-2xx status
  #[error("Request failed with status {status}: {message}")]
  Http { status: u16, message: String },

  /// The request never produced a response
  #[error("Network error: {0}")]
  Network(String),

  /// The response body did not have the expected shape
  #[error("Failed to decode response: {0}")]
  Decode(String),

  /// The in-flight request for this key was cancelled
  #[error("Request for {0} was cancelled")]
  Cancelled(String),

  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error("Invalid request URL: {0}")]
  InvalidUrl(String),
}

impl ApiError {
  pub fn decode(err: impl std::fmt::Display) -> Self {
    ApiError::Decode(err.to_string())
  }

  /// HTTP status of the failure, if the server produced one.
  pub fn status(&self) -> Option<u16> {
    match self {
      ApiError::Http { status, .. } => Some(*status),
      _ => None,
    }
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, ApiError::Cancelled(_))
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      ApiError::Decode(err.to_string())
    } else {
      ApiError::Network(err.to_string())
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(err: serde_json::Error) -> Self {
    ApiError::Decode(err.to_string())
  }
}
