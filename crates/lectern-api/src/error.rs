//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::rejection::JsonRejection,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use lectern_core::{ErrorKind, store::StoreError};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a backend error by the domain error it carries, if any.
  pub fn store<E: StoreError>(e: E) -> Self {
    match e.as_core() {
      Some(core) => Self::from_core(core),
      None => ApiError::Store(Box::new(e)),
    }
  }

  fn from_core(e: &lectern_core::Error) -> Self {
    let message = e.to_string();
    match e.kind() {
      ErrorKind::NotFound => ApiError::NotFound(message),
      ErrorKind::Invalid => ApiError::BadRequest(message),
      ErrorKind::Conflict => ApiError::Conflict(message),
    }
  }
}

impl From<lectern_core::Error> for ApiError {
  fn from(e: lectern_core::Error) -> Self { Self::from_core(&e) }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { ApiError::BadRequest(rejection.body_text()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
