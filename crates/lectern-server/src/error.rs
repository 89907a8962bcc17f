//! Error types and axum `IntoResponse` implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,
  #[error("not found")]
  NotFound,
  #[error("password hashing failed: {0}")]
  PasswordHash(String),
  #[error("http client error: {0}")]
  Client(#[from] reqwest::Error),
  #[error("response build error: {0}")]
  Http(#[from] axum::http::Error),
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Error::Store(Box::new(e))
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::Unauthorized => {
        let mut res =
          (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"lectern\""),
        );
        res
      }
      Error::NotFound => {
        (StatusCode::NOT_FOUND, Json(json!({ "error": "Not Found" }))).into_response()
      }
      other => {
        tracing::error!(error = %other, "request failed");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          Json(json!({ "error": "internal server error" })),
        )
          .into_response()
      }
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
