//! Request extractors whose rejections use the API error body.

use axum::extract::FromRequest;

use crate::error::ApiError;

/// `axum::Json`, except that a missing content type or a body that does not
/// deserialize is a 400 with `{"error": …}` instead of axum's plain-text
/// 415/422.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);
