//! Self-service sign-up: `POST /api/v1/register/`.
//!
//! Open to anonymous callers. The new account authenticates with Basic auth
//! straight away.

use axum::{Json, extract::State, http::StatusCode};
use lectern_api::{ApiError, JsonBody};
use lectern_core::{store::LectureStore, user::User};
use serde::{Deserialize, Serialize};

use crate::{AppState, auth::hash_password};

/// Shortest password accepted at sign-up.
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct Registration {
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub password: String,
}

#[derive(Debug, Serialize)]
pub struct Registered {
  pub success: bool,
  #[serde(flatten)]
  pub user:    User,
}

impl Registration {
  /// The username to store, or why the form is rejected.
  fn validate(&self) -> Result<String, ApiError> {
    let username = self.username.trim();
    if username.is_empty() {
      return Err(ApiError::BadRequest("Username is required".into()));
    }
    // Basic auth splits on the first colon.
    if username.contains(':') {
      return Err(ApiError::BadRequest("Username may not contain ':'".into()));
    }
    if self.password.chars().count() < MIN_PASSWORD_LEN {
      return Err(ApiError::BadRequest(format!(
        "Password must be at least {MIN_PASSWORD_LEN} characters"
      )));
    }
    Ok(username.to_owned())
  }
}

pub async fn handler<S: LectureStore>(
  State(app): State<AppState<S>>,
  JsonBody(form): JsonBody<Registration>,
) -> Result<(StatusCode, Json<Registered>), ApiError> {
  let username = form.validate()?;
  let password_hash =
    hash_password(&form.password).map_err(|e| ApiError::Store(Box::new(e)))?;

  let user = app
    .store
    .add_user(username, password_hash)
    .await
    .map_err(ApiError::store)?;
  tracing::info!(user_id = %user.user_id, username = %user.username, "user registered");

  Ok((StatusCode::CREATED, Json(Registered { success: true, user })))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn form(username: &str, password: &str) -> Registration {
    Registration { username: username.into(), password: password.into() }
  }

  #[test]
  fn username_is_trimmed() {
    assert_eq!(form("  radha ", "longenough").validate().unwrap(), "radha");
  }

  #[test]
  fn rejects_bad_forms() {
    for bad in [form("   ", "longenough"), form("a:b", "longenough"), form("radha", "short")] {
      assert!(matches!(bad.validate(), Err(ApiError::BadRequest(_))));
    }
  }
}
