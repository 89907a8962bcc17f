//! Listener accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub user_id:    Uuid,
  pub username:   String,
  pub created_at: DateTime<Utc>,
}

/// A user together with their stored password hash. Only the auth layer
/// should ever hold one of these.
#[derive(Debug, Clone)]
pub struct UserCredentials {
  pub user:          User,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}
