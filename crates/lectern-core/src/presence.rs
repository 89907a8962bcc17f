//! "Now listening" presence, inferred from recent progress updates.
//!
//! Presence is polled, not pushed: a listener is visible while their last
//! progress update falls within the trailing window.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Parameters for [`crate::store::LectureStore::list_active_listeners`].
#[derive(Debug, Clone)]
pub struct PresenceQuery {
  /// The requesting user; never included in the result.
  pub exclude_user: Uuid,
  /// Trailing recency window measured back from `as_of`.
  pub window:       TimeDelta,
  pub limit:        usize,
  /// Reference instant; defaults to now.
  pub as_of:        Option<DateTime<Utc>>,
}

impl PresenceQuery {
  pub fn new(exclude_user: Uuid, window: TimeDelta, limit: usize) -> Self {
    Self { exclude_user, window, limit, as_of: None }
  }

  /// Oldest `updated_at` still considered active.
  pub fn cutoff(&self) -> DateTime<Utc> {
    self.as_of.unwrap_or_else(Utc::now) - self.window
  }
}

/// Someone else's recent playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveListener {
  pub user_id:       Uuid,
  pub username:      String,
  pub lecture_id:    i64,
  pub lecture_title: String,
  pub topic_id:      i64,
  pub topic_title:   String,
  pub current_time:  f64,
  pub updated_at:    DateTime<Utc>,
}
