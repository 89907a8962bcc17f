//! Playback progress, the per-topic "now playing" pointer, and listening
//! history.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::Lecture;

// ─── Stored records ──────────────────────────────────────────────────────────

/// One row per (user, lecture).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LectureProgress {
  pub user_id:      Uuid,
  pub lecture_id:   i64,
  /// Playback position in seconds, stored as supplied by the player.
  pub current_time: f64,
  pub completed:    bool,
  pub listen_count: u32,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

/// Input to [`crate::store::LectureStore::update_progress`].
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ProgressUpdate {
  #[serde(default)]
  pub current_time: f64,
  #[serde(default)]
  pub completed:    bool,
}

/// The lecture a user last switched to within a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentLecture {
  pub user_id:    Uuid,
  pub topic_id:   i64,
  pub lecture_id: i64,
  pub updated_at: DateTime<Utc>,
}

/// A snapshot of progress taken when the user switched lectures; at most one
/// per (user, lecture, UTC day).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LectureHistory {
  pub user_id:               Uuid,
  pub lecture_id:            i64,
  pub listened_on:           NaiveDate,
  pub listened_at:           DateTime<Utc>,
  /// Whole seconds of the position at snapshot time.
  pub duration_listened:     u32,
  pub completion_percentage: f64,
}

/// A history row joined with its lecture, for listing pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
  pub entry:   LectureHistory,
  pub lecture: Lecture,
}

// ─── Read model ──────────────────────────────────────────────────────────────

/// Progress as seen by readers: either a stored record, or the explicit
/// "never played" state.
#[derive(Debug, Clone)]
pub enum Progress {
  Unstarted,
  Recorded(LectureProgress),
}

impl From<Option<LectureProgress>> for Progress {
  fn from(record: Option<LectureProgress>) -> Self {
    match record {
      Some(r) => Self::Recorded(r),
      None => Self::Unstarted,
    }
  }
}

impl Progress {
  pub fn current_time(&self) -> f64 {
    match self {
      Self::Unstarted => 0.0,
      Self::Recorded(r) => r.current_time,
    }
  }

  pub fn completed(&self) -> bool {
    matches!(self, Self::Recorded(r) if r.completed)
  }

  pub fn listen_count(&self) -> u32 {
    match self {
      Self::Unstarted => 0,
      Self::Recorded(r) => r.listen_count,
    }
  }

  /// Summarise against the lecture's duration.
  pub fn summary(&self, duration: Option<u32>) -> ProgressSummary {
    match self {
      Self::Unstarted => ProgressSummary::default(),
      Self::Recorded(r) => ProgressSummary {
        current_time:        r.current_time,
        progress_percentage: progress_percentage(r.current_time, duration),
        completed:           r.completed,
        listen_count:        r.listen_count,
      },
    }
  }
}

/// The wire shape of a progress read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
  pub current_time:        f64,
  pub progress_percentage: f64,
  pub completed:           bool,
  pub listen_count:        u32,
}

// ─── Rules ───────────────────────────────────────────────────────────────────

/// Percentage of `duration` reached at `current_time`, clamped to
/// `[0, 100]` and rounded to one decimal. Unknown or zero duration is 0.
pub fn progress_percentage(current_time: f64, duration: Option<u32>) -> f64 {
  let duration = match duration {
    Some(d) if d > 0 => f64::from(d),
    _ => return 0.0,
  };
  if !current_time.is_finite() {
    return 0.0;
  }
  let pct = (current_time * 100.0 / duration).clamp(0.0, 100.0);
  (pct * 10.0).round() / 10.0
}

/// Listen count after a progress report with `completed`.
///
/// A listen is counted when the lecture goes from not completed (or never
/// played) to completed. Reporting completion again while already completed
/// does not count; the player has to report an incomplete position first.
/// A missing row counts as `(0, false)`.
pub fn next_listen_count(listen_count: u32, was_completed: bool, completed: bool) -> u32 {
  if completed && !was_completed { listen_count + 1 } else { listen_count }
}
