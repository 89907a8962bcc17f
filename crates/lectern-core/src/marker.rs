//! User-authored timestamped notes on a lecture.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, naming};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LectureMarker {
  pub id:         i64,
  pub user_id:    Uuid,
  pub lecture_id: i64,
  /// Position in seconds within the lecture.
  pub timestamp:  f64,
  pub text:       String,
  pub created_at: DateTime<Utc>,
}

impl LectureMarker {
  pub fn formatted_timestamp(&self) -> String {
    naming::format_timestamp(self.timestamp)
  }
}

/// Marker input as received from clients; nothing is validated yet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewMarker {
  pub timestamp: Option<f64>,
  #[serde(default)]
  pub text:      String,
}

/// Update to an existing marker. The timestamp is optional; text is not.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarkerPatch {
  pub timestamp: Option<f64>,
  #[serde(default)]
  pub text:      String,
}

/// Check a marker position against the lecture length. When the duration is
/// unknown only the lower bound applies.
pub fn validate_timestamp(timestamp: Option<f64>, duration: Option<u32>) -> Result<f64> {
  let timestamp = timestamp.ok_or(Error::MarkerTimestampMissing)?;
  if !timestamp.is_finite() || timestamp < 0.0 {
    return Err(Error::MarkerTimestampNegative);
  }
  if let Some(duration) = duration
    && duration > 0
    && timestamp > f64::from(duration)
  {
    return Err(Error::MarkerTimestampBeyondDuration { timestamp, duration });
  }
  Ok(timestamp)
}

/// Trimmed marker text; blank text is rejected.
pub fn validate_text(text: &str) -> Result<String> {
  let text = text.trim();
  if text.is_empty() {
    return Err(Error::MarkerTextEmpty);
  }
  Ok(text.to_owned())
}
