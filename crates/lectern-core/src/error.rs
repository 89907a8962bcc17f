//! Error types for `lectern-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("lecturer not found: {0}")]
  LecturerNotFound(i64),

  #[error("topic not found: {0}")]
  TopicNotFound(i64),

  #[error("lecture not found: {0}")]
  LectureNotFound(i64),

  #[error("language not found: {0}")]
  LanguageNotFound(i64),

  #[error("topic group not found: {0}")]
  TopicGroupNotFound(i64),

  #[error("marker not found: {0}")]
  MarkerNotFound(i64),

  #[error("a founder lecturer already exists: {0}")]
  FounderExists(i64),

  #[error("the founder lecturer cannot have a guru")]
  FounderWithGuru,

  #[error("guru chain of lecturer {lecturer} would become circular via {guru}")]
  CircularGuru { lecturer: i64, guru: i64 },

  #[error("language {language} is not offered by topic {topic}")]
  LanguageNotInTopic { language: i64, topic: i64 },

  #[error("topic {topic} already has a lecture with file hash {file_hash}")]
  DuplicateLecture { topic: i64, file_hash: String },

  #[error("Timestamp required")]
  MarkerTimestampMissing,

  #[error("Timestamp must not be negative")]
  MarkerTimestampNegative,

  #[error("Timestamp {timestamp} exceeds lecture duration {duration}")]
  MarkerTimestampBeyondDuration { timestamp: f64, duration: u32 },

  #[error("Text required")]
  MarkerTextEmpty,

  #[error("conflict: {0}")]
  Conflict(String),
}

/// Coarse classification used by transport layers to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  NotFound,
  Invalid,
  Conflict,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::LecturerNotFound(_)
      | Self::TopicNotFound(_)
      | Self::LectureNotFound(_)
      | Self::LanguageNotFound(_)
      | Self::TopicGroupNotFound(_)
      | Self::MarkerNotFound(_) => ErrorKind::NotFound,
      Self::FounderExists(_) | Self::DuplicateLecture { .. } | Self::Conflict(_) => {
        ErrorKind::Conflict
      }
      _ => ErrorKind::Invalid,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
