//! Catalog types: lecturers, topics, lectures and their reference data.
//!
//! The catalog is written by administrators and read by everyone. Invariants
//! that span rows (one founder, acyclic guru chains, topic languages) are
//! checked by the helpers at the bottom of this module so every backend
//! enforces them the same way.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, naming};

// ─── Reference data ──────────────────────────────────────────────────────────

/// A spoken language a lecture can be recorded in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
  pub id:   i64,
  /// Short unique code, e.g. `"en"` or `"ru"`.
  pub code: String,
  pub name: String,
}

/// A named shelf that groups related topics on listing pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicGroup {
  pub id:   i64,
  pub name: String,
}

// ─── Lecturers ───────────────────────────────────────────────────────────────

/// Position of a lecturer in the lineage. Stored as its numeric value.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LecturerLevel {
  Founder        = 1,
  DirectDisciple = 2,
  GrandDisciple  = 3,
}

impl LecturerLevel {
  /// The level a lecturer takes on when `guru` is their guru.
  pub fn disciple_of(guru: LecturerLevel) -> LecturerLevel {
    match guru {
      LecturerLevel::Founder => LecturerLevel::DirectDisciple,
      LecturerLevel::DirectDisciple | LecturerLevel::GrandDisciple => {
        LecturerLevel::GrandDisciple
      }
    }
  }

  pub fn as_i64(self) -> i64 { self as i64 }

  pub fn from_i64(v: i64) -> Option<Self> {
    match v {
      1 => Some(Self::Founder),
      2 => Some(Self::DirectDisciple),
      3 => Some(Self::GrandDisciple),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lecturer {
  pub id:          i64,
  pub name:        String,
  /// Unique slug used by import tooling and URLs.
  pub code:        String,
  pub description: String,
  /// Path of the portrait relative to the media root.
  pub photo:       Option<String>,
  /// Display position; unique across lecturers. Order 1 is featured first.
  pub order:       u32,
  pub level:       LecturerLevel,
  pub guru_id:     Option<i64>,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::LectureStore::add_lecturer`].
///
/// The level is never supplied: a lecturer without a guru is the founder,
/// everyone else derives their level from the guru.
#[derive(Debug, Clone, Deserialize)]
pub struct NewLecturer {
  pub name:        String,
  pub code:        String,
  #[serde(default)]
  pub description: String,
  pub photo:       Option<String>,
  pub order:       u32,
  pub guru_id:     Option<i64>,
}

// ─── Topics ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
  pub id:           i64,
  pub lecturer_id:  i64,
  pub code:         String,
  pub title:        String,
  pub group_id:     Option<i64>,
  /// Languages lectures of this topic may be recorded in.
  pub language_ids: Vec<i64>,
  pub order:        u32,
  pub created_at:   DateTime<Utc>,
}

impl Topic {
  pub fn offers_language(&self, language_id: i64) -> bool {
    self.language_ids.contains(&language_id)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTopic {
  pub lecturer_id:  i64,
  pub code:         String,
  pub title:        String,
  pub group_id:     Option<i64>,
  #[serde(default)]
  pub language_ids: Vec<i64>,
  pub order:        u32,
}

// ─── Lectures ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lecture {
  pub id:          i64,
  pub topic_id:    i64,
  pub title:       String,
  /// Storage key relative to the media root, or an absolute `http(s)` URL.
  pub audio_file:  String,
  pub language_id: i64,
  /// Size of the audio file in bytes, when known.
  pub file_size:   Option<i64>,
  /// Length in whole seconds, when known.
  pub duration:    Option<u32>,
  pub order:       u32,
  pub year:        Option<i32>,
  pub event:       Option<String>,
  /// SHA-256 hex digest of the original filename.
  pub file_hash:   String,
  pub created_at:  DateTime<Utc>,
}

impl Lecture {
  pub fn formatted_duration(&self) -> String {
    naming::format_seconds(self.duration.map(f64::from))
  }

  pub fn file_size_mb(&self) -> f64 {
    match self.file_size {
      Some(size) if size > 0 => {
        (size as f64 / (1024.0 * 1024.0) * 10.0).round() / 10.0
      }
      _ => 0.0,
    }
  }
}

/// Input to [`crate::store::LectureStore::add_lecture`]. The store derives
/// `file_hash` from `original_filename`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewLecture {
  pub topic_id:          i64,
  pub title:             String,
  pub audio_file:        String,
  pub original_filename: String,
  pub language_id:       i64,
  pub file_size:         Option<i64>,
  pub duration:          Option<u32>,
  pub order:             u32,
  pub year:              Option<i32>,
  pub event:             Option<String>,
}

/// One entry of a batch append: an already-stored audio file plus the
/// metadata read from it.
#[derive(Debug, Clone, Deserialize)]
pub struct LectureFile {
  pub filename:    String,
  pub audio_file:  String,
  pub language_id: i64,
  pub file_size:   Option<i64>,
  pub duration:    Option<u32>,
}

/// Turn a batch of files into lecture inputs: non-audio files are dropped,
/// the rest are naturally sorted by filename and numbered from `next_order`.
/// Files whose hash is in `existing_hashes` (or repeated within the batch)
/// are skipped without consuming an order number.
pub fn plan_lecture_batch(
  topic_id: i64,
  files: Vec<LectureFile>,
  existing_hashes: &HashSet<String>,
  next_order: u32,
) -> Vec<NewLecture> {
  let mut files: Vec<LectureFile> = files
    .into_iter()
    .filter(|f| naming::is_audio_file(&f.filename))
    .collect();
  files.sort_by(|a, b| naming::natural_cmp(&a.filename, &b.filename));

  let mut seen = existing_hashes.clone();
  let mut order = next_order;
  let mut planned = Vec::with_capacity(files.len());
  for file in files {
    if !seen.insert(naming::file_hash(&file.filename)) {
      continue;
    }
    planned.push(NewLecture {
      topic_id,
      title: naming::title_from_filename(&file.filename),
      audio_file: file.audio_file,
      original_filename: file.filename,
      language_id: file.language_id,
      file_size: file.file_size,
      duration: file.duration,
      order,
      year: None,
      event: None,
    });
    order += 1;
  }
  planned
}

// ─── Invariant checks ────────────────────────────────────────────────────────

/// Resolve the level for a lecturer about to be created or re-parented.
///
/// `guru_level` is the level of the chosen guru (`None` for no guru) and
/// `founder_id` the id of the existing founder, if any.
pub fn resolve_level(
  lecturer_id: Option<i64>,
  guru_level: Option<LecturerLevel>,
  founder_id: Option<i64>,
) -> Result<LecturerLevel> {
  match guru_level {
    Some(level) => Ok(LecturerLevel::disciple_of(level)),
    None => match founder_id {
      Some(existing) if Some(existing) != lecturer_id => {
        Err(Error::FounderExists(existing))
      }
      _ => Ok(LecturerLevel::Founder),
    },
  }
}

/// Walk the guru chain upwards from `guru_id` and fail if it reaches
/// `lecturer_id`. `guru_of` looks up the guru of a lecturer.
pub fn check_guru_chain(
  lecturer_id: i64,
  guru_id: i64,
  guru_of: impl Fn(i64) -> Option<i64>,
) -> Result<()> {
  let mut visited = HashSet::new();
  let mut current = Some(guru_id);
  while let Some(id) = current {
    if id == lecturer_id {
      return Err(Error::CircularGuru { lecturer: lecturer_id, guru: guru_id });
    }
    if !visited.insert(id) {
      break;
    }
    current = guru_of(id);
  }
  Ok(())
}
