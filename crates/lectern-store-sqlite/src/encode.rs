//! Encoding and decoding helpers between Rust domain types and the plain
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as fixed-width RFC 3339 UTC strings, dates as
//! `YYYY-MM-DD`. UUIDs are stored as hyphenated lowercase strings. Row
//! readers copy columns into `Raw*` structs inside the connection thread;
//! decoding into domain types happens afterwards on the caller's side.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use lectern_core::{
  catalog::{Language, Lecture, Lecturer, LecturerLevel, Topic, TopicGroup},
  marker::LectureMarker,
  presence::ActiveListener,
  progress::{HistoryItem, LectureHistory, LectureProgress},
  user::{User, UserCredentials},
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> / NaiveDate ───────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── LecturerLevel ───────────────────────────────────────────────────────────

pub fn decode_level(v: i64) -> Result<LecturerLevel> {
  LecturerLevel::from_i64(v)
    .ok_or_else(|| Error::Decode(format!("unknown lecturer level: {v}")))
}

// ─── Small columns ───────────────────────────────────────────────────────────

fn decode_u32(column: &str, v: i64) -> Result<u32> {
  u32::try_from(v).map_err(|_| Error::Decode(format!("{column} out of range: {v}")))
}

/// `group_concat` output (`"3,1"`) into sorted ids.
fn decode_id_list(s: Option<&str>) -> Result<Vec<i64>> {
  let mut ids = s
    .unwrap_or_default()
    .split(',')
    .filter(|part| !part.is_empty())
    .map(|part| {
      part
        .parse::<i64>()
        .map_err(|_| Error::Decode(format!("bad id list: {part:?}")))
    })
    .collect::<Result<Vec<_>>>()?;
  ids.sort_unstable();
  Ok(ids)
}

// ─── Users ───────────────────────────────────────────────────────────────────

pub const USER_COLUMNS: &str = "u.user_id, u.username, u.created_at, u.password_hash";

pub struct RawUser {
  pub user_id:       String,
  pub username:      String,
  pub created_at:    String,
  pub password_hash: String,
}

impl RawUser {
  pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:       row.get(0)?,
      username:      row.get(1)?,
      created_at:    row.get(2)?,
      password_hash: row.get(3)?,
    })
  }

  pub fn into_credentials(self) -> Result<UserCredentials> {
    Ok(UserCredentials {
      user:          User {
        user_id:    decode_uuid(&self.user_id)?,
        username:   self.username,
        created_at: decode_dt(&self.created_at)?,
      },
      password_hash: self.password_hash,
    })
  }
}

// ─── Reference data ──────────────────────────────────────────────────────────

pub fn read_language(row: &Row<'_>) -> rusqlite::Result<Language> {
  Ok(Language { id: row.get(0)?, code: row.get(1)?, name: row.get(2)? })
}

pub fn read_topic_group(row: &Row<'_>) -> rusqlite::Result<TopicGroup> {
  Ok(TopicGroup { id: row.get(0)?, name: row.get(1)? })
}

// ─── Lecturers ───────────────────────────────────────────────────────────────

pub const LECTURER_COLUMNS: &str = "lr.id, lr.name, lr.code, lr.description, lr.photo, \
   lr.sort_order, lr.level, lr.guru_id, lr.created_at";

pub struct RawLecturer {
  pub id:          i64,
  pub name:        String,
  pub code:        String,
  pub description: String,
  pub photo:       Option<String>,
  pub sort_order:  i64,
  pub level:       i64,
  pub guru_id:     Option<i64>,
  pub created_at:  String,
}

impl RawLecturer {
  pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      name:        row.get(1)?,
      code:        row.get(2)?,
      description: row.get(3)?,
      photo:       row.get(4)?,
      sort_order:  row.get(5)?,
      level:       row.get(6)?,
      guru_id:     row.get(7)?,
      created_at:  row.get(8)?,
    })
  }

  pub fn into_lecturer(self) -> Result<Lecturer> {
    Ok(Lecturer {
      id:          self.id,
      name:        self.name,
      code:        self.code,
      description: self.description,
      photo:       self.photo,
      order:       decode_u32("sort_order", self.sort_order)?,
      level:       decode_level(self.level)?,
      guru_id:     self.guru_id,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

// ─── Topics ──────────────────────────────────────────────────────────────────

pub const TOPIC_COLUMNS: &str = "t.id, t.lecturer_id, t.code, t.title, t.group_id, \
   (SELECT group_concat(tl.language_id) FROM topic_languages tl WHERE tl.topic_id = t.id), \
   t.sort_order, t.created_at";

pub struct RawTopic {
  pub id:           i64,
  pub lecturer_id:  i64,
  pub code:         String,
  pub title:        String,
  pub group_id:     Option<i64>,
  pub language_ids: Option<String>,
  pub sort_order:   i64,
  pub created_at:   String,
}

impl RawTopic {
  pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      lecturer_id:  row.get(1)?,
      code:         row.get(2)?,
      title:        row.get(3)?,
      group_id:     row.get(4)?,
      language_ids: row.get(5)?,
      sort_order:   row.get(6)?,
      created_at:   row.get(7)?,
    })
  }

  pub fn into_topic(self) -> Result<Topic> {
    Ok(Topic {
      id:           self.id,
      lecturer_id:  self.lecturer_id,
      code:         self.code,
      title:        self.title,
      group_id:     self.group_id,
      language_ids: decode_id_list(self.language_ids.as_deref())?,
      order:        decode_u32("sort_order", self.sort_order)?,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

// ─── Lectures ────────────────────────────────────────────────────────────────

/// Lecture columns; occupy twelve consecutive indices of a row.
pub const LECTURE_COLUMNS: &str = "l.id, l.topic_id, l.title, l.audio_file, l.language_id, \
   l.file_size, l.duration, l.sort_order, l.year, l.event, l.file_hash, l.created_at";

pub struct RawLecture {
  pub id:          i64,
  pub topic_id:    i64,
  pub title:       String,
  pub audio_file:  String,
  pub language_id: i64,
  pub file_size:   Option<i64>,
  pub duration:    Option<i64>,
  pub sort_order:  i64,
  pub year:        Option<i32>,
  pub event:       Option<String>,
  pub file_hash:   String,
  pub created_at:  String,
}

impl RawLecture {
  pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> { Self::read_at(row, 0) }

  /// Read lecture columns starting at column `base`.
  pub fn read_at(row: &Row<'_>, base: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(base)?,
      topic_id:    row.get(base + 1)?,
      title:       row.get(base + 2)?,
      audio_file:  row.get(base + 3)?,
      language_id: row.get(base + 4)?,
      file_size:   row.get(base + 5)?,
      duration:    row.get(base + 6)?,
      sort_order:  row.get(base + 7)?,
      year:        row.get(base + 8)?,
      event:       row.get(base + 9)?,
      file_hash:   row.get(base + 10)?,
      created_at:  row.get(base + 11)?,
    })
  }

  pub fn into_lecture(self) -> Result<Lecture> {
    Ok(Lecture {
      id:          self.id,
      topic_id:    self.topic_id,
      title:       self.title,
      audio_file:  self.audio_file,
      language_id: self.language_id,
      file_size:   self.file_size,
      duration:    self.duration.map(|d| decode_u32("duration", d)).transpose()?,
      order:       decode_u32("sort_order", self.sort_order)?,
      year:        self.year,
      event:       self.event,
      file_hash:   self.file_hash,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

// ─── Progress ────────────────────────────────────────────────────────────────

pub const PROGRESS_COLUMNS: &str = "p.user_id, p.lecture_id, p.position, p.completed, \
   p.listen_count, p.created_at, p.updated_at";

pub struct RawProgress {
  pub user_id:      String,
  pub lecture_id:   i64,
  pub position:     f64,
  pub completed:    bool,
  pub listen_count: i64,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawProgress {
  pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:      row.get(0)?,
      lecture_id:   row.get(1)?,
      position:     row.get(2)?,
      completed:    row.get(3)?,
      listen_count: row.get(4)?,
      created_at:   row.get(5)?,
      updated_at:   row.get(6)?,
    })
  }

  pub fn into_progress(self) -> Result<LectureProgress> {
    Ok(LectureProgress {
      user_id:      decode_uuid(&self.user_id)?,
      lecture_id:   self.lecture_id,
      current_time: self.position,
      completed:    self.completed,
      listen_count: decode_u32("listen_count", self.listen_count)?,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

// ─── History ─────────────────────────────────────────────────────────────────

pub struct RawHistoryItem {
  pub user_id:               String,
  pub lecture_id:            i64,
  pub listened_on:           String,
  pub listened_at:           String,
  pub duration_listened:     i64,
  pub completion_percentage: f64,
  pub lecture:               RawLecture,
}

impl RawHistoryItem {
  /// Six history columns followed by [`LECTURE_COLUMNS`].
  pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:               row.get(0)?,
      lecture_id:            row.get(1)?,
      listened_on:           row.get(2)?,
      listened_at:           row.get(3)?,
      duration_listened:     row.get(4)?,
      completion_percentage: row.get(5)?,
      lecture:               RawLecture::read_at(row, 6)?,
    })
  }

  pub fn into_item(self) -> Result<HistoryItem> {
    Ok(HistoryItem {
      entry:   LectureHistory {
        user_id:               decode_uuid(&self.user_id)?,
        lecture_id:            self.lecture_id,
        listened_on:           decode_date(&self.listened_on)?,
        listened_at:           decode_dt(&self.listened_at)?,
        duration_listened:     decode_u32("duration_listened", self.duration_listened)?,
        completion_percentage: self.completion_percentage,
      },
      lecture: self.lecture.into_lecture()?,
    })
  }
}

// ─── Markers ─────────────────────────────────────────────────────────────────

pub const MARKER_COLUMNS: &str = "m.id, m.user_id, m.lecture_id, m.position, m.text, m.created_at";

pub struct RawMarker {
  pub id:         i64,
  pub user_id:    String,
  pub lecture_id: i64,
  pub position:   f64,
  pub text:       String,
  pub created_at: String,
}

impl RawMarker {
  pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      user_id:    row.get(1)?,
      lecture_id: row.get(2)?,
      position:   row.get(3)?,
      text:       row.get(4)?,
      created_at: row.get(5)?,
    })
  }

  pub fn into_marker(self) -> Result<LectureMarker> {
    Ok(LectureMarker {
      id:         self.id,
      user_id:    decode_uuid(&self.user_id)?,
      lecture_id: self.lecture_id,
      timestamp:  self.position,
      text:       self.text,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

// ─── Presence ────────────────────────────────────────────────────────────────

pub struct RawListener {
  pub user_id:       String,
  pub username:      String,
  pub lecture_id:    i64,
  pub lecture_title: String,
  pub topic_id:      i64,
  pub topic_title:   String,
  pub position:      f64,
  pub updated_at:    String,
}

impl RawListener {
  pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:       row.get(0)?,
      username:      row.get(1)?,
      lecture_id:    row.get(2)?,
      lecture_title: row.get(3)?,
      topic_id:      row.get(4)?,
      topic_title:   row.get(5)?,
      position:      row.get(6)?,
      updated_at:    row.get(7)?,
    })
  }

  pub fn into_listener(self) -> Result<ActiveListener> {
    Ok(ActiveListener {
      user_id:       decode_uuid(&self.user_id)?,
      username:      self.username,
      lecture_id:    self.lecture_id,
      lecture_title: self.lecture_title,
      topic_id:      self.topic_id,
      topic_title:   self.topic_title,
      current_time:  self.position,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamps_are_fixed_width_and_ordered() {
    let a = DateTime::parse_from_rfc3339("2025-01-01T10:00:00Z").unwrap().with_timezone(&Utc);
    let b = DateTime::parse_from_rfc3339("2025-01-01T10:00:00.5Z").unwrap().with_timezone(&Utc);
    let (ea, eb) = (encode_dt(a), encode_dt(b));
    assert_eq!(ea, "2025-01-01T10:00:00.000000Z");
    assert_eq!(ea.len(), eb.len());
    assert!(ea < eb);
    assert_eq!(decode_dt(&eb).unwrap(), b);
  }

  #[test]
  fn id_lists_are_sorted() {
    assert_eq!(decode_id_list(Some("3,1,2")).unwrap(), vec![1, 2, 3]);
    assert!(decode_id_list(None).unwrap().is_empty());
    assert!(decode_id_list(Some("x")).is_err());
  }
}
