//! [`SqliteStore`], the SQLite implementation of [`LectureStore`].

use std::{
  collections::{HashMap, HashSet},
  path::Path,
};

use chrono::Utc;
use lectern_core::{
  Error as CoreError,
  catalog::{
    self, Language, Lecture, LectureFile, Lecturer, LecturerLevel, NewLecture,
    NewLecturer, NewTopic, Topic, TopicGroup,
  },
  marker::{self, LectureMarker, MarkerPatch, NewMarker},
  naming,
  presence::{ActiveListener, PresenceQuery},
  progress::{
    self, CurrentLecture, HistoryItem, LectureHistory, LectureProgress, ProgressUpdate,
  },
  store::LectureStore,
  user::{User, UserCredentials},
};
use rusqlite::{Connection, OptionalExtension as _, Row, TransactionBehavior, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    LECTURE_COLUMNS, LECTURER_COLUMNS, MARKER_COLUMNS, PROGRESS_COLUMNS, RawHistoryItem,
    RawLecture, RawLecturer, RawListener, RawMarker, RawProgress, RawTopic, RawUser,
    TOPIC_COLUMNS, USER_COLUMNS, decode_dt, encode_date, encode_dt, encode_uuid, read_language,
    read_topic_group,
  },
  schema::SCHEMA,
};

/// Outcome of a closure run on the connection thread: the outer result
/// carries SQLite failures, the inner one domain rejections.
type Checked<T> = std::result::Result<T, CoreError>;

// ─── Connection-thread helpers ───────────────────────────────────────────────

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(err, _)
      if err.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

/// Turn a unique-constraint failure into a domain conflict.
fn checked<T>(
  result: rusqlite::Result<T>,
  conflict: impl FnOnce() -> CoreError,
) -> tokio_rusqlite::Result<Checked<T>> {
  match result {
    Ok(v) => Ok(Ok(v)),
    Err(e) if is_constraint_violation(&e) => Ok(Err(conflict())),
    Err(e) => Err(e.into()),
  }
}

fn query_all<T, P, F>(conn: &Connection, sql: &str, params: P, read: F) -> rusqlite::Result<Vec<T>>
where
  P: rusqlite::Params,
  F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
  let mut stmt = conn.prepare(sql)?;
  let rows = stmt.query_map(params, read)?.collect::<rusqlite::Result<Vec<_>>>();
  rows
}

fn select_lecturer(conn: &Connection, id: i64) -> rusqlite::Result<Option<RawLecturer>> {
  conn
    .query_row(
      &format!("SELECT {LECTURER_COLUMNS} FROM lecturers lr WHERE lr.id = ?1"),
      params![id],
      RawLecturer::read,
    )
    .optional()
}

fn select_topic(conn: &Connection, id: i64) -> rusqlite::Result<Option<RawTopic>> {
  conn
    .query_row(
      &format!("SELECT {TOPIC_COLUMNS} FROM topics t WHERE t.id = ?1"),
      params![id],
      RawTopic::read,
    )
    .optional()
}

fn select_lecture(conn: &Connection, id: i64) -> rusqlite::Result<Option<RawLecture>> {
  conn
    .query_row(
      &format!("SELECT {LECTURE_COLUMNS} FROM lectures l WHERE l.id = ?1"),
      params![id],
      RawLecture::read,
    )
    .optional()
}

fn select_progress(
  conn: &Connection,
  user_id: &str,
  lecture_id: i64,
) -> rusqlite::Result<Option<RawProgress>> {
  conn
    .query_row(
      &format!(
        "SELECT {PROGRESS_COLUMNS} FROM lecture_progress p
         WHERE p.user_id = ?1 AND p.lecture_id = ?2"
      ),
      params![user_id, lecture_id],
      RawProgress::read,
    )
    .optional()
}

fn select_marker(
  conn: &Connection,
  user_id: &str,
  marker_id: i64,
) -> rusqlite::Result<Option<RawMarker>> {
  conn
    .query_row(
      &format!(
        "SELECT {MARKER_COLUMNS} FROM lecture_markers m WHERE m.id = ?1 AND m.user_id = ?2"
      ),
      params![marker_id, user_id],
      RawMarker::read,
    )
    .optional()
}

fn lecture_duration(conn: &Connection, lecture_id: i64) -> rusqlite::Result<Option<Option<u32>>> {
  conn
    .query_row(
      "SELECT duration FROM lectures WHERE id = ?1",
      params![lecture_id],
      |r| r.get::<_, Option<u32>>(0),
    )
    .optional()
}

/// Validate and insert one lecture inside an open transaction.
fn insert_lecture(
  conn: &Connection,
  input: &NewLecture,
  created_at: &str,
) -> tokio_rusqlite::Result<Checked<i64>> {
  let offered: bool = conn
    .query_row(
      "SELECT 1 FROM topic_languages WHERE topic_id = ?1 AND language_id = ?2",
      params![input.topic_id, input.language_id],
      |_| Ok(true),
    )
    .optional()?
    .unwrap_or(false);
  if !offered {
    return Ok(Err(CoreError::LanguageNotInTopic {
      language: input.language_id,
      topic:    input.topic_id,
    }));
  }

  let file_hash = naming::file_hash(&input.original_filename);
  let duplicate: bool = conn
    .query_row(
      "SELECT 1 FROM lectures WHERE topic_id = ?1 AND file_hash = ?2",
      params![input.topic_id, file_hash],
      |_| Ok(true),
    )
    .optional()?
    .unwrap_or(false);
  if duplicate {
    return Ok(Err(CoreError::DuplicateLecture { topic: input.topic_id, file_hash }));
  }

  let inserted = checked(
    conn.execute(
      "INSERT INTO lectures (
         topic_id, title, audio_file, language_id, file_size, duration,
         sort_order, year, event, file_hash, created_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
      params![
        input.topic_id,
        input.title,
        input.audio_file,
        input.language_id,
        input.file_size,
        input.duration,
        input.order,
        input.year,
        input.event,
        file_hash,
        created_at,
      ],
    ),
    || {
      CoreError::Conflict(format!(
        "topic {} already has a lecture at order {} in language {}",
        input.topic_id, input.order, input.language_id
      ))
    },
  )?;
  Ok(inserted.map(|_| conn.last_insert_rowid()))
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Lectern store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, used by tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── LectureStore impl ───────────────────────────────────────────────────────

impl LectureStore for SqliteStore {
  type Error = crate::Error;

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn add_user(&self, username: String, password_hash: String) -> Result<User> {
    let user = User {
      user_id:    Uuid::new_v4(),
      username,
      created_at: Utc::now(),
    };

    let id_str = encode_uuid(user.user_id);
    let at_str = encode_dt(user.created_at);
    let name   = user.username.clone();

    self
      .conn
      .call(move |conn| {
        checked(
          conn.execute(
            "INSERT INTO users (user_id, username, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id_str, name, password_hash, at_str],
          ),
          || CoreError::Conflict(format!("username {name:?} is taken")),
        )
      })
      .await??;

    Ok(user)
  }

  async fn get_credentials(&self, username: String) -> Result<Option<UserCredentials>> {
    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = ?1"),
              params![username],
              RawUser::read,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawUser::into_credentials).transpose()
  }

  // ── Catalog writes ────────────────────────────────────────────────────────

  async fn add_language(&self, code: String, name: String) -> Result<Language> {
    let language = self
      .conn
      .call(move |conn| {
        let inserted = checked(
          conn.execute(
            "INSERT INTO languages (code, name) VALUES (?1, ?2)",
            params![code, name],
          ),
          || CoreError::Conflict(format!("language code {code:?} exists")),
        )?;
        if let Err(e) = inserted {
          return Ok(Err(e));
        }
        let language = conn.query_row(
          "SELECT id, code, name FROM languages WHERE id = ?1",
          params![conn.last_insert_rowid()],
          read_language,
        )?;
        Ok(Ok(language))
      })
      .await??;
    Ok(language)
  }

  async fn add_topic_group(&self, name: String) -> Result<TopicGroup> {
    let group = self
      .conn
      .call(move |conn| {
        let inserted = checked(
          conn.execute("INSERT INTO topic_groups (name) VALUES (?1)", params![name]),
          || CoreError::Conflict(format!("topic group {name:?} exists")),
        )?;
        if let Err(e) = inserted {
          return Ok(Err(e));
        }
        let group = conn.query_row(
          "SELECT id, name FROM topic_groups WHERE id = ?1",
          params![conn.last_insert_rowid()],
          read_topic_group,
        )?;
        Ok(Ok(group))
      })
      .await??;
    Ok(group)
  }

  async fn add_lecturer(&self, input: NewLecturer) -> Result<Lecturer> {
    let at_str = encode_dt(Utc::now());

    let raw: RawLecturer = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let guru_level = match input.guru_id {
          Some(guru_id) => match select_lecturer(&tx, guru_id)? {
            Some(guru) => LecturerLevel::from_i64(guru.level),
            None => return Ok(Err(CoreError::LecturerNotFound(guru_id))),
          },
          None => None,
        };
        let founder_id: Option<i64> = tx
          .query_row("SELECT id FROM lecturers WHERE level = 1", [], |r| r.get(0))
          .optional()?;
        let level = match catalog::resolve_level(None, guru_level, founder_id) {
          Ok(level) => level,
          Err(e) => return Ok(Err(e)),
        };

        let inserted = checked(
          tx.execute(
            "INSERT INTO lecturers (
               name, code, description, photo, sort_order, level, guru_id, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
              input.name,
              input.code,
              input.description,
              input.photo,
              input.order,
              level.as_i64(),
              input.guru_id,
              at_str,
            ],
          ),
          || {
            CoreError::Conflict(format!(
              "lecturer code {:?} or order {} is taken",
              input.code, input.order
            ))
          },
        )?;
        if let Err(e) = inserted {
          return Ok(Err(e));
        }

        let id = tx.last_insert_rowid();
        let raw = select_lecturer(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(Ok(raw))
      })
      .await??;

    raw.into_lecturer()
  }

  async fn set_guru(&self, lecturer_id: i64, guru_id: i64) -> Result<Lecturer> {
    let raw: RawLecturer = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(lecturer) = select_lecturer(&tx, lecturer_id)? else {
          return Ok(Err(CoreError::LecturerNotFound(lecturer_id)));
        };
        if lecturer.level == LecturerLevel::Founder.as_i64() {
          return Ok(Err(CoreError::FounderWithGuru));
        }
        let Some(guru) = select_lecturer(&tx, guru_id)? else {
          return Ok(Err(CoreError::LecturerNotFound(guru_id)));
        };

        let gurus: HashMap<i64, Option<i64>> = query_all(
          &tx,
          "SELECT id, guru_id FROM lecturers",
          [],
          |r| Ok((r.get(0)?, r.get(1)?)),
        )?
        .into_iter()
        .collect();
        if let Err(e) = catalog::check_guru_chain(lecturer_id, guru_id, |id| {
          gurus.get(&id).copied().flatten()
        }) {
          return Ok(Err(e));
        }

        let level = LecturerLevel::from_i64(guru.level)
          .map(LecturerLevel::disciple_of)
          .unwrap_or(LecturerLevel::GrandDisciple);
        tx.execute(
          "UPDATE lecturers SET guru_id = ?1, level = ?2 WHERE id = ?3",
          params![guru_id, level.as_i64(), lecturer_id],
        )?;

        let raw = select_lecturer(&tx, lecturer_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(Ok(raw))
      })
      .await??;

    raw.into_lecturer()
  }

  async fn add_topic(&self, input: NewTopic) -> Result<Topic> {
    let at_str = encode_dt(Utc::now());

    let raw: RawTopic = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if select_lecturer(&tx, input.lecturer_id)?.is_none() {
          return Ok(Err(CoreError::LecturerNotFound(input.lecturer_id)));
        }
        if let Some(group_id) = input.group_id {
          let exists: bool = tx
            .query_row("SELECT 1 FROM topic_groups WHERE id = ?1", params![group_id], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
          if !exists {
            return Ok(Err(CoreError::TopicGroupNotFound(group_id)));
          }
        }
        for language_id in &input.language_ids {
          let exists: bool = tx
            .query_row("SELECT 1 FROM languages WHERE id = ?1", params![language_id], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
          if !exists {
            return Ok(Err(CoreError::LanguageNotFound(*language_id)));
          }
        }

        let inserted = checked(
          tx.execute(
            "INSERT INTO topics (lecturer_id, code, title, group_id, sort_order, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
              input.lecturer_id,
              input.code,
              input.title,
              input.group_id,
              input.order,
              at_str,
            ],
          ),
          || {
            CoreError::Conflict(format!(
              "lecturer {} already has topic {:?} at order {}",
              input.lecturer_id, input.code, input.order
            ))
          },
        )?;
        if let Err(e) = inserted {
          return Ok(Err(e));
        }

        let id = tx.last_insert_rowid();
        for language_id in &input.language_ids {
          tx.execute(
            "INSERT OR IGNORE INTO topic_languages (topic_id, language_id) VALUES (?1, ?2)",
            params![id, language_id],
          )?;
        }

        let raw = select_topic(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(Ok(raw))
      })
      .await??;

    raw.into_topic()
  }

  async fn add_lecture(&self, input: NewLecture) -> Result<Lecture> {
    let at_str = encode_dt(Utc::now());

    let raw: RawLecture = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if select_topic(&tx, input.topic_id)?.is_none() {
          return Ok(Err(CoreError::TopicNotFound(input.topic_id)));
        }
        let id = match insert_lecture(&tx, &input, &at_str)? {
          Ok(id) => id,
          Err(e) => return Ok(Err(e)),
        };

        let raw = select_lecture(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(Ok(raw))
      })
      .await??;

    raw.into_lecture()
  }

  async fn append_lectures(&self, topic_id: i64, files: Vec<LectureFile>) -> Result<Vec<Lecture>> {
    let at_str = encode_dt(Utc::now());

    let raws: Vec<RawLecture> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if select_topic(&tx, topic_id)?.is_none() {
          return Ok(Err(CoreError::TopicNotFound(topic_id)));
        }
        let existing: HashSet<String> = query_all(
          &tx,
          "SELECT file_hash FROM lectures WHERE topic_id = ?1",
          params![topic_id],
          |r| r.get(0),
        )?
        .into_iter()
        .collect();
        let last_order: Option<u32> = tx.query_row(
          "SELECT MAX(sort_order) FROM lectures WHERE topic_id = ?1",
          params![topic_id],
          |r| r.get(0),
        )?;

        let planned = catalog::plan_lecture_batch(
          topic_id,
          files,
          &existing,
          last_order.map_or(1, |o| o + 1),
        );

        let mut created = Vec::with_capacity(planned.len());
        for input in &planned {
          let id = match insert_lecture(&tx, input, &at_str)? {
            Ok(id) => id,
            Err(e) => return Ok(Err(e)),
          };
          created.push(select_lecture(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?);
        }
        tx.commit()?;
        Ok(Ok(created))
      })
      .await??;

    tracing::info!(topic_id, created = raws.len(), "appended lectures");
    raws.into_iter().map(RawLecture::into_lecture).collect()
  }

  // ── Catalog reads ─────────────────────────────────────────────────────────

  async fn get_lecturer(&self, id: i64) -> Result<Option<Lecturer>> {
    let raw = self
      .conn
      .call(move |conn| Ok(select_lecturer(conn, id)?))
      .await?;
    raw.map(RawLecturer::into_lecturer).transpose()
  }

  async fn list_lecturers(&self) -> Result<Vec<Lecturer>> {
    let raws: Vec<RawLecturer> = self
      .conn
      .call(|conn| {
        Ok(query_all(
          conn,
          &format!("SELECT {LECTURER_COLUMNS} FROM lecturers lr ORDER BY lr.sort_order, lr.name"),
          [],
          RawLecturer::read,
        )?)
      })
      .await?;
    raws.into_iter().map(RawLecturer::into_lecturer).collect()
  }

  async fn featured_lecturers(&self, others: usize) -> Result<Vec<Lecturer>> {
    let others = others as i64;

    let raws: Vec<RawLecturer> = self
      .conn
      .call(move |conn| {
        let first = conn
          .query_row(
            &format!("SELECT {LECTURER_COLUMNS} FROM lecturers lr WHERE lr.sort_order = 1"),
            [],
            RawLecturer::read,
          )
          .optional()?;
        let first_id = first.as_ref().map(|r| r.id);
        let rest = query_all(
          conn,
          &format!(
            "SELECT {LECTURER_COLUMNS} FROM lecturers lr
             WHERE ?1 IS NULL OR lr.id != ?1
             ORDER BY RANDOM() LIMIT ?2"
          ),
          params![first_id, others],
          RawLecturer::read,
        )?;
        Ok(first.into_iter().chain(rest).collect())
      })
      .await?;

    raws.into_iter().map(RawLecturer::into_lecturer).collect()
  }

  async fn get_topic(&self, id: i64) -> Result<Option<Topic>> {
    let raw = self.conn.call(move |conn| Ok(select_topic(conn, id)?)).await?;
    raw.map(RawTopic::into_topic).transpose()
  }

  async fn list_topics(&self, lecturer_id: i64) -> Result<Vec<Topic>> {
    let raws: Vec<RawTopic> = self
      .conn
      .call(move |conn| {
        Ok(query_all(
          conn,
          &format!(
            "SELECT {TOPIC_COLUMNS} FROM topics t
             WHERE t.lecturer_id = ?1
             ORDER BY t.sort_order, t.id"
          ),
          params![lecturer_id],
          RawTopic::read,
        )?)
      })
      .await?;
    raws.into_iter().map(RawTopic::into_topic).collect()
  }

  async fn random_topics(&self, limit: usize) -> Result<Vec<Topic>> {
    let limit = limit as i64;
    let raws: Vec<RawTopic> = self
      .conn
      .call(move |conn| {
        Ok(query_all(
          conn,
          &format!("SELECT {TOPIC_COLUMNS} FROM topics t ORDER BY RANDOM() LIMIT ?1"),
          params![limit],
          RawTopic::read,
        )?)
      })
      .await?;
    raws.into_iter().map(RawTopic::into_topic).collect()
  }

  async fn get_lecture(&self, id: i64) -> Result<Option<Lecture>> {
    let raw = self.conn.call(move |conn| Ok(select_lecture(conn, id)?)).await?;
    raw.map(RawLecture::into_lecture).transpose()
  }

  async fn list_lectures(&self, topic_id: i64) -> Result<Vec<Lecture>> {
    let raws: Vec<RawLecture> = self
      .conn
      .call(move |conn| {
        Ok(query_all(
          conn,
          &format!("SELECT {LECTURE_COLUMNS} FROM lectures l WHERE l.topic_id = ?1"),
          params![topic_id],
          RawLecture::read,
        )?)
      })
      .await?;

    let mut lectures = raws
      .into_iter()
      .map(RawLecture::into_lecture)
      .collect::<Result<Vec<_>>>()?;
    lectures.sort_by(|a, b| {
      a.order
        .cmp(&b.order)
        .then_with(|| naming::natural_cmp(&a.title, &b.title))
    });
    Ok(lectures)
  }

  async fn recent_lectures(&self, limit: usize) -> Result<Vec<Lecture>> {
    let limit = limit as i64;
    let raws: Vec<RawLecture> = self
      .conn
      .call(move |conn| {
        Ok(query_all(
          conn,
          &format!(
            "SELECT {LECTURE_COLUMNS} FROM lectures l
             JOIN topics t ON t.id = l.topic_id
             WHERE substr(t.created_at, 1, 10) =
                   (SELECT substr(MAX(created_at), 1, 10) FROM topics)
             ORDER BY RANDOM() LIMIT ?1"
          ),
          params![limit],
          RawLecture::read,
        )?)
      })
      .await?;
    raws.into_iter().map(RawLecture::into_lecture).collect()
  }

  // ── Progress ──────────────────────────────────────────────────────────────

  async fn get_progress(&self, user_id: Uuid, lecture_id: i64) -> Result<Option<LectureProgress>> {
    let user_str = encode_uuid(user_id);
    let raw = self
      .conn
      .call(move |conn| Ok(select_progress(conn, &user_str, lecture_id)?))
      .await?;
    raw.map(RawProgress::into_progress).transpose()
  }

  async fn update_progress(
    &self,
    user_id: Uuid,
    lecture_id: i64,
    update: ProgressUpdate,
  ) -> Result<LectureProgress> {
    if update.current_time < 0.0 {
      // Persisted as reported; readers clamp the derived percentage.
      tracing::warn!(%user_id, lecture_id, current_time = update.current_time, "negative playback position");
    }

    let user_str = encode_uuid(user_id);
    let at_str   = encode_dt(Utc::now());

    let raw: RawProgress = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if lecture_duration(&tx, lecture_id)?.is_none() {
          return Ok(Err(CoreError::LectureNotFound(lecture_id)));
        }

        let (count, was_completed): (u32, bool) = tx
          .query_row(
            "SELECT listen_count, completed FROM lecture_progress
             WHERE user_id = ?1 AND lecture_id = ?2",
            params![user_str, lecture_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?
          .unwrap_or((0, false));
        let listen_count = progress::next_listen_count(count, was_completed, update.completed);

        tx.execute(
          "INSERT INTO lecture_progress (
             user_id, lecture_id, position, completed, listen_count, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
           ON CONFLICT (user_id, lecture_id) DO UPDATE SET
             position     = excluded.position,
             completed    = excluded.completed,
             listen_count = excluded.listen_count,
             updated_at   = excluded.updated_at",
          params![
            user_str,
            lecture_id,
            update.current_time,
            update.completed,
            listen_count,
            at_str,
          ],
        )?;

        let raw = select_progress(&tx, &user_str, lecture_id)?
          .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(Ok(raw))
      })
      .await??;

    raw.into_progress()
  }

  async fn topic_progress(&self, user_id: Uuid, topic_id: i64) -> Result<Vec<LectureProgress>> {
    let user_str = encode_uuid(user_id);
    let raws: Vec<RawProgress> = self
      .conn
      .call(move |conn| {
        Ok(query_all(
          conn,
          &format!(
            "SELECT {PROGRESS_COLUMNS} FROM lecture_progress p
             JOIN lectures l ON l.id = p.lecture_id
             WHERE p.user_id = ?1 AND l.topic_id = ?2"
          ),
          params![user_str, topic_id],
          RawProgress::read,
        )?)
      })
      .await?;
    raws.into_iter().map(RawProgress::into_progress).collect()
  }

  // ── Presence ──────────────────────────────────────────────────────────────

  async fn list_active_listeners(&self, query: &PresenceQuery) -> Result<Vec<ActiveListener>> {
    let exclude = encode_uuid(query.exclude_user);
    let cutoff  = encode_dt(query.cutoff());
    let limit   = query.limit as i64;

    let raws: Vec<RawListener> = self
      .conn
      .call(move |conn| {
        Ok(query_all(
          conn,
          "SELECT p.user_id, u.username, p.lecture_id, l.title, l.topic_id, t.title,
                  p.position, p.updated_at
           FROM lecture_progress p
           JOIN users    u ON u.user_id = p.user_id
           JOIN lectures l ON l.id      = p.lecture_id
           JOIN topics   t ON t.id      = l.topic_id
           WHERE p.user_id != ?1
             AND p.position > 0
             AND p.updated_at >= ?2
           ORDER BY p.updated_at DESC
           LIMIT ?3",
          params![exclude, cutoff, limit],
          RawListener::read,
        )?)
      })
      .await?;

    raws.into_iter().map(RawListener::into_listener).collect()
  }

  // ── Current lecture & history ─────────────────────────────────────────────

  async fn set_current_lecture(
    &self,
    user_id: Uuid,
    lecture_id: i64,
  ) -> Result<(CurrentLecture, LectureHistory)> {
    let now      = Utc::now();
    let today    = now.date_naive();
    let user_str = encode_uuid(user_id);
    let at_str   = encode_dt(now);
    let day_str  = encode_date(today);

    let (topic_id, duration_listened, completion_percentage) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(lecture) = select_lecture(&tx, lecture_id)? else {
          return Ok(Err(CoreError::LectureNotFound(lecture_id)));
        };
        let duration = lecture.duration.and_then(|d| u32::try_from(d).ok());

        tx.execute(
          "INSERT INTO current_lectures (user_id, topic_id, lecture_id, updated_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (user_id, topic_id) DO UPDATE SET
             lecture_id = excluded.lecture_id,
             updated_at = excluded.updated_at",
          params![user_str, lecture.topic_id, lecture_id, at_str],
        )?;

        let position = select_progress(&tx, &user_str, lecture_id)?.map(|p| p.position);
        let duration_listened = position.map_or(0, |p| p.max(0.0) as u32);
        let completion = position.map_or(0.0, |p| progress::progress_percentage(p, duration));

        tx.execute(
          "INSERT INTO lecture_history (
             user_id, lecture_id, listened_on, listened_at, duration_listened, completion_percentage
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (user_id, lecture_id, listened_on) DO UPDATE SET
             listened_at           = excluded.listened_at,
             duration_listened     = excluded.duration_listened,
             completion_percentage = excluded.completion_percentage",
          params![user_str, lecture_id, day_str, at_str, duration_listened, completion],
        )?;

        tx.commit()?;
        Ok(Ok((lecture.topic_id, duration_listened, completion)))
      })
      .await??;

    Ok((
      CurrentLecture { user_id, topic_id, lecture_id, updated_at: now },
      LectureHistory {
        user_id,
        lecture_id,
        listened_on: today,
        listened_at: now,
        duration_listened,
        completion_percentage,
      },
    ))
  }

  async fn get_current_lecture(&self, user_id: Uuid, topic_id: i64) -> Result<Option<CurrentLecture>> {
    let user_str = encode_uuid(user_id);
    let raw: Option<(i64, String)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT lecture_id, updated_at FROM current_lectures
               WHERE user_id = ?1 AND topic_id = ?2",
              params![user_str, topic_id],
              |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?,
        )
      })
      .await?;

    raw
      .map(|(lecture_id, at)| {
        Ok(CurrentLecture {
          user_id,
          topic_id,
          lecture_id,
          updated_at: decode_dt(&at)?,
        })
      })
      .transpose()
  }

  async fn list_history(&self, user_id: Uuid, limit: usize) -> Result<Vec<HistoryItem>> {
    let user_str = encode_uuid(user_id);
    let limit    = limit as i64;

    let raws: Vec<RawHistoryItem> = self
      .conn
      .call(move |conn| {
        Ok(query_all(
          conn,
          &format!(
            "SELECT h.user_id, h.lecture_id, h.listened_on, h.listened_at,
                    h.duration_listened, h.completion_percentage, {LECTURE_COLUMNS}
             FROM lecture_history h
             JOIN lectures l ON l.id = h.lecture_id
             WHERE h.user_id = ?1
               AND h.listened_at = (
                 SELECT MAX(h2.listened_at) FROM lecture_history h2
                 WHERE h2.user_id = h.user_id AND h2.lecture_id = h.lecture_id
               )
             ORDER BY h.listened_at DESC
             LIMIT ?2"
          ),
          params![user_str, limit],
          RawHistoryItem::read,
        )?)
      })
      .await?;

    raws.into_iter().map(RawHistoryItem::into_item).collect()
  }

  // ── Favorites ─────────────────────────────────────────────────────────────

  async fn add_favorite(&self, user_id: Uuid, lecture_id: i64) -> Result<()> {
    let user_str = encode_uuid(user_id);
    let at_str   = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        if lecture_duration(conn, lecture_id)?.is_none() {
          return Ok(Err(CoreError::LectureNotFound(lecture_id)));
        }
        conn.execute(
          "INSERT OR IGNORE INTO favorite_lectures (user_id, lecture_id, created_at)
           VALUES (?1, ?2, ?3)",
          params![user_str, lecture_id, at_str],
        )?;
        Ok(Ok(()))
      })
      .await??;
    Ok(())
  }

  async fn remove_favorite(&self, user_id: Uuid, lecture_id: i64) -> Result<bool> {
    let user_str = encode_uuid(user_id);
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM favorite_lectures WHERE user_id = ?1 AND lecture_id = ?2",
          params![user_str, lecture_id],
        )?)
      })
      .await?;
    Ok(removed > 0)
  }

  async fn list_favorites(&self, user_id: Uuid, limit: Option<usize>) -> Result<Vec<Lecture>> {
    let user_str = encode_uuid(user_id);
    let limit    = limit.map_or(-1, |l| l as i64);

    let raws: Vec<RawLecture> = self
      .conn
      .call(move |conn| {
        Ok(query_all(
          conn,
          &format!(
            "SELECT {LECTURE_COLUMNS} FROM favorite_lectures f
             JOIN lectures l ON l.id = f.lecture_id
             WHERE f.user_id = ?1
             ORDER BY f.created_at DESC
             LIMIT ?2"
          ),
          params![user_str, limit],
          RawLecture::read,
        )?)
      })
      .await?;
    raws.into_iter().map(RawLecture::into_lecture).collect()
  }

  async fn topic_favorites(&self, user_id: Uuid, topic_id: i64) -> Result<Vec<i64>> {
    let user_str = encode_uuid(user_id);
    let ids = self
      .conn
      .call(move |conn| {
        Ok(query_all(
          conn,
          "SELECT f.lecture_id FROM favorite_lectures f
           JOIN lectures l ON l.id = f.lecture_id
           WHERE f.user_id = ?1 AND l.topic_id = ?2",
          params![user_str, topic_id],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(ids)
  }

  // ── Markers ───────────────────────────────────────────────────────────────

  async fn list_markers(&self, user_id: Uuid, lecture_id: i64) -> Result<Vec<LectureMarker>> {
    let user_str = encode_uuid(user_id);
    let raws: Vec<RawMarker> = self
      .conn
      .call(move |conn| {
        Ok(query_all(
          conn,
          &format!(
            "SELECT {MARKER_COLUMNS} FROM lecture_markers m
             WHERE m.user_id = ?1 AND m.lecture_id = ?2
             ORDER BY m.position, m.id"
          ),
          params![user_str, lecture_id],
          RawMarker::read,
        )?)
      })
      .await?;
    raws.into_iter().map(RawMarker::into_marker).collect()
  }

  async fn add_marker(&self, user_id: Uuid, lecture_id: i64, input: NewMarker) -> Result<LectureMarker> {
    let user_str = encode_uuid(user_id);
    let at_str   = encode_dt(Utc::now());

    let raw: RawMarker = self
      .conn
      .call(move |conn| {
        let Some(duration) = lecture_duration(conn, lecture_id)? else {
          return Ok(Err(CoreError::LectureNotFound(lecture_id)));
        };
        let validated = marker::validate_timestamp(input.timestamp, duration)
          .and_then(|ts| marker::validate_text(&input.text).map(|text| (ts, text)));
        let (timestamp, text) = match validated {
          Ok(v) => v,
          Err(e) => return Ok(Err(e)),
        };

        conn.execute(
          "INSERT INTO lecture_markers (user_id, lecture_id, position, text, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          params![user_str, lecture_id, timestamp, text, at_str],
        )?;
        let raw = select_marker(conn, &user_str, conn.last_insert_rowid())?
          .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        Ok(Ok(raw))
      })
      .await??;

    raw.into_marker()
  }

  async fn update_marker(
    &self,
    user_id: Uuid,
    marker_id: i64,
    patch: MarkerPatch,
  ) -> Result<Option<LectureMarker>> {
    let user_str = encode_uuid(user_id);

    let raw: Option<RawMarker> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(existing) = select_marker(&tx, &user_str, marker_id)? else {
          return Ok(Ok(None));
        };
        let text = match marker::validate_text(&patch.text) {
          Ok(text) => text,
          Err(e) => return Ok(Err(e)),
        };
        let timestamp = match patch.timestamp {
          Some(ts) => {
            let duration = lecture_duration(&tx, existing.lecture_id)?.flatten();
            match marker::validate_timestamp(Some(ts), duration) {
              Ok(ts) => ts,
              Err(e) => return Ok(Err(e)),
            }
          }
          None => existing.position,
        };

        tx.execute(
          "UPDATE lecture_markers SET text = ?1, position = ?2 WHERE id = ?3",
          params![text, timestamp, marker_id],
        )?;
        let raw = select_marker(&tx, &user_str, marker_id)?;
        tx.commit()?;
        Ok(Ok(raw))
      })
      .await??;

    raw.map(RawMarker::into_marker).transpose()
  }

  async fn delete_marker(&self, user_id: Uuid, marker_id: i64) -> Result<bool> {
    let user_str = encode_uuid(user_id);
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM lecture_markers WHERE id = ?1 AND user_id = ?2",
          params![marker_id, user_str],
        )?)
      })
      .await?;
    Ok(removed > 0)
  }
}
