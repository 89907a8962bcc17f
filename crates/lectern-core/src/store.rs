//! The `LectureStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `lectern-store-sqlite`).
//! Higher layers (`lectern-api`, `lectern-server`) depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  catalog::{
    Language, Lecture, LectureFile, Lecturer, NewLecture, NewLecturer, NewTopic,
    Topic, TopicGroup,
  },
  marker::{LectureMarker, MarkerPatch, NewMarker},
  presence::{ActiveListener, PresenceQuery},
  progress::{CurrentLecture, HistoryItem, LectureHistory, LectureProgress, ProgressUpdate},
  user::{User, UserCredentials},
};

// ─── Error classification ────────────────────────────────────────────────────

/// Backend errors expose the domain error they wrap, if any, so transport
/// layers can tell a validation failure from an I/O failure.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn as_core(&self) -> Option<&crate::Error>;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Lectern store backend.
///
/// Keyed records (progress, current lecture, favorites, history) are written
/// as upserts; backends must rely on their own unique constraints for
/// correctness under concurrent requests.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait LectureStore: Send + Sync {
  type Error: StoreError;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Create a user with an already-hashed password.
  fn add_user(
    &self,
    username: String,
    password_hash: String,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// Look up a user and their password hash by username.
  fn get_credentials(
    &self,
    username: String,
  ) -> impl Future<Output = Result<Option<UserCredentials>, Self::Error>> + Send + '_;

  // ── Catalog writes ────────────────────────────────────────────────────

  fn add_language(
    &self,
    code: String,
    name: String,
  ) -> impl Future<Output = Result<Language, Self::Error>> + Send + '_;

  fn add_topic_group(
    &self,
    name: String,
  ) -> impl Future<Output = Result<TopicGroup, Self::Error>> + Send + '_;

  /// Create a lecturer. The level is derived: no guru means founder (and
  /// fails if a founder exists), otherwise one below the guru.
  fn add_lecturer(
    &self,
    input: NewLecturer,
  ) -> impl Future<Output = Result<Lecturer, Self::Error>> + Send + '_;

  /// Re-parent a lecturer, re-deriving its level. Fails on cycles and when
  /// the lecturer is the founder.
  fn set_guru(
    &self,
    lecturer_id: i64,
    guru_id: i64,
  ) -> impl Future<Output = Result<Lecturer, Self::Error>> + Send + '_;

  fn add_topic(
    &self,
    input: NewTopic,
  ) -> impl Future<Output = Result<Topic, Self::Error>> + Send + '_;

  /// Create one lecture. The language must be one of the topic's languages
  /// and the filename hash must be new within the topic.
  fn add_lecture(
    &self,
    input: NewLecture,
  ) -> impl Future<Output = Result<Lecture, Self::Error>> + Send + '_;

  /// Append a batch of stored audio files to a topic, in natural filename
  /// order after the topic's last lecture. Returns the lectures created.
  fn append_lectures(
    &self,
    topic_id: i64,
    files: Vec<LectureFile>,
  ) -> impl Future<Output = Result<Vec<Lecture>, Self::Error>> + Send + '_;

  // ── Catalog reads ─────────────────────────────────────────────────────

  fn get_lecturer(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Lecturer>, Self::Error>> + Send + '_;

  /// All lecturers ordered by `(order, name)`.
  fn list_lecturers(
    &self,
  ) -> impl Future<Output = Result<Vec<Lecturer>, Self::Error>> + Send + '_;

  /// The order-1 lecturer followed by up to `others` random lecturers.
  fn featured_lecturers(
    &self,
    others: usize,
  ) -> impl Future<Output = Result<Vec<Lecturer>, Self::Error>> + Send + '_;

  fn get_topic(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Topic>, Self::Error>> + Send + '_;

  /// Topics of a lecturer ordered by `order`.
  fn list_topics(
    &self,
    lecturer_id: i64,
  ) -> impl Future<Output = Result<Vec<Topic>, Self::Error>> + Send + '_;

  fn random_topics(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Topic>, Self::Error>> + Send + '_;

  fn get_lecture(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Lecture>, Self::Error>> + Send + '_;

  /// Lectures of a topic ordered by `order`, then naturally by title.
  fn list_lectures(
    &self,
    topic_id: i64,
  ) -> impl Future<Output = Result<Vec<Lecture>, Self::Error>> + Send + '_;

  /// Random lectures from the topics created on the most recent topic
  /// creation day.
  fn recent_lectures(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Lecture>, Self::Error>> + Send + '_;

  // ── Progress ──────────────────────────────────────────────────────────

  fn get_progress(
    &self,
    user_id: Uuid,
    lecture_id: i64,
  ) -> impl Future<Output = Result<Option<LectureProgress>, Self::Error>> + Send + '_;

  /// Upsert the (user, lecture) progress row, counting a listen on each
  /// not-completed → completed transition.
  fn update_progress(
    &self,
    user_id: Uuid,
    lecture_id: i64,
    update: ProgressUpdate,
  ) -> impl Future<Output = Result<LectureProgress, Self::Error>> + Send + '_;

  /// All of a user's progress rows for the lectures of one topic.
  fn topic_progress(
    &self,
    user_id: Uuid,
    topic_id: i64,
  ) -> impl Future<Output = Result<Vec<LectureProgress>, Self::Error>> + Send + '_;

  // ── Presence ──────────────────────────────────────────────────────────

  fn list_active_listeners<'a>(
    &'a self,
    query: &'a PresenceQuery,
  ) -> impl Future<Output = Result<Vec<ActiveListener>, Self::Error>> + Send + 'a;

  // ── Current lecture & history ─────────────────────────────────────────

  /// Point the user's (user, topic) pointer at `lecture_id` and snapshot
  /// today's history row from the current progress.
  fn set_current_lecture(
    &self,
    user_id: Uuid,
    lecture_id: i64,
  ) -> impl Future<Output = Result<(CurrentLecture, LectureHistory), Self::Error>> + Send + '_;

  fn get_current_lecture(
    &self,
    user_id: Uuid,
    topic_id: i64,
  ) -> impl Future<Output = Result<Option<CurrentLecture>, Self::Error>> + Send + '_;

  /// Most recently listened lectures first, one item per lecture.
  fn list_history(
    &self,
    user_id: Uuid,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<HistoryItem>, Self::Error>> + Send + '_;

  // ── Favorites ─────────────────────────────────────────────────────────

  /// Idempotent.
  fn add_favorite(
    &self,
    user_id: Uuid,
    lecture_id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Returns whether a row was removed.
  fn remove_favorite(
    &self,
    user_id: Uuid,
    lecture_id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn list_favorites(
    &self,
    user_id: Uuid,
    limit: Option<usize>,
  ) -> impl Future<Output = Result<Vec<Lecture>, Self::Error>> + Send + '_;

  /// Ids of the user's favorite lectures within one topic.
  fn topic_favorites(
    &self,
    user_id: Uuid,
    topic_id: i64,
  ) -> impl Future<Output = Result<Vec<i64>, Self::Error>> + Send + '_;

  // ── Markers ───────────────────────────────────────────────────────────

  /// The user's markers on a lecture ordered by timestamp.
  fn list_markers(
    &self,
    user_id: Uuid,
    lecture_id: i64,
  ) -> impl Future<Output = Result<Vec<LectureMarker>, Self::Error>> + Send + '_;

  /// Validate and store a marker against the lecture's duration.
  fn add_marker(
    &self,
    user_id: Uuid,
    lecture_id: i64,
    input: NewMarker,
  ) -> impl Future<Output = Result<LectureMarker, Self::Error>> + Send + '_;

  /// Returns `None` when the marker does not exist or belongs to someone else.
  fn update_marker(
    &self,
    user_id: Uuid,
    marker_id: i64,
    patch: MarkerPatch,
  ) -> impl Future<Output = Result<Option<LectureMarker>, Self::Error>> + Send + '_;

  /// Returns whether a marker owned by `user_id` was removed.
  fn delete_marker(
    &self,
    user_id: Uuid,
    marker_id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
