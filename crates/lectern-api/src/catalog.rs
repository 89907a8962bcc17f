//! Read-only catalog handlers and the topic player view.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/lecturers/` | Ordered by `(order, name)` |
//! | `GET`  | `/lecturers/{id}/` | Lecturer plus their topics |
//! | `GET`  | `/topics/{id}/` | Lectures, plus the caller's progress and favorites when signed in |
//!
//! None of these require a user.

use std::collections::{HashMap, HashSet};

use axum::{
  Extension, Json,
  extract::{Path, State},
};
use lectern_core::{
  Error as CoreError,
  catalog::{Lecture, Lecturer, Topic},
  progress::{Progress, ProgressSummary},
  store::LectureStore,
  user::User,
};
use serde::Serialize;

use crate::{ApiState, error::ApiError};

// ─── Lecturers ───────────────────────────────────────────────────────────────

/// `GET /lecturers/`
pub async fn lecturers<S: LectureStore>(
  State(state): State<ApiState<S>>,
) -> Result<Json<Vec<Lecturer>>, ApiError> {
  let lecturers = state.store.list_lecturers().await.map_err(ApiError::store)?;
  Ok(Json(lecturers))
}

#[derive(Debug, Serialize)]
pub struct LecturerDetail {
  #[serde(flatten)]
  pub lecturer: Lecturer,
  pub topics:   Vec<Topic>,
}

/// `GET /lecturers/{id}/`
pub async fn lecturer<S: LectureStore>(
  State(state): State<ApiState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<LecturerDetail>, ApiError> {
  let lecturer = state
    .store
    .get_lecturer(id)
    .await
    .map_err(ApiError::store)?
    .ok_or(CoreError::LecturerNotFound(id))?;
  let topics = state.store.list_topics(id).await.map_err(ApiError::store)?;
  Ok(Json(LecturerDetail { lecturer, topics }))
}

// ─── Topic player ────────────────────────────────────────────────────────────

/// A lecture as shown in the player list.
#[derive(Debug, Serialize)]
pub struct LectureEntry {
  #[serde(flatten)]
  pub lecture:            Lecture,
  pub formatted_duration: String,
  pub file_size_mb:       f64,
  pub progress:           ProgressSummary,
  pub is_favorite:        bool,
}

#[derive(Debug, Serialize)]
pub struct CurrentEntry {
  pub lecture_id: i64,
  pub progress:   ProgressSummary,
}

#[derive(Debug, Serialize)]
pub struct TopicView {
  pub topic:           Topic,
  pub lectures:        Vec<LectureEntry>,
  pub lecture_count:   usize,
  pub current_lecture: Option<CurrentEntry>,
}

/// `GET /topics/{id}/`
pub async fn topic<S: LectureStore>(
  State(state): State<ApiState<S>>,
  user: Option<Extension<User>>,
  Path(id): Path<i64>,
) -> Result<Json<TopicView>, ApiError> {
  let store = &*state.store;
  let topic = store
    .get_topic(id)
    .await
    .map_err(ApiError::store)?
    .ok_or(CoreError::TopicNotFound(id))?;
  let lectures = store.list_lectures(id).await.map_err(ApiError::store)?;

  let mut progress: HashMap<i64, Progress> = HashMap::new();
  let mut favorites: HashSet<i64> = HashSet::new();
  let mut current = None;
  if let Some(Extension(user)) = user {
    progress = store
      .topic_progress(user.user_id, id)
      .await
      .map_err(ApiError::store)?
      .into_iter()
      .map(|p| (p.lecture_id, Progress::Recorded(p)))
      .collect();
    favorites = store
      .topic_favorites(user.user_id, id)
      .await
      .map_err(ApiError::store)?
      .into_iter()
      .collect();
    current = store
      .get_current_lecture(user.user_id, id)
      .await
      .map_err(ApiError::store)?;
  }

  let current_lecture = current.and_then(|c| {
    let lecture = lectures.iter().find(|l| l.id == c.lecture_id)?;
    let summary = progress
      .get(&c.lecture_id)
      .map_or_else(ProgressSummary::default, |p| p.summary(lecture.duration));
    Some(CurrentEntry { lecture_id: c.lecture_id, progress: summary })
  });

  let lectures: Vec<LectureEntry> = lectures
    .into_iter()
    .map(|lecture| {
      let progress = progress.remove(&lecture.id).unwrap_or(Progress::Unstarted);
      LectureEntry {
        formatted_duration: lecture.formatted_duration(),
        file_size_mb:       lecture.file_size_mb(),
        progress:           progress.summary(lecture.duration),
        is_favorite:        favorites.contains(&lecture.id),
        lecture,
      }
    })
    .collect();

  Ok(Json(TopicView {
    topic,
    lecture_count: lectures.len(),
    lectures,
    current_lecture,
  }))
}
