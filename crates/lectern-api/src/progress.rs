//! Handlers for playback progress, the current-lecture pointer and history.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/lectures/{id}/progress/` | Zeroed summary when never played |
//! | `POST` | `/lectures/{id}/progress/` | Body: `{"current_time":108,"completed":true}` |
//! | `POST` | `/lectures/{id}/set-current/` | Also snapshots today's history row |
//! | `GET`  | `/history/` | Optional `?limit=`; most recent first |

use axum::{
  Extension, Json,
  extract::{Path, Query, State},
};
use lectern_core::{
  progress::{HistoryItem, Progress, ProgressSummary, ProgressUpdate},
  store::LectureStore,
  user::User,
};
use serde::{Deserialize, Serialize};

use crate::{ApiState, error::ApiError, extract::JsonBody, require_lecture};

// ─── Read ────────────────────────────────────────────────────────────────────

/// `GET /lectures/{id}/progress/`
pub async fn get_one<S: LectureStore>(
  State(state): State<ApiState<S>>,
  Extension(user): Extension<User>,
  Path(lecture_id): Path<i64>,
) -> Result<Json<ProgressSummary>, ApiError> {
  let lecture = require_lecture(&*state.store, lecture_id).await?;
  let record = state
    .store
    .get_progress(user.user_id, lecture_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(Progress::from(record).summary(lecture.duration)))
}

// ─── Update ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ProgressSaved {
  pub success:  bool,
  #[serde(flatten)]
  pub progress: ProgressSummary,
}

/// `POST /lectures/{id}/progress/`
pub async fn update<S: LectureStore>(
  State(state): State<ApiState<S>>,
  Extension(user): Extension<User>,
  Path(lecture_id): Path<i64>,
  JsonBody(body): JsonBody<ProgressUpdate>,
) -> Result<Json<ProgressSaved>, ApiError> {
  let lecture = require_lecture(&*state.store, lecture_id).await?;
  let record = state
    .store
    .update_progress(user.user_id, lecture_id, body)
    .await
    .map_err(ApiError::store)?;

  tracing::debug!(
    user = %user.username,
    lecture_id,
    current_time = record.current_time,
    completed = record.completed,
    "progress saved"
  );

  Ok(Json(ProgressSaved {
    success:  true,
    progress: Progress::Recorded(record).summary(lecture.duration),
  }))
}

// ─── Current lecture ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CurrentSet {
  pub success:            bool,
  pub current_lecture_id: i64,
}

/// `POST /lectures/{id}/set-current/`
pub async fn set_current<S: LectureStore>(
  State(state): State<ApiState<S>>,
  Extension(user): Extension<User>,
  Path(lecture_id): Path<i64>,
) -> Result<Json<CurrentSet>, ApiError> {
  let (current, history) = state
    .store
    .set_current_lecture(user.user_id, lecture_id)
    .await
    .map_err(ApiError::store)?;

  tracing::debug!(
    user = %user.username,
    lecture_id,
    topic_id = current.topic_id,
    completion = history.completion_percentage,
    "current lecture set"
  );

  Ok(Json(CurrentSet { success: true, current_lecture_id: current.lecture_id }))
}

// ─── History ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  pub limit: Option<usize>,
}

/// `GET /history/[?limit=<n>]`
pub async fn history<S: LectureStore>(
  State(state): State<ApiState<S>>,
  Extension(user): Extension<User>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistoryItem>>, ApiError> {
  let items = state
    .store
    .list_history(user.user_id, params.limit.unwrap_or(50))
    .await
    .map_err(ApiError::store)?;
  Ok(Json(items))
}
