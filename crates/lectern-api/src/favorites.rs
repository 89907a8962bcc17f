//! Handlers for favorite lectures.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/lectures/{id}/favorite/` | Idempotent |
//! | `DELETE` | `/lectures/{id}/favorite/` | Idempotent |
//! | `GET`    | `/favorites/` | Optional `?limit=` |

use axum::{
  Extension, Json,
  extract::{Path, Query, State},
};
use lectern_core::{catalog::Lecture, store::LectureStore, user::User};
use serde::{Deserialize, Serialize};

use crate::{ApiState, error::ApiError, require_lecture};

#[derive(Debug, Serialize)]
pub struct FavoriteState {
  pub success:     bool,
  pub is_favorite: bool,
  pub lecture_id:  i64,
}

/// `POST /lectures/{id}/favorite/`
pub async fn add<S: LectureStore>(
  State(state): State<ApiState<S>>,
  Extension(user): Extension<User>,
  Path(lecture_id): Path<i64>,
) -> Result<Json<FavoriteState>, ApiError> {
  state
    .store
    .add_favorite(user.user_id, lecture_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(FavoriteState { success: true, is_favorite: true, lecture_id }))
}

/// `DELETE /lectures/{id}/favorite/`
pub async fn remove<S: LectureStore>(
  State(state): State<ApiState<S>>,
  Extension(user): Extension<User>,
  Path(lecture_id): Path<i64>,
) -> Result<Json<FavoriteState>, ApiError> {
  require_lecture(&*state.store, lecture_id).await?;
  state
    .store
    .remove_favorite(user.user_id, lecture_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(FavoriteState { success: true, is_favorite: false, lecture_id }))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub limit: Option<usize>,
}

/// `GET /favorites/[?limit=<n>]`
pub async fn list<S: LectureStore>(
  State(state): State<ApiState<S>>,
  Extension(user): Extension<User>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Lecture>>, ApiError> {
  let lectures = state
    .store
    .list_favorites(user.user_id, params.limit)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(lectures))
}
