//! Handlers for per-user lecture markers.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/lectures/{id}/markers/` | `{"markers":[…]}` ordered by timestamp |
//! | `POST`   | `/lectures/{id}/markers/` | Body: `{"timestamp":42.5,"text":"…"}` |
//! | `PUT`    | `/markers/{id}/` | Body: `{"text":"…","timestamp":?}`; owner only |
//! | `DELETE` | `/markers/{id}/` | Owner only |
//!
//! A marker owned by someone else is reported as not found.

use axum::{
  Extension, Json,
  extract::{Path, State},
};
use lectern_core::{
  Error as CoreError,
  marker::{LectureMarker, MarkerPatch, NewMarker},
  store::LectureStore,
  user::User,
};
use serde::Serialize;

use crate::{ApiState, error::ApiError, extract::JsonBody, require_lecture};

/// Wire shape of a marker.
#[derive(Debug, Serialize)]
pub struct MarkerBody {
  pub id:                  i64,
  pub timestamp:           f64,
  pub text:                String,
  pub formatted_timestamp: String,
}

impl From<LectureMarker> for MarkerBody {
  fn from(m: LectureMarker) -> Self {
    Self {
      id:                  m.id,
      timestamp:           m.timestamp,
      formatted_timestamp: m.formatted_timestamp(),
      text:                m.text,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct MarkerList {
  pub markers: Vec<MarkerBody>,
}

#[derive(Debug, Serialize)]
pub struct MarkerSaved {
  pub success: bool,
  pub marker:  MarkerBody,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
  pub success: bool,
}

/// `GET /lectures/{id}/markers/`
pub async fn list<S: LectureStore>(
  State(state): State<ApiState<S>>,
  Extension(user): Extension<User>,
  Path(lecture_id): Path<i64>,
) -> Result<Json<MarkerList>, ApiError> {
  require_lecture(&*state.store, lecture_id).await?;
  let markers = state
    .store
    .list_markers(user.user_id, lecture_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(MarkerList { markers: markers.into_iter().map(MarkerBody::from).collect() }))
}

/// `POST /lectures/{id}/markers/`
pub async fn create<S: LectureStore>(
  State(state): State<ApiState<S>>,
  Extension(user): Extension<User>,
  Path(lecture_id): Path<i64>,
  JsonBody(body): JsonBody<NewMarker>,
) -> Result<Json<MarkerSaved>, ApiError> {
  let marker = state
    .store
    .add_marker(user.user_id, lecture_id, body)
    .await
    .map_err(ApiError::store)?;
  tracing::debug!(user = %user.username, lecture_id, marker_id = marker.id, "marker added");
  Ok(Json(MarkerSaved { success: true, marker: marker.into() }))
}

/// `PUT /markers/{id}/`
pub async fn update<S: LectureStore>(
  State(state): State<ApiState<S>>,
  Extension(user): Extension<User>,
  Path(marker_id): Path<i64>,
  JsonBody(body): JsonBody<MarkerPatch>,
) -> Result<Json<MarkerSaved>, ApiError> {
  let marker = state
    .store
    .update_marker(user.user_id, marker_id, body)
    .await
    .map_err(ApiError::store)?
    .ok_or(CoreError::MarkerNotFound(marker_id))?;
  Ok(Json(MarkerSaved { success: true, marker: marker.into() }))
}

/// `DELETE /markers/{id}/`
pub async fn remove<S: LectureStore>(
  State(state): State<ApiState<S>>,
  Extension(user): Extension<User>,
  Path(marker_id): Path<i64>,
) -> Result<Json<Deleted>, ApiError> {
  let removed = state
    .store
    .delete_marker(user.user_id, marker_id)
    .await
    .map_err(ApiError::store)?;
  if !removed {
    return Err(CoreError::MarkerNotFound(marker_id).into());
  }
  Ok(Json(Deleted { success: true }))
}
