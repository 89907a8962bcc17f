//! `GET /now-listening/`: who else is playing something right now.

use axum::{Extension, Json, extract::State};
use lectern_core::{
  presence::{ActiveListener, PresenceQuery},
  store::LectureStore,
  user::User,
};

use crate::{ApiState, error::ApiError};

/// Listeners other than the caller with a recent, non-zero position.
pub async fn handler<S: LectureStore>(
  State(state): State<ApiState<S>>,
  Extension(user): Extension<User>,
) -> Result<Json<Vec<ActiveListener>>, ApiError> {
  Ok(Json(active_listeners(&state, &user).await?))
}

pub(crate) async fn active_listeners<S: LectureStore>(
  state: &ApiState<S>,
  user: &User,
) -> Result<Vec<ActiveListener>, ApiError> {
  let query = PresenceQuery::new(user.user_id, state.presence.window, state.presence.limit);
  state
    .store
    .list_active_listeners(&query)
    .await
    .map_err(ApiError::store)
}
