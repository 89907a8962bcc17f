//! The `GET /home/` landing page feed.
//!
//! The lecturer, topic and recent-lecture lists are shared by every visitor
//! and served from [`crate::HomeCache`]. Favorites, history and presence are
//! read per request and stay empty without a user.

use axum::{Extension, Json, extract::State};
use lectern_core::{
  catalog::{Lecture, Lecturer, Topic},
  presence::ActiveListener,
  store::LectureStore,
  user::User,
};
use serde::Serialize;

use crate::{ApiState, error::ApiError, presence::active_listeners};

const FEATURED_OTHERS: usize = 4;
const RANDOM_TOPICS: usize = 5;
const RECENT_LECTURES: usize = 5;
const PERSONAL_ITEMS: usize = 5;

#[derive(Debug, Serialize)]
pub struct HomeFeed {
  pub lecturers:         Vec<Lecturer>,
  pub topics:            Vec<Topic>,
  pub recent_lectures:   Vec<Lecture>,
  pub favorite_lectures: Vec<Lecture>,
  pub history_lectures:  Vec<Lecture>,
  pub now_listening:     Vec<ActiveListener>,
}

/// `GET /home/`
pub async fn handler<S: LectureStore>(
  State(state): State<ApiState<S>>,
  user: Option<Extension<User>>,
) -> Result<Json<HomeFeed>, ApiError> {
  let store = &*state.store;
  let home = &state.home;

  let lecturers = home
    .featured_lecturers
    .get_or_load(|| async {
      store.featured_lecturers(FEATURED_OTHERS).await.map_err(ApiError::store)
    })
    .await?;
  let topics = home
    .random_topics
    .get_or_load(|| async { store.random_topics(RANDOM_TOPICS).await.map_err(ApiError::store) })
    .await?;
  let recent_lectures = home
    .recent_lectures
    .get_or_load(|| async {
      store.recent_lectures(RECENT_LECTURES).await.map_err(ApiError::store)
    })
    .await?;

  let (favorite_lectures, history_lectures, now_listening) = match user {
    Some(Extension(user)) => {
      let favorites = store
        .list_favorites(user.user_id, Some(PERSONAL_ITEMS))
        .await
        .map_err(ApiError::store)?;
      let history: Vec<Lecture> = store
        .list_history(user.user_id, PERSONAL_ITEMS)
        .await
        .map_err(ApiError::store)?
        .into_iter()
        .map(|item| item.lecture)
        .collect();
      (favorites, history, active_listeners(&state, &user).await?)
    }
    None => (Vec::new(), Vec::new(), Vec::new()),
  };

  Ok(Json(HomeFeed {
    lecturers,
    topics,
    recent_lectures,
    favorite_lectures,
    history_lectures,
    now_listening,
  }))
}
