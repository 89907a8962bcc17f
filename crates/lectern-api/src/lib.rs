//! JSON REST API for Lectern.
//!
//! Exposes axum [`Router`]s backed by any [`lectern_core::store::LectureStore`].
//! Handlers read the authenticated `User` from a request extension; auth,
//! TLS and the audio proxy are the caller's responsibility.
//!
//! [`api_router`] holds the per-user routes and needs a `User` on every
//! request. [`catalog_router`] serves the catalog to anyone and adds the
//! personal sections when a `User` is present.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let api = lectern_api::api_router(state.clone())
//!   .route_layer(require_auth)
//!   .merge(lectern_api::catalog_router(state).route_layer(optional_auth));
//! Router::new().nest("/api/v1", api)
//! ```

pub mod cache;
pub mod catalog;
pub mod error;
pub mod extract;
pub mod favorites;
pub mod home;
pub mod markers;
pub mod presence;
pub mod progress;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use chrono::TimeDelta;
use lectern_core::{catalog::Lecture, store::LectureStore};

pub use cache::{CacheTtls, HomeCache};
pub use error::ApiError;
pub use extract::JsonBody;

// ─── State ───────────────────────────────────────────────────────────────────

/// Tunables for the presence list.
#[derive(Debug, Clone, Copy)]
pub struct PresenceSettings {
  /// How far back a progress update still counts as listening.
  pub window: TimeDelta,
  pub limit:  usize,
}

impl Default for PresenceSettings {
  fn default() -> Self { Self { window: TimeDelta::seconds(60), limit: 5 } }
}

/// Shared state threaded through all API handlers.
pub struct ApiState<S> {
  pub store:    Arc<S>,
  pub presence: PresenceSettings,
  pub home:     Arc<HomeCache>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      presence: self.presence,
      home:     Arc::clone(&self.home),
    }
  }
}

impl<S> ApiState<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self {
      store,
      presence: PresenceSettings::default(),
      home: Arc::new(HomeCache::default()),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the per-user API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: LectureStore + 'static,
{
  Router::new()
    // Progress
    .route(
      "/lectures/{id}/progress/",
      get(progress::get_one::<S>).post(progress::update::<S>),
    )
    .route("/lectures/{id}/set-current/", post(progress::set_current::<S>))
    .route("/history/", get(progress::history::<S>))
    // Favorites
    .route(
      "/lectures/{id}/favorite/",
      post(favorites::add::<S>).delete(favorites::remove::<S>),
    )
    .route("/favorites/", get(favorites::list::<S>))
    // Markers
    .route(
      "/lectures/{id}/markers/",
      get(markers::list::<S>).post(markers::create::<S>),
    )
    .route("/markers/{id}/", put(markers::update::<S>).delete(markers::remove::<S>))
    // Presence
    .route("/now-listening/", get(presence::handler::<S>))
    .with_state(state)
}

/// Build the catalog router. Its handlers take the `User` extension as
/// optional.
pub fn catalog_router<S>(state: ApiState<S>) -> Router<()>
where
  S: LectureStore + 'static,
{
  Router::new()
    .route("/lecturers/", get(catalog::lecturers::<S>))
    .route("/lecturers/{id}/", get(catalog::lecturer::<S>))
    .route("/topics/{id}/", get(catalog::topic::<S>))
    .route("/home/", get(home::handler::<S>))
    .with_state(state)
}

/// Fetch a lecture or fail with 404.
pub(crate) async fn require_lecture<S: LectureStore>(
  store: &S,
  lecture_id: i64,
) -> Result<Lecture, ApiError> {
  store
    .get_lecture(lecture_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| lectern_core::Error::LectureNotFound(lecture_id).into())
}
