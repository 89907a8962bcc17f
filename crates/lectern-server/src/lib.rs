//! HTTP server assembly for Lectern.
//!
//! Mounts everything under `/api/v1`:
//!
//! | Routes                      | Auth                                     |
//! |-----------------------------|------------------------------------------|
//! | per-user API                | Basic auth required                      |
//! | catalog and home feed       | optional; credentials add personal data  |
//! | `POST /register/`           | none                                     |
//! | `GET /lectures/{id}/audio/` | none; browser `<audio>` hits it directly |

pub mod audio;
pub mod auth;
pub mod error;
pub mod register;

pub use error::{Error, Result};

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router, middleware,
  routing::{get, post},
};
use chrono::TimeDelta;
use lectern_api::{
  ApiState, CacheTtls, HomeCache, PresenceSettings, api_router, catalog_router,
};
use lectern_core::store::LectureStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `LECTERN_*` environment variables.
#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                          String,
  #[serde(default = "default_port")]
  pub port:                          u16,
  #[serde(default = "default_store_path")]
  pub store_path:                    PathBuf,
  /// Root that relative `audio_file` keys are joined onto.
  pub media_base_url:                String,
  #[serde(default = "default_presence_window_secs")]
  pub presence_window_secs:          u32,
  #[serde(default = "default_presence_limit")]
  pub presence_limit:                usize,
  #[serde(default = "default_featured_lecturers_ttl_secs")]
  pub featured_lecturers_ttl_secs:   u64,
  #[serde(default = "default_random_topics_ttl_secs")]
  pub random_topics_ttl_secs:        u64,
  #[serde(default = "default_recent_lectures_ttl_secs")]
  pub recent_lectures_ttl_secs:      u64,
  #[serde(default = "default_upstream_connect_timeout_secs")]
  pub upstream_connect_timeout_secs: u64,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8000 }
fn default_store_path() -> PathBuf { PathBuf::from("lectern.db") }
fn default_presence_window_secs() -> u32 { 60 }
fn default_presence_limit() -> usize { 5 }
fn default_featured_lecturers_ttl_secs() -> u64 { 300 }
fn default_random_topics_ttl_secs() -> u64 { 60 }
fn default_recent_lectures_ttl_secs() -> u64 { 300 }
fn default_upstream_connect_timeout_secs() -> u64 { 10 }

impl ServerConfig {
  pub fn presence(&self) -> PresenceSettings {
    PresenceSettings {
      window: TimeDelta::seconds(i64::from(self.presence_window_secs)),
      limit:  self.presence_limit,
    }
  }

  pub fn cache_ttls(&self) -> CacheTtls {
    CacheTtls {
      featured_lecturers: Duration::from_secs(self.featured_lecturers_ttl_secs),
      random_topics:      Duration::from_secs(self.random_topics_ttl_secs),
      recent_lectures:    Duration::from_secs(self.recent_lectures_ttl_secs),
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through the server's own handlers and middleware.
pub struct AppState<S> {
  pub store:  Arc<S>,
  pub config: Arc<ServerConfig>,
  pub home:   Arc<HomeCache>,
  /// Client for the audio upstream; cloning shares its connection pool.
  pub http:   reqwest::Client,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      config: Arc::clone(&self.config),
      home:   Arc::clone(&self.home),
      http:   self.http.clone(),
    }
  }
}

impl<S> AppState<S> {
  pub fn new(store: Arc<S>, config: ServerConfig) -> Result<Self> {
    let http = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(config.upstream_connect_timeout_secs))
      .build()?;
    Ok(Self {
      store,
      home: Arc::new(HomeCache::new(config.cache_ttls())),
      config: Arc::new(config),
      http,
    })
  }

  /// The state the JSON API handlers see.
  pub fn api_state(&self) -> ApiState<S> {
    ApiState {
      store:    Arc::clone(&self.store),
      presence: self.config.presence(),
      home:     Arc::clone(&self.home),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the complete application router.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: LectureStore + 'static,
{
  let personal = api_router(state.api_state())
    .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_user::<S>));
  let catalog = catalog_router(state.api_state())
    .route_layer(middleware::from_fn_with_state(state.clone(), auth::attach_user::<S>));
  let open = Router::new()
    .route("/register/", post(register::handler::<S>))
    .route("/lectures/{id}/audio/", get(audio::handler::<S>))
    .with_state(state);

  Router::new()
    .nest("/api/v1", personal.merge(catalog).merge(open))
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests;
