//! In-process cache for the shared parts of the home feed.
//!
//! Each key has its own slot, its own lock and its own TTL. A miss loads
//! outside the lock, so two concurrent misses may both hit the store; the
//! later write wins.

use std::{
  future::Future,
  sync::Mutex,
  time::{Duration, Instant},
};

use lectern_core::catalog::{Lecture, Lecturer, Topic};

// ─── Slot ────────────────────────────────────────────────────────────────────

/// One cached value with its load time.
pub struct Slot<T> {
  ttl:   Duration,
  entry: Mutex<Option<(Instant, T)>>,
}

impl<T: Clone> Slot<T> {
  pub fn new(ttl: Duration) -> Self { Self { ttl, entry: Mutex::new(None) } }

  pub fn ttl(&self) -> Duration { self.ttl }

  /// The cached value, if it was stored no longer than `ttl` before `now`.
  pub fn get_at(&self, now: Instant) -> Option<T> {
    let guard = match self.entry.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    match guard.as_ref() {
      Some((stored_at, value)) if now.saturating_duration_since(*stored_at) <= self.ttl => {
        Some(value.clone())
      }
      _ => None,
    }
  }

  pub fn put_at(&self, now: Instant, value: T) {
    let mut guard = match self.entry.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    *guard = Some((now, value));
  }

  /// Return the fresh cached value or run `load` and cache its result.
  /// Errors are not cached.
  pub async fn get_or_load<E, F, Fut>(&self, load: F) -> Result<T, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    if let Some(hit) = self.get_at(Instant::now()) {
      return Ok(hit);
    }
    let value = load().await?;
    self.put_at(Instant::now(), value.clone());
    Ok(value)
  }
}

// ─── Home cache ──────────────────────────────────────────────────────────────

/// Time-to-live of each home feed key.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
  pub featured_lecturers: Duration,
  pub random_topics:      Duration,
  pub recent_lectures:    Duration,
}

impl Default for CacheTtls {
  fn default() -> Self {
    Self {
      featured_lecturers: Duration::from_secs(300),
      random_topics:      Duration::from_secs(60),
      recent_lectures:    Duration::from_secs(300),
    }
  }
}

/// The home feed lists that are the same for every user.
pub struct HomeCache {
  pub featured_lecturers: Slot<Vec<Lecturer>>,
  pub random_topics:      Slot<Vec<Topic>>,
  pub recent_lectures:    Slot<Vec<Lecture>>,
}

impl HomeCache {
  pub fn new(ttls: CacheTtls) -> Self {
    Self {
      featured_lecturers: Slot::new(ttls.featured_lecturers),
      random_topics:      Slot::new(ttls.random_topics),
      recent_lectures:    Slot::new(ttls.recent_lectures),
    }
  }
}

impl Default for HomeCache {
  fn default() -> Self { Self::new(CacheTtls::default()) }
}
