//! HTTP Basic authentication against the users table.
//!
//! [`require_user`] runs as middleware in front of the per-user JSON routes
//! and inserts the authenticated [`User`] as a request extension.
//! [`attach_user`] does the same for the catalog reads but lets requests
//! without an `Authorization` header through anonymously.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
  extract::{Request, State},
  http::{HeaderMap, header},
  middleware::Next,
  response::Response,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use lectern_core::{store::LectureStore, user::User};
use rand_core::OsRng;

use crate::{AppState, error::Error};

/// Split an `Authorization: Basic …` header into username and password.
/// Anything malformed is reported as [`Error::Unauthorized`].
pub fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), Error> {
  headers
    .get(header::AUTHORIZATION)
    .and_then(|value| value.to_str().ok())
    .and_then(|value| value.strip_prefix("Basic "))
    .and_then(|token| B64.decode(token.trim()).ok())
    .and_then(|raw| String::from_utf8(raw).ok())
    .and_then(|pair| {
      let (username, password) = pair.split_once(':')?;
      Some((username.to_owned(), password.to_owned()))
    })
    .ok_or(Error::Unauthorized)
}

/// Check `password` against an argon2 PHC string.
pub fn verify_password(password: &str, password_hash: &str) -> Result<(), Error> {
  let stored = PasswordHash::new(password_hash).map_err(|_| Error::Unauthorized)?;
  match Argon2::default().verify_password(password.as_bytes(), &stored) {
    Ok(()) => Ok(()),
    Err(_) => Err(Error::Unauthorized),
  }
}

/// Hash `password` with a fresh salt into a PHC string.
pub fn hash_password(password: &str) -> Result<String, Error> {
  let salt = SaltString::generate(OsRng);
  let hash = Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map_err(|e| Error::PasswordHash(e.to_string()))?;
  Ok(hash.to_string())
}

/// Look up `username` and check `password` against the stored hash.
pub async fn authenticate<S: LectureStore>(
  store: &S,
  username: String,
  password: &str,
) -> Result<User, Error> {
  let creds = store
    .get_credentials(username)
    .await
    .map_err(Error::store)?
    .ok_or(Error::Unauthorized)?;
  verify_password(password, &creds.password_hash)?;
  Ok(creds.user)
}

/// Middleware: reject with 401 unless the request carries valid credentials.
pub async fn require_user<S: LectureStore + 'static>(
  State(app): State<AppState<S>>,
  mut req: Request,
  next: Next,
) -> Result<Response, Error> {
  let (username, password) = basic_credentials(req.headers())?;
  let user = match authenticate(&*app.store, username, &password).await {
    Ok(user) => user,
    Err(Error::Unauthorized) => {
      tracing::debug!(path = %req.uri().path(), "rejected credentials");
      return Err(Error::Unauthorized);
    }
    Err(e) => return Err(e),
  };
  req.extensions_mut().insert(user);
  Ok(next.run(req).await)
}

/// Middleware: attach the user when credentials are sent. No header means an
/// anonymous request; a header that does not authenticate is still a 401.
pub async fn attach_user<S: LectureStore + 'static>(
  State(app): State<AppState<S>>,
  req: Request,
  next: Next,
) -> Result<Response, Error> {
  if !req.headers().contains_key(header::AUTHORIZATION) {
    return Ok(next.run(req).await);
  }
  require_user(State(app), req, next).await
}
