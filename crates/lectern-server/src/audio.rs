//! Range-aware audio passthrough for `GET /api/v1/lectures/{id}/audio/`.
//!
//! One upstream request per client request. The incoming `Range` header is
//! forwarded untouched and the upstream status and length headers come back
//! as-is, so seeking works whether the upstream answers 200 or 206.

use axum::{
  body::Body,
  extract::{Path, State},
  http::{HeaderMap, HeaderName, header},
  response::Response,
};
use bytes::Bytes;
use futures_util::{Stream, StreamExt as _, stream};
use lectern_core::store::LectureStore;

use crate::{AppState, error::Error};

/// Largest body chunk handed to the client.
pub const CHUNK_SIZE: usize = 8 * 1024;

const FORWARDED_HEADERS: [HeaderName; 4] = [
  header::CONTENT_LENGTH,
  header::CONTENT_RANGE,
  header::ACCEPT_RANGES,
  header::CONTENT_TYPE,
];

/// Absolute `http(s)` URLs are used as-is; anything else is a key under
/// `base`.
pub fn resolve_url(base: &str, audio_file: &str) -> String {
  if audio_file.starts_with("http://") || audio_file.starts_with("https://") {
    return audio_file.to_owned();
  }
  format!(
    "{}/{}",
    base.trim_end_matches('/'),
    audio_file.trim_start_matches('/')
  )
}

/// Split every item of `stream` into pieces of at most `max` bytes.
pub fn rechunk<St, E>(stream: St, max: usize) -> impl Stream<Item = Result<Bytes, E>>
where
  St: Stream<Item = Result<Bytes, E>>,
{
  stream.flat_map(move |item| {
    let pieces = match item {
      Ok(mut bytes) => {
        let mut pieces = Vec::with_capacity(bytes.len().div_ceil(max));
        while bytes.len() > max {
          pieces.push(Ok(bytes.split_to(max)));
        }
        if !bytes.is_empty() {
          pieces.push(Ok(bytes));
        }
        pieces
      }
      Err(e) => vec![Err(e)],
    };
    stream::iter(pieces)
  })
}

pub async fn handler<S: LectureStore>(
  State(state): State<AppState<S>>,
  Path(lecture_id): Path<i64>,
  headers: HeaderMap,
) -> Result<Response, Error> {
  let lecture = state
    .store
    .get_lecture(lecture_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::NotFound)?;

  let url = resolve_url(&state.config.media_base_url, &lecture.audio_file);
  let range = headers.get(header::RANGE).cloned();

  let mut request = state.http.get(&url);
  if let Some(range) = &range {
    request = request.header(header::RANGE, range.clone());
  }

  let upstream = match request.send().await {
    Ok(upstream) => upstream,
    Err(e) => {
      tracing::warn!(lecture_id, %url, error = %e, "audio upstream unreachable");
      return Err(Error::NotFound);
    }
  };

  let status = upstream.status();
  if status.is_client_error() || status.is_server_error() {
    tracing::warn!(lecture_id, %url, %status, "audio upstream returned an error");
    return Err(Error::NotFound);
  }

  tracing::debug!(lecture_id, %status, range = ?range, "streaming audio");

  let mut response = Response::builder().status(status);
  for name in FORWARDED_HEADERS {
    if let Some(value) = upstream.headers().get(&name) {
      response = response.header(name, value.clone());
    }
  }

  let body = Body::from_stream(rechunk(upstream.bytes_stream(), CHUNK_SIZE));
  Ok(response.body(body)?)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn relative_keys_join_onto_base() {
    assert_eq!(
      resolve_url("http://media.local/files/", "/sb/canto-1.mp3"),
      "http://media.local/files/sb/canto-1.mp3"
    );
    assert_eq!(
      resolve_url("http://media.local/files", "sb/canto-1.mp3"),
      "http://media.local/files/sb/canto-1.mp3"
    );
  }

  #[test]
  fn absolute_urls_pass_through() {
    let url = "https://cdn.example.org/a.mp3";
    assert_eq!(resolve_url("http://media.local/", url), url);
  }

  #[tokio::test]
  async fn rechunk_caps_piece_size() {
    let input = stream::iter(vec![
      Ok::<_, std::io::Error>(Bytes::from(vec![1u8; 20_000])),
      Ok(Bytes::from_static(b"tail")),
      Ok(Bytes::new()),
    ]);
    let sizes: Vec<usize> = rechunk(input, CHUNK_SIZE)
      .map(|piece| piece.unwrap().len())
      .collect()
      .await;
    assert_eq!(sizes, vec![8192, 8192, 3616, 4]);
  }
}
