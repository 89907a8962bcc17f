//! Full-router tests: auth in front of the API, sign-up, and the audio proxy
//! against a local fake upstream.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
  response::{IntoResponse, Response},
  routing::get,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use futures_util::StreamExt as _;
use lectern_core::{
  catalog::{Lecture, NewLecture, NewLecturer, NewTopic},
  store::LectureStore,
};
use lectern_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower::ServiceExt as _;

use crate::{AppState, ServerConfig, audio::CHUNK_SIZE, auth::hash_password, router};

const AUDIO_SIZE: usize = 20_000;

// ─── Fake upstream ───────────────────────────────────────────────────────────

async fn serve_audio(req: Request<Body>) -> Response {
  let body: Vec<u8> = (0..AUDIO_SIZE).map(|i| (i % 251) as u8).collect();
  let total = body.len();

  if let Some(range) = req.headers().get(header::RANGE) {
    let range = range.to_str().unwrap_or("");
    if let Some((start, end)) = range.strip_prefix("bytes=").and_then(|r| r.split_once('-')) {
      let start: usize = start.parse().unwrap_or(0);
      let end: usize = if end.is_empty() { total - 1 } else { end.parse().unwrap_or(total - 1) };
      let end = end.min(total - 1);
      let slice = body[start..=end].to_vec();
      return (
        StatusCode::PARTIAL_CONTENT,
        [
          (header::CONTENT_TYPE, "audio/mpeg".to_string()),
          (header::ACCEPT_RANGES, "bytes".to_string()),
          (header::CONTENT_RANGE, format!("bytes {start}-{end}/{total}")),
          (header::CONTENT_LENGTH, slice.len().to_string()),
        ],
        slice,
      )
        .into_response();
    }
  }

  (
    StatusCode::OK,
    [
      (header::CONTENT_TYPE, "audio/mpeg".to_string()),
      (header::ACCEPT_RANGES, "bytes".to_string()),
      (header::CONTENT_LENGTH, total.to_string()),
    ],
    body,
  )
    .into_response()
}

async fn start_upstream() -> SocketAddr {
  let app = Router::new()
    .route("/media/sb/canto-1.mp3", get(serve_audio))
    .route("/media/broken.mp3", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    axum::serve(listener, app).await.unwrap();
  });
  addr
}

/// An address nothing listens on.
async fn closed_port() -> SocketAddr {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  listener.local_addr().unwrap()
}

// ─── Fixture ─────────────────────────────────────────────────────────────────

struct Fixture {
  app:     Router,
  store:   Arc<SqliteStore>,
  lecture: Lecture,
  topic:   i64,
  lang:    i64,
}

fn config(media_base_url: String) -> ServerConfig {
  ServerConfig {
    host: "127.0.0.1".into(),
    port: 0,
    store_path: PathBuf::from(":memory:"),
    media_base_url,
    presence_window_secs: 60,
    presence_limit: 5,
    featured_lecturers_ttl_secs: 300,
    random_topics_ttl_secs: 60,
    recent_lectures_ttl_secs: 300,
    upstream_connect_timeout_secs: 2,
  }
}

async fn fixture(upstream: SocketAddr) -> Fixture {
  let store = SqliteStore::open_in_memory().await.unwrap();
  store
    .add_user("radha".into(), hash_password("hunter2").unwrap())
    .await
    .unwrap();
  let lang = store.add_language("en".into(), "English".into()).await.unwrap().id;
  let lecturer = store
    .add_lecturer(NewLecturer {
      name:        "Founder".into(),
      code:        "founder".into(),
      description: String::new(),
      photo:       None,
      order:       1,
      guru_id:     None,
    })
    .await
    .unwrap();
  let topic = store
    .add_topic(NewTopic {
      lecturer_id:  lecturer.id,
      code:         "SB".into(),
      title:        "Srimad Bhagavatam".into(),
      group_id:     None,
      language_ids: vec![lang],
      order:        1,
    })
    .await
    .unwrap()
    .id;
  let lecture = add_lecture(&store, topic, lang, "sb/canto-1.mp3", 1).await;

  let store = Arc::new(store);
  let state = AppState::new(Arc::clone(&store), config(format!("http://{upstream}/media/")))
    .unwrap();
  Fixture { app: router(state), store, lecture, topic, lang }
}

async fn add_lecture(
  store: &SqliteStore,
  topic_id: i64,
  language_id: i64,
  audio_file: &str,
  order: u32,
) -> Lecture {
  store
    .add_lecture(NewLecture {
      topic_id,
      title: format!("Lecture {order}"),
      audio_file: audio_file.into(),
      original_filename: audio_file.into(),
      language_id,
      file_size: Some(AUDIO_SIZE as i64),
      duration: Some(120),
      order,
      year: None,
      event: None,
    })
    .await
    .unwrap()
}

fn basic(user: &str, pass: &str) -> String {
  format!("Basic {}", B64.encode(format!("{user}:{pass}")))
}

async fn json_body(res: Response) -> Value {
  let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

fn audio_request(lecture_id: i64, range: Option<&str>) -> Request<Body> {
  let mut builder = Request::builder().uri(format!("/api/v1/lectures/{lecture_id}/audio/"));
  if let Some(range) = range {
    builder = builder.header(header::RANGE, range);
  }
  builder.body(Body::empty()).unwrap()
}

fn register_request(body: &str) -> Request<Body> {
  Request::builder()
    .method("POST")
    .uri("/api/v1/register/")
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from(body.to_owned()))
    .unwrap()
}

fn get_as(uri: &str, user: &str, pass: &str) -> Request<Body> {
  Request::builder()
    .uri(uri)
    .header(header::AUTHORIZATION, basic(user, pass))
    .body(Body::empty())
    .unwrap()
}

// ─── Auth ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn api_requires_credentials() {
  let fx = fixture(closed_port().await).await;
  let uri = format!("/api/v1/lectures/{}/progress/", fx.lecture.id);

  let res = fx
    .app
    .clone()
    .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
  assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));

  let res = fx
    .app
    .oneshot(
      Request::builder()
        .uri(&uri)
        .header(header::AUTHORIZATION, basic("radha", "wrong"))
        .body(Body::empty())
        .unwrap(),
    )
    .await
    .unwrap();
  assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_user_is_unauthorized() {
  let fx = fixture(closed_port().await).await;
  let res = fx
    .app
    .oneshot(
      Request::builder()
        .uri("/api/v1/home/")
        .header(header::AUTHORIZATION, basic("nobody", "hunter2"))
        .body(Body::empty())
        .unwrap(),
    )
    .await
    .unwrap();
  assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authenticated_progress_update() {
  let fx = fixture(closed_port().await).await;
  let res = fx
    .app
    .oneshot(
      Request::builder()
        .method("POST")
        .uri(format!("/api/v1/lectures/{}/progress/", fx.lecture.id))
        .header(header::AUTHORIZATION, basic("radha", "hunter2"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "current_time": 108.0, "completed": true }).to_string()))
        .unwrap(),
    )
    .await
    .unwrap();
  assert_eq!(res.status(), StatusCode::OK);

  let body = json_body(res).await;
  assert_eq!(body["success"], true);
  assert_eq!(body["progress_percentage"], 90.0);
  assert_eq!(body["listen_count"], 1);
}

#[tokio::test]
async fn catalog_is_public() {
  let fx = fixture(closed_port().await).await;

  for uri in [
    "/api/v1/lecturers/".to_owned(),
    "/api/v1/home/".to_owned(),
    format!("/api/v1/topics/{}/", fx.topic),
  ] {
    let res = fx
      .app
      .clone()
      .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::OK, "{uri}");
  }

  let res = fx
    .app
    .clone()
    .oneshot(Request::builder().uri("/api/v1/home/").body(Body::empty()).unwrap())
    .await
    .unwrap();
  let feed = json_body(res).await;
  assert_eq!(feed["lecturers"][0]["code"], "founder");
  assert_eq!(feed["favorite_lectures"], json!([]));

  let res = fx.app.oneshot(get_as("/api/v1/home/", "radha", "hunter2")).await.unwrap();
  assert_eq!(res.status(), StatusCode::OK);
}

// ─── Registration ────────────────────────────────────────────────────────────

#[tokio::test]
async fn registered_user_can_sign_in() {
  let fx = fixture(closed_port().await).await;

  let res = fx
    .app
    .clone()
    .oneshot(register_request(r#"{"username":"gopal","password":"correct horse"}"#))
    .await
    .unwrap();
  assert_eq!(res.status(), StatusCode::CREATED);
  let body = json_body(res).await;
  assert_eq!(body["success"], true);
  assert_eq!(body["username"], "gopal");
  assert!(body.get("password_hash").is_none());

  let uri = format!("/api/v1/lectures/{}/progress/", fx.lecture.id);
  let res = fx.app.oneshot(get_as(&uri, "gopal", "correct horse")).await.unwrap();
  assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn taken_username_is_conflict() {
  let fx = fixture(closed_port().await).await;
  let res = fx
    .app
    .oneshot(register_request(r#"{"username":"radha","password":"another one"}"#))
    .await
    .unwrap();
  assert_eq!(res.status(), StatusCode::CONFLICT);
  assert!(json_body(res).await["error"].is_string());
}

#[tokio::test]
async fn invalid_registrations_are_bad_requests() {
  let fx = fixture(closed_port().await).await;
  for body in [
    r#"{"username":"gopal","password":"short"}"#,
    r#"{"username":"","password":"long enough"}"#,
    r#"{"username":"gopal","password":12345678}"#,
    "not json",
  ] {
    let res = fx.app.clone().oneshot(register_request(body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{body}");
    assert!(json_body(res).await["error"].is_string(), "{body}");
  }

  let res = fx
    .app
    .oneshot(get_as("/api/v1/home/", "gopal", "long enough"))
    .await
    .unwrap();
  assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

// ─── Audio proxy ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn range_request_is_forwarded() {
  let fx = fixture(start_upstream().await).await;
  let res = fx
    .app
    .oneshot(audio_request(fx.lecture.id, Some("bytes=100-10099")))
    .await
    .unwrap();

  assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
  let headers = res.headers();
  assert_eq!(headers[header::CONTENT_RANGE], "bytes 100-10099/20000");
  assert_eq!(headers[header::CONTENT_LENGTH], "10000");
  assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
  assert_eq!(headers[header::CONTENT_TYPE], "audio/mpeg");

  let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
  assert_eq!(bytes.len(), 10_000);
  assert_eq!(bytes[0], (100 % 251) as u8);
}

#[tokio::test]
async fn full_body_streams_in_small_chunks() {
  let fx = fixture(start_upstream().await).await;
  let res = fx.app.oneshot(audio_request(fx.lecture.id, None)).await.unwrap();

  assert_eq!(res.status(), StatusCode::OK);
  assert_eq!(res.headers()[header::CONTENT_LENGTH], "20000");

  let mut stream = res.into_body().into_data_stream();
  let mut total = 0;
  while let Some(chunk) = stream.next().await {
    let chunk = chunk.unwrap();
    assert!(chunk.len() <= CHUNK_SIZE);
    total += chunk.len();
  }
  assert_eq!(total, AUDIO_SIZE);
}

#[tokio::test]
async fn audio_needs_no_credentials_but_a_known_lecture() {
  let fx = fixture(start_upstream().await).await;
  let res = fx.app.oneshot(audio_request(9_999, None)).await.unwrap();
  assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upstream_error_status_is_not_found() {
  let fx = fixture(start_upstream().await).await;
  let missing = add_lecture(&fx.store, fx.topic, fx.lang, "sb/missing.mp3", 2).await;
  let broken = add_lecture(&fx.store, fx.topic, fx.lang, "broken.mp3", 3).await;

  let res = fx.app.clone().oneshot(audio_request(missing.id, None)).await.unwrap();
  assert_eq!(res.status(), StatusCode::NOT_FOUND);

  let res = fx.app.oneshot(audio_request(broken.id, None)).await.unwrap();
  assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unreachable_upstream_is_not_found() {
  let fx = fixture(closed_port().await).await;
  let res = fx
    .app
    .oneshot(audio_request(fx.lecture.id, Some("bytes=0-")))
    .await
    .unwrap();
  assert_eq!(res.status(), StatusCode::NOT_FOUND);
  assert_eq!(json_body(res).await["error"], "Not Found");
}
