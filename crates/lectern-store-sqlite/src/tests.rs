//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{TimeDelta, Utc};
use lectern_core::{
  Error as CoreError,
  catalog::{Lecture, LectureFile, Lecturer, LecturerLevel, NewLecture, NewLecturer, NewTopic, Topic},
  marker::{MarkerPatch, NewMarker},
  presence::PresenceQuery,
  progress::ProgressUpdate,
  store::LectureStore,
  user::User,
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn core(err: Error) -> CoreError {
  match err {
    Error::Core(e) => e,
    other => panic!("expected a domain error, got {other:?}"),
  }
}

/// A founder with one topic offered in one language.
struct Catalog {
  language_id: i64,
  founder:     Lecturer,
  topic:       Topic,
}

async fn catalog(s: &SqliteStore) -> Catalog {
  let language = s.add_language("en".into(), "English".into()).await.unwrap();
  let founder = s.add_lecturer(lecturer("founder", 1, None)).await.unwrap();
  let topic = s
    .add_topic(NewTopic {
      lecturer_id:  founder.id,
      code:         "BG".into(),
      title:        "Bhagavad Gita".into(),
      group_id:     None,
      language_ids: vec![language.id],
      order:        1,
    })
    .await
    .unwrap();
  Catalog { language_id: language.id, founder, topic }
}

fn lecturer(code: &str, order: u32, guru_id: Option<i64>) -> NewLecturer {
  NewLecturer {
    name: code.to_uppercase(),
    code: code.into(),
    description: String::new(),
    photo: None,
    order,
    guru_id,
  }
}

fn new_lecture(c: &Catalog, filename: &str, order: u32, duration: Option<u32>) -> NewLecture {
  NewLecture {
    topic_id: c.topic.id,
    title: filename.into(),
    audio_file: format!("lectures/{filename}"),
    original_filename: filename.into(),
    language_id: c.language_id,
    file_size: Some(1_048_576),
    duration,
    order,
    year: None,
    event: None,
  }
}

async fn lecture(s: &SqliteStore, c: &Catalog, duration: Option<u32>) -> Lecture {
  s.add_lecture(new_lecture(c, "chapter 1.mp3", 1, duration)).await.unwrap()
}

async fn user(s: &SqliteStore, name: &str) -> User {
  s.add_user(name.into(), "$argon2id$stub".into()).await.unwrap()
}

fn update(current_time: f64, completed: bool) -> ProgressUpdate {
  ProgressUpdate { current_time, completed }
}

// ─── Users ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_username_conflicts() {
  let s = store().await;
  user(&s, "radha").await;
  let err = s.add_user("radha".into(), "x".into()).await.unwrap_err();
  assert!(matches!(core(err), CoreError::Conflict(_)));
}

#[tokio::test]
async fn credentials_round_trip() {
  let s = store().await;
  let u = user(&s, "radha").await;
  let creds = s.get_credentials("radha".into()).await.unwrap().unwrap();
  assert_eq!(creds.user.user_id, u.user_id);
  assert_eq!(creds.password_hash, "$argon2id$stub");
  assert!(s.get_credentials("nobody".into()).await.unwrap().is_none());
}

// ─── Progress ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_upsert_keeps_one_row() {
  let s = store().await;
  let c = catalog(&s).await;
  let l = lecture(&s, &c, Some(120)).await;
  let u = user(&s, "radha").await;

  assert!(s.get_progress(u.user_id, l.id).await.unwrap().is_none());

  s.update_progress(u.user_id, l.id, update(10.0, false)).await.unwrap();
  let p = s.update_progress(u.user_id, l.id, update(108.0, false)).await.unwrap();
  assert_eq!(p.current_time, 108.0);
  assert!(p.updated_at >= p.created_at);

  let rows = s.topic_progress(u.user_id, c.topic.id).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].current_time, 108.0);
}

#[tokio::test]
async fn listen_count_increments_on_completion_transitions() {
  let s = store().await;
  let c = catalog(&s).await;
  let l = lecture(&s, &c, Some(120)).await;
  let u = user(&s, "radha").await;

  let p = s.update_progress(u.user_id, l.id, update(120.0, true)).await.unwrap();
  assert_eq!(p.listen_count, 1);

  // Repeated completion reports do not count again.
  let p = s.update_progress(u.user_id, l.id, update(120.0, true)).await.unwrap();
  assert_eq!(p.listen_count, 1);

  s.update_progress(u.user_id, l.id, update(5.0, false)).await.unwrap();
  let p = s.update_progress(u.user_id, l.id, update(120.0, true)).await.unwrap();
  assert_eq!(p.listen_count, 2);
  assert!(p.completed);
}

#[tokio::test]
async fn negative_position_is_stored_as_given() {
  let s = store().await;
  let c = catalog(&s).await;
  let l = lecture(&s, &c, Some(120)).await;
  let u = user(&s, "radha").await;

  let p = s.update_progress(u.user_id, l.id, update(-4.5, false)).await.unwrap();
  assert_eq!(p.current_time, -4.5);
}

#[tokio::test]
async fn progress_for_missing_lecture_is_not_found() {
  let s = store().await;
  let u = user(&s, "radha").await;
  let err = s.update_progress(u.user_id, 999, update(1.0, false)).await.unwrap_err();
  assert!(matches!(core(err), CoreError::LectureNotFound(999)));
}

// ─── Presence ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn presence_excludes_requester_and_idle_positions() {
  let s = store().await;
  let c = catalog(&s).await;
  let l = lecture(&s, &c, Some(120)).await;
  let me = user(&s, "me").await;
  let other = user(&s, "other").await;
  let idle = user(&s, "idle").await;

  s.update_progress(me.user_id, l.id, update(30.0, false)).await.unwrap();
  s.update_progress(other.user_id, l.id, update(42.0, false)).await.unwrap();
  s.update_progress(idle.user_id, l.id, update(0.0, false)).await.unwrap();

  let query = PresenceQuery::new(me.user_id, TimeDelta::seconds(60), 5);
  let active = s.list_active_listeners(&query).await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].user_id, other.user_id);
  assert_eq!(active[0].username, "other");
  assert_eq!(active[0].topic_title, "Bhagavad Gita");
  assert_eq!(active[0].current_time, 42.0);
}

#[tokio::test]
async fn presence_window_is_sixty_seconds() {
  let s = store().await;
  let c = catalog(&s).await;
  let l = lecture(&s, &c, Some(120)).await;
  let me = user(&s, "me").await;
  let other = user(&s, "other").await;

  s.update_progress(other.user_id, l.id, update(10.0, false)).await.unwrap();

  let mut query = PresenceQuery::new(me.user_id, TimeDelta::seconds(60), 5);
  query.as_of = Some(Utc::now() + TimeDelta::seconds(59));
  assert_eq!(s.list_active_listeners(&query).await.unwrap().len(), 1);

  query.as_of = Some(Utc::now() + TimeDelta::seconds(61));
  assert!(s.list_active_listeners(&query).await.unwrap().is_empty());
}

#[tokio::test]
async fn presence_is_limited_and_most_recent_first() {
  let s = store().await;
  let c = catalog(&s).await;
  let l = lecture(&s, &c, Some(120)).await;
  let me = user(&s, "me").await;

  let mut listeners = Vec::new();
  for i in 0..7 {
    let u = user(&s, &format!("listener{i}")).await;
    s.update_progress(u.user_id, l.id, update(1.0 + f64::from(i), false)).await.unwrap();
    listeners.push(u);
  }

  let query = PresenceQuery::new(me.user_id, TimeDelta::seconds(60), 5);
  let active = s.list_active_listeners(&query).await.unwrap();
  assert_eq!(active.len(), 5);
  assert!(active.windows(2).all(|w| w[0].updated_at >= w[1].updated_at));
  assert!(active.iter().all(|a| listeners.iter().any(|u| u.user_id == a.user_id)));
}

// ─── Lineage ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn levels_follow_the_guru() {
  let s = store().await;
  let c = catalog(&s).await;
  assert_eq!(c.founder.level, LecturerLevel::Founder);

  let disciple = s.add_lecturer(lecturer("disciple", 2, Some(c.founder.id))).await.unwrap();
  assert_eq!(disciple.level, LecturerLevel::DirectDisciple);

  let grand = s.add_lecturer(lecturer("grand", 3, Some(disciple.id))).await.unwrap();
  assert_eq!(grand.level, LecturerLevel::GrandDisciple);
}

#[tokio::test]
async fn second_founder_is_rejected() {
  let s = store().await;
  let c = catalog(&s).await;
  let err = s.add_lecturer(lecturer("usurper", 2, None)).await.unwrap_err();
  assert!(matches!(core(err), CoreError::FounderExists(id) if id == c.founder.id));
}

#[tokio::test]
async fn guru_cycles_are_rejected() {
  let s = store().await;
  let c = catalog(&s).await;
  let a = s.add_lecturer(lecturer("a", 2, Some(c.founder.id))).await.unwrap();
  let b = s.add_lecturer(lecturer("b", 3, Some(a.id))).await.unwrap();

  let err = s.set_guru(a.id, b.id).await.unwrap_err();
  assert!(matches!(core(err), CoreError::CircularGuru { .. }));

  let err = s.set_guru(c.founder.id, a.id).await.unwrap_err();
  assert!(matches!(core(err), CoreError::FounderWithGuru));

  let moved = s.set_guru(b.id, c.founder.id).await.unwrap();
  assert_eq!(moved.level, LecturerLevel::DirectDisciple);
}

#[tokio::test]
async fn lecturer_order_is_unique() {
  let s = store().await;
  let c = catalog(&s).await;
  let err = s.add_lecturer(lecturer("clash", 1, Some(c.founder.id))).await.unwrap_err();
  assert!(matches!(core(err), CoreError::Conflict(_)));
}

#[tokio::test]
async fn duplicate_topic_order_code_conflicts() {
  let s = store().await;
  let c = catalog(&s).await;
  let clash = NewTopic {
    lecturer_id:  c.founder.id,
    code:         "BG".into(),
    title:        "Gita again".into(),
    group_id:     None,
    language_ids: vec![c.language_id],
    order:        1,
  };
  let err = s.add_topic(clash.clone()).await.unwrap_err();
  assert!(matches!(core(err), CoreError::Conflict(_)));

  // Same code at a different position is a separate topic.
  s.add_topic(NewTopic { order: 2, ..clash }).await.unwrap();
}

// ─── Lectures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_lecture_order_language_conflicts() {
  let s = store().await;
  let c = catalog(&s).await;
  s.add_lecture(new_lecture(&c, "one.mp3", 1, None)).await.unwrap();

  let err = s.add_lecture(new_lecture(&c, "two.mp3", 1, None)).await.unwrap_err();
  assert!(matches!(core(err), CoreError::Conflict(_)));

  let two = s.add_lecture(new_lecture(&c, "two.mp3", 2, None)).await.unwrap();
  assert_eq!(two.order, 2);
}

#[tokio::test]
async fn lecture_language_must_belong_to_topic() {
  let s = store().await;
  let c = catalog(&s).await;
  let other = s.add_language("ru".into(), "Russian".into()).await.unwrap();

  let mut input = new_lecture(&c, "x.mp3", 1, None);
  input.language_id = other.id;
  let err = s.add_lecture(input).await.unwrap_err();
  assert!(matches!(core(err), CoreError::LanguageNotInTopic { .. }));
}

#[tokio::test]
async fn duplicate_filename_in_topic_is_rejected() {
  let s = store().await;
  let c = catalog(&s).await;
  s.add_lecture(new_lecture(&c, "same.mp3", 1, None)).await.unwrap();
  let err = s.add_lecture(new_lecture(&c, "same.mp3", 2, None)).await.unwrap_err();
  assert!(matches!(core(err), CoreError::DuplicateLecture { .. }));
}

#[tokio::test]
async fn batch_append_orders_naturally_after_existing() {
  let s = store().await;
  let c = catalog(&s).await;
  lecture(&s, &c, None).await;

  let file = |name: &str| LectureFile {
    filename:    name.into(),
    audio_file:  format!("lectures/{name}"),
    language_id: c.language_id,
    file_size:   None,
    duration:    Some(600),
  };
  let created = s
    .append_lectures(c.topic.id, vec![
      file("part 10.mp3"),
      file("notes.txt"),
      file("part 2.mp3"),
      file("chapter 1.mp3"),
      file("part 1.mp3"),
    ])
    .await
    .unwrap();

  let titles: Vec<_> = created.iter().map(|l| (l.order, l.title.as_str())).collect();
  assert_eq!(titles, vec![(2, "part 1"), (3, "part 2"), (4, "part 10")]);

  let all = s.list_lectures(c.topic.id).await.unwrap();
  assert_eq!(all.len(), 4);
  assert!(all.windows(2).all(|w| w[0].order < w[1].order));
}

// ─── Current lecture & history ───────────────────────────────────────────────

#[tokio::test]
async fn set_current_snapshots_history_once_per_day() {
  let s = store().await;
  let c = catalog(&s).await;
  let l = lecture(&s, &c, Some(120)).await;
  let u = user(&s, "radha").await;

  s.update_progress(u.user_id, l.id, update(60.7, false)).await.unwrap();
  let (current, history) = s.set_current_lecture(u.user_id, l.id).await.unwrap();
  assert_eq!(current.topic_id, c.topic.id);
  assert_eq!(history.duration_listened, 60);
  assert_eq!(history.completion_percentage, 50.6);

  s.update_progress(u.user_id, l.id, update(108.0, false)).await.unwrap();
  s.set_current_lecture(u.user_id, l.id).await.unwrap();

  let items = s.list_history(u.user_id, 10).await.unwrap();
  assert_eq!(items.len(), 1);
  assert_eq!(items[0].entry.completion_percentage, 90.0);
  assert_eq!(items[0].lecture.id, l.id);

  let pointer = s.get_current_lecture(u.user_id, c.topic.id).await.unwrap().unwrap();
  assert_eq!(pointer.lecture_id, l.id);
}

#[tokio::test]
async fn set_current_without_progress_records_zero() {
  let s = store().await;
  let c = catalog(&s).await;
  let l = lecture(&s, &c, Some(120)).await;
  let u = user(&s, "radha").await;

  let (_, history) = s.set_current_lecture(u.user_id, l.id).await.unwrap();
  assert_eq!(history.duration_listened, 0);
  assert_eq!(history.completion_percentage, 0.0);
}

// ─── Favorites ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn favorites_are_idempotent() {
  let s = store().await;
  let c = catalog(&s).await;
  let l = lecture(&s, &c, Some(120)).await;
  let u = user(&s, "radha").await;

  s.add_favorite(u.user_id, l.id).await.unwrap();
  s.add_favorite(u.user_id, l.id).await.unwrap();
  assert_eq!(s.list_favorites(u.user_id, None).await.unwrap().len(), 1);
  assert_eq!(s.topic_favorites(u.user_id, c.topic.id).await.unwrap(), vec![l.id]);

  assert!(s.remove_favorite(u.user_id, l.id).await.unwrap());
  assert!(!s.remove_favorite(u.user_id, l.id).await.unwrap());
  assert!(s.list_favorites(u.user_id, Some(5)).await.unwrap().is_empty());
}

// ─── Markers ─────────────────────────────────────────────────────────────────

fn marker(timestamp: Option<f64>, text: &str) -> NewMarker {
  NewMarker { timestamp, text: text.into() }
}

#[tokio::test]
async fn marker_validation() {
  let s = store().await;
  let c = catalog(&s).await;
  let l = lecture(&s, &c, Some(120)).await;
  let u = user(&s, "radha").await;

  let err = s.add_marker(u.user_id, l.id, marker(Some(-1.0), "x")).await.unwrap_err();
  assert!(matches!(core(err), CoreError::MarkerTimestampNegative));

  let err = s.add_marker(u.user_id, l.id, marker(Some(121.0), "x")).await.unwrap_err();
  assert!(matches!(core(err), CoreError::MarkerTimestampBeyondDuration { .. }));

  let err = s.add_marker(u.user_id, l.id, marker(None, "x")).await.unwrap_err();
  assert!(matches!(core(err), CoreError::MarkerTimestampMissing));

  let err = s.add_marker(u.user_id, l.id, marker(Some(5.0), "   ")).await.unwrap_err();
  assert!(matches!(core(err), CoreError::MarkerTextEmpty));

  let m = s.add_marker(u.user_id, l.id, marker(Some(120.0), " end ")).await.unwrap();
  assert_eq!(m.text, "end");
  assert_eq!(m.formatted_timestamp(), "2:00");
}

#[tokio::test]
async fn markers_are_private_to_their_owner() {
  let s = store().await;
  let c = catalog(&s).await;
  let l = lecture(&s, &c, Some(120)).await;
  let owner = user(&s, "owner").await;
  let stranger = user(&s, "stranger").await;

  let late = s.add_marker(owner.user_id, l.id, marker(Some(90.0), "late")).await.unwrap();
  let early = s.add_marker(owner.user_id, l.id, marker(Some(10.0), "early")).await.unwrap();

  let listed = s.list_markers(owner.user_id, l.id).await.unwrap();
  assert_eq!(listed.iter().map(|m| m.id).collect::<Vec<_>>(), vec![early.id, late.id]);
  assert!(s.list_markers(stranger.user_id, l.id).await.unwrap().is_empty());

  let patch = MarkerPatch { timestamp: None, text: "changed".into() };
  assert!(s.update_marker(stranger.user_id, late.id, patch.clone()).await.unwrap().is_none());
  assert!(!s.delete_marker(stranger.user_id, late.id).await.unwrap());

  let updated = s.update_marker(owner.user_id, late.id, patch).await.unwrap().unwrap();
  assert_eq!(updated.text, "changed");
  assert_eq!(updated.timestamp, 90.0);

  assert!(s.delete_marker(owner.user_id, late.id).await.unwrap());
  assert_eq!(s.list_markers(owner.user_id, l.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn marker_update_checks_duration() {
  let s = store().await;
  let c = catalog(&s).await;
  let l = lecture(&s, &c, Some(120)).await;
  let u = user(&s, "radha").await;

  let m = s.add_marker(u.user_id, l.id, marker(Some(10.0), "a")).await.unwrap();
  let patch = MarkerPatch { timestamp: Some(500.0), text: "a".into() };
  let err = s.update_marker(u.user_id, m.id, patch).await.unwrap_err();
  assert!(matches!(core(err), CoreError::MarkerTimestampBeyondDuration { .. }));
}

// ─── Catalog reads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn featured_lecturers_lead_with_order_one() {
  let s = store().await;
  let c = catalog(&s).await;
  for (i, code) in ["a", "b", "c"].into_iter().enumerate() {
    s.add_lecturer(lecturer(code, 2 + i as u32, Some(c.founder.id))).await.unwrap();
  }

  let featured = s.featured_lecturers(2).await.unwrap();
  assert_eq!(featured.len(), 3);
  assert_eq!(featured[0].id, c.founder.id);
  assert!(featured[1..].iter().all(|l| l.id != c.founder.id));

  assert_eq!(s.list_lecturers().await.unwrap().len(), 4);
  assert_eq!(s.list_topics(c.founder.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn recent_lectures_come_from_newest_topics() {
  let s = store().await;
  let c = catalog(&s).await;
  lecture(&s, &c, None).await;

  let recent = s.recent_lectures(9).await.unwrap();
  assert_eq!(recent.len(), 1);
  assert_eq!(recent[0].topic_id, c.topic.id);
  assert_eq!(s.random_topics(3).await.unwrap().len(), 1);
}

#[tokio::test]
async fn missing_ids_read_as_none() {
  let s = store().await;
  assert!(s.get_lecture(1).await.unwrap().is_none());
  assert!(s.get_topic(1).await.unwrap().is_none());
  assert!(s.get_lecturer(1).await.unwrap().is_none());
}
