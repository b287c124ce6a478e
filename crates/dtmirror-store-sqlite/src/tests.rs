//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, Utc};
use dtmirror_core::{
  document::{Document, GroupId},
  person::{
    Alias, Email, HistoricalEmail, HistoricalPerson, History, HistoryType, Person, PersonEvent,
    PersonId, PersonRecord,
  },
  store::MirrorStore,
};

use crate::{SqliteStore, TABLES};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn at(s: &str) -> DateTime<Utc> { s.parse().unwrap() }

fn person(id: i64, time: &str) -> Person {
  Person {
    id:              PersonId(id),
    name:            format!("Person {id}"),
    name_from_draft: None,
    ascii:           format!("Person {id}"),
    ascii_short:     None,
    user:            None,
    time:            at(time),
    photo:           Some(format!("https://example.org/media/photo/{id}.jpg")),
    photo_thumb:     None,
    biography:       String::new(),
    consent:         Some(true),
  }
}

fn email(address: &str, owner: i64) -> Email {
  Email {
    address: address.into(),
    person:  PersonId(owner),
    time:    at("2019-06-01T12:00:00Z"),
    origin:  "author: draft-ietf-foo-bar".into(),
    primary: true,
    active:  true,
  }
}

fn history(id: i64, kind: HistoryType) -> History {
  History {
    history_id:            id,
    history_type:          kind,
    history_change_reason: None,
    history_user:          Some("admin".into()),
    history_date:          at("2019-06-02T08:30:00Z"),
  }
}

/// A person with one of every child collection.
fn full_record(id: i64, time: &str) -> PersonRecord {
  let mut record = PersonRecord::new(person(id, time));
  record.aliases.push(Alias { id: id * 10, person: PersonId(id), name: "P. Erson".into() });
  record.emails.push(email(&format!("p{id}@example.org"), id));
  record.email_history.push(HistoricalEmail {
    email:   email(&format!("p{id}@example.org"), id),
    history: history(id * 100, HistoryType::Created),
  });
  record.person_history.push(HistoricalPerson {
    person:  person(id, "2018-01-01T00:00:00Z"),
    history: history(id * 100 + 1, HistoryType::Changed),
  });
  record.events.push(PersonEvent {
    id:     id * 1000,
    person: PersonId(id),
    time:   at("2019-07-01T00:00:00Z"),
    kind:   "apikey_login".into(),
    desc:   "Logged in with an API key".into(),
  });
  record
}

async fn count(s: &SqliteStore, table: &str) -> u64 {
  s.row_counts()
    .await
    .unwrap()
    .into_iter()
    .find(|(t, _)| *t == table)
    .map(|(_, n)| n)
    .unwrap()
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_store_has_no_watermark() {
  let s = store().await;

  assert_eq!(s.watermark().await.unwrap(), None);
  let counts = s.row_counts().await.unwrap();
  assert_eq!(counts.len(), TABLES.len());
  assert!(counts.iter().all(|(_, n)| *n == 0));
}

#[tokio::test]
async fn reopening_a_file_keeps_rows() {
  let dir = tempfile::tempdir().expect("tempdir");
  let path = dir.path().join("ietfdata.db");

  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.put_person(&full_record(1, "2020-01-01T00:00:00Z")).await.unwrap();
  }

  let s = SqliteStore::open(&path).await.unwrap();
  assert!(s.get_record(PersonId(1)).await.unwrap().is_some());
}

// ─── People ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_person_stores_every_child() {
  let s = store().await;
  let record = full_record(7, "2020-01-01T00:00:00Z");

  s.put_person(&record).await.unwrap();

  let back = s.get_record(PersonId(7)).await.unwrap().unwrap();
  assert_eq!(back, record);
}

#[tokio::test]
async fn put_person_is_idempotent() {
  let s = store().await;
  let record = full_record(1, "2020-01-01T00:00:00Z");

  s.put_person(&record).await.unwrap();
  let once = s.row_counts().await.unwrap();
  s.put_person(&record).await.unwrap();
  let twice = s.row_counts().await.unwrap();

  assert_eq!(once, twice);
  assert_eq!(s.get_record(PersonId(1)).await.unwrap().unwrap(), record);
}

#[tokio::test]
async fn newer_person_replaces_older() {
  let s = store().await;
  s.put_person(&full_record(1, "2020-01-01T00:00:00Z")).await.unwrap();

  let mut changed = full_record(1, "2021-03-04T05:06:07Z");
  changed.person.name = "Renamed".into();
  s.put_person(&changed).await.unwrap();

  let back = s.get_record(PersonId(1)).await.unwrap().unwrap();
  assert_eq!(back.person.name, "Renamed");
  assert_eq!(count(&s, "person").await, 1);
  // Children keyed by their own ids are rewritten in place.
  assert_eq!(count(&s, "alias").await, 1);
}

#[tokio::test]
async fn watermark_is_newest_person_time() {
  let s = store().await;
  s.put_person(&full_record(1, "2020-01-01T00:00:00Z")).await.unwrap();
  s.put_person(&full_record(2, "2020-01-01T00:00:00.500Z")).await.unwrap();
  s.put_person(&full_record(3, "2019-12-31T23:59:59Z")).await.unwrap();

  assert_eq!(s.watermark().await.unwrap(), Some(at("2020-01-01T00:00:00.500Z")));
}

#[tokio::test]
async fn foreign_child_rolls_back_whole_record() {
  let s = store().await;
  let mut record = full_record(3, "2020-01-01T00:00:00Z");
  record.emails.push(email("stray@example.org", 99));

  assert!(s.put_person(&record).await.is_err());

  assert!(s.get_record(PersonId(3)).await.unwrap().is_none());
  assert!(s.row_counts().await.unwrap().iter().all(|(_, n)| *n == 0));
}

#[tokio::test]
async fn rejected_update_keeps_previous_version() {
  let s = store().await;
  let original = full_record(4, "2020-01-01T00:00:00Z");
  s.put_person(&original).await.unwrap();

  let mut broken = full_record(4, "2022-01-01T00:00:00Z");
  broken.person.name = "Updated".into();
  broken.emails.push(email("", 4));

  assert!(s.put_person(&broken).await.is_err());

  let back = s.get_record(PersonId(4)).await.unwrap().unwrap();
  assert_eq!(back, original);
  assert_eq!(s.watermark().await.unwrap(), Some(at("2020-01-01T00:00:00Z")));
}

#[tokio::test]
async fn history_rows_are_keyed_by_history_id() {
  let s = store().await;
  let mut record = full_record(5, "2020-01-01T00:00:00Z");
  record.email_history.push(HistoricalEmail {
    email:   email("p5@example.org", 5),
    history: history(501, HistoryType::Deleted),
  });
  s.put_person(&record).await.unwrap();
  s.put_person(&record).await.unwrap();

  assert_eq!(count(&s, "historical_email").await, 2);
  let back = s.get_record(PersonId(5)).await.unwrap().unwrap();
  assert_eq!(back.email_history[1].history.history_type, HistoryType::Deleted);
}

#[tokio::test]
async fn email_moving_to_another_person_keeps_one_row() {
  let s = store().await;
  s.put_person(&full_record(1, "2020-01-01T00:00:00Z")).await.unwrap();

  let mut other = full_record(2, "2020-02-01T00:00:00Z");
  other.emails.push(email("p1@example.org", 2));
  s.put_person(&other).await.unwrap();

  assert_eq!(count(&s, "email").await, 2);
  let first = s.get_record(PersonId(1)).await.unwrap().unwrap();
  assert!(first.emails.is_empty());
  let second = s.get_record(PersonId(2)).await.unwrap().unwrap();
  assert_eq!(second.emails.len(), 2);
}

// ─── Documents ───────────────────────────────────────────────────────────────

fn document(name: &str, title: &str) -> Document {
  Document {
    id:        42,
    name:      name.into(),
    title:     title.into(),
    abstract_: Some("An abstract.".into()),
    rev:       "03".into(),
    pages:     Some(12),
    time:      at("2021-05-05T10:00:00Z"),
    expires:   None,
    ad:        Some(PersonId(12345)),
    shepherd:  None,
    group:     Some(GroupId(2161)),
  }
}

#[tokio::test]
async fn document_upsert_by_name() {
  let s = store().await;

  s.put_document(&document("draft-ietf-foo-bar", "First")).await.unwrap();
  s.put_document(&document("draft-ietf-foo-bar", "Second")).await.unwrap();

  assert_eq!(count(&s, "document").await, 1);
  assert_eq!(
    s.document_title("draft-ietf-foo-bar").await.unwrap().as_deref(),
    Some("Second"),
  );
  assert_eq!(s.document_title("draft-missing").await.unwrap(), None);
}

#[tokio::test]
async fn summary_counts_people_and_documents() {
  let s = store().await;
  s.put_person(&full_record(1, "2020-01-01T00:00:00Z")).await.unwrap();
  s.put_person(&full_record(2, "2020-06-01T00:00:00Z")).await.unwrap();
  s.put_document(&document("draft-ietf-foo-bar", "Foo")).await.unwrap();

  let summary = s.summary().await.unwrap();
  assert_eq!(summary.people, 2);
  assert_eq!(summary.documents, 1);
  assert_eq!(summary.watermark, Some(at("2020-06-01T00:00:00Z")));
}
