//! JSON shapes returned by the Datatracker API and their translation into
//! `dtmirror-core` types.
//!
//! The API reports times without an offset; they are UTC. Optional links
//! and URLs are sometimes sent as `""` rather than `null`; both mean absent.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, de::DeserializeOwned};

use dtmirror_core::{
  Malformed,
  document::{Document, GroupId},
  person::{
    Alias, Email, HistoricalEmail, HistoricalPerson, History, HistoryType, Person, PersonEvent,
    PersonId,
  },
};

use crate::{Error, Result};

pub const PERSON_URI: &str = "/api/v1/person/person/";
pub const EMAIL_URI: &str = "/api/v1/person/email/";
pub const GROUP_URI: &str = "/api/v1/group/group/";

// ─── Envelope ────────────────────────────────────────────────────────────────

/// One page of a Tastypie listing.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
  pub meta:    Meta,
  pub objects: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct Meta {
  /// Path and query of the following page; `null` on the last one.
  #[serde(default)]
  pub next: Option<String>,
}

/// A wire object that can be turned into its domain counterpart.
pub trait Wire: DeserializeOwned {
  type Domain;

  /// Noun used when reporting an object of this type.
  const KIND: &'static str;
  /// Field holding the object's natural key.
  const KEY: &'static str;

  fn into_domain(self) -> Result<Self::Domain>;
}

/// Decode and translate the `index`th object of a listing.
pub fn translate<W: Wire>(
  index: usize,
  object: serde_json::Value,
) -> Result<W::Domain, Malformed> {
  let key = match object.get(W::KEY) {
    Some(serde_json::Value::String(s)) => format!("{} {s}", W::KIND),
    Some(serde_json::Value::Number(n)) => format!("{} {n}", W::KIND),
    _ => format!("{} #{index}", W::KIND),
  };
  let malformed = |reason: String| Malformed { key: key.clone(), reason };

  serde_json::from_value::<W>(object)
    .map_err(|e| malformed(e.to_string()))?
    .into_domain()
    .map_err(|e| malformed(e.to_string()))
}

// ─── Scalars ─────────────────────────────────────────────────────────────────

/// Parse an API timestamp. RFC 3339 with an offset is honoured; a bare
/// `YYYY-MM-DDTHH:MM:SS[.ffffff]` is taken as UTC.
pub fn parse_time(s: &str) -> Result<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
    .map(|naive| naive.and_utc())
    .map_err(|_| Error::Timestamp(s.to_owned()))
}

/// Format a bound for a `time__gte` filter in the API's own notation.
pub fn format_time(dt: DateTime<Utc>) -> String {
  dt.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

pub fn parse_history_type(symbol: &str) -> Result<HistoryType> {
  match symbol {
    "+" => Ok(HistoryType::Created),
    "~" => Ok(HistoryType::Changed),
    "-" => Ok(HistoryType::Deleted),
    other => Err(Error::HistoryType(other.to_owned())),
  }
}

fn non_empty(value: Option<String>) -> Option<String> { value.filter(|s| !s.is_empty()) }

/// The single path segment following `prefix` in `uri`.
fn resource_key<'a>(kind: &'static str, prefix: &str, uri: &'a str) -> Result<&'a str> {
  let invalid = || Error::ResourceUri { kind, uri: uri.to_owned() };
  let key = uri
    .strip_prefix(prefix)
    .and_then(|rest| rest.strip_suffix('/'))
    .ok_or_else(invalid)?;
  if key.is_empty() || key.contains('/') {
    return Err(invalid());
  }
  Ok(key)
}

/// `/api/v1/person/person/<id>/` → `PersonId(<id>)`.
pub fn person_id(uri: &str) -> Result<PersonId> {
  resource_key("person", PERSON_URI, uri)?
    .parse()
    .map(PersonId)
    .map_err(|_| Error::ResourceUri { kind: "person", uri: uri.to_owned() })
}

/// `/api/v1/person/email/<address>/` → `<address>`.
pub fn email_address(uri: &str) -> Result<String> {
  resource_key("email", EMAIL_URI, uri).map(str::to_owned)
}

/// `/api/v1/group/group/<id>/` → `GroupId(<id>)`.
pub fn group_id(uri: &str) -> Result<GroupId> {
  resource_key("group", GROUP_URI, uri)?
    .parse()
    .map(GroupId)
    .map_err(|_| Error::ResourceUri { kind: "group", uri: uri.to_owned() })
}

fn optional<T>(uri: Option<String>, resolve: impl FnOnce(&str) -> Result<T>) -> Result<Option<T>> {
  non_empty(uri).as_deref().map(resolve).transpose()
}

// ─── People ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WirePerson {
  pub id:              i64,
  pub name:            String,
  #[serde(default)]
  pub name_from_draft: Option<String>,
  pub ascii:           String,
  #[serde(default)]
  pub ascii_short:     Option<String>,
  #[serde(default)]
  pub user:            Option<String>,
  pub time:            String,
  #[serde(default)]
  pub photo:           Option<String>,
  #[serde(default)]
  pub photo_thumb:     Option<String>,
  #[serde(default)]
  pub biography:       String,
  #[serde(default)]
  pub consent:         Option<bool>,
}

impl Wire for WirePerson {
  type Domain = Person;

  const KIND: &'static str = "person";
  const KEY: &'static str = "id";

  fn into_domain(self) -> Result<Person> {
    Ok(Person {
      id:              PersonId(self.id),
      name:            self.name,
      name_from_draft: non_empty(self.name_from_draft),
      ascii:           self.ascii,
      ascii_short:     non_empty(self.ascii_short),
      user:            non_empty(self.user),
      time:            parse_time(&self.time)?,
      photo:           non_empty(self.photo),
      photo_thumb:     non_empty(self.photo_thumb),
      biography:       self.biography,
      consent:         self.consent,
    })
  }
}

#[derive(Debug, Deserialize)]
pub struct WireHistory {
  pub history_id:            i64,
  pub history_type:          String,
  #[serde(default)]
  pub history_change_reason: Option<String>,
  #[serde(default)]
  pub history_user:          Option<String>,
  pub history_date:          String,
}

impl WireHistory {
  fn into_history(self) -> Result<History> {
    Ok(History {
      history_id:            self.history_id,
      history_type:          parse_history_type(&self.history_type)?,
      history_change_reason: non_empty(self.history_change_reason),
      history_user:          non_empty(self.history_user),
      history_date:          parse_time(&self.history_date)?,
    })
  }
}

#[derive(Debug, Deserialize)]
pub struct WireHistoricalPerson {
  #[serde(flatten)]
  pub person:  WirePerson,
  #[serde(flatten)]
  pub history: WireHistory,
}

impl Wire for WireHistoricalPerson {
  type Domain = HistoricalPerson;

  const KIND: &'static str = "person history entry";
  const KEY: &'static str = "history_id";

  fn into_domain(self) -> Result<HistoricalPerson> {
    Ok(HistoricalPerson {
      person:  self.person.into_domain()?,
      history: self.history.into_history()?,
    })
  }
}

#[derive(Debug, Deserialize)]
pub struct WireAlias {
  pub id:     i64,
  pub person: String,
  pub name:   String,
}

impl Wire for WireAlias {
  type Domain = Alias;

  const KIND: &'static str = "alias";
  const KEY: &'static str = "id";

  fn into_domain(self) -> Result<Alias> {
    Ok(Alias { id: self.id, person: person_id(&self.person)?, name: self.name })
  }
}

#[derive(Debug, Deserialize)]
pub struct WireEmail {
  pub address: String,
  pub person:  String,
  pub time:    String,
  #[serde(default)]
  pub origin:  String,
  pub primary: bool,
  pub active:  bool,
}

impl Wire for WireEmail {
  type Domain = Email;

  const KIND: &'static str = "email";
  const KEY: &'static str = "address";

  fn into_domain(self) -> Result<Email> {
    Ok(Email {
      address: self.address,
      person:  person_id(&self.person)?,
      time:    parse_time(&self.time)?,
      origin:  self.origin,
      primary: self.primary,
      active:  self.active,
    })
  }
}

#[derive(Debug, Deserialize)]
pub struct WireHistoricalEmail {
  #[serde(flatten)]
  pub email:   WireEmail,
  #[serde(flatten)]
  pub history: WireHistory,
}

impl Wire for WireHistoricalEmail {
  type Domain = HistoricalEmail;

  const KIND: &'static str = "email history entry";
  const KEY: &'static str = "history_id";

  fn into_domain(self) -> Result<HistoricalEmail> {
    Ok(HistoricalEmail {
      email:   self.email.into_domain()?,
      history: self.history.into_history()?,
    })
  }
}

#[derive(Debug, Deserialize)]
pub struct WireEvent {
  pub id:     i64,
  pub person: String,
  pub time:   String,
  #[serde(rename = "type")]
  pub kind:   String,
  #[serde(default)]
  pub desc:   String,
}

impl Wire for WireEvent {
  type Domain = PersonEvent;

  const KIND: &'static str = "person event";
  const KEY: &'static str = "id";

  fn into_domain(self) -> Result<PersonEvent> {
    Ok(PersonEvent {
      id:     self.id,
      person: person_id(&self.person)?,
      time:   parse_time(&self.time)?,
      kind:   self.kind,
      desc:   self.desc,
    })
  }
}

// ─── Documents ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WireDocument {
  pub id:        i64,
  pub name:      String,
  pub title:     String,
  #[serde(rename = "abstract", default)]
  pub abstract_: Option<String>,
  pub rev:       String,
  #[serde(default)]
  pub pages:     Option<i64>,
  pub time:      String,
  #[serde(default)]
  pub expires:   Option<String>,
  #[serde(default)]
  pub ad:        Option<String>,
  #[serde(default)]
  pub shepherd:  Option<String>,
  #[serde(default)]
  pub group:     Option<String>,
}

impl Wire for WireDocument {
  type Domain = Document;

  const KIND: &'static str = "document";
  const KEY: &'static str = "name";

  fn into_domain(self) -> Result<Document> {
    Ok(Document {
      id:        self.id,
      name:      self.name,
      title:     self.title,
      abstract_: non_empty(self.abstract_),
      rev:       self.rev,
      pages:     self.pages,
      time:      parse_time(&self.time)?,
      expires:   optional(self.expires, parse_time)?,
      ad:        optional(self.ad, person_id)?,
      shepherd:  optional(self.shepherd, email_address)?,
      group:     optional(self.group, group_id)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn utc(s: &str) -> DateTime<Utc> { s.parse().unwrap() }

  #[test]
  fn naive_times_are_utc() {
    assert_eq!(parse_time("2012-02-26T00:03:54").unwrap(), utc("2012-02-26T00:03:54Z"));
    assert_eq!(
      parse_time("2019-11-20T09:57:12.274597").unwrap(),
      utc("2019-11-20T09:57:12.274597Z")
    );
    assert_eq!(parse_time("2020-01-01T02:00:00+02:00").unwrap(), utc("2020-01-01T00:00:00Z"));
    assert!(matches!(parse_time("yesterday"), Err(Error::Timestamp(_))));
  }

  #[test]
  fn filter_bound_drops_offset_and_trailing_zeros() {
    assert_eq!(format_time(utc("2020-01-01T00:00:00Z")), "2020-01-01T00:00:00");
    assert_eq!(format_time(utc("2020-01-01T00:00:00.5Z")), "2020-01-01T00:00:00.500");
  }

  #[test]
  fn resource_uris_resolve_to_keys() {
    assert_eq!(person_id("/api/v1/person/person/20209/").unwrap(), PersonId(20209));
    assert_eq!(email_address("/api/v1/person/email/a@example.org/").unwrap(), "a@example.org");
    assert_eq!(group_id("/api/v1/group/group/2161/").unwrap(), GroupId(2161));
  }

  #[test]
  fn malformed_resource_uris_are_rejected() {
    for uri in [
      "/api/v1/person/person/",
      "/api/v1/person/person/abc/",
      "/api/v1/person/person/1",
      "/api/v1/person/person/1/2/",
      "/api/v1/group/group/1/",
      "",
    ] {
      assert!(
        matches!(person_id(uri), Err(Error::ResourceUri { kind: "person", .. })),
        "{uri:?} was accepted"
      );
    }
  }

  #[test]
  fn history_symbols() {
    assert_eq!(parse_history_type("+").unwrap(), HistoryType::Created);
    assert_eq!(parse_history_type("~").unwrap(), HistoryType::Changed);
    assert_eq!(parse_history_type("-").unwrap(), HistoryType::Deleted);
    assert!(matches!(parse_history_type("?"), Err(Error::HistoryType(_))));
  }

  #[test]
  fn person_page_parses() {
    let body = r#"{
      "meta": {"limit": 1, "next": "/api/v1/person/person/?limit=1&offset=1", "offset": 0},
      "objects": [{
        "ascii": "Colin Perkins",
        "ascii_short": "",
        "biography": "",
        "consent": true,
        "id": 20209,
        "name": "Colin Perkins",
        "name_from_draft": "Colin Perkins",
        "photo": "https://www.ietf.org/lib/dt/media/photo/Colin-Perkins.jpg",
        "photo_thumb": "",
        "resource_uri": "/api/v1/person/person/20209/",
        "time": "2012-02-26T00:03:54",
        "user": ""
      }]
    }"#;

    let page: Envelope<WirePerson> = serde_json::from_str(body).unwrap();
    assert_eq!(page.meta.next.as_deref(), Some("/api/v1/person/person/?limit=1&offset=1"));

    let person = page.objects.into_iter().next().unwrap().into_domain().unwrap();
    assert_eq!(person.id, PersonId(20209));
    assert_eq!(person.ascii_short, None);
    assert_eq!(person.user, None);
    assert_eq!(person.photo_thumb, None);
    assert_eq!(person.asset_uris().count(), 1);
    assert_eq!(person.time, utc("2012-02-26T00:03:54Z"));
  }

  #[test]
  fn historical_email_parses_flattened_history() {
    let body = r#"{
      "active": true,
      "address": "csp@csperkins.org",
      "history_change_reason": null,
      "history_date": "2019-09-24T12:50:52.166Z",
      "history_id": 71823,
      "history_type": "~",
      "history_user": "",
      "origin": "author: draft-ietf-avtcore-rtp-circuit-breakers",
      "person": "/api/v1/person/person/20209/",
      "primary": false,
      "resource_uri": "/api/v1/person/historicalemail/71823/",
      "time": "1970-01-01T23:59:59"
    }"#;

    let wire: WireHistoricalEmail = serde_json::from_str(body).unwrap();
    let email = wire.into_domain().unwrap();
    assert_eq!(email.email.person, PersonId(20209));
    assert_eq!(email.history.history_type, HistoryType::Changed);
    assert_eq!(email.history.history_user, None);
  }

  #[test]
  fn document_links_resolve() {
    let body = r#"{
      "abstract": "Abstract text.",
      "ad": "/api/v1/person/person/105099/",
      "expires": null,
      "group": "/api/v1/group/group/1665/",
      "id": 66405,
      "name": "draft-ietf-quic-transport",
      "pages": 207,
      "rev": "34",
      "shepherd": "/api/v1/person/email/lars@eggert.org/",
      "time": "2021-05-27T14:12:20",
      "title": "QUIC: A UDP-Based Multiplexed and Secure Transport"
    }"#;

    let doc = serde_json::from_str::<WireDocument>(body).unwrap().into_domain().unwrap();
    assert_eq!(doc.ad, Some(PersonId(105099)));
    assert_eq!(doc.group, Some(GroupId(1665)));
    assert_eq!(doc.shepherd.as_deref(), Some("lars@eggert.org"));
    assert_eq!(doc.expires, None);
  }

  #[test]
  fn event_with_foreign_link_shape_fails() {
    let wire = WireEvent {
      id:     1,
      person: "/api/v1/person/email/x@y/".into(),
      time:   "2020-01-01T00:00:00".into(),
      kind:   "apikey_login".into(),
      desc:   String::new(),
    };
    assert!(matches!(wire.into_domain(), Err(Error::ResourceUri { .. })));
  }

  #[test]
  fn untranslatable_objects_are_named_by_their_key() {
    let bad_time = serde_json::json!({
      "id": 3, "name": "C", "ascii": "C", "time": "not-a-time"
    });
    let err = translate::<WirePerson>(2, bad_time).unwrap_err();
    assert_eq!(err.key, "person 3");
    assert!(err.reason.contains("not-a-time"), "{}", err.reason);

    let no_name = serde_json::json!({ "id": 9, "title": "T", "rev": "00", "time": "2020" });
    assert_eq!(translate::<WireDocument>(0, no_name).unwrap_err().key, "document #0");

    let bad_symbol = serde_json::json!({
      "id": 1, "name": "A", "ascii": "A", "time": "2020-01-01T00:00:00",
      "history_id": 44, "history_type": "?", "history_date": "2020-01-01T00:00:00"
    });
    let err = translate::<WireHistoricalPerson>(0, bad_symbol).unwrap_err();
    assert_eq!(err.key, "person history entry 44");
  }

  #[test]
  fn translatable_object_passes_through() {
    let alias = serde_json::json!({
      "id": 5, "person": "/api/v1/person/person/20209/", "name": "C. Perkins"
    });
    let alias = translate::<WireAlias>(0, alias).unwrap();
    assert_eq!(alias.person, PersonId(20209));
  }
}
