//! Person records and the child entities that hang off them.
//!
//! These types are mirrored as-is from the record source; nothing in this
//! workspace mutates them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Identity ────────────────────────────────────────────────────────────────

/// Stable integer key of a person in the remote catalog.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PersonId(pub i64);

impl fmt::Display for PersonId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// A person as currently known to the record source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
  pub id:              PersonId,
  pub name:            String,
  pub name_from_draft: Option<String>,
  pub ascii:           String,
  pub ascii_short:     Option<String>,
  /// Resource identifier of the linked login account, if any.
  pub user:            Option<String>,
  /// Last-modified time; the watermark is derived from this field.
  pub time:            DateTime<Utc>,
  pub photo:           Option<String>,
  pub photo_thumb:     Option<String>,
  pub biography:       String,
  pub consent:         Option<bool>,
}

impl Person {
  /// URIs of the binary assets this person references.
  pub fn asset_uris(&self) -> impl Iterator<Item = &str> {
    [self.photo.as_deref(), self.photo_thumb.as_deref()]
      .into_iter()
      .flatten()
  }
}

// ─── History ─────────────────────────────────────────────────────────────────

/// What kind of change a historical snapshot records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryType {
  Created,
  Changed,
  Deleted,
}

/// Bookkeeping shared by every historical snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
  /// Natural key; monotonically increasing on the remote side.
  pub history_id:            i64,
  pub history_type:          HistoryType,
  pub history_change_reason: Option<String>,
  pub history_user:          Option<String>,
  pub history_date:          DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPerson {
  #[serde(flatten)]
  pub person:  Person,
  #[serde(flatten)]
  pub history: History,
}

// ─── Children ────────────────────────────────────────────────────────────────

/// An email address. Addresses are assumed globally unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
  pub address: String,
  pub person:  PersonId,
  pub time:    DateTime<Utc>,
  pub origin:  String,
  pub primary: bool,
  pub active:  bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalEmail {
  #[serde(flatten)]
  pub email:   Email,
  #[serde(flatten)]
  pub history: History,
}

/// An alternative spelling of a person's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
  pub id:     i64,
  pub person: PersonId,
  pub name:   String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonEvent {
  pub id:     i64,
  pub person: PersonId,
  pub time:   DateTime<Utc>,
  #[serde(rename = "type")]
  pub kind:   String,
  pub desc:   String,
}

// ─── Assembled record ────────────────────────────────────────────────────────

/// A person together with every child collection currently attached to it.
///
/// This is the unit a [`MirrorStore`](crate::store::MirrorStore) writes in a
/// single atomic step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
  #[serde(flatten)]
  pub person:         Person,
  #[serde(default)]
  pub aliases:        Vec<Alias>,
  #[serde(default)]
  pub emails:         Vec<Email>,
  #[serde(default)]
  pub email_history:  Vec<HistoricalEmail>,
  #[serde(default)]
  pub person_history: Vec<HistoricalPerson>,
  #[serde(default)]
  pub events:         Vec<PersonEvent>,
}

impl PersonRecord {
  /// A record with no children.
  pub fn new(person: Person) -> Self {
    Self {
      person,
      aliases: vec![],
      emails: vec![],
      email_history: vec![],
      person_history: vec![],
      events: vec![],
    }
  }

  pub fn id(&self) -> PersonId { self.person.id }

  /// Check that every child points back at this record's person.
  ///
  /// A record that fails this check would leave rows referencing some other
  /// person, so it is rejected before any write happens.
  pub fn verify_links(&self) -> Result<()> {
    let expected = self.person.id;
    let links = self
      .aliases
      .iter()
      .map(|a| ("alias", a.person))
      .chain(self.emails.iter().map(|e| ("email", e.person)))
      .chain(self.email_history.iter().map(|h| ("historical email", h.email.person)))
      .chain(self.person_history.iter().map(|h| ("historical person", h.person.id)))
      .chain(self.events.iter().map(|e| ("event", e.person)));

    for (kind, found) in links {
      if found != expected {
        return Err(Error::BrokenLink { kind, expected, found });
      }
    }
    Ok(())
  }
}
