//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so that text comparison is chronological. History
//! types are stored as lowercase words.

use chrono::{DateTime, SecondsFormat, Utc};
use dtmirror_core::{
  document::Document,
  person::{
    Alias, Email, HistoricalEmail, HistoricalPerson, History, HistoryType, Person, PersonEvent,
    PersonId, PersonRecord,
  },
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── HistoryType ─────────────────────────────────────────────────────────────

pub fn encode_history_type(t: HistoryType) -> &'static str {
  match t {
    HistoryType::Created => "created",
    HistoryType::Changed => "changed",
    HistoryType::Deleted => "deleted",
  }
}

pub fn decode_history_type(s: &str) -> Result<HistoryType> {
  match s {
    "created" => Ok(HistoryType::Created),
    "changed" => Ok(HistoryType::Changed),
    "deleted" => Ok(HistoryType::Deleted),
    other => Err(Error::UnknownHistoryType(other.to_owned())),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column values of a `person` row (also the person part of a
/// `historical_person` row).
pub struct PersonRow {
  pub id:              i64,
  pub name:            String,
  pub name_from_draft: Option<String>,
  pub ascii:           String,
  pub ascii_short:     Option<String>,
  pub user:            Option<String>,
  pub time:            String,
  pub photo:           Option<String>,
  pub photo_thumb:     Option<String>,
  pub biography:       String,
  pub consent:         Option<bool>,
}

impl PersonRow {
  pub fn encode(p: &Person) -> Self {
    Self {
      id:              p.id.0,
      name:            p.name.clone(),
      name_from_draft: p.name_from_draft.clone(),
      ascii:           p.ascii.clone(),
      ascii_short:     p.ascii_short.clone(),
      user:            p.user.clone(),
      time:            encode_dt(p.time),
      photo:           p.photo.clone(),
      photo_thumb:     p.photo_thumb.clone(),
      biography:       p.biography.clone(),
      consent:         p.consent,
    }
  }

  /// Read the eleven person columns starting at `row[0]`.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      name:            row.get(1)?,
      name_from_draft: row.get(2)?,
      ascii:           row.get(3)?,
      ascii_short:     row.get(4)?,
      user:            row.get(5)?,
      time:            row.get(6)?,
      photo:           row.get(7)?,
      photo_thumb:     row.get(8)?,
      biography:       row.get(9)?,
      consent:         row.get(10)?,
    })
  }

  pub fn into_person(self) -> Result<Person> {
    Ok(Person {
      id:              PersonId(self.id),
      name:            self.name,
      name_from_draft: self.name_from_draft,
      ascii:           self.ascii,
      ascii_short:     self.ascii_short,
      user:            self.user,
      time:            decode_dt(&self.time)?,
      photo:           self.photo,
      photo_thumb:     self.photo_thumb,
      biography:       self.biography,
      consent:         self.consent,
    })
  }
}

pub struct EmailRow {
  pub address:    String,
  pub person:     i64,
  pub time:       String,
  pub origin:     String,
  pub is_primary: bool,
  pub active:     bool,
}

impl EmailRow {
  pub fn encode(e: &Email) -> Self {
    Self {
      address:    e.address.clone(),
      person:     e.person.0,
      time:       encode_dt(e.time),
      origin:     e.origin.clone(),
      is_primary: e.primary,
      active:     e.active,
    }
  }

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      address:    row.get(0)?,
      person:     row.get(1)?,
      time:       row.get(2)?,
      origin:     row.get(3)?,
      is_primary: row.get(4)?,
      active:     row.get(5)?,
    })
  }

  pub fn into_email(self) -> Result<Email> {
    Ok(Email {
      address: self.address,
      person:  PersonId(self.person),
      time:    decode_dt(&self.time)?,
      origin:  self.origin,
      primary: self.is_primary,
      active:  self.active,
    })
  }
}

/// The `history_*` columns shared by both historical tables.
pub struct HistoryRow {
  pub history_id:            i64,
  pub history_type:          String,
  pub history_change_reason: Option<String>,
  pub history_user:          Option<String>,
  pub history_date:          String,
}

impl HistoryRow {
  pub fn encode(h: &History) -> Self {
    Self {
      history_id:            h.history_id,
      history_type:          encode_history_type(h.history_type).to_owned(),
      history_change_reason: h.history_change_reason.clone(),
      history_user:          h.history_user.clone(),
      history_date:          encode_dt(h.history_date),
    }
  }

  /// Read the five history columns starting at `row[at]`.
  pub fn from_row(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      history_id:            row.get(at)?,
      history_type:          row.get(at + 1)?,
      history_change_reason: row.get(at + 2)?,
      history_user:          row.get(at + 3)?,
      history_date:          row.get(at + 4)?,
    })
  }

  pub fn into_history(self) -> Result<History> {
    Ok(History {
      history_id:            self.history_id,
      history_type:          decode_history_type(&self.history_type)?,
      history_change_reason: self.history_change_reason,
      history_user:          self.history_user,
      history_date:          decode_dt(&self.history_date)?,
    })
  }
}

pub struct AliasRow {
  pub id:     i64,
  pub person: i64,
  pub name:   String,
}

impl AliasRow {
  pub fn into_alias(self) -> Alias {
    Alias { id: self.id, person: PersonId(self.person), name: self.name }
  }
}

pub struct EventRow {
  pub id:     i64,
  pub person: i64,
  pub time:   String,
  pub kind:   String,
  pub desc:   String,
}

impl EventRow {
  pub fn into_event(self) -> Result<PersonEvent> {
    Ok(PersonEvent {
      id:     self.id,
      person: PersonId(self.person),
      time:   decode_dt(&self.time)?,
      kind:   self.kind,
      desc:   self.desc,
    })
  }
}

/// Everything written for one [`PersonRecord`], encoded up front so it can
/// be moved onto the database thread.
pub struct RecordRows {
  pub person:         PersonRow,
  pub aliases:        Vec<AliasRow>,
  pub emails:         Vec<EmailRow>,
  pub email_history:  Vec<(EmailRow, HistoryRow)>,
  pub person_history: Vec<(PersonRow, HistoryRow)>,
  pub events:         Vec<EventRow>,
}

impl RecordRows {
  pub fn encode(record: &PersonRecord) -> Self {
    Self {
      person:         PersonRow::encode(&record.person),
      aliases:        record.aliases.iter().map(encode_alias).collect(),
      emails:         record.emails.iter().map(EmailRow::encode).collect(),
      email_history:  record
        .email_history
        .iter()
        .map(|HistoricalEmail { email, history }| {
          (EmailRow::encode(email), HistoryRow::encode(history))
        })
        .collect(),
      person_history: record
        .person_history
        .iter()
        .map(|HistoricalPerson { person, history }| {
          (PersonRow::encode(person), HistoryRow::encode(history))
        })
        .collect(),
      events:         record.events.iter().map(encode_event).collect(),
    }
  }
}

fn encode_alias(a: &Alias) -> AliasRow {
  AliasRow { id: a.id, person: a.person.0, name: a.name.clone() }
}

fn encode_event(e: &PersonEvent) -> EventRow {
  EventRow {
    id:     e.id,
    person: e.person.0,
    time:   encode_dt(e.time),
    kind:   e.kind.clone(),
    desc:   e.desc.clone(),
  }
}

/// Column values of a `document` row.
pub struct DocumentRow {
  pub name:      String,
  pub id:        i64,
  pub title:     String,
  pub abstract_: Option<String>,
  pub rev:       String,
  pub pages:     Option<i64>,
  pub time:      String,
  pub expires:   Option<String>,
  pub ad:        Option<i64>,
  pub shepherd:  Option<String>,
  pub group_id:  Option<i64>,
}

impl DocumentRow {
  pub fn encode(d: &Document) -> Self {
    Self {
      name:      d.name.clone(),
      id:        d.id,
      title:     d.title.clone(),
      abstract_: d.abstract_.clone(),
      rev:       d.rev.clone(),
      pages:     d.pages,
      time:      encode_dt(d.time),
      expires:   d.expires.map(encode_dt),
      ad:        d.ad.map(|p| p.0),
      shepherd:  d.shepherd.clone(),
      group_id:  d.group.map(|g| g.0),
    }
  }
}
