//! [`SqliteStore`], the SQLite implementation of [`MirrorStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;

use dtmirror_core::{
  document::Document,
  person::{HistoricalEmail, HistoricalPerson, PersonId, PersonRecord},
  store::{MirrorStore, StoreSummary},
};

use crate::{
  Result,
  encode::{
    AliasRow, DocumentRow, EmailRow, EventRow, HistoryRow, PersonRow, RecordRows, decode_dt,
  },
  schema::SCHEMA,
};

/// Every table of the mirror, in the order `status` reports them.
pub const TABLES: [&str; 7] = [
  "person",
  "alias",
  "email",
  "historical_email",
  "historical_person",
  "person_events",
  "document",
];

const PERSON_COLUMNS: &str = "id, name, name_from_draft, ascii, ascii_short, user, time, \
                              photo, photo_thumb, biography, consent";

const EMAIL_COLUMNS: &str = "address, person, time, origin, is_primary, active";

const HISTORY_COLUMNS: &str =
  "history_id, history_type, history_change_reason, history_user, history_date";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A mirror backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. The
/// connection closes when the last clone is dropped.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and bootstrap the schema.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Row count of every table in [`TABLES`].
  pub async fn row_counts(&self) -> Result<Vec<(&'static str, u64)>> {
    let counts = self
      .conn
      .call(|conn| {
        TABLES
          .iter()
          .map(|table| -> tokio_rusqlite::Result<(&'static str, u64)> {
            let n: i64 =
              conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0))?;
            Ok((*table, n as u64))
          })
          .collect::<tokio_rusqlite::Result<Vec<_>>>()
      })
      .await?;
    Ok(counts)
  }

  /// Read back a person with every child row that references it.
  pub async fn get_record(&self, id: PersonId) -> Result<Option<PersonRecord>> {
    let raw = self
      .conn
      .call(move |conn| {
        let person = conn
          .query_row(
            &format!("SELECT {PERSON_COLUMNS} FROM person WHERE id = ?1"),
            [id.0],
            PersonRow::from_row,
          )
          .optional()?;
        let Some(person) = person else {
          return Ok(None);
        };

        let aliases = conn
          .prepare("SELECT id, person, name FROM alias WHERE person = ?1 ORDER BY id")?
          .query_map([id.0], |r| {
            Ok(AliasRow { id: r.get(0)?, person: r.get(1)?, name: r.get(2)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let emails = conn
          .prepare(&format!(
            "SELECT {EMAIL_COLUMNS} FROM email WHERE person = ?1 ORDER BY address"
          ))?
          .query_map([id.0], EmailRow::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let email_history = conn
          .prepare(&format!(
            "SELECT {EMAIL_COLUMNS}, {HISTORY_COLUMNS} FROM historical_email
             WHERE person = ?1 ORDER BY history_id"
          ))?
          .query_map([id.0], |r| Ok((EmailRow::from_row(r)?, HistoryRow::from_row(r, 6)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let person_history = conn
          .prepare(&format!(
            "SELECT {PERSON_COLUMNS}, {HISTORY_COLUMNS} FROM historical_person
             WHERE id = ?1 ORDER BY history_id"
          ))?
          .query_map([id.0], |r| Ok((PersonRow::from_row(r)?, HistoryRow::from_row(r, 11)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let events = conn
          .prepare(
            "SELECT id, person, time, type, \"desc\" FROM person_events
             WHERE person = ?1 ORDER BY id",
          )?
          .query_map([id.0], |r| {
            Ok(EventRow {
              id:     r.get(0)?,
              person: r.get(1)?,
              time:   r.get(2)?,
              kind:   r.get(3)?,
              desc:   r.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some((person, aliases, emails, email_history, person_history, events)))
      })
      .await?;

    let Some((person, aliases, emails, email_history, person_history, events)) = raw else {
      return Ok(None);
    };

    Ok(Some(PersonRecord {
      person:         person.into_person()?,
      aliases:        aliases.into_iter().map(AliasRow::into_alias).collect(),
      emails:         emails.into_iter().map(EmailRow::into_email).collect::<Result<_>>()?,
      email_history:  email_history
        .into_iter()
        .map(|(email, history)| {
          Ok(HistoricalEmail { email: email.into_email()?, history: history.into_history()? })
        })
        .collect::<Result<_>>()?,
      person_history: person_history
        .into_iter()
        .map(|(person, history)| {
          Ok(HistoricalPerson {
            person:  person.into_person()?,
            history: history.into_history()?,
          })
        })
        .collect::<Result<_>>()?,
      events:         events.into_iter().map(EventRow::into_event).collect::<Result<_>>()?,
    }))
  }

  /// Look up a document's title by its name.
  #[cfg(test)]
  pub(crate) async fn document_title(&self, name: &str) -> Result<Option<String>> {
    let name = name.to_owned();
    let title = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row("SELECT title FROM document WHERE name = ?1", [name], |r| r.get(0))
          .optional()?)
      })
      .await?;
    Ok(title)
  }
}

// ─── Writers ─────────────────────────────────────────────────────────────────

/// Write one person and its children inside `tx`. The person row is
/// upserted first so every child's foreign key resolves.
fn write_record(tx: &rusqlite::Transaction<'_>, rows: &RecordRows) -> rusqlite::Result<()> {
  let p = &rows.person;
  tx.execute(
    &format!(
      "INSERT INTO person ({PERSON_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
       ON CONFLICT (id) DO UPDATE SET
         name            = excluded.name,
         name_from_draft = excluded.name_from_draft,
         ascii           = excluded.ascii,
         ascii_short     = excluded.ascii_short,
         user            = excluded.user,
         time            = excluded.time,
         photo           = excluded.photo,
         photo_thumb     = excluded.photo_thumb,
         biography       = excluded.biography,
         consent         = excluded.consent"
    ),
    rusqlite::params![
      p.id,
      p.name,
      p.name_from_draft,
      p.ascii,
      p.ascii_short,
      p.user,
      p.time,
      p.photo,
      p.photo_thumb,
      p.biography,
      p.consent,
    ],
  )?;

  let mut stmt =
    tx.prepare_cached("INSERT OR REPLACE INTO alias (id, person, name) VALUES (?1, ?2, ?3)")?;
  for a in &rows.aliases {
    stmt.execute(rusqlite::params![a.id, a.person, a.name])?;
  }

  let mut stmt = tx.prepare_cached(&format!(
    "INSERT OR REPLACE INTO email ({EMAIL_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
  ))?;
  for e in &rows.emails {
    stmt.execute(rusqlite::params![e.address, e.person, e.time, e.origin, e.is_primary, e.active])?;
  }

  let mut stmt = tx.prepare_cached(&format!(
    "INSERT OR REPLACE INTO historical_email ({EMAIL_COLUMNS}, {HISTORY_COLUMNS})
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
  ))?;
  for (e, h) in &rows.email_history {
    stmt.execute(rusqlite::params![
      e.address,
      e.person,
      e.time,
      e.origin,
      e.is_primary,
      e.active,
      h.history_id,
      h.history_type,
      h.history_change_reason,
      h.history_user,
      h.history_date,
    ])?;
  }

  let mut stmt = tx.prepare_cached(&format!(
    "INSERT OR REPLACE INTO historical_person ({PERSON_COLUMNS}, {HISTORY_COLUMNS})
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
  ))?;
  for (p, h) in &rows.person_history {
    stmt.execute(rusqlite::params![
      p.id,
      p.name,
      p.name_from_draft,
      p.ascii,
      p.ascii_short,
      p.user,
      p.time,
      p.photo,
      p.photo_thumb,
      p.biography,
      p.consent,
      h.history_id,
      h.history_type,
      h.history_change_reason,
      h.history_user,
      h.history_date,
    ])?;
  }

  let mut stmt = tx.prepare_cached(
    "INSERT OR REPLACE INTO person_events (id, person, time, type, \"desc\")
     VALUES (?1, ?2, ?3, ?4, ?5)",
  )?;
  for e in &rows.events {
    stmt.execute(rusqlite::params![e.id, e.person, e.time, e.kind, e.desc])?;
  }

  Ok(())
}

// ─── MirrorStore impl ────────────────────────────────────────────────────────

impl MirrorStore for SqliteStore {
  type Error = crate::Error;

  async fn watermark(&self) -> Result<Option<DateTime<Utc>>> {
    let latest: Option<String> = self
      .conn
      .call(|conn| Ok(conn.query_row("SELECT max(time) FROM person", [], |r| r.get(0))?))
      .await?;

    latest.as_deref().map(decode_dt).transpose()
  }

  async fn put_person(&self, record: &PersonRecord) -> Result<()> {
    let rows = RecordRows::encode(record);

    self
      .conn
      .call(move |conn| {
        // Dropping an uncommitted transaction rolls it back.
        let tx = conn.transaction()?;
        write_record(&tx, &rows)?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn put_document(&self, document: &Document) -> Result<()> {
    let d = DocumentRow::encode(document);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO document (
             name, id, title, abstract, rev, pages, time, expires, ad, shepherd, group_id
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
          rusqlite::params![
            d.name,
            d.id,
            d.title,
            d.abstract_,
            d.rev,
            d.pages,
            d.time,
            d.expires,
            d.ad,
            d.shepherd,
            d.group_id,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn summary(&self) -> Result<StoreSummary> {
    let (people, documents): (i64, i64) = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT (SELECT count(*) FROM person), (SELECT count(*) FROM document)",
          [],
          |r| Ok((r.get(0)?, r.get(1)?)),
        )?)
      })
      .await?;

    Ok(StoreSummary {
      people:    people as u64,
      documents: documents as u64,
      watermark: self.watermark().await?,
    })
  }
}
