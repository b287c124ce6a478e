//! The sync loop: plan the fetch window, pull records, persist them one by
//! one, then materialise their assets.
//!
//! Runs strictly sequentially. A failure on one record is logged here and
//! never stops the run; only an unreadable watermark or an unreachable
//! top-level listing is fatal.

use chrono::{DateTime, Utc};

use crate::{
  Error, FetchError, RecordKey, Result,
  asset::{AssetFetcher, MaterializeOutcome, asset_file_name, materialize_if_stale},
  document::Document,
  person::{Person, PersonId, PersonRecord},
  source::{Page, PageToken, RecordSource, collect_pages},
  store::MirrorStore,
};

// ─── Planner ─────────────────────────────────────────────────────────────────

/// Lower bound for the next people query: `None` for an empty store (fetch
/// everything), otherwise the newest stored `Person::time`.
///
/// The bound is handed to [`RecordSource::people`], which treats it as
/// inclusive; the boundary record is simply rewritten.
pub async fn plan_fetch<S: MirrorStore>(store: &S) -> Result<Option<DateTime<Utc>>> {
  store
    .watermark()
    .await
    .map_err(|e| Error::Watermark(Box::new(e)))
}

// ─── Options & report ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
  /// Ignore the watermark and walk the whole catalog.
  pub full:      bool,
  /// Also mirror the document listing after people.
  pub documents: bool,
}

/// Outcome counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  /// The bound the people listing was queried with.
  pub since:               Option<DateTime<Utc>>,
  pub people_persisted:    u64,
  pub people_failed:       u64,
  pub documents_persisted: u64,
  pub documents_failed:    u64,
  pub assets_downloaded:   u64,
  pub assets_skipped:      u64,
  pub assets_failed:       u64,
}

// ─── Mirror ──────────────────────────────────────────────────────────────────

/// One-directional mirror from a record source into a local store.
///
/// Borrows its collaborators; the caller owns (and eventually closes) the
/// store. Running two mirrors against the same store at once is not
/// supported.
pub struct Mirror<'a, Src, St, F> {
  source:  &'a Src,
  store:   &'a St,
  fetcher: &'a F,
}

impl<'a, Src, St, F> Mirror<'a, Src, St, F>
where
  Src: RecordSource,
  St: MirrorStore,
  F: AssetFetcher,
{
  pub fn new(source: &'a Src, store: &'a St, fetcher: &'a F) -> Self {
    Self { source, store, fetcher }
  }

  pub async fn run(&self, options: SyncOptions) -> Result<SyncReport> {
    let since = if options.full { None } else { plan_fetch(self.store).await? };
    let mut report = SyncReport { since, ..SyncReport::default() };

    tracing::info!(since = ?since, "mirroring people");
    let mut token: Option<PageToken> = None;
    loop {
      let page = self
        .source
        .people(since, token)
        .await
        .map_err(Error::source_error)?;

      for malformed in page.malformed {
        report.people_failed += 1;
        skipped(&Error::from(malformed));
      }
      for person in page.items {
        self.mirror_person(person, &mut report).await;
      }

      token = page.next;
      if token.is_none() {
        break;
      }
    }

    if options.documents {
      tracing::info!("mirroring documents");
      let mut token: Option<PageToken> = None;
      loop {
        let page = self
          .source
          .documents(token)
          .await
          .map_err(Error::source_error)?;

        for malformed in page.malformed {
          report.documents_failed += 1;
          skipped(&Error::from(malformed));
        }
        for document in page.items {
          match self.persist_document(&document).await {
            Ok(()) => report.documents_persisted += 1,
            Err(e) => {
              report.documents_failed += 1;
              skipped(&e);
            }
          }
        }

        token = page.next;
        if token.is_none() {
          break;
        }
      }
    }

    tracing::info!(
      people = report.people_persisted,
      people_failed = report.people_failed,
      documents = report.documents_persisted,
      documents_failed = report.documents_failed,
      assets_downloaded = report.assets_downloaded,
      assets_skipped = report.assets_skipped,
      assets_failed = report.assets_failed,
      "sync finished"
    );
    if report.people_failed > 0 {
      tracing::warn!(
        people_failed = report.people_failed,
        "skipped people may predate the new watermark; run a full sync to retry them"
      );
    }
    Ok(report)
  }

  async fn mirror_person(&self, person: Person, report: &mut SyncReport) {
    tracing::debug!(person = %person.id, "gathering person");

    let record = match self.persist_person(person).await {
      Ok(record) => {
        report.people_persisted += 1;
        record
      }
      Err(e) => {
        report.people_failed += 1;
        skipped(&e);
        return;
      }
    };

    // Assets are only touched once the person's own metadata is durable.
    for uri in record.person.asset_uris() {
      match self.materialize(record.id(), uri).await {
        Ok(None) => {}
        Ok(Some(MaterializeOutcome::Skipped)) => report.assets_skipped += 1,
        Ok(Some(MaterializeOutcome::Downloaded { .. })) => report.assets_downloaded += 1,
        Err(e) => {
          report.assets_failed += 1;
          tracing::error!(person = %record.id(), uri, error = %e, "asset not materialised");
        }
      }
    }
  }

  /// Assemble the full record for `person`, check it, and write it.
  async fn persist_person(&self, person: Person) -> Result<PersonRecord> {
    let record = self.gather(person).await?;
    record.verify_links()?;
    self
      .store
      .put_person(&record)
      .await
      .map_err(|e| Error::persist(RecordKey::Person(record.id()), e))?;
    Ok(record)
  }

  async fn gather(&self, person: Person) -> Result<PersonRecord> {
    let id = person.id;
    let source = self.source;

    let aliases = complete(id, collect_pages(move |p| source.aliases(id, p)).await)?;
    let emails = complete(id, collect_pages(move |p| source.emails(id, p)).await)?;
    let email_history = complete(id, collect_pages(move |p| source.email_history(id, p)).await)?;
    let person_history =
      complete(id, collect_pages(move |p| source.person_history(id, p)).await)?;
    let events = complete(id, collect_pages(move |p| source.events(id, p)).await)?;

    Ok(PersonRecord { person, aliases, emails, email_history, person_history, events })
  }

  async fn persist_document(&self, document: &Document) -> Result<()> {
    self
      .store
      .put_document(document)
      .await
      .map_err(|e| Error::persist(RecordKey::Document(document.name.clone()), e))
  }

  /// `Ok(None)` when the store keeps no assets.
  async fn materialize(
    &self,
    person: PersonId,
    uri: &str,
  ) -> Result<Option<MaterializeOutcome>, FetchError> {
    let Some(dir) = self.store.asset_dir(person) else {
      return Ok(None);
    };
    let local = dir.join(asset_file_name(uri)?);
    materialize_if_stale(self.fetcher, uri, &local).await.map(Some)
  }
}

/// The items of a fully walked child listing of `person`. One malformed
/// child fails the whole person, since a record is only stored complete.
fn complete<T, E>(person: PersonId, listing: Result<Page<T>, E>) -> Result<Vec<T>>
where
  E: std::error::Error + Send + Sync + 'static,
{
  let page = listing.map_err(|e| Error::gather(RecordKey::Person(person), e))?;
  match page.malformed.into_iter().next() {
    Some(malformed) => Err(Error::gather(RecordKey::Person(person), malformed)),
    None => Ok(page.items),
  }
}

/// Report a record that was not mirrored this run.
fn skipped(error: &Error) {
  tracing::warn!(error = %error, "record skipped");
}
