//! The `RecordSource` trait and its paging types.
//!
//! A record source is the remote catalog. It is consumed one page at a time
//! so callers decide how lazily to walk a listing.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  Malformed,
  document::Document,
  person::{Alias, Email, HistoricalEmail, HistoricalPerson, Person, PersonEvent, PersonId},
};

// ─── Paging ──────────────────────────────────────────────────────────────────

/// Opaque continuation handed back by a source; only meaningful to the
/// source that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(pub String);

/// One page of a listing.
///
/// Objects the source could not translate are reported in `malformed`
/// instead of failing the page.
#[derive(Debug, Clone)]
pub struct Page<T> {
  pub items:     Vec<T>,
  pub malformed: Vec<Malformed>,
  /// `None` on the last page.
  pub next:      Option<PageToken>,
}

impl<T> Page<T> {
  pub fn new(items: Vec<T>, next: Option<PageToken>) -> Self {
    Self { items, malformed: Vec::new(), next }
  }

  /// A single page that ends the listing.
  pub fn last(items: Vec<T>) -> Self { Self::new(items, None) }
}

/// Walk a listing from its first page to its last and merge every page into
/// one terminal page.
///
/// `fetch` is called with `None` first and then with each returned token.
pub async fn collect_pages<T, E, F, Fut>(mut fetch: F) -> Result<Page<T>, E>
where
  F: FnMut(Option<PageToken>) -> Fut,
  Fut: Future<Output = Result<Page<T>, E>>,
{
  let mut all = Page::last(Vec::new());
  let mut token = None;
  loop {
    let page = fetch(token).await?;
    all.items.extend(page.items);
    all.malformed.extend(page.malformed);
    match page.next {
      Some(next) => token = Some(next),
      None => return Ok(all),
    }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the remote catalog.
///
/// Every call re-issues the underlying query; sources do not cache unless a
/// cache was explicitly injected into them. For a given listing, `page` is
/// `None` for the first page and the previous page's `next` afterwards.
pub trait RecordSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// People, oldest change first. With `since`, only people whose `time` is
  /// at or after that instant; the boundary is inclusive so records sharing
  /// the watermark's timestamp are never lost.
  fn people(
    &self,
    since: Option<DateTime<Utc>>,
    page: Option<PageToken>,
  ) -> impl Future<Output = Result<Page<Person>, Self::Error>> + Send + '_;

  fn aliases(
    &self,
    person: PersonId,
    page: Option<PageToken>,
  ) -> impl Future<Output = Result<Page<Alias>, Self::Error>> + Send + '_;

  fn emails(
    &self,
    person: PersonId,
    page: Option<PageToken>,
  ) -> impl Future<Output = Result<Page<Email>, Self::Error>> + Send + '_;

  fn email_history(
    &self,
    person: PersonId,
    page: Option<PageToken>,
  ) -> impl Future<Output = Result<Page<HistoricalEmail>, Self::Error>> + Send + '_;

  fn person_history(
    &self,
    person: PersonId,
    page: Option<PageToken>,
  ) -> impl Future<Output = Result<Page<HistoricalPerson>, Self::Error>> + Send + '_;

  fn events(
    &self,
    person: PersonId,
    page: Option<PageToken>,
  ) -> impl Future<Output = Result<Page<PersonEvent>, Self::Error>> + Send + '_;

  fn documents(
    &self,
    page: Option<PageToken>,
  ) -> impl Future<Output = Result<Page<Document>, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn collect_pages_follows_tokens() {
    let pages = vec![
      Page::new(vec![1, 2], Some(PageToken("b".into()))),
      Page {
        items:     vec![3],
        malformed: vec![Malformed { key: "item #1".into(), reason: "bad".into() }],
        next:      Some(PageToken("c".into())),
      },
      Page::last(vec![4, 5]),
    ];
    let mut seen = Vec::new();
    let mut pages = pages.into_iter();

    let all = collect_pages(|token| {
      seen.push(token);
      let page = pages.next().unwrap();
      async move { Ok::<_, std::io::Error>(page) }
    })
    .await
    .unwrap();

    assert_eq!(all.items, [1, 2, 3, 4, 5]);
    assert_eq!(all.malformed.len(), 1);
    assert!(all.next.is_none());
    assert_eq!(seen, [None, Some(PageToken("b".into())), Some(PageToken("c".into()))]);
  }

  #[tokio::test]
  async fn collect_pages_stops_on_error() {
    let result: Result<Page<u8>, std::io::Error> = collect_pages(|_| async {
      Err(std::io::Error::other("unreachable"))
    })
    .await;
    assert!(result.is_err());
  }
}
