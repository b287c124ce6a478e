//! Async HTTP client for the Datatracker REST API.

use std::{
  sync::atomic::{AtomicBool, Ordering},
  time::Duration,
};

use chrono::{DateTime, Utc};
use reqwest::{Client, header};
use tokio::io::AsyncWriteExt as _;

use dtmirror_core::{
  FetchError,
  asset::AssetFetcher,
  document::Document,
  person::{Alias, Email, HistoricalEmail, HistoricalPerson, Person, PersonEvent, PersonId},
  source::{Page, PageToken, RecordSource},
};

use crate::{
  DiskCache, Error, Result,
  wire::{
    Envelope, Wire, WireAlias, WireDocument, WireEmail, WireEvent, WireHistoricalEmail,
    WireHistoricalPerson, WirePerson, format_time, translate,
  },
};

const PEOPLE: &str = "/api/v1/person/person/";
const ALIASES: &str = "/api/v1/person/alias/";
const EMAILS: &str = "/api/v1/person/email/";
const EMAIL_HISTORY: &str = "/api/v1/person/historicalemail/";
const PERSON_HISTORY: &str = "/api/v1/person/historicalperson/";
const EVENTS: &str = "/api/v1/person/personevent/";
const DOCUMENTS: &str = "/api/v1/doc/document/";

/// Connection settings for the Datatracker.
#[derive(Debug, Clone)]
pub struct ClientConfig {
  pub base_url:  String,
  pub timeout:   Duration,
  pub page_size: u32,
}

/// Async HTTP client for the Datatracker.
///
/// With a cache injected, only unbounded walks are served from it. Once the
/// people listing has been queried with a `since` bound, every person it
/// returns has changed, so neither that listing nor their child listings
/// are read from the cache (responses are still written to it).
pub struct DatatrackerClient {
  client:    Client,
  base_url:  String,
  page_size: u32,
  cache:     Option<DiskCache>,
  /// Set by the first page of a `since`-bounded people query.
  bounded:   AtomicBool,
}

impl DatatrackerClient {
  pub fn new(config: ClientConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(config.timeout)
      .user_agent(concat!("dtmirror/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self {
      client,
      base_url: config.base_url.trim_end_matches('/').to_owned(),
      page_size: config.page_size,
      cache: None,
      bounded: AtomicBool::new(false),
    })
  }

  /// Serve listing requests from `cache` when it holds a fresh copy.
  pub fn with_cache(mut self, cache: DiskCache) -> Self {
    self.cache = Some(cache);
    self
  }

  /// Absolute form of a path or URL returned by the API.
  fn absolute(&self, path_or_url: &str) -> String {
    if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
      path_or_url.to_owned()
    } else {
      format!("{}{}", self.base_url, path_or_url)
    }
  }

  /// The full URL of one page of `path`. A continuation token already
  /// carries every query parameter.
  fn page_url(
    &self,
    path: &str,
    filter: &[(&str, String)],
    page: Option<PageToken>,
  ) -> Result<String> {
    let request = match page {
      Some(PageToken(next)) => self.client.get(self.absolute(&next)),
      None => self
        .client
        .get(self.absolute(path))
        .query(&[("limit", self.page_size.to_string())])
        .query(filter),
    }
    .build()?;
    Ok(request.url().as_str().to_owned())
  }

  /// `cached` allows answering from the cache; the response is stored
  /// there either way.
  async fn get_body(&self, url: &str, cached: bool) -> Result<Vec<u8>> {
    if cached
      && let Some(cache) = &self.cache
      && let Some(body) = cache.get(url).await?
    {
      return Ok(body);
    }

    tracing::debug!(url, "GET");
    let resp = self
      .client
      .get(url)
      .header(header::ACCEPT, "application/json")
      .send()
      .await?;
    if !resp.status().is_success() {
      return Err(Error::Status { url: url.to_owned(), status: resp.status().as_u16() });
    }
    let body = resp.bytes().await?.to_vec();

    if let Some(cache) = &self.cache {
      cache.put(url, &body).await?;
    }
    Ok(body)
  }

  /// Fetch one page of a listing and translate its objects one by one.
  ///
  /// Only the envelope has to parse; an object that does not translate is
  /// reported in [`Page::malformed`] and the rest of the page is kept.
  async fn listing<W: Wire>(
    &self,
    path: &str,
    filter: &[(&str, String)],
    page: Option<PageToken>,
    cached: bool,
  ) -> Result<Page<W::Domain>> {
    let url = self.page_url(path, filter, page)?;
    let body = self.get_body(&url, cached).await?;
    let envelope: Envelope<serde_json::Value> = serde_json::from_slice(&body)
      .map_err(|source| Error::Json { url: url.clone(), source })?;

    let next = envelope.meta.next.filter(|n| !n.is_empty()).map(PageToken);
    let mut out = Page::new(Vec::new(), next);
    for (index, object) in envelope.objects.into_iter().enumerate() {
      match translate::<W>(index, object) {
        Ok(item) => out.items.push(item),
        Err(malformed) => {
          tracing::debug!(url = %url, key = %malformed.key, "untranslatable object");
          out.malformed.push(malformed);
        }
      }
    }
    Ok(out)
  }

  async fn of_person<W: Wire>(
    &self,
    path: &str,
    key: &'static str,
    person: PersonId,
    page: Option<PageToken>,
  ) -> Result<Page<W::Domain>> {
    let cached = !self.bounded.load(Ordering::Relaxed);
    self
      .listing::<W>(path, &[(key, person.to_string())], page, cached)
      .await
  }
}

// ─── RecordSource impl ───────────────────────────────────────────────────────

impl RecordSource for DatatrackerClient {
  type Error = Error;

  async fn people(
    &self,
    since: Option<DateTime<Utc>>,
    page: Option<PageToken>,
  ) -> Result<Page<Person>> {
    if page.is_none() {
      self.bounded.store(since.is_some(), Ordering::Relaxed);
    }
    let mut filter = vec![("order_by", "time".to_owned())];
    if let Some(since) = since {
      filter.push(("time__gte", format_time(since)));
    }
    self
      .listing::<WirePerson>(PEOPLE, &filter, page, since.is_none())
      .await
  }

  async fn aliases(&self, person: PersonId, page: Option<PageToken>) -> Result<Page<Alias>> {
    self.of_person::<WireAlias>(ALIASES, "person", person, page).await
  }

  async fn emails(&self, person: PersonId, page: Option<PageToken>) -> Result<Page<Email>> {
    self.of_person::<WireEmail>(EMAILS, "person", person, page).await
  }

  async fn email_history(
    &self,
    person: PersonId,
    page: Option<PageToken>,
  ) -> Result<Page<HistoricalEmail>> {
    self
      .of_person::<WireHistoricalEmail>(EMAIL_HISTORY, "person", person, page)
      .await
  }

  async fn person_history(
    &self,
    person: PersonId,
    page: Option<PageToken>,
  ) -> Result<Page<HistoricalPerson>> {
    self
      .of_person::<WireHistoricalPerson>(PERSON_HISTORY, "id", person, page)
      .await
  }

  async fn events(&self, person: PersonId, page: Option<PageToken>) -> Result<Page<PersonEvent>> {
    self.of_person::<WireEvent>(EVENTS, "person", person, page).await
  }

  async fn documents(&self, page: Option<PageToken>) -> Result<Page<Document>> {
    self.listing::<WireDocument>(DOCUMENTS, &[], page, true).await
  }
}

// ─── AssetFetcher impl ───────────────────────────────────────────────────────

impl AssetFetcher for DatatrackerClient {
  async fn last_modified(&self, uri: &str) -> Result<DateTime<Utc>, FetchError> {
    let url = self.absolute(uri);
    let resp = self
      .client
      .head(&url)
      .send()
      .await
      .map_err(|e| FetchError::transport(uri, e))?;
    if !resp.status().is_success() {
      return Err(FetchError::Status { uri: uri.to_owned(), status: resp.status().as_u16() });
    }

    let value = resp
      .headers()
      .get(header::LAST_MODIFIED)
      .ok_or_else(|| FetchError::MissingLastModified { uri: uri.to_owned() })?;
    let invalid = || FetchError::InvalidLastModified {
      uri:   uri.to_owned(),
      value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
    };
    let text = value.to_str().map_err(|_| invalid())?;
    DateTime::parse_from_rfc2822(text)
      .map(|dt| dt.with_timezone(&Utc))
      .map_err(|_| invalid())
  }

  async fn fetch_into(&self, uri: &str, out: &mut tokio::fs::File) -> Result<u64, FetchError> {
    let url = self.absolute(uri);
    let mut resp = self
      .client
      .get(&url)
      .send()
      .await
      .map_err(|e| FetchError::transport(uri, e))?;
    if !resp.status().is_success() {
      return Err(FetchError::Status { uri: uri.to_owned(), status: resp.status().as_u16() });
    }

    let mut bytes = 0u64;
    while let Some(chunk) = resp.chunk().await.map_err(|e| FetchError::transport(uri, e))? {
      out
        .write_all(&chunk)
        .await
        .map_err(|e| FetchError::transport(uri, e))?;
      bytes += chunk.len() as u64;
    }
    out.flush().await.map_err(|e| FetchError::transport(uri, e))?;
    Ok(bytes)
  }
}

#[cfg(test)]
mod tests {
  use dtmirror_core::{
    store::MirrorStore,
    sync::{Mirror, SyncOptions},
  };
  use dtmirror_store_tree::TreeStore;

  use super::*;

  /// Nothing listens here; any request that reaches the network fails.
  const OFFLINE: &str = "http://127.0.0.1:9";

  fn client() -> DatatrackerClient {
    DatatrackerClient::new(ClientConfig {
      base_url:  format!("{OFFLINE}/"),
      timeout:   Duration::from_secs(2),
      page_size: 50,
    })
    .unwrap()
  }

  #[test]
  fn first_page_url_carries_limit_and_filter() {
    let url = client()
      .page_url(ALIASES, &[("person", "20209".to_owned())], None)
      .unwrap();
    assert_eq!(url, format!("{OFFLINE}/api/v1/person/alias/?limit=50&person=20209"));
  }

  #[test]
  fn continuation_token_is_used_verbatim() {
    let next = PageToken("/api/v1/person/alias/?limit=50&offset=50&person=20209".into());
    let url = client().page_url(ALIASES, &[], Some(next)).unwrap();
    assert_eq!(url, format!("{OFFLINE}/api/v1/person/alias/?limit=50&offset=50&person=20209"));
  }

  #[test]
  fn people_filter_is_encoded() {
    let since = "2020-01-01T00:00:00Z".parse().unwrap();
    let filter = [("order_by", "time".to_owned()), ("time__gte", format_time(since))];
    let url = client().page_url(PEOPLE, &filter, None).unwrap();
    assert_eq!(
      url,
      format!(
        "{OFFLINE}/api/v1/person/person/?limit=50&order_by=time&time__gte=2020-01-01T00%3A00%3A00"
      )
    );
  }

  #[tokio::test]
  async fn cached_listing_needs_no_network() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = DiskCache::new(dir.path(), Duration::from_secs(60));
    let client = client().with_cache(cache.clone());

    let url = client
      .page_url(EMAILS, &[("person", "1".to_owned())], None)
      .unwrap();
    let body = br#"{
      "meta": {"next": null},
      "objects": [{
        "address": "one@example.org",
        "active": true,
        "origin": "",
        "person": "/api/v1/person/person/1/",
        "primary": true,
        "time": "2020-01-01T00:00:00"
      }]
    }"#;
    cache.put(&url, body).await.unwrap();

    let page = client.emails(PersonId(1), None).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].address, "one@example.org");
    assert!(page.next.is_none());
  }

  #[tokio::test]
  async fn malformed_cached_listing_is_a_json_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = DiskCache::new(dir.path(), Duration::from_secs(60));
    let client = client().with_cache(cache.clone());

    let url = client.page_url(DOCUMENTS, &[], None).unwrap();
    cache.put(&url, b"<html>maintenance</html>").await.unwrap();

    assert!(matches!(client.documents(None).await, Err(Error::Json { .. })));
  }

  #[tokio::test]
  async fn unreachable_server_is_an_http_error() {
    let err = client().documents(None).await.unwrap_err();
    assert!(matches!(err, Error::Http(_)), "got {err:?}");
  }

  const EMPTY: &[u8] = br#"{"meta": {"next": null}, "objects": []}"#;

  fn person_json(id: i64, time: &str) -> String {
    format!(r#"{{"id": {id}, "name": "P{id}", "ascii": "P{id}", "time": "{time}"}}"#)
  }

  /// A people page of five where the third carries an unparsable `time`.
  fn people_page_with_bad_third() -> Vec<u8> {
    let objects = (1..=5)
      .map(|id| {
        let time = match id {
          3 => "not-a-time".to_owned(),
          _ => format!("2020-01-0{id}T00:00:00"),
        };
        person_json(id, &time)
      })
      .collect::<Vec<_>>()
      .join(",");
    format!(r#"{{"meta": {{"next": null}}, "objects": [{objects}]}}"#).into_bytes()
  }

  async fn cache_people_page(client: &DatatrackerClient, cache: &DiskCache, body: &[u8]) {
    let url = client
      .page_url(PEOPLE, &[("order_by", "time".to_owned())], None)
      .unwrap();
    cache.put(&url, body).await.unwrap();
  }

  async fn cache_empty_children(client: &DatatrackerClient, cache: &DiskCache, id: i64) {
    for (path, key) in [
      (ALIASES, "person"),
      (EMAILS, "person"),
      (EMAIL_HISTORY, "person"),
      (PERSON_HISTORY, "id"),
      (EVENTS, "person"),
    ] {
      let url = client.page_url(path, &[(key, id.to_string())], None).unwrap();
      cache.put(&url, EMPTY).await.unwrap();
    }
  }

  #[tokio::test]
  async fn bad_object_is_reported_and_the_rest_of_the_page_kept() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = DiskCache::new(dir.path(), Duration::from_secs(60));
    let client = client().with_cache(cache.clone());
    cache_people_page(&client, &cache, &people_page_with_bad_third()).await;

    let page = client.people(None, None).await.unwrap();

    let ids: Vec<i64> = page.items.iter().map(|p| p.id.0).collect();
    assert_eq!(ids, [1, 2, 4, 5]);
    assert_eq!(page.malformed.len(), 1);
    assert_eq!(page.malformed[0].key, "person 3");
  }

  #[tokio::test]
  async fn run_over_a_page_with_a_bad_person_keeps_the_others() {
    let cache_dir = tempfile::tempdir().expect("tempdir");
    let data_dir = tempfile::tempdir().expect("tempdir");
    let cache = DiskCache::new(cache_dir.path(), Duration::from_secs(60));
    let client = client().with_cache(cache.clone());
    cache_people_page(&client, &cache, &people_page_with_bad_third()).await;
    for id in [1, 2, 4, 5] {
      cache_empty_children(&client, &cache, id).await;
    }
    let store = TreeStore::open(data_dir.path()).await.unwrap();

    let report = Mirror::new(&client, &store, &client)
      .run(SyncOptions::default())
      .await
      .unwrap();

    assert_eq!(report.people_persisted, 4);
    assert_eq!(report.people_failed, 1);
    assert_eq!(store.summary().await.unwrap().people, 4);
    assert!(store.get_record(PersonId(3)).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn bounded_query_bypasses_the_cache_for_child_listings() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = DiskCache::new(dir.path(), Duration::from_secs(60));
    let client = client().with_cache(cache.clone());
    cache_people_page(&client, &cache, EMPTY).await;
    cache_empty_children(&client, &cache, 1).await;

    client.people(None, None).await.unwrap();
    assert!(client.emails(PersonId(1), None).await.is_ok());

    let since = "2020-01-01T00:00:00Z".parse().unwrap();
    let err = client.people(Some(since), None).await.unwrap_err();
    assert!(matches!(err, Error::Http(_)), "got {err:?}");
    let err = client.emails(PersonId(1), None).await.unwrap_err();
    assert!(matches!(err, Error::Http(_)), "got {err:?}");
  }

  #[test]
  fn relative_asset_paths_are_made_absolute() {
    let c = client();
    assert_eq!(c.absolute("/media/photo/a.jpg"), format!("{OFFLINE}/media/photo/a.jpg"));
    assert_eq!(c.absolute("https://www.ietf.org/a.jpg"), "https://www.ietf.org/a.jpg");
  }
}
