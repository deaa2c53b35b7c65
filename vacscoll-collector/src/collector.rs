use futures::future::try_join_all;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::DedupeCache;
use crate::errors::{CollectError, FetchError, Result};
use crate::fetcher::PageFetcher;
use crate::rate::RateGate;
use crate::record::VacancyRecord;
use crate::{CollectorSettings, PageIndexing, SearchRequest};

/// The envelope of one search results page.
#[derive(Debug, Default, Deserialize)]
struct SearchPage {
    #[serde(default)]
    items: Option<Vec<Value>>,
    #[serde(default)]
    page: u32,
    #[serde(default)]
    pages: u32,
}

/// Walks every page of one search and turns the hits into records.
///
/// The first page is fetched on its own to learn how many pages exist; the
/// rest are requested concurrently, each dispatched through the [`RateGate`].
pub struct VacancyCollector {
    request: SearchRequest,
    settings: CollectorSettings,
    fetcher: Arc<dyn PageFetcher>,
    gate: RateGate,
    filters: HashSet<String>,
}

impl VacancyCollector {
    pub fn new(
        request: SearchRequest,
        settings: CollectorSettings,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Result<Self> {
        validate_base_url(&request.base_url)?;
        let gate = RateGate::new(settings.rate_delay);
        let filters = request.filters.iter().cloned().collect();
        Ok(Self {
            request,
            settings,
            fetcher,
            gate,
            filters,
        })
    }

    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    /// Compose a request URL from the base, an endpoint and query pairs.
    ///
    /// A missing or empty argument falls back to the search request's own
    /// endpoint or params. When neither resolves to anything the base URL is
    /// returned as is. Params are appended in order and are not
    /// percent-encoded.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use vacscoll_collector::{
    ///     CollectorSettings, HttpPageFetcher, SearchRequest, VacancyCollector,
    /// };
    ///
    /// let request = SearchRequest::new("https://api.hh.ru", "vacancies")
    ///     .with_param("text", "rust+developer")
    ///     .with_param("per_page", "100");
    /// let fetcher = HttpPageFetcher::with_client_options(None, None).unwrap();
    /// let collector =
    ///     VacancyCollector::new(request, CollectorSettings::default(), Arc::new(fetcher)).unwrap();
    ///
    /// assert_eq!(
    ///     collector.build_url(None, None),
    ///     "https://api.hh.ru/vacancies?text=rust+developer&per_page=100"
    /// );
    /// assert_eq!(
    ///     collector.build_url(Some(""), Some(&[])),
    ///     "https://api.hh.ru/vacancies?text=rust+developer&per_page=100"
    /// );
    /// ```
    pub fn build_url(&self, endpoint: Option<&str>, params: Option<&[(String, String)]>) -> String {
        let endpoint = endpoint
            .filter(|e| !e.is_empty())
            .unwrap_or(&self.request.endpoint);
        let params = params
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.request.query_params);
        join_url(&self.request.base_url, endpoint, params)
    }

    /// Fetch, merge and filter every page of the search.
    pub async fn fetch_all(&self) -> Result<Vec<VacancyRecord>> {
        let started = Instant::now();
        let first_url = self.build_url(None, None);
        let first = self.fetch_page(&first_url).await?;
        debug!(url = %first_url, page = first.page, pages = first.pages, "collector.page.fetched");

        let numbers = secondary_pages(self.settings.page_indexing, first.page, first.pages);
        let rest = try_join_all(numbers.iter().map(|&n| {
            let url = with_page(&first_url, n);
            async move {
                self.gate.acquire().await;
                let page = self.fetch_page(&url).await?;
                debug!(url = %url, page = n, "collector.page.fetched");
                Ok::<_, FetchError>(page)
            }
        }))
        .await?;

        let raw: Vec<Value> = std::iter::once(first)
            .chain(rest)
            .flat_map(|p| p.items.unwrap_or_default())
            .collect();
        let total = raw.len();

        let records: Vec<VacancyRecord> = raw
            .iter()
            .filter(|item| self.passes_filters(item))
            .filter_map(to_record)
            .collect();

        info!(
            pages = numbers.len() + 1,
            items = total,
            kept = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "collector.fetch_all.done"
        );
        Ok(records)
    }

    /// Fetch everything, then drop what the cache has already delivered.
    pub async fn collect(&self, cache: &DedupeCache) -> Result<Vec<VacancyRecord>> {
        let records = self.fetch_all().await?;
        Ok(cache.sift(records).await?)
    }

    /// Like [`collect`](Self::collect), but delivers the full payload of each
    /// new vacancy. Ids are recorded as seen only after every detail fetch
    /// succeeded, so a failed run leaves the cache untouched.
    pub async fn collect_detailed(&self, cache: &DedupeCache) -> Result<Vec<VacancyRecord>> {
        let records = self.fetch_all().await?;
        let seen = cache.load().await?;

        let mut batch = HashSet::new();
        let fresh: Vec<&str> = records
            .iter()
            .map(VacancyRecord::id)
            .filter(|id| !seen.contains(*id) && batch.insert(*id))
            .collect();
        let detailed = self.fetch_details(&fresh).await?;

        cache.save(records.iter().map(VacancyRecord::id)).await?;
        info!(candidates = records.len(), fresh = detailed.len(), "collector.collect_detailed.done");
        Ok(detailed)
    }

    /// Full payloads for individual vacancies, in the order of `ids`.
    pub async fn fetch_details<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<VacancyRecord>> {
        let endpoint = self.settings.detail_endpoint.trim_end_matches('/');
        let urls: Vec<String> = ids
            .iter()
            .map(|id| {
                self.build_url(
                    Some(&format!("{endpoint}/{}", id.as_ref())),
                    Some(&self.settings.detail_params),
                )
            })
            .collect();

        let payloads = try_join_all(urls.iter().map(|url| async move {
            self.gate.acquire().await;
            self.fetcher.fetch_json(url).await
        }))
        .await?;

        Ok(payloads.iter().filter_map(to_record).collect())
    }

    async fn fetch_page(&self, url: &str) -> Result<SearchPage, FetchError> {
        let body = self.fetcher.fetch_json(url).await?;
        serde_json::from_value(body).map_err(|e| FetchError::shape(url, e))
    }

    /// An item is dropped when its experience or employment id is filtered.
    fn passes_filters(&self, item: &Value) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        let category = |field: &str| item.get(field).and_then(|v| v.get("id")).and_then(Value::as_str);
        let blocked = ["experience", "employment"]
            .into_iter()
            .filter_map(category)
            .any(|id| self.filters.contains(id));
        !blocked
    }
}

fn to_record(item: &Value) -> Option<VacancyRecord> {
    match VacancyRecord::from_item(item) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(error = %err, id = ?item.get("id"), "collector.item.skipped");
            None
        }
    }
}

fn validate_base_url(base: &str) -> Result<()> {
    let parsed = Url::parse(base)
        .map_err(|e| CollectError::Validation(format!("base_url {base:?}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CollectError::Validation(format!(
            "base_url {base:?} must use http or https"
        )));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(CollectError::Validation(format!("base_url {base:?} has no host")));
    }
    Ok(())
}

fn join_url(base: &str, endpoint: &str, params: &[(String, String)]) -> String {
    let endpoint = endpoint.trim_start_matches('/');
    if endpoint.is_empty() && params.is_empty() {
        return base.to_string();
    }

    let mut url = base.to_string();
    if !endpoint.is_empty() {
        if !url.ends_with('/') {
            url.push('/');
        }
        url.push_str(endpoint);
    }
    if !params.is_empty() {
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&query);
    }
    url
}

fn with_page(url: &str, page: u32) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}page={page}")
}

/// Page numbers still to fetch after the first one.
fn secondary_pages(indexing: PageIndexing, page: u32, pages: u32) -> Vec<u32> {
    let next = page.saturating_add(1);
    match indexing {
        PageIndexing::ZeroBased => (next..pages).collect(),
        PageIndexing::OneBased => (next..=pages).collect(),
    }
}
