//! Rate-limited collection of paginated vacancy searches.
//!
//! [`VacancyCollector`] fetches every page of a search through a
//! [`PageFetcher`], paces follow-up pages with a [`RateGate`], filters out
//! unwanted categories and hands the records to a [`DedupeCache`] so each
//! vacancy is delivered once per retention window. [`AreaResolver`] turns a
//! place name into the provider's area id.
use serde::Deserialize;
use std::time::Duration;

pub mod cache;
pub mod collector;
pub mod errors;
pub mod fetcher;
pub mod location;
pub mod rate;
pub mod record;

pub use cache::DedupeCache;
pub use collector::VacancyCollector;
pub use errors::{CollectError, FetchError, RecordError, StorageError};
pub use fetcher::{HttpPageFetcher, PageFetcher};
pub use location::{AreaEntry, AreaResolver, LocationIndex, RegionNode};
pub use rate::RateGate;
pub use record::{Salary, VacancyRecord};

/// What to search for. Fixed for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_url: String,
    pub endpoint: String,
    /// Sent in this order.
    pub query_params: Vec<(String, String)>,
    /// Experience or employment ids to exclude.
    pub filters: Vec<String>,
}

impl SearchRequest {
    pub fn new(base_url: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint: endpoint.into(),
            query_params: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query_params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.extend(filters.into_iter().map(Into::into));
        self
    }
}

/// Whether the provider's first page is numbered 0 or 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageIndexing {
    #[default]
    ZeroBased,
    OneBased,
}

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    /// Minimum spacing between dispatched follow-up requests.
    pub rate_delay: Duration,
    pub page_indexing: PageIndexing,
    pub detail_endpoint: String,
    pub detail_params: Vec<(String, String)>,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            rate_delay: Duration::from_millis(200),
            page_indexing: PageIndexing::ZeroBased,
            detail_endpoint: "vacancies".into(),
            detail_params: vec![("host".into(), "hh.ru".into())],
        }
    }
}
