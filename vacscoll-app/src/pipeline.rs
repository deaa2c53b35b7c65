use std::sync::Arc;

use vacscoll_collector::{
    AreaResolver, CollectError, CollectorSettings, DedupeCache, HttpPageFetcher, PageFetcher,
    SearchRequest, VacancyCollector, VacancyRecord,
};
use vacscoll_config::{ProviderConfig, VacscollConfig};

/// One search as asked for on the command line.
#[derive(Debug, Clone, Default)]
pub struct SearchJob {
    pub keywords: Vec<String>,
    pub location: Option<String>,
    pub dedup: bool,
    pub details: bool,
}

/// Everything a run needs, built once from configuration.
pub struct Pipeline {
    cfg: VacscollConfig,
    fetcher: Arc<dyn PageFetcher>,
    areas: AreaResolver,
}

impl Pipeline {
    pub fn from_config(cfg: VacscollConfig) -> Result<Self, CollectError> {
        let provider = &cfg.provider;
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::with_client_options(
            provider.user_agent.as_deref(),
            provider.request_timeout(),
        )?);
        let areas = AreaResolver::new(fetcher.clone(), areas_url(provider));
        Ok(Self {
            cfg,
            fetcher,
            areas,
        })
    }

    pub async fn resolve_area(&self, place: &str) -> Result<Option<String>, CollectError> {
        Ok(self.areas.resolve_area(place).await?)
    }

    pub async fn search(&self, job: &SearchJob) -> Result<Vec<VacancyRecord>, CollectError> {
        let mut request = search_request(&self.cfg.provider, &job.keywords);
        if let Some(place) = job.location.as_deref() {
            match self.resolve_area(place).await? {
                Some(area) => request = request.with_param("area", area),
                None => tracing::warn!(place, "pipeline.area.unknown"),
            }
        }

        let collector =
            VacancyCollector::new(request, collector_settings(&self.cfg.provider), self.fetcher.clone())?;

        if !job.dedup {
            let records = collector.fetch_all().await?;
            if !job.details || records.is_empty() {
                return Ok(records);
            }
            let ids: Vec<&str> = records.iter().map(|r| r.id()).collect();
            return collector.fetch_details(&ids).await;
        }

        let cache =
            DedupeCache::open(self.cfg.cache.store_path(), self.cfg.cache.max_age_days).await?;
        if job.details {
            collector.collect_detailed(&cache).await
        } else {
            collector.collect(&cache).await
        }
    }
}

/// Keywords are whitespace-split and joined with `+` into the `text` param,
/// ahead of the configured params.
pub fn search_request(provider: &ProviderConfig, keywords: &[String]) -> SearchRequest {
    let text = keywords
        .iter()
        .flat_map(|k| k.split_whitespace())
        .collect::<Vec<_>>()
        .join("+");

    let mut request = SearchRequest::new(&provider.base_url, &provider.endpoint);
    if !text.is_empty() {
        request = request.with_param("text", text);
    }
    request
        .with_params(provider.query_params.iter().cloned())
        .with_filters(provider.filters.iter().cloned())
}

pub fn collector_settings(provider: &ProviderConfig) -> CollectorSettings {
    CollectorSettings {
        rate_delay: provider.rate_delay(),
        page_indexing: provider.page_indexing,
        detail_endpoint: provider.detail_endpoint.clone(),
        detail_params: provider.detail_params.clone(),
    }
}

fn areas_url(provider: &ProviderConfig) -> String {
    let base = provider.base_url.trim_end_matches('/');
    let endpoint = provider.areas_endpoint.trim_start_matches('/');
    format!("{base}/{endpoint}")
}

/// What the user sees when a run cannot finish.
pub fn user_message(err: &CollectError) -> &'static str {
    match err {
        CollectError::Fetch(_) | CollectError::Storage(_) => {
            "The job board could not be reached right now, try again later."
        }
        CollectError::Validation(_) => "The configuration is invalid, check the provider settings.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vacscoll_collector::PageIndexing;

    #[test]
    fn keywords_become_text_param_first() {
        let provider = ProviderConfig {
            filters: vec!["noExperience".into()],
            ..ProviderConfig::default()
        };
        let req = search_request(&provider, &["rust  developer".into(), "remote".into()]);

        assert_eq!(req.base_url, "https://api.hh.ru");
        assert_eq!(req.endpoint, "vacancies");
        assert_eq!(
            req.query_params,
            vec![
                ("text".to_string(), "rust+developer+remote".to_string()),
                ("per_page".to_string(), "100".to_string()),
                ("no_magic".to_string(), "true".to_string()),
            ]
        );
        assert_eq!(req.filters, vec!["noExperience".to_string()]);
    }

    #[test]
    fn settings_follow_provider_config() {
        let provider = ProviderConfig {
            rate_delay: 0.5,
            page_indexing: PageIndexing::OneBased,
            ..ProviderConfig::default()
        };
        let settings = collector_settings(&provider);
        assert_eq!(settings.rate_delay.as_millis(), 500);
        assert_eq!(settings.page_indexing, PageIndexing::OneBased);
        assert_eq!(settings.detail_endpoint, "vacancies");
    }

    #[test]
    fn areas_url_joins_cleanly() {
        let provider = ProviderConfig {
            base_url: "https://api.hh.ru/".into(),
            areas_endpoint: "/areas".into(),
            ..ProviderConfig::default()
        };
        assert_eq!(areas_url(&provider), "https://api.hh.ru/areas");
    }
}
