use serde_json::Value;
use std::time::Duration;
use vacscoll_http::{HttpClient, RequestOpts};

use crate::errors::FetchError;

/// One decoded JSON document per URL. Implementations are stateless and
/// must tolerate concurrent calls.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError>;
}

/// [`PageFetcher`] over the shared HTTP client.
#[derive(Clone, Debug)]
pub struct HttpPageFetcher {
    client: HttpClient,
}

impl HttpPageFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Build a client with the given user agent and optional per-request timeout.
    pub fn with_client_options(
        user_agent: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self, FetchError> {
        let mut client = HttpClient::new()
            .map_err(|e| FetchError::new("-", e))?
            .with_timeout(timeout);
        if let Some(ua) = user_agent {
            client = client.with_user_agent(ua);
        }
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        self.client
            .get_json::<Value>(url, RequestOpts::default())
            .await
            .map_err(|e| FetchError::new(url, e))
    }
}
