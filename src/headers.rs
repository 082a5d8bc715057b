// HTTP response header fetch for the security-header analysis
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug)]
pub enum HeaderFetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
}

/// Fetches the response headers served for a URL
#[async_trait]
pub trait HeaderFetcher: Send + Sync {
    async fn fetch_headers(&self, url: &str) -> Result<Vec<(String, String)>, HeaderFetchError>;
}

pub struct HttpHeaderFetcher {
    client: reqwest::Client,
}

impl HttpHeaderFetcher {
    pub fn new() -> Result<Self, HeaderFetchError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("aidoc/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HeaderFetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HeaderFetcher for HttpHeaderFetcher {
    async fn fetch_headers(&self, url: &str) -> Result<Vec<(String, String)>, HeaderFetchError> {
        debug!("Fetching headers for {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HeaderFetchError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect())
    }
}
