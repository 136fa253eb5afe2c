//! HTTP feed fetcher

use super::payload::{decode_payload, FeedError, RawPayload};
use crate::config::SourceConfig;
use async_trait::async_trait;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("roadfeed/", env!("CARGO_PKG_VERSION"));

/// Retrieves the raw payload of one source.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, source: &SourceConfig) -> Result<RawPayload, FeedError>;
}

/// Fetches feeds over HTTP(S) with a fixed per-request timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Fetch(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, source: &SourceConfig) -> Result<RawPayload, FeedError> {
        tracing::debug!(source = %source.name, url = %source.url, kind = %source.kind, "Fetching feed");

        let response = self
            .client
            .get(&source.url)
            .query(&source.query_pairs())
            .send()
            .await
            .map_err(|e| FeedError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Http {
                status: status.as_u16(),
                url: source.url.clone(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FeedError::Fetch(e.to_string()))?;
        tracing::debug!(source = %source.name, bytes = body.len(), "Feed downloaded");

        decode_payload(source.kind, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::PayloadKind;

    #[test]
    fn client_builds_with_timeout() {
        assert!(HttpFetcher::new(Duration::from_secs(5)).is_ok());
    }

    #[tokio::test]
    async fn unreachable_host_is_a_fetch_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
        // Port 9 on loopback: nothing listens there.
        let source = SourceConfig::new("nowhere", "paris", PayloadKind::Json, "interrupt")
            .with_url("http://127.0.0.1:9/records");
        let err = fetcher.fetch(&source).await.unwrap_err();
        assert!(matches!(err, FeedError::Fetch(_)));
    }
}
