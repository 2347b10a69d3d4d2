use crate::domain::ports::{FetchOutcome, Fetcher};
use crate::utils::error::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("docdeck/", env!("CARGO_PKG_VERSION"));

/// 以 reqwest 下載文件頁面
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome> {
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        tracing::debug!("{} responded with {}", url, status);

        match status {
            StatusCode::OK => Ok(FetchOutcome::Document(response.text().await?)),
            StatusCode::TOO_MANY_REQUESTS => Ok(FetchOutcome::RateLimited),
            other => Ok(FetchOutcome::Rejected {
                status: other.as_u16(),
            }),
        }
    }
}
