use crate::errors::{Result, StockWatchError};
use crate::scrapers::base::QuoteScraper;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use std::time::Duration;

/// Quote scraper speaking plain HTTP(S) GET
pub struct HttpScraper {
    client: Client,
}

impl HttpScraper {
    /// `read_timeout` bounds the whole exchange once connected.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(connect_timeout + read_timeout)
            .build()
            .map_err(|e| StockWatchError::NetworkError {
                url: String::new(),
                reason: format!("could not build HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    /// Use a preconfigured client, e.g. one with custom proxy settings.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn classify(url: &str, e: reqwest::Error) -> StockWatchError {
        if e.is_timeout() {
            StockWatchError::NetworkTimeout {
                url: url.to_string(),
            }
        } else {
            StockWatchError::NetworkError {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl QuoteScraper for HttpScraper {
    fn source_name(&self) -> &'static str {
        "http"
    }

    async fn fetch_quote(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StockWatchError::NetworkError {
                url: url.to_string(),
                reason: format!("HTTP status {}", status),
            });
        }

        let body = response.text().await.map_err(|e| Self::classify(url, e))?;
        debug!("Received {} bytes from {}", body.len(), url);
        Ok(body)
    }
}
