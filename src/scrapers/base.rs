use crate::errors::Result;
use async_trait::async_trait;

/// Source of raw quote payloads
#[async_trait]
pub trait QuoteScraper {
    /// Name used in log lines
    fn source_name(&self) -> &'static str;

    /// GET `url` and return the response body.
    ///
    /// Timeouts are reported as `NetworkTimeout`; connection, DNS and
    /// non-2xx failures as `NetworkError`.
    async fn fetch_quote(&self, url: &str) -> Result<String>;
}
