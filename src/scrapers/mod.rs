pub mod base;
pub mod http;

pub use base::QuoteScraper;
pub use http::HttpScraper;
