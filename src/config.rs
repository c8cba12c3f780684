use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WATCHED_PATH: &str = "/content/stocks";
pub const DEFAULT_CRON_EXPRESSION: &str = "0 0/2 * * * ?";
pub const DEFAULT_SOURCE_URL: &str =
    "https://raw.githubusercontent.com/Adobe-Marketing-Cloud/ADLS-Samples/master/stock-data/";

/// Settings a new job config inherits when the observer creates it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDefaults {
    pub cron_expression: String,
    pub source_url_template: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub watched_path: String,
    pub default_cron_expression: String,
    pub default_source_url: String,
    pub worker_count: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub snapshot_path: Option<PathBuf>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            watched_path: DEFAULT_WATCHED_PATH.to_string(),
            default_cron_expression: DEFAULT_CRON_EXPRESSION.to_string(),
            default_source_url: DEFAULT_SOURCE_URL.to_string(),
            worker_count: 4,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            snapshot_path: None,
        }
    }

    pub fn with_watched_path(mut self, path: &str) -> Self {
        self.watched_path = path.trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_cron_expression(mut self, cron: &str) -> Self {
        self.default_cron_expression = cron.to_string();
        self
    }

    pub fn with_default_source_url(mut self, url: &str) -> Self {
        self.default_source_url = url.to_string();
        self
    }

    /// A pool of zero workers would never run anything, so it is clamped to one.
    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn job_defaults(&self) -> JobDefaults {
        JobDefaults {
            cron_expression: self.default_cron_expression.clone(),
            source_url_template: self.default_source_url.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
