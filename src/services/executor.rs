use crate::errors::{Result, StockWatchError};
use crate::models::{FetchTask, TradeRecord, TRADE_NODE};
use crate::scrapers::QuoteScraper;
use crate::store::{child_path, RecordStore, Transaction};
use log::{error, info};
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
}

/// Runs the fetch, parse, map and upsert cycle for one symbol per call.
pub struct JobExecutor {
    scraper: Arc<dyn QuoteScraper + Send + Sync>,
    store: Arc<dyn RecordStore>,
    stocks_root: String,
}

impl JobExecutor {
    pub fn new(
        scraper: Arc<dyn QuoteScraper + Send + Sync>,
        store: Arc<dyn RecordStore>,
        stocks_root: &str,
    ) -> Self {
        Self {
            scraper,
            store,
            stocks_root: stocks_root.trim_end_matches('/').to_string(),
        }
    }

    pub async fn execute(&self, task: &FetchTask) -> Outcome {
        match self.try_execute(task).await {
            Ok(record) => {
                info!("Last trade for {} was {}", task.symbol, record.last_trade);
                Outcome::Success
            }
            Err(e) => {
                error!("Import for {} failed ({:?}): {}", task.symbol, e.kind(), e);
                Outcome::Failed
            }
        }
    }

    /// Like [`execute`](Self::execute) but keeps the classified error.
    /// Nothing is written unless every step before the upsert succeeded.
    pub async fn try_execute(&self, task: &FetchTask) -> Result<TradeRecord> {
        let body = self.scraper.fetch_quote(&task.resolved_url).await?;
        let quote = parse_quote(&body)?;
        let record = TradeRecord::from_quote(&quote)?;
        self.upsert(&task.symbol, &record)?;
        Ok(record)
    }

    /// Path of the trade node for `symbol`.
    pub fn trade_path(&self, symbol: &str) -> String {
        child_path(&child_path(&self.stocks_root, symbol), TRADE_NODE)
    }

    fn upsert(&self, symbol: &str, record: &TradeRecord) -> Result<()> {
        let trade_path = self.trade_path(symbol);

        let mut tx = Transaction::new();
        tx.create_if_absent(child_path(&self.stocks_root, symbol))
            .create_if_absent(trade_path.clone())
            .set_properties(trade_path, record.to_properties());

        self.store.commit(tx).map_err(|e| match e {
            StockWatchError::WriteError(reason) => StockWatchError::WriteError(format!(
                "Cannot write trade data for {}: {}",
                symbol, reason
            )),
            other => StockWatchError::WriteError(other.to_string()),
        })?;

        info!("Updated trade data for {}", symbol);
        Ok(())
    }
}

/// Parse a flat JSON object. Anything other than an object is a parse error.
pub fn parse_quote(body: &str) -> Result<Map<String, Value>> {
    Ok(serde_json::from_str::<Map<String, Value>>(body)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use crate::store::{MemoryStore, PropertyValue};
    use async_trait::async_trait;
    use std::sync::Mutex;

    pub(crate) const ADBE_QUOTE: &str = r#"{"companyName":"Adobe","sector":"Tech","latestPrice":"550.12","open":"545.00","high":"552.00","low":"544.00","latestVolume":"1000000","change":"5.12","week52High":"600.00","week52Low":"400.00","ytdChange":"0.12","latestUpdate":"1700000000000"}"#;

    /// Scraper returning queued canned responses, then repeating the last one.
    pub(crate) struct CannedScraper {
        responses: Mutex<Vec<std::result::Result<String, FailureKind>>>,
        pub requests: Mutex<Vec<String>>,
    }

    impl CannedScraper {
        pub fn new(responses: Vec<std::result::Result<String, FailureKind>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn ok(body: &str) -> Self {
            Self::new(vec![Ok(body.to_string())])
        }
    }

    #[async_trait]
    impl QuoteScraper for CannedScraper {
        fn source_name(&self) -> &'static str {
            "canned"
        }

        async fn fetch_quote(&self, url: &str) -> Result<String> {
            self.requests.lock().unwrap().push(url.to_string());
            let mut responses = self.responses.lock().unwrap();
            let next = if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].clone()
            };
            next.map_err(|kind| match kind {
                FailureKind::NetworkTimeout => StockWatchError::NetworkTimeout {
                    url: url.to_string(),
                },
                _ => StockWatchError::NetworkError {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                },
            })
        }
    }

    fn task() -> FetchTask {
        FetchTask {
            symbol: "ADBE".to_string(),
            resolved_url: "https://example.com/stock-data/ADBE.json".to_string(),
        }
    }

    fn executor(scraper: CannedScraper, store: Arc<MemoryStore>) -> JobExecutor {
        JobExecutor::new(Arc::new(scraper), store, "/content/stocks")
    }

    #[tokio::test]
    async fn successful_fetch_writes_trade_record() {
        let store = Arc::new(MemoryStore::new());
        let executor = executor(CannedScraper::ok(ADBE_QUOTE), store.clone());

        assert_eq!(executor.execute(&task()).await, Outcome::Success);

        let props = store.properties("/content/stocks/ADBE/trade").unwrap();
        assert_eq!(props.get("lastTrade"), Some(&PropertyValue::Double(550.12)));
        assert_eq!(props.get("volume"), Some(&PropertyValue::Long(1_000_000)));
        assert_eq!(props.get("companyName").and_then(|v| v.as_str()), Some("Adobe"));
        assert!(!props.get("timeOfUpdate").and_then(|v| v.as_str()).unwrap().is_empty());
        assert!(!props.get("dayOfLastUpdate").and_then(|v| v.as_str()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_fetch_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let executor = executor(CannedScraper::ok(ADBE_QUOTE), store.clone());

        executor.execute(&task()).await;
        let once = store.snapshot();
        executor.execute(&task()).await;
        assert_eq!(store.snapshot(), once);
        assert_eq!(store.children("/content/stocks/ADBE"), vec!["trade".to_string()]);
    }

    #[tokio::test]
    async fn malformed_json_keeps_previous_record() {
        let store = Arc::new(MemoryStore::new());
        let scraper = CannedScraper::new(vec![
            Ok(ADBE_QUOTE.to_string()),
            Ok("{\"latestPrice\": ".to_string()),
        ]);
        let executor = executor(scraper, store.clone());

        executor.execute(&task()).await;
        let before = store.snapshot();

        let err = executor.try_execute(&task()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ParseError);
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn non_object_payload_is_a_parse_error() {
        let store = Arc::new(MemoryStore::new());
        let executor = executor(CannedScraper::ok("[1, 2, 3]"), store.clone());
        let err = executor.try_execute(&task()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ParseError);
        assert!(!store.exists("/content/stocks/ADBE"));
    }

    #[tokio::test]
    async fn timeout_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let executor = executor(
            CannedScraper::new(vec![Err(FailureKind::NetworkTimeout)]),
            store.clone(),
        );
        let before = store.snapshot();

        let err = executor.try_execute(&task()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::NetworkTimeout);
        assert_eq!(executor.execute(&task()).await, Outcome::Failed);
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn mapping_error_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let payload = ADBE_QUOTE.replace("\"latestVolume\":\"1000000\",", "");
        let executor = executor(CannedScraper::ok(&payload), store.clone());

        let err = executor.try_execute(&task()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::MappingError);
        assert!(!store.exists("/content/stocks/ADBE"));
    }

    #[tokio::test]
    async fn uses_resolved_url() {
        let store = Arc::new(MemoryStore::new());
        let scraper = Arc::new(CannedScraper::ok(ADBE_QUOTE));
        let executor = JobExecutor::new(scraper.clone(), store, "/content/stocks/");
        executor.execute(&task()).await;
        assert_eq!(
            *scraper.requests.lock().unwrap(),
            vec!["https://example.com/stock-data/ADBE.json".to_string()]
        );
        assert_eq!(executor.trade_path("ADBE"), "/content/stocks/ADBE/trade");
    }

    /// Store whose commits always fail, reads go to the inner store.
    struct ReadOnlyStore(MemoryStore);

    impl RecordStore for ReadOnlyStore {
        fn exists(&self, path: &str) -> bool {
            self.0.exists(path)
        }

        fn properties(&self, path: &str) -> Option<crate::store::Properties> {
            self.0.properties(path)
        }

        fn children(&self, path: &str) -> Vec<String> {
            self.0.children(path)
        }

        fn commit(&self, _tx: Transaction) -> Result<()> {
            Err(StockWatchError::WriteError("repository is read-only".to_string()))
        }

        fn subscribe(&self, prefix: &str) -> crate::store::Subscription {
            self.0.subscribe(prefix)
        }
    }

    #[tokio::test]
    async fn commit_failure_is_a_write_error() {
        let store = Arc::new(ReadOnlyStore(MemoryStore::new()));
        let executor = JobExecutor::new(
            Arc::new(CannedScraper::ok(ADBE_QUOTE)),
            store.clone(),
            "/content/stocks",
        );

        let err = executor.try_execute(&task()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::WriteError);
        assert!(err.to_string().contains("ADBE"));
        assert!(!store.exists("/content/stocks/ADBE/trade"));
    }
}
