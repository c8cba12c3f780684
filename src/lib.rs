// Public modules
pub mod config;
pub mod errors;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod scrapers;
pub mod services;
pub mod store;
pub mod util;

// Re-exports for the common entry points
pub use config::Config;
pub use errors::{FailureKind, Result, StockWatchError};
pub use models::{FetchTask, ScheduledJobConfig, Symbol, TradeRecord};
pub use registry::JobRegistry;
pub use services::{JobExecutor, Outcome, Pipeline};
pub use store::{MemoryStore, RecordStore};
