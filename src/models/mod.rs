pub mod job;
pub mod stock;
pub mod symbol;

pub use job::{FetchTask, ScheduledJobConfig, TickPayload};
pub use stock::TradeRecord;
pub use symbol::{Symbol, SymbolCandidate, TRADE_NODE};
