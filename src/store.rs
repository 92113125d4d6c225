/// store.rs – Read contract every backing store implements.
use async_trait::async_trait;
use thiserror::Error;

use crate::models::{PositionState, SentimentReading, SystemLogEvent, TradeEvent};

pub const BOT_STATE: &str = "bot_state";
pub const TRADE_LOGS: &str = "trade_logs";
pub const SYSTEM_LOGS: &str = "system_logs";
pub const MARKET_SENTIMENT: &str = "market_sentiment";

#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport failure: DNS, connect, TLS, dropped connection.
    #[error("backing store unreachable: {0}")]
    Unreachable(String),
    /// Credentials were rejected (HTTP 401/403).
    #[error("backing store rejected credentials: {0}")]
    Unauthorized(String),
    /// The query itself failed, e.g. a missing table.
    #[error("query on {table} failed: {message}")]
    Query { table: &'static str, message: String },
    /// Rows came back but did not match the expected shape.
    #[error("could not decode {table} rows: {message}")]
    Decode { table: &'static str, message: String },
}

impl StoreError {
    pub fn query(table: &'static str, err: impl std::fmt::Display) -> Self {
        StoreError::Query {
            table,
            message: err.to_string(),
        }
    }

    pub fn decode(table: &'static str, err: impl std::fmt::Display) -> Self {
        StoreError::Decode {
            table,
            message: err.to_string(),
        }
    }

    /// Errors that say nothing could be read at all. They end the whole
    /// refresh cycle and flip connectivity to DOWN.
    pub fn aborts_cycle(&self) -> bool {
        matches!(self, StoreError::Unreachable(_) | StoreError::Unauthorized(_))
    }
}

/// The four reads the dashboard performs. Implementations must not write.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short name for logs ("supabase", "sqlite").
    fn name(&self) -> &'static str;

    /// Every position row, ordered by symbol.
    async fn positions(&self) -> Result<Vec<PositionState>, StoreError>;

    /// The most recent sentiment reading, if any.
    async fn latest_sentiment(&self) -> Result<Option<SentimentReading>, StoreError>;

    /// Up to `limit` trade events, newest first.
    async fn recent_trades(&self, limit: usize) -> Result<Vec<TradeEvent>, StoreError>;

    /// Up to `limit` system log events, newest first.
    async fn recent_logs(&self, limit: usize) -> Result<Vec<SystemLogEvent>, StoreError>;
}
