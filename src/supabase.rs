/// supabase.rs – PostgREST client for the hosted backing store.
///
/// Every read is a plain `GET {url}/rest/v1/{table}` with the public key sent
/// both as `apikey` and as a bearer token. Nothing here writes.
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::models::{PositionState, SentimentReading, SystemLogEvent, TradeEvent};
use crate::store::{Store, StoreError, BOT_STATE, MARKET_SENTIMENT, SYSTEM_LOGS, TRADE_LOGS};

#[derive(Clone)]
pub struct SupabaseStore {
    base_url: String,
    key: String,
    http: Client,
}

impl SupabaseStore {
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(url: &str, key: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let http = builder.build().context("building HTTP client")?;
        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http,
        })
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &'static str,
        order: &str,
        limit: Option<usize>,
    ) -> Result<Vec<T>, StoreError> {
        let query = select_query(order, limit);
        debug!("GET {} {:?}", table, query);

        let resp = self
            .http
            .get(self.table_url(table))
            .query(&query)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(table, status, &body));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        serde_json::from_str::<Vec<T>>(&body).map_err(|e| StoreError::decode(table, e))
    }
}

#[async_trait]
impl Store for SupabaseStore {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn positions(&self) -> Result<Vec<PositionState>, StoreError> {
        self.select(BOT_STATE, "symbol.asc", None).await
    }

    async fn latest_sentiment(&self) -> Result<Option<SentimentReading>, StoreError> {
        let rows: Vec<SentimentReading> =
            self.select(MARKET_SENTIMENT, "timestamp.desc", Some(1)).await?;
        Ok(rows.into_iter().next())
    }

    async fn recent_trades(&self, limit: usize) -> Result<Vec<TradeEvent>, StoreError> {
        self.select(TRADE_LOGS, "timestamp.desc", Some(limit)).await
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<SystemLogEvent>, StoreError> {
        self.select(SYSTEM_LOGS, "timestamp.desc", Some(limit)).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn select_query(order: &str, limit: Option<usize>) -> Vec<(&'static str, String)> {
    let mut q = vec![("select", "*".to_string()), ("order", order.to_string())];
    if let Some(n) = limit {
        q.push(("limit", n.to_string()));
    }
    q
}

/// Rejected credentials end the cycle; anything else only loses one resource.
fn classify_status(table: &'static str, status: StatusCode, body: &str) -> StoreError {
    let snippet: String = body.chars().take(200).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StoreError::Unauthorized(format!("{table}: {status} {snippet}"))
        }
        _ => StoreError::query(table, format!("{status} {snippet}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_url_strips_trailing_slash() {
        let store = SupabaseStore::new("https://abc.supabase.co/", "anon", None).unwrap();
        assert_eq!(
            store.table_url("bot_state"),
            "https://abc.supabase.co/rest/v1/bot_state"
        );
    }

    #[test]
    fn select_query_orders_and_limits() {
        let q = select_query("timestamp.desc", Some(50));
        assert_eq!(
            q,
            vec![
                ("select", "*".to_string()),
                ("order", "timestamp.desc".to_string()),
                ("limit", "50".to_string()),
            ]
        );
        assert_eq!(select_query("symbol.asc", None).len(), 2);
    }

    #[test]
    fn rejected_key_aborts_cycle() {
        let err = classify_status(BOT_STATE, StatusCode::UNAUTHORIZED, "Invalid API key");
        assert!(err.aborts_cycle());
    }

    #[test]
    fn missing_table_is_a_query_error() {
        let err = classify_status(
            SYSTEM_LOGS,
            StatusCode::NOT_FOUND,
            r#"{"code":"42P01","message":"relation \"public.system_logs\" does not exist"}"#,
        );
        assert!(!err.aborts_cycle());
        assert!(matches!(err, StoreError::Query { table: SYSTEM_LOGS, .. }));
    }
}
