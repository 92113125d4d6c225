/// Tests for the fetch/reconcile cycle against a scripted in-memory store.
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::Notify;

#[path = "../src/models.rs"]
mod models;

#[path = "../src/store.rs"]
mod store;

#[path = "../src/state.rs"]
mod state;

#[path = "../src/refresh.rs"]
mod refresh;

use models::{
    placeholder_positions, LogLevel, PositionSide, PositionState, SentimentReading,
    SystemLogEvent, TradeEvent, TradeType, REPLACEMENT_PAIRS,
};
use refresh::{FetchLimits, RefreshOutcome, Refresher};
use state::{Connectivity, ViewState};
use store::{Store, StoreError, BOT_STATE, MARKET_SENTIMENT, SYSTEM_LOGS, TRADE_LOGS};

// ---------------------------------------------------------------------------
// Mock store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Healthy,
    Unreachable,
    Unauthorized,
    /// Every table answers with no rows.
    Empty,
    /// system_logs does not exist.
    NoLogTable,
    /// Every query fails on its own.
    AllQueriesFail,
}

struct MockStore {
    mode: Mutex<Mode>,
    /// Scales every value so two healthy cycles are distinguishable.
    generation: Mutex<f64>,
    gate: Option<Arc<Notify>>,
}

impl MockStore {
    fn new(mode: Mode) -> Self {
        Self {
            mode: Mutex::new(mode),
            generation: Mutex::new(1.0),
            gate: None,
        }
    }

    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(Mode::Healthy)
        }
    }

    fn set_mode(&self, mode: Mode) {
        *self.mode.lock() = mode;
    }

    fn check(&self, table: &'static str) -> Result<bool, StoreError> {
        match *self.mode.lock() {
            Mode::Healthy => Ok(true),
            Mode::Empty => Ok(false),
            Mode::Unreachable => Err(StoreError::Unreachable("connection refused".into())),
            Mode::Unauthorized => Err(StoreError::Unauthorized("401 Invalid API key".into())),
            Mode::NoLogTable if table == SYSTEM_LOGS => {
                Err(StoreError::query(table, "relation does not exist"))
            }
            Mode::NoLogTable => Ok(true),
            Mode::AllQueriesFail => Err(StoreError::query(table, "statement timeout")),
        }
    }
}

#[async_trait]
impl Store for MockStore {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn positions(&self) -> Result<Vec<PositionState>, StoreError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if !self.check(BOT_STATE)? {
            return Ok(Vec::new());
        }
        let g = *self.generation.lock();
        Ok(REPLACEMENT_PAIRS
            .iter()
            .map(|s| PositionState {
                symbol: s.to_string(),
                is_active: true,
                position_type: Some(PositionSide::LongAShortB),
                entry_z: Some(-2.0 * g),
                entry_ratio: Some(g),
                current_z: None,
                last_updated: None,
            })
            .collect())
    }

    async fn latest_sentiment(&self) -> Result<Option<SentimentReading>, StoreError> {
        if !self.check(MARKET_SENTIMENT)? {
            return Ok(None);
        }
        Ok(Some(SentimentReading {
            id: 1,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap(),
            risk_score: (40.0 * *self.generation.lock()) as i32,
            sentiment: "NEUTRAL".into(),
            summary: None,
        }))
    }

    async fn recent_trades(&self, limit: usize) -> Result<Vec<TradeEvent>, StoreError> {
        if !self.check(TRADE_LOGS)? {
            return Ok(Vec::new());
        }
        let g = *self.generation.lock();
        Ok((0..limit.min(3))
            .map(|i| TradeEvent {
                id: i as i64,
                timestamp: Utc::now(),
                pair: "SOL/LTC".into(),
                trade_type: TradeType::Exit,
                side: None,
                price: None,
                z_score: None,
                pnl_percent: Some(g),
                comment: None,
            })
            .collect())
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<SystemLogEvent>, StoreError> {
        if !self.check(SYSTEM_LOGS)? {
            return Ok(Vec::new());
        }
        let g = *self.generation.lock();
        Ok((0..limit.min(2))
            .map(|i| SystemLogEvent {
                id: i as i64,
                timestamp: Utc::now(),
                level: LogLevel::Info,
                source: "SOL/LTC".into(),
                message: format!("Z-Score calculated: {g}"),
                details: None,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn setup(mode: Mode) -> (Arc<MockStore>, Refresher, RwLock<ViewState>) {
    let store = Arc::new(MockStore::new(mode));
    let refresher = Refresher::new(store.clone(), FetchLimits::default());
    (store, refresher, RwLock::new(ViewState::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_healthy_cycle_replaces_everything() {
    let (_store, refresher, state) = setup(Mode::Healthy);
    let outcome = refresher.refresh(&state).await;
    assert_eq!(outcome, RefreshOutcome::Completed(Connectivity::Up));

    let st = state.read();
    assert_eq!(st.connectivity, Connectivity::Up);
    assert!(st.last_refresh.is_some());
    assert!(!st.loading);
    assert_eq!(st.positions.len(), 3);
    assert!(st.positions.iter().all(|p| p.is_active));
    assert_eq!(st.trades.len(), 3);
    assert_eq!(st.logs.len(), 2);
    assert_eq!(st.sentiment.as_ref().map(|s| s.risk_score), Some(40));
}

#[tokio::test]
async fn test_unreachable_leaves_state_untouched_except_connectivity() {
    let (store, refresher, state) = setup(Mode::Healthy);
    refresher.refresh(&state).await;
    let before = state.read().clone();

    store.set_mode(Mode::Unreachable);
    let outcome = refresher.refresh(&state).await;
    assert_eq!(outcome, RefreshOutcome::Completed(Connectivity::Down));

    let mut expected = before;
    expected.connectivity = Connectivity::Down;
    assert_eq!(*state.read(), expected);
}

#[tokio::test]
async fn test_rejected_key_goes_down() {
    let (_store, refresher, state) = setup(Mode::Unauthorized);
    let outcome = refresher.refresh(&state).await;
    assert_eq!(outcome, RefreshOutcome::Completed(Connectivity::Down));
    let st = state.read();
    assert_eq!(st.positions, placeholder_positions());
    assert!(st.last_refresh.is_none());
}

#[tokio::test]
async fn test_empty_results_keep_previous_data() {
    let (store, refresher, state) = setup(Mode::Healthy);
    refresher.refresh(&state).await;
    let before = state.read().clone();

    store.set_mode(Mode::Empty);
    let outcome = refresher.refresh(&state).await;
    assert_eq!(outcome, RefreshOutcome::Completed(Connectivity::Up));

    let st = state.read();
    assert_eq!(st.positions, before.positions);
    assert_eq!(st.trades, before.trades);
    assert_eq!(st.logs, before.logs);
    assert_eq!(st.sentiment, before.sentiment);
    assert!(st.last_refresh >= before.last_refresh);
}

#[tokio::test]
async fn test_placeholder_rows_survive_empty_first_cycle() {
    let (_store, refresher, state) = setup(Mode::Empty);
    refresher.refresh(&state).await;
    let st = state.read();
    assert_eq!(st.positions, placeholder_positions());
    assert_eq!(st.connectivity, Connectivity::Up);
}

#[tokio::test]
async fn test_missing_log_table_only_costs_logs() {
    let (store, refresher, state) = setup(Mode::Healthy);
    refresher.refresh(&state).await;
    let old_logs = state.read().logs.clone();

    *store.generation.lock() = 2.0;
    store.set_mode(Mode::NoLogTable);
    let outcome = refresher.refresh(&state).await;
    assert_eq!(outcome, RefreshOutcome::Completed(Connectivity::Up));

    let st = state.read();
    assert_eq!(st.logs, old_logs);
    assert_eq!(st.positions[0].entry_ratio, Some(2.0));
    assert_eq!(st.sentiment.as_ref().map(|s| s.risk_score), Some(80));
}

#[tokio::test]
async fn test_every_query_failing_goes_down() {
    let (store, refresher, state) = setup(Mode::Healthy);
    refresher.refresh(&state).await;
    let before = state.read().clone();

    store.set_mode(Mode::AllQueriesFail);
    let outcome = refresher.refresh(&state).await;
    assert_eq!(outcome, RefreshOutcome::Completed(Connectivity::Down));

    let mut expected = before;
    expected.connectivity = Connectivity::Down;
    assert_eq!(*state.read(), expected);
}

#[tokio::test]
async fn test_limits_are_passed_to_store() {
    let store = Arc::new(MockStore::new(Mode::Healthy));
    let refresher = Refresher::new(store, FetchLimits { trades: 1, logs: 1 });
    let state = RwLock::new(ViewState::default());
    refresher.refresh(&state).await;
    assert_eq!(state.read().trades.len(), 1);
    assert_eq!(state.read().logs.len(), 1);
}

#[tokio::test]
async fn test_overlapping_refresh_is_skipped() {
    let gate = Arc::new(Notify::new());
    let store = Arc::new(MockStore::gated(gate.clone()));
    let refresher = Arc::new(Refresher::new(store, FetchLimits::default()));
    let state = Arc::new(RwLock::new(ViewState::default()));

    let first = {
        let refresher = refresher.clone();
        let state = state.clone();
        tokio::spawn(async move { refresher.refresh(&state).await })
    };
    while !refresher.is_in_flight() {
        tokio::task::yield_now().await;
    }
    assert!(state.read().loading);

    assert_eq!(refresher.refresh(&state).await, RefreshOutcome::Skipped);

    gate.notify_one();
    let outcome = first.await.unwrap();
    assert_eq!(outcome, RefreshOutcome::Completed(Connectivity::Up));
    assert!(!refresher.is_in_flight());
    assert!(!state.read().loading);
}
