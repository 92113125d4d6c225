/// state.rs – The dashboard's view-state and its reconciliation policy.
///
/// Renderers only read `ViewState`. The single writer is [`ViewState::apply`],
/// which replaces whole resources and never edits one in place.
use chrono::{DateTime, Utc};

use crate::models::{
    placeholder_positions, PositionState, SentimentReading, SystemLogEvent, TradeEvent,
};
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    Up,
    #[default]
    Down,
}

impl Connectivity {
    pub fn is_up(self) -> bool {
        self == Connectivity::Up
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub positions: Vec<PositionState>,
    pub sentiment: Option<SentimentReading>,
    /// Newest first.
    pub trades: Vec<TradeEvent>,
    /// Newest first.
    pub logs: Vec<SystemLogEvent>,
    pub connectivity: Connectivity,
    pub last_refresh: Option<DateTime<Utc>>,
    /// A fetch cycle is in flight.
    pub loading: bool,
    /// No backing store is configured; everything shown is built in.
    pub placeholder: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            positions: placeholder_positions(),
            sentiment: None,
            trades: Vec::new(),
            logs: Vec::new(),
            connectivity: Connectivity::Down,
            last_refresh: None,
            loading: false,
            placeholder: false,
        }
    }
}

/// Raw results of one fetch cycle, one per resource.
#[derive(Debug)]
pub struct CycleFetch {
    pub positions: Result<Vec<PositionState>, StoreError>,
    pub sentiment: Result<Option<SentimentReading>, StoreError>,
    pub trades: Result<Vec<TradeEvent>, StoreError>,
    pub logs: Result<Vec<SystemLogEvent>, StoreError>,
}

impl CycleFetch {
    /// The first error that aborts the whole cycle, if any.
    pub fn aborting_error(&self) -> Option<&StoreError> {
        [
            self.positions.as_ref().err(),
            self.sentiment.as_ref().err(),
            self.trades.as_ref().err(),
            self.logs.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .find(|e| e.aborts_cycle())
    }

    /// Errors that only cost their own resource.
    pub fn resource_errors(&self) -> Vec<&StoreError> {
        [
            self.positions.as_ref().err(),
            self.sentiment.as_ref().err(),
            self.trades.as_ref().err(),
            self.logs.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .filter(|e| !e.aborts_cycle())
        .collect()
    }

    fn any_succeeded(&self) -> bool {
        self.positions.is_ok() || self.sentiment.is_ok() || self.trades.is_ok() || self.logs.is_ok()
    }
}

impl ViewState {
    /// State shown when no store is configured.
    pub fn placeholder() -> Self {
        Self {
            placeholder: true,
            ..Self::default()
        }
    }

    /// Fold one cycle's results into the view.
    ///
    /// - An aborting error anywhere: connectivity DOWN, nothing else changes.
    /// - Otherwise each resource that came back non-empty replaces the held
    ///   one; failed or empty resources keep what was there.
    /// - Connectivity is UP when at least one query succeeded, and
    ///   `last_refresh` is set to `now`. If every query failed it is DOWN.
    pub fn apply(&mut self, fetch: CycleFetch, now: DateTime<Utc>) -> Connectivity {
        if fetch.aborting_error().is_some() || !fetch.any_succeeded() {
            self.connectivity = Connectivity::Down;
            return self.connectivity;
        }

        if let Ok(positions) = fetch.positions {
            if !positions.is_empty() {
                self.positions = positions;
            }
        }
        if let Ok(Some(sentiment)) = fetch.sentiment {
            self.sentiment = Some(sentiment);
        }
        if let Ok(trades) = fetch.trades {
            if !trades.is_empty() {
                self.trades = trades;
            }
        }
        if let Ok(logs) = fetch.logs {
            if !logs.is_empty() {
                self.logs = logs;
            }
        }

        self.connectivity = Connectivity::Up;
        self.last_refresh = Some(now);
        self.connectivity
    }

    pub fn is_trading_halted(&self, threshold: i32) -> bool {
        self.sentiment
            .as_ref()
            .map(|s| crate::models::is_halted(s.risk_score, threshold))
            .unwrap_or(false)
    }
}
