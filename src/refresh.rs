/// refresh.rs – One fetch cycle against the backing store, guarded so timer
/// ticks and manual refreshes never overlap.
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::state::{Connectivity, CycleFetch, ViewState};
use crate::store::Store;

/// Row caps for the two append-only tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub trades: usize,
    pub logs: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            trades: 50,
            logs: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed(Connectivity),
    /// Another cycle was already in flight; nothing was fetched.
    Skipped,
}

pub struct Refresher {
    store: Arc<dyn Store>,
    limits: FetchLimits,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag however the cycle ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Refresher {
    pub fn new(store: Arc<dyn Store>, limits: FetchLimits) -> Self {
        Self {
            store,
            limits,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Query all four resources concurrently.
    pub async fn fetch(&self) -> CycleFetch {
        let store = self.store.as_ref();
        let (positions, sentiment, trades, logs) = tokio::join!(
            store.positions(),
            store.latest_sentiment(),
            store.recent_trades(self.limits.trades),
            store.recent_logs(self.limits.logs),
        );
        CycleFetch {
            positions,
            sentiment,
            trades,
            logs,
        }
    }

    /// Run one cycle and fold it into `state`, unless one is already running.
    pub async fn refresh(&self, state: &RwLock<ViewState>) -> RefreshOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Refresh skipped: cycle already in flight");
            return RefreshOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);

        state.write().loading = true;
        let fetch = self.fetch().await;

        if let Some(err) = fetch.aborting_error() {
            warn!("Refresh from {} failed: {err}", self.store.name());
        }
        for err in fetch.resource_errors() {
            debug!("Keeping previous data: {err}");
        }

        let connectivity = {
            let mut st = state.write();
            let before = st.connectivity;
            let now_conn = st.apply(fetch, Utc::now());
            st.loading = false;
            if before != now_conn {
                info!("Backing store {} is now {:?}", self.store.name(), now_conn);
            }
            now_conn
        };

        RefreshOutcome::Completed(connectivity)
    }
}
