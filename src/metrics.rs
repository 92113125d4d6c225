/// metrics.rs – Summary figures derived from the current view-state.
///
/// Nothing here is cached; the dashboard recomputes on every frame.
use chrono::TimeZone;

use crate::models::{PositionState, TradeEvent, TradeType};
use crate::series::{latest_value, HourBucket};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DashboardMetrics {
    /// ENTRY + EXIT events; INIT rows are not trades.
    pub total_trades: usize,
    /// Sum of `pnl_percent` over every held trade event, INIT included.
    pub total_pnl: f64,
    pub active_positions: usize,
    pub exits: usize,
    pub winning_exits: usize,
    /// Percentage in [0, 100].
    pub win_rate: f64,
}

impl DashboardMetrics {
    pub fn compute(positions: &[PositionState], trades: &[TradeEvent]) -> Self {
        let exits = trades
            .iter()
            .filter(|t| t.trade_type == TradeType::Exit)
            .count();
        let winning_exits = trades
            .iter()
            .filter(|t| t.trade_type == TradeType::Exit && t.pnl() > 0.0)
            .count();

        Self {
            total_trades: total_trades(trades),
            total_pnl: total_pnl(trades),
            active_positions: positions.iter().filter(|p| p.is_active).count(),
            exits,
            winning_exits,
            win_rate: win_rate(trades),
        }
    }
}

pub fn total_trades(trades: &[TradeEvent]) -> usize {
    trades.iter().filter(|t| t.trade_type.is_trade()).count()
}

pub fn total_pnl(trades: &[TradeEvent]) -> f64 {
    trades.iter().map(TradeEvent::pnl).sum()
}

/// Winning exits over all exits, as a percentage. Zero exits gives 0.
pub fn win_rate(trades: &[TradeEvent]) -> f64 {
    let (wins, exits) = trades
        .iter()
        .filter(|t| t.trade_type == TradeType::Exit)
        .fold((0usize, 0usize), |(w, n), t| {
            (w + usize::from(t.pnl() > 0.0), n + 1)
        });
    wins as f64 / exits.max(1) as f64 * 100.0
}

/// Z-score shown next to a pair: latest log reading, then the row's own
/// `current_z`, then zero.
pub fn display_zscore<Tz: TimeZone>(position: &PositionState, series: &[HourBucket<Tz>]) -> f64 {
    latest_value(series, &position.symbol)
        .or(position.current_z)
        .unwrap_or(0.0)
}
