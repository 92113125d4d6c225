/// dashboard.rs – ratatui live terminal dashboard.
///
/// Layout:
///  ┌─ Header ───────────────────────────────────────────────────────────────┐
///  │ Quantum Sniper │ store │ ●/○ │ last refresh │ loading │ keys            │
///  ├─ [TRADING HALTED banner, only when risk > threshold] ──────────────────┤
///  ├─ Total PnL ──────┬─ Win Rate ──────┬─ Trades ───────┬─ Active ─────────┤
///  ├─ Positions ──────────────────────────────┬─ Risk gauge ────────────────┤
///  │ one row per pair                         ├─ Sentiment summary ─────────┤
///  ├─ Z-Score (24h) ──────────────────────────┼─ Trade Log ─────────────────┤
///  │ hourly chart per pair, gaps left open    ├─ System Logs ───────────────┤
///  └──────────────────────────────────────────┴─────────────────────────────┘
use chrono::{DateTime, Local, TimeZone};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        Axis, Block, Borders, Cell, Chart, Dataset, Gauge, GraphType, List, ListItem, Paragraph,
        Row, Table, Wrap,
    },
    Frame, Terminal,
};
use std::io::{self, Stdout};

use crate::metrics::{display_zscore, DashboardMetrics};
use crate::models::{LogLevel, RiskLevel, TradeType};
use crate::series::{series_sources, zscore_series, HourBucket, SERIES_HOURS};
use crate::state::ViewState;

pub type CrossTerm = Terminal<CrosstermBackend<Stdout>>;

/// Entry band of the strategy, drawn as reference lines on the chart.
const ENTRY_BAND: f64 = 2.0;

const SERIES_COLORS: [Color; 6] = [
    Color::Cyan,
    Color::Magenta,
    Color::Yellow,
    Color::LightGreen,
    Color::LightBlue,
    Color::LightRed,
];

/// Everything the renderer needs besides the view-state.
pub struct RenderContext<'a> {
    pub store_name: &'a str,
    pub halt_threshold: i32,
    pub now: DateTime<Local>,
}

// ---------------------------------------------------------------------------
// Setup / teardown
// ---------------------------------------------------------------------------

pub fn setup_terminal() -> anyhow::Result<CrossTerm> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

pub fn teardown_terminal(terminal: &mut CrossTerm) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Key event handling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    Refresh,
    Ignore,
}

/// q / Q / Ctrl-C quit, r / R asks for an immediate refresh.
pub fn handle_event(event: &Event) -> KeyAction {
    let Event::Key(k) = event else {
        return KeyAction::Ignore;
    };
    if k.kind != KeyEventKind::Press {
        return KeyAction::Ignore;
    }
    match k.code {
        KeyCode::Char('q') | KeyCode::Char('Q') => KeyAction::Quit,
        KeyCode::Char('c') if k.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
        KeyCode::Char('r') | KeyCode::Char('R') => KeyAction::Refresh,
        _ => KeyAction::Ignore,
    }
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

pub fn render(frame: &mut Frame, state: &ViewState, ctx: &RenderContext<'_>) {
    let series = zscore_series(&state.logs, ctx.now);
    let metrics = DashboardMetrics::compute(&state.positions, &state.trades);
    let halted = state.is_trading_halted(ctx.halt_threshold);

    let mut constraints = vec![Constraint::Length(3)];
    if halted {
        constraints.push(Constraint::Length(3));
    }
    constraints.extend([Constraint::Length(3), Constraint::Min(0)]);

    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(frame.size());

    render_header(frame, outer[0], state, ctx);
    let mut next = 1;
    if halted {
        render_halt_banner(frame, outer[next], state, ctx.halt_threshold);
        next += 1;
    }
    render_cards(frame, outer[next], &metrics);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(58), Constraint::Percentage(42)])
        .split(outer[next + 1]);

    // Left column: positions | chart
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(state.positions.len() as u16 + 3),
            Constraint::Min(8),
        ])
        .split(body[0]);

    // Right column: gauge | summary | trades | logs
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(5),
            Constraint::Percentage(50),
            Constraint::Min(5),
        ])
        .split(body[1]);

    render_positions(frame, left[0], state, &series);
    render_chart(frame, left[1], &series);
    render_risk_gauge(frame, right[0], state, ctx.halt_threshold);
    render_summary(frame, right[1], state);
    render_trades(frame, right[2], state);
    render_logs(frame, right[3], state);
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

fn render_header(frame: &mut Frame, area: Rect, state: &ViewState, ctx: &RenderContext<'_>) {
    let link = if state.placeholder {
        Span::styled(
            "○ OFFLINE (placeholder data)",
            Style::default().fg(Color::Yellow),
        )
    } else if state.connectivity.is_up() {
        Span::styled("● CONNECTED", Style::default().fg(Color::Green))
    } else {
        Span::styled("○ DISCONNECTED", Style::default().fg(Color::Red))
    };

    let last = state
        .last_refresh
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "—".into());

    let mut spans = vec![
        Span::styled(
            "  ◎ Quantum Sniper  │ ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("Store: {}  │ ", ctx.store_name)),
        link,
        Span::raw(format!("  │ Last refresh: {last}")),
    ];
    if state.loading {
        spans.push(Span::styled(
            "  ⟳ loading…",
            Style::default().fg(Color::Yellow),
        ));
    }
    spans.push(Span::styled(
        "  [r] refresh  [q] quit",
        Style::default().fg(Color::DarkGray),
    ));

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Pairs Trading Monitor (simulation) "),
    );
    frame.render_widget(header, area);
}

fn render_halt_banner(frame: &mut Frame, area: Rect, state: &ViewState, threshold: i32) {
    let score = state.sentiment.as_ref().map(|s| s.risk_score).unwrap_or(0);
    let banner = Paragraph::new(Line::from(Span::styled(
        format!("⛔ TRADING HALTED – risk score {score} exceeds {threshold}"),
        Style::default()
            .fg(Color::White)
            .bg(Color::Red)
            .add_modifier(Modifier::BOLD),
    )))
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red)),
    );
    frame.render_widget(banner, area);
}

// ---------------------------------------------------------------------------
// Metric cards
// ---------------------------------------------------------------------------

fn render_cards(frame: &mut Frame, area: Rect, m: &DashboardMetrics) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 4); 4])
        .split(area);

    let pnl_color = if m.total_pnl >= 0.0 {
        Color::Green
    } else {
        Color::Red
    };
    let cards = [
        (
            " Total PnL ",
            format!("{:+.2}%", m.total_pnl),
            pnl_color,
        ),
        (
            " Win Rate ",
            format!("{:.1}%  ({}/{})", m.win_rate, m.winning_exits, m.exits),
            Color::Cyan,
        ),
        (" Trades ", m.total_trades.to_string(), Color::White),
        (
            " Active Positions ",
            m.active_positions.to_string(),
            Color::Yellow,
        ),
    ];

    for (area, (title, value, color)) in cols.iter().zip(cards) {
        let card = Paragraph::new(Span::styled(
            value,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(card, *area);
    }
}

// ---------------------------------------------------------------------------
// Positions table
// ---------------------------------------------------------------------------

fn render_positions<Tz: TimeZone>(
    frame: &mut Frame,
    area: Rect,
    state: &ViewState,
    series: &[HourBucket<Tz>],
) {
    let header_cells = ["Pair", "Status", "Side", "Entry Z", "Entry Ratio", "Z Now", "Updated"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows: Vec<Row> = state
        .positions
        .iter()
        .map(|pos| {
            let z_now = display_zscore(pos, series);
            let (status, status_color) = if pos.is_active {
                ("ACTIVE", Color::Green)
            } else {
                ("SCANNING", Color::Gray)
            };
            Row::new(vec![
                Cell::from(pos.symbol.clone()),
                Cell::from(status).style(Style::default().fg(status_color)),
                Cell::from(
                    pos.position_type
                        .map(|s| s.short_label())
                        .unwrap_or("—"),
                ),
                Cell::from(opt_num(pos.entry_z, 2)),
                Cell::from(opt_num(pos.entry_ratio, 4)),
                Cell::from(format!("{:+.2}", z_now))
                    .style(Style::default().fg(zscore_color(z_now))),
                Cell::from(
                    pos.last_updated
                        .map(|t| t.with_timezone(&Local).format("%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "—".into()),
                ),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(9),
            Constraint::Length(5),
            Constraint::Length(8),
            Constraint::Length(12),
            Constraint::Length(7),
            Constraint::Min(11),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Positions ({}) ", state.positions.len())),
    );

    frame.render_widget(table, area);
}

// ---------------------------------------------------------------------------
// Z-score chart
// ---------------------------------------------------------------------------

/// Contiguous runs of readings for `source`, as (bucket index, value).
/// A missing bucket ends a run so the line shows a gap.
pub fn series_segments<Tz: TimeZone>(
    series: &[HourBucket<Tz>],
    source: &str,
) -> Vec<Vec<(f64, f64)>> {
    let mut segments = Vec::new();
    let mut current: Vec<(f64, f64)> = Vec::new();
    for (i, bucket) in series.iter().enumerate() {
        match bucket.values.get(source) {
            Some(v) => current.push((i as f64, *v)),
            None if !current.is_empty() => segments.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Y range covering every reading and the entry band, padded a little.
pub fn y_bounds<Tz: TimeZone>(series: &[HourBucket<Tz>]) -> [f64; 2] {
    let (lo, hi) = series
        .iter()
        .flat_map(|b| b.values.values().copied())
        .fold((-ENTRY_BAND, ENTRY_BAND), |(lo, hi), v| (lo.min(v), hi.max(v)));
    [lo - 0.5, hi + 0.5]
}

fn render_chart<Tz: TimeZone>(frame: &mut Frame, area: Rect, series: &[HourBucket<Tz>]) {
    let sources = series_sources(series);
    let x_max = (SERIES_HOURS - 1) as f64;
    let band_hi = [(0.0, ENTRY_BAND), (x_max, ENTRY_BAND)];
    let band_lo = [(0.0, -ENTRY_BAND), (x_max, -ENTRY_BAND)];

    let per_source: Vec<(String, Color, Vec<Vec<(f64, f64)>>)> = sources
        .iter()
        .enumerate()
        .map(|(i, s)| {
            (
                s.clone(),
                SERIES_COLORS[i % SERIES_COLORS.len()],
                series_segments(series, s),
            )
        })
        .collect();

    let band_style = Style::default().fg(Color::DarkGray);
    let mut datasets = vec![
        Dataset::default()
            .marker(Marker::Dot)
            .graph_type(GraphType::Line)
            .style(band_style)
            .data(&band_hi),
        Dataset::default()
            .marker(Marker::Dot)
            .graph_type(GraphType::Line)
            .style(band_style)
            .data(&band_lo),
    ];
    for (name, color, segments) in &per_source {
        for (j, seg) in segments.iter().enumerate() {
            let graph = if seg.len() == 1 {
                GraphType::Scatter
            } else {
                GraphType::Line
            };
            let mut ds = Dataset::default()
                .marker(Marker::Braille)
                .graph_type(graph)
                .style(Style::default().fg(*color))
                .data(seg);
            // Only the first run carries the name so the legend lists each pair once.
            if j == 0 {
                ds = ds.name(name.clone());
            }
            datasets.push(ds);
        }
    }

    let x_labels: Vec<Span> = [0, SERIES_HOURS / 2, SERIES_HOURS - 1]
        .iter()
        .filter_map(|&i| series.get(i))
        .map(|b| Span::raw(b.label.clone()))
        .collect();
    let [y_lo, y_hi] = y_bounds(series);

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Z-Score (24h, from system logs) "),
        )
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, x_max])
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([y_lo, y_hi])
                .labels(vec![
                    Span::raw(format!("{y_lo:.1}")),
                    Span::raw("0"),
                    Span::raw(format!("{y_hi:.1}")),
                ]),
        );

    frame.render_widget(chart, area);
}

// ---------------------------------------------------------------------------
// Risk gauge + sentiment summary
// ---------------------------------------------------------------------------

fn render_risk_gauge(frame: &mut Frame, area: Rect, state: &ViewState, threshold: i32) {
    let Some(reading) = &state.sentiment else {
        let empty = Paragraph::new(Span::styled(
            "no sentiment reading yet",
            Style::default().fg(Color::DarkGray),
        ))
        .block(Block::default().borders(Borders::ALL).title(" Risk "));
        frame.render_widget(empty, area);
        return;
    };

    let color = match reading.risk_level() {
        RiskLevel::Safe => Color::Green,
        RiskLevel::Caution => Color::Yellow,
        RiskLevel::Critical => Color::Red,
    };
    let label = format!(
        "{}/100  {}{}",
        reading.risk_score,
        reading.sentiment,
        if reading.risk_score > threshold {
            "  HALT"
        } else {
            ""
        }
    );

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Risk "))
        .gauge_style(Style::default().fg(color).bg(Color::Black))
        .percent(reading.clamped_score())
        .label(label);
    frame.render_widget(gauge, area);
}

fn render_summary(frame: &mut Frame, area: Rect, state: &ViewState) {
    let (title, text) = match &state.sentiment {
        Some(s) => (
            format!(
                " Sentiment @ {} ",
                s.timestamp.with_timezone(&Local).format("%m-%d %H:%M")
            ),
            s.summary.clone().unwrap_or_else(|| "—".into()),
        ),
        None => (" Sentiment ".to_string(), "—".to_string()),
    };
    let para = Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(Color::Gray))
        .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(para, area);
}

// ---------------------------------------------------------------------------
// Trade log table
// ---------------------------------------------------------------------------

fn render_trades(frame: &mut Frame, area: Rect, state: &ViewState) {
    let header_cells = ["Time", "Pair", "Type", "Side", "Z", "PnL %", "Comment"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows: Vec<Row> = state
        .trades
        .iter()
        .take(area.height.saturating_sub(3) as usize)
        .map(|t| {
            let type_color = match t.trade_type {
                TradeType::Entry => Color::Cyan,
                TradeType::Exit => Color::Magenta,
                TradeType::Init => Color::DarkGray,
            };
            let pnl = t.pnl();
            let pnl_color = if pnl > 0.0 {
                Color::Green
            } else if pnl < 0.0 {
                Color::Red
            } else {
                Color::Gray
            };
            let side = t
                .side
                .as_deref()
                .and_then(|s| s.parse::<crate::models::PositionSide>().ok())
                .map(|s| s.short_label().to_string())
                .or_else(|| t.side.clone())
                .unwrap_or_else(|| "—".into());
            Row::new(vec![
                Cell::from(t.timestamp.with_timezone(&Local).format("%m-%d %H:%M").to_string()),
                Cell::from(t.pair.clone()),
                Cell::from(t.trade_type.as_str()).style(Style::default().fg(type_color)),
                Cell::from(side),
                Cell::from(opt_num(t.z_score, 2)),
                Cell::from(format!("{:+.2}", pnl))
                    .style(Style::default().fg(pnl_color).add_modifier(Modifier::BOLD)),
                Cell::from(t.comment.clone().unwrap_or_default()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(11),
            Constraint::Length(10),
            Constraint::Length(5),
            Constraint::Length(4),
            Constraint::Length(6),
            Constraint::Length(7),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Trade Log ({}) ", state.trades.len())),
    );

    frame.render_widget(table, area);
}

// ---------------------------------------------------------------------------
// System logs panel
// ---------------------------------------------------------------------------

fn render_logs(frame: &mut Frame, area: Rect, state: &ViewState) {
    let items: Vec<ListItem> = state
        .logs
        .iter()
        .take(area.height as usize)
        .map(|e| {
            let color = match e.level {
                LogLevel::Error => Color::Red,
                LogLevel::Warning => Color::Yellow,
                LogLevel::Success => Color::Green,
                LogLevel::Info => Color::Gray,
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("[{}] ", e.timestamp.with_timezone(&Local).format("%H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    format!("{:<7} ", e.level.as_str().to_uppercase()),
                    Style::default().fg(color),
                ),
                Span::styled(format!("{}: ", e.source), Style::default().fg(Color::Cyan)),
                Span::raw(e.message.clone()),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" System Logs "))
        .style(Style::default().fg(Color::White));

    frame.render_widget(list, area);
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn opt_num(v: Option<f64>, decimals: usize) -> String {
    v.map(|x| format!("{:.*}", decimals, x))
        .unwrap_or_else(|| "—".into())
}

fn zscore_color(z: f64) -> Color {
    if z.abs() >= ENTRY_BAND {
        Color::Red
    } else if z.abs() >= ENTRY_BAND / 2.0 {
        Color::Yellow
    } else {
        Color::Green
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PositionState, SentimentReading, SystemLogEvent};
    use chrono::{Duration, Utc};
    use crossterm::event::{KeyEvent, KeyEventState};
    use ratatui::backend::TestBackend;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn zlog(source: &str, value: f64, at: DateTime<Utc>) -> SystemLogEvent {
        SystemLogEvent {
            id: 0,
            timestamp: at,
            level: LogLevel::Info,
            source: source.into(),
            message: format!("Z-Score calculated: {value}"),
            details: None,
        }
    }

    #[test]
    fn keys_map_to_actions() {
        assert_eq!(handle_event(&key(KeyCode::Char('q'), KeyModifiers::NONE)), KeyAction::Quit);
        assert_eq!(
            handle_event(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            KeyAction::Quit
        );
        assert_eq!(
            handle_event(&key(KeyCode::Char('r'), KeyModifiers::NONE)),
            KeyAction::Refresh
        );
        assert_eq!(
            handle_event(&key(KeyCode::Char('c'), KeyModifiers::NONE)),
            KeyAction::Ignore
        );
    }

    #[test]
    fn gaps_split_segments() {
        let now = Utc::now();
        let logs = vec![
            zlog("SOL/LTC", 1.0, now),
            zlog("SOL/LTC", 0.5, now - Duration::hours(1)),
            zlog("SOL/LTC", -1.0, now - Duration::hours(5)),
        ];
        let series = zscore_series(&logs, now);
        let segs = series_segments(&series, "SOL/LTC");
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0], vec![(18.0, -1.0)]);
        assert_eq!(segs[1], vec![(22.0, 0.5), (23.0, 1.0)]);
    }

    #[test]
    fn y_bounds_cover_band_and_outliers() {
        let now = Utc::now();
        let series = zscore_series(&[zlog("AVAX/NEAR", 4.2, now)], now);
        let [lo, hi] = y_bounds(&series);
        assert!(lo <= -ENTRY_BAND);
        assert!(hi >= 4.2);
    }

    #[test]
    fn renders_halted_state_without_panicking() {
        let mut state = ViewState::default();
        state.positions = vec![PositionState::scanning("AVAX/NEAR")];
        state.sentiment = Some(SentimentReading {
            id: 1,
            timestamp: Utc::now(),
            risk_score: 90,
            sentiment: "CRITICAL".into(),
            summary: Some("[AVAX] exploit reported".into()),
        });
        state.logs = vec![zlog("AVAX/NEAR", 2.5, Utc::now())];

        let ctx = RenderContext {
            store_name: "sqlite",
            halt_threshold: 75,
            now: Local::now(),
        };
        let mut terminal = Terminal::new(TestBackend::new(140, 48)).unwrap();
        terminal.draw(|f| render(f, &state, &ctx)).unwrap();

        let buffer = terminal.backend().buffer().clone();
        let text: String = buffer.content.iter().map(|c| c.symbol()).collect();
        assert!(text.contains("TRADING HALTED"));
        assert!(text.contains("AVAX/NEAR"));
    }
}
