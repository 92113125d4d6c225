/// main.rs – Entry point for the Quantum Sniper monitor.
///
/// Wires the configured backing store to the refresh cycle and the live
/// ratatui dashboard, and hosts the one-shot maintenance subcommands.
mod config;
mod dashboard;
mod database;
mod metrics;
mod models;
mod refresh;
mod series;
mod state;
mod store;
mod supabase;
mod verify;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use crossterm::event::EventStream;
use futures_util::StreamExt;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use config::{Settings, StoreTarget};
use dashboard::{KeyAction, RenderContext};
use database::Database;
use metrics::DashboardMetrics;
use models::{ORIGINAL_PAIRS, REPLACEMENT_PAIRS};
use refresh::{RefreshOutcome, Refresher};
use state::{Connectivity, ViewState};
use store::Store;
use supabase::SupabaseStore;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "quantum-sniper-monitor",
    about = "Read-only dashboard for the Quantum Sniper pairs-trading bot",
    version
)]
struct Cli {
    /// Disable the interactive dashboard and log a summary line per refresh instead.
    #[arg(long, default_value_t = false, global = true)]
    no_dashboard: bool,

    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the monitor (default).
    Run,
    /// Check that every backing-store table answers, then exit.
    Verify,
    /// Create the SQLite schema and seed the original pairs.
    InitDb {
        /// SQLite file; falls back to store.sqlite_path.
        #[arg(long)]
        db: Option<String>,
    },
    /// Force-close open positions and swap the retiring pairs for their replacements.
    Migrate {
        /// SQLite file; falls back to store.sqlite_path.
        #[arg(long)]
        db: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load settings (YAML + env override)
    let settings = Settings::load(&cli.config)?;

    let command = cli.command.unwrap_or(Command::Run);
    let tui = matches!(command, Command::Run) && !cli.no_dashboard;
    let _log_guard = init_logging(&settings, tui)?;

    match command {
        Command::Run => run(&settings, tui).await,
        Command::Verify => run_verify(&settings).await,
        Command::InitDb { db } => {
            let path = sqlite_path(db, &settings)?;
            let db = Database::open(&path)?;
            let seeded = db.seed_pairs(&ORIGINAL_PAIRS)?;
            info!("Schema ready in {path}; seeded {seeded} pair(s)");
            Ok(())
        }
        Command::Migrate { db } => {
            let path = sqlite_path(db, &settings)?;
            let db = Database::open(&path)?;
            let report = db.migrate_pairs(&ORIGINAL_PAIRS, &REPLACEMENT_PAIRS)?;
            if report.force_closed.is_empty() {
                info!("No active positions to close");
            } else {
                info!("Force-closed: {}", report.force_closed.join(", "));
            }
            info!(
                "Removed {} retiring row(s), added {} replacement pair(s)",
                report.rows_deleted, report.rows_inserted
            );
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// RUST_LOG wins over `monitor.log_level`. While the terminal UI owns the
/// screen, output goes to `monitor.log_file` or nowhere.
fn init_logging(settings: &Settings, tui: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.monitor.log_level));

    if !tui {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
        return Ok(None);
    }

    match &settings.monitor.log_file {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("monitor.log_file '{file}' has no file name"))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::sink)
                .init();
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Store selection
// ---------------------------------------------------------------------------

fn open_store(settings: &Settings) -> Result<Option<Arc<dyn Store>>> {
    let store: Arc<dyn Store> = match settings.store_target() {
        StoreTarget::Sqlite(path) => {
            info!("Reading from SQLite file {path}");
            Arc::new(Database::open_read_only(&path)?)
        }
        StoreTarget::Supabase { url, key } => {
            info!("Reading from {url}");
            Arc::new(SupabaseStore::new(&url, &key, settings.request_timeout())?)
        }
        StoreTarget::Offline => return Ok(None),
    };
    Ok(Some(store))
}

fn sqlite_path(cli_path: Option<String>, settings: &Settings) -> Result<String> {
    match cli_path.or_else(|| settings.store.sqlite_path.clone()) {
        Some(p) => Ok(p),
        None => bail!("no SQLite file given: pass --db PATH or set store.sqlite_path"),
    }
}

// ---------------------------------------------------------------------------
// Monitor loop
// ---------------------------------------------------------------------------

async fn run(settings: &Settings, tui: bool) -> Result<()> {
    let refresher = match open_store(settings)? {
        Some(store) => Some(Arc::new(Refresher::new(store, settings.fetch_limits()))),
        None => {
            warn!("SUPABASE_URL / SUPABASE_KEY not set – showing placeholder data only.");
            None
        }
    };
    let store_name = refresher
        .as_ref()
        .map(|r| r.store_name())
        .unwrap_or("offline");

    let state = Arc::new(RwLock::new(if refresher.is_some() {
        ViewState::default()
    } else {
        ViewState::placeholder()
    }));

    let mut terminal = if tui {
        Some(dashboard::setup_terminal()?)
    } else {
        None
    };

    // First tick fires immediately, which doubles as the startup refresh.
    let mut poll_ticker = tokio::time::interval(settings.refresh_interval());
    let mut dash_ticker = tokio::time::interval(settings.redraw_interval());
    let mut event_stream = EventStream::new();
    let halt_threshold = settings.monitor.halt_threshold;

    info!(
        "Monitor started, refreshing every {:?}.  Press 'q' to quit.",
        settings.refresh_interval()
    );

    loop {
        // Render dashboard
        if let Some(ref mut term) = terminal {
            let st = state.read().clone();
            let ctx = RenderContext {
                store_name,
                halt_threshold,
                now: Local::now(),
            };
            term.draw(|f| dashboard::render(f, &st, &ctx))?;
        }

        tokio::select! {
            // ── Dashboard keyboard events ──────────────────────────────────
            Some(Ok(event)) = event_stream.next(), if terminal.is_some() => {
                match dashboard::handle_event(&event) {
                    KeyAction::Quit => break,
                    KeyAction::Refresh => {
                        if let Some(r) = &refresher {
                            spawn_refresh(r, &state, halt_threshold, false);
                        }
                    }
                    KeyAction::Ignore => {}
                }
            }

            // ── Headless shutdown ──────────────────────────────────────────
            _ = tokio::signal::ctrl_c(), if terminal.is_none() => break,

            // ── Redraw tick ────────────────────────────────────────────────
            _ = dash_ticker.tick() => {}

            // ── Store poll tick ────────────────────────────────────────────
            _ = poll_ticker.tick() => {
                if let Some(r) = &refresher {
                    spawn_refresh(r, &state, halt_threshold, terminal.is_none());
                }
            }
        }
    }

    if let Some(ref mut term) = terminal {
        dashboard::teardown_terminal(term)?;
    }
    info!("Monitor stopped.");
    Ok(())
}

/// Start one refresh cycle in the background. Overlapping requests are
/// dropped by the refresher's own guard.
fn spawn_refresh(
    refresher: &Arc<Refresher>,
    state: &Arc<RwLock<ViewState>>,
    halt_threshold: i32,
    summarize: bool,
) {
    let refresher = Arc::clone(refresher);
    let state = Arc::clone(state);
    tokio::spawn(async move {
        let outcome = refresher.refresh(&state).await;
        if let (RefreshOutcome::Completed(conn), true) = (outcome, summarize) {
            let line = summary_line(&state.read(), conn, halt_threshold);
            info!("{line}");
        }
    });
}

fn summary_line(state: &ViewState, conn: Connectivity, halt_threshold: i32) -> String {
    let m = DashboardMetrics::compute(&state.positions, &state.trades);
    let risk = state
        .sentiment
        .as_ref()
        .map(|s| format!("{}/100 {}", s.risk_score, s.risk_level()))
        .unwrap_or_else(|| "n/a".into());
    format!(
        "{:?} │ active {}/{} │ trades {} │ pnl {:+.2}% │ win {:.1}% │ risk {}{}",
        conn,
        m.active_positions,
        state.positions.len(),
        m.total_trades,
        m.total_pnl,
        m.win_rate,
        risk,
        if state.is_trading_halted(halt_threshold) {
            " │ HALTED"
        } else {
            ""
        },
    )
}

// ---------------------------------------------------------------------------
// Verify
// ---------------------------------------------------------------------------

async fn run_verify(settings: &Settings) -> Result<()> {
    let Some(store) = open_store(settings)? else {
        bail!("no backing store configured: set SUPABASE_URL and SUPABASE_KEY, or store.sqlite_path");
    };

    let report = verify::verify_store(store.as_ref()).await;
    for check in &report.checks {
        println!("{} {}", if check.ok { "✅" } else { "❌" }, check.table);
        for line in &check.lines {
            println!("   {line}");
        }
    }

    if !report.all_ok() {
        bail!("backing store verification failed");
    }
    println!("All tables answered – the dashboard is ready.");
    Ok(())
}
