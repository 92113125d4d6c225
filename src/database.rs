/// database.rs – SQLite copy of the backing-store schema using rusqlite.
///
/// The hosted store is Postgres behind PostgREST; this file mirrors its four
/// tables so operators can seed, migrate, and inspect a local copy, and so the
/// dashboard can point at a file instead of the network.
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::info;

use crate::models::{
    parse_timestamp, LogLevel, PositionState, SentimentReading, SystemLogEvent, TradeEvent,
    TradeType,
};
use crate::store::{Store, StoreError, BOT_STATE, MARKET_SENTIMENT, SYSTEM_LOGS, TRADE_LOGS};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS bot_state (
    symbol          TEXT PRIMARY KEY,
    is_active       INTEGER NOT NULL DEFAULT 0,
    position_type   TEXT CHECK (position_type IN ('LONG_A_SHORT_B', 'SHORT_A_LONG_B')),
    entry_z         REAL,
    entry_ratio     REAL,
    current_z       REAL,
    last_updated    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS trade_logs (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp       TEXT NOT NULL,
    pair            TEXT NOT NULL,
    type            TEXT NOT NULL CHECK (type IN ('ENTRY', 'EXIT', 'INIT')),
    side            TEXT,
    price           REAL,
    z_score         REAL,
    pnl_percent     REAL DEFAULT 0.0,
    comment         TEXT
);

CREATE TABLE IF NOT EXISTS system_logs (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp       TEXT NOT NULL,
    level           TEXT NOT NULL CHECK (level IN ('info', 'warning', 'error', 'success')),
    source          TEXT NOT NULL,
    message         TEXT NOT NULL,
    details         TEXT
);

CREATE TABLE IF NOT EXISTS market_sentiment (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp       TEXT NOT NULL,
    risk_score      INTEGER NOT NULL CHECK (risk_score BETWEEN 0 AND 100),
    sentiment       TEXT NOT NULL,
    summary         TEXT
);

CREATE INDEX IF NOT EXISTS idx_trade_logs_timestamp       ON trade_logs(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_system_logs_timestamp      ON system_logs(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_market_sentiment_timestamp ON market_sentiment(timestamp DESC);
";

/// Comment written on the synthetic EXIT rows the migration appends.
pub const MIGRATION_EXIT_COMMENT: &str = "FORCED EXIT: pair migration V3.0";

/// Source label of the migration's system-log entry.
pub const MIGRATION_SOURCE: &str = "MIGRATION";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    /// Pairs that were active and got a synthetic EXIT.
    pub force_closed: Vec<String>,
    pub rows_deleted: usize,
    pub rows_inserted: usize,
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the SQLite database at *path* and apply the schema.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("opening SQLite database")?;
        conn.execute_batch(SCHEMA).context("applying schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an existing database without touching its schema. Any write fails.
    pub fn open_read_only(path: &str) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("opening SQLite database {path} read-only"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }

    // ------------------------------------------------------------------
    // Position state
    // ------------------------------------------------------------------

    /// Insert the given pairs as inactive rows; existing symbols are left alone.
    /// Returns how many rows were actually inserted.
    pub fn seed_pairs(&self, symbols: &[&str]) -> Result<usize> {
        self.with_conn(|conn| insert_scanning(conn, symbols, Utc::now()))
    }

    pub fn upsert_position(&self, p: &PositionState) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO bot_state
                    (symbol, is_active, position_type, entry_z, entry_ratio,
                     current_z, last_updated)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)
                 ON CONFLICT(symbol) DO UPDATE SET
                    is_active     = excluded.is_active,
                    position_type = excluded.position_type,
                    entry_z       = excluded.entry_z,
                    entry_ratio   = excluded.entry_ratio,
                    current_z     = excluded.current_z,
                    last_updated  = excluded.last_updated",
                params![
                    p.symbol,
                    p.is_active as i32,
                    p.position_type.map(|s| s.as_str()),
                    p.entry_z,
                    p.entry_ratio,
                    p.current_z,
                    fmt_ts(p.last_updated.unwrap_or_else(Utc::now)),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_positions(&self) -> Result<Vec<PositionState>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM bot_state ORDER BY symbol ASC")?;
            let rows = stmt.query_map([], |row| Self::row_to_position(row))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(anyhow::Error::from)
        })
    }

    fn row_to_position(row: &rusqlite::Row<'_>) -> Result<PositionState, rusqlite::Error> {
        Ok(PositionState {
            symbol: row.get("symbol")?,
            is_active: row.get::<_, i32>("is_active")? != 0,
            position_type: row
                .get::<_, Option<String>>("position_type")?
                .and_then(|s| s.parse().ok()),
            entry_z: row.get("entry_z")?,
            entry_ratio: row.get("entry_ratio")?,
            current_z: row.get("current_z")?,
            last_updated: row
                .get::<_, Option<String>>("last_updated")?
                .and_then(|s| parse_timestamp(&s)),
        })
    }

    // ------------------------------------------------------------------
    // Trade events
    // ------------------------------------------------------------------

    /// Append a trade event. The `id` field is ignored; the new id is returned.
    pub fn insert_trade(&self, t: &TradeEvent) -> Result<i64> {
        self.with_conn(|conn| insert_trade_row(conn, t))
    }

    pub fn recent_trades(&self, limit: usize) -> Result<Vec<TradeEvent>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM trade_logs ORDER BY timestamp DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| Self::row_to_trade(row))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(anyhow::Error::from)
        })
    }

    fn row_to_trade(row: &rusqlite::Row<'_>) -> Result<TradeEvent, rusqlite::Error> {
        let type_str: String = row.get("type")?;
        Ok(TradeEvent {
            id: row.get("id")?,
            timestamp: ts_column(row, "timestamp")?,
            pair: row.get("pair")?,
            trade_type: type_str.parse().unwrap_or(TradeType::Init),
            side: row.get("side")?,
            price: row.get("price")?,
            z_score: row.get("z_score")?,
            pnl_percent: row.get("pnl_percent")?,
            comment: row.get("comment")?,
        })
    }

    // ------------------------------------------------------------------
    // System logs
    // ------------------------------------------------------------------

    pub fn insert_log(&self, e: &SystemLogEvent) -> Result<i64> {
        self.with_conn(|conn| insert_log_row(conn, e))
    }

    pub fn recent_logs(&self, limit: usize) -> Result<Vec<SystemLogEvent>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM system_logs ORDER BY timestamp DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| Self::row_to_log(row))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(anyhow::Error::from)
        })
    }

    fn row_to_log(row: &rusqlite::Row<'_>) -> Result<SystemLogEvent, rusqlite::Error> {
        let level_str: String = row.get("level")?;
        Ok(SystemLogEvent {
            id: row.get("id")?,
            timestamp: ts_column(row, "timestamp")?,
            level: level_str.parse().unwrap_or(LogLevel::Info),
            source: row.get("source")?,
            message: row.get("message")?,
            details: row
                .get::<_, Option<String>>("details")?
                .and_then(|s| serde_json::from_str(&s).ok()),
        })
    }

    // ------------------------------------------------------------------
    // Sentiment
    // ------------------------------------------------------------------

    pub fn insert_sentiment(&self, s: &SentimentReading) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO market_sentiment (timestamp, risk_score, sentiment, summary)
                 VALUES (?1,?2,?3,?4)",
                params![fmt_ts(s.timestamp), s.risk_score, s.sentiment, s.summary],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn latest_sentiment(&self) -> Result<Option<SentimentReading>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM market_sentiment ORDER BY timestamp DESC, id DESC LIMIT 1",
                [],
                |row| {
                    Ok(SentimentReading {
                        id: row.get("id")?,
                        timestamp: ts_column(row, "timestamp")?,
                        risk_score: row.get("risk_score")?,
                        sentiment: row.get("sentiment")?,
                        summary: row.get("summary")?,
                    })
                },
            )
            .optional()
            .map_err(anyhow::Error::from)
        })
    }

    // ------------------------------------------------------------------
    // One-time pair migration
    // ------------------------------------------------------------------

    /// Retire `retiring` and register `replacements`, all in one transaction:
    ///
    /// 1. every active position gets a synthetic EXIT (zero PnL, zero Z) and
    ///    its row is reset to scanning;
    /// 2. rows for the retiring pairs are deleted;
    /// 3. replacement pairs are inserted inactive, existing keys untouched;
    /// 4. one `info` system-log row records what happened.
    pub fn migrate_pairs(&self, retiring: &[&str], replacements: &[&str]) -> Result<MigrationReport> {
        self.with_conn(|conn| {
            let now = Utc::now();
            let tx = conn.transaction().context("starting migration transaction")?;
            let mut report = MigrationReport::default();

            let active: Vec<PositionState> = {
                let mut stmt = tx.prepare("SELECT * FROM bot_state WHERE is_active = 1")?;
                let rows = stmt.query_map([], |row| Self::row_to_position(row))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            for pos in &active {
                insert_trade_row(
                    &tx,
                    &TradeEvent {
                        id: 0,
                        timestamp: now,
                        pair: pos.symbol.clone(),
                        trade_type: TradeType::Exit,
                        side: pos.position_type.map(|s| s.as_str().to_string()),
                        price: pos.entry_ratio,
                        z_score: Some(0.0),
                        pnl_percent: Some(0.0),
                        comment: Some(MIGRATION_EXIT_COMMENT.to_string()),
                    },
                )?;
                tx.execute(
                    "UPDATE bot_state SET
                        is_active = 0, position_type = NULL,
                        entry_z = NULL, entry_ratio = NULL, last_updated = ?2
                     WHERE symbol = ?1",
                    params![pos.symbol, fmt_ts(now)],
                )?;
                report.force_closed.push(pos.symbol.clone());
            }

            for symbol in retiring {
                report.rows_deleted +=
                    tx.execute("DELETE FROM bot_state WHERE symbol = ?1", params![symbol])?;
            }

            report.rows_inserted = insert_scanning(&tx, replacements, now)?;

            insert_log_row(
                &tx,
                &SystemLogEvent {
                    id: 0,
                    timestamp: now,
                    level: LogLevel::Info,
                    source: MIGRATION_SOURCE.to_string(),
                    message: format!(
                        "Pair migration: {} -> {} ({} position(s) force-closed)",
                        retiring.join(", "),
                        replacements.join(", "),
                        report.force_closed.len(),
                    ),
                    details: Some(serde_json::json!({
                        "retired": retiring,
                        "added": replacements,
                        "force_closed": report.force_closed,
                    })),
                },
            )?;

            tx.commit().context("committing migration")?;
            info!(
                "Migration committed: closed={} deleted={} inserted={}",
                report.force_closed.len(),
                report.rows_deleted,
                report.rows_inserted
            );
            Ok(report)
        })
    }
}

// ---------------------------------------------------------------------------
// Store implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl Store for Database {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn positions(&self) -> Result<Vec<PositionState>, StoreError> {
        self.get_positions()
            .map_err(|e| StoreError::query(BOT_STATE, format!("{e:#}")))
    }

    async fn latest_sentiment(&self) -> Result<Option<SentimentReading>, StoreError> {
        Database::latest_sentiment(self)
            .map_err(|e| StoreError::query(MARKET_SENTIMENT, format!("{e:#}")))
    }

    async fn recent_trades(&self, limit: usize) -> Result<Vec<TradeEvent>, StoreError> {
        Database::recent_trades(self, limit)
            .map_err(|e| StoreError::query(TRADE_LOGS, format!("{e:#}")))
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<SystemLogEvent>, StoreError> {
        Database::recent_logs(self, limit)
            .map_err(|e| StoreError::query(SYSTEM_LOGS, format!("{e:#}")))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn insert_scanning(conn: &Connection, symbols: &[&str], now: DateTime<Utc>) -> Result<usize> {
    let mut inserted = 0;
    for symbol in symbols {
        inserted += conn.execute(
            "INSERT OR IGNORE INTO bot_state
                (symbol, is_active, position_type, entry_z, entry_ratio, last_updated)
             VALUES (?1, 0, NULL, NULL, NULL, ?2)",
            params![symbol, fmt_ts(now)],
        )?;
    }
    Ok(inserted)
}

fn insert_trade_row(conn: &Connection, t: &TradeEvent) -> Result<i64> {
    conn.execute(
        "INSERT INTO trade_logs
            (timestamp, pair, type, side, price, z_score, pnl_percent, comment)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            fmt_ts(t.timestamp),
            t.pair,
            t.trade_type.as_str(),
            t.side,
            t.price,
            t.z_score,
            t.pnl_percent,
            t.comment,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_log_row(conn: &Connection, e: &SystemLogEvent) -> Result<i64> {
    conn.execute(
        "INSERT INTO system_logs (timestamp, level, source, message, details)
         VALUES (?1,?2,?3,?4,?5)",
        params![
            fmt_ts(e.timestamp),
            e.level.as_str(),
            e.source,
            e.message,
            e.details.as_ref().map(|d| d.to_string()),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Fixed-width UTC form so text ordering matches time ordering.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_column(row: &rusqlite::Row<'_>, name: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(name)?;
    parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(0, name.to_string(), rusqlite::types::Type::Text)
    })
}
