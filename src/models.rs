/// models.rs – Row types for the four backing-store tables.
///
/// Field names match the column names the trading engine writes, so the same
/// structs decode PostgREST JSON and map SQLite rows.
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Pairs the engine traded before the V3 migration. Also the placeholder set
/// shown when no backing store is configured.
pub const ORIGINAL_PAIRS: [&str; 3] = ["ATOM/DOT", "SAND/MANA", "CRV/CVX"];

/// Pairs that replace [`ORIGINAL_PAIRS`] after the migration.
pub const REPLACEMENT_PAIRS: [&str; 3] = ["AVAX/NEAR", "SOL/LTC", "NEAR/FIL"];

/// Risk scores strictly above this halt new entries.
pub const HALT_THRESHOLD: i32 = 75;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    /// Ratio below its mean: long leg A, short leg B.
    #[serde(rename = "LONG_A_SHORT_B")]
    LongAShortB,
    /// Ratio above its mean: short leg A, long leg B.
    #[serde(rename = "SHORT_A_LONG_B")]
    ShortALongB,
}

impl PositionSide {
    pub fn as_str(self) -> &'static str {
        match self {
            PositionSide::LongAShortB => "LONG_A_SHORT_B",
            PositionSide::ShortALongB => "SHORT_A_LONG_B",
        }
    }

    /// Compact label for table cells.
    pub fn short_label(self) -> &'static str {
        match self {
            PositionSide::LongAShortB => "L/S",
            PositionSide::ShortALongB => "S/L",
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PositionSide {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LONG_A_SHORT_B" => Ok(PositionSide::LongAShortB),
            "SHORT_A_LONG_B" => Ok(PositionSide::ShortALongB),
            _ => Err(anyhow::anyhow!("Unknown position side: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeType {
    #[serde(rename = "ENTRY", alias = "entry")]
    Entry,
    #[serde(rename = "EXIT", alias = "exit")]
    Exit,
    /// Placeholder row written when a pair is first registered.
    #[serde(rename = "INIT", alias = "init")]
    Init,
}

impl TradeType {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeType::Entry => "ENTRY",
            TradeType::Exit => "EXIT",
            TradeType::Init => "INIT",
        }
    }

    /// Entries and exits count as trades; INIT rows do not.
    pub fn is_trade(self) -> bool {
        matches!(self, TradeType::Entry | TradeType::Exit)
    }
}

impl std::fmt::Display for TradeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TradeType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ENTRY" => Ok(TradeType::Entry),
            "EXIT" => Ok(TradeType::Exit),
            "INIT" => Ok(TradeType::Init),
            _ => Err(anyhow::anyhow!("Unknown trade type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    #[serde(rename = "info", alias = "INFO")]
    Info,
    #[serde(rename = "warning", alias = "WARNING", alias = "warn", alias = "WARN")]
    Warning,
    #[serde(rename = "error", alias = "ERROR")]
    Error,
    #[serde(rename = "success", alias = "SUCCESS")]
    Success,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Success => "success",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "success" => Ok(LogLevel::Success),
            _ => Err(anyhow::anyhow!("Unknown log level: {s}")),
        }
    }
}

/// Band a risk score falls into. Bands follow the news agent's rubric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Safe,
    Caution,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: i32) -> Self {
        if score <= 50 {
            RiskLevel::Safe
        } else if score <= HALT_THRESHOLD {
            RiskLevel::Caution
        } else {
            RiskLevel::Critical
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Safe => "SAFE",
            RiskLevel::Caution => "CAUTION",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Position state (bot_state)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub symbol: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub position_type: Option<PositionSide>,
    #[serde(default)]
    pub entry_z: Option<f64>,
    #[serde(default)]
    pub entry_ratio: Option<f64>,
    /// Only present on schemas that added the column.
    #[serde(default)]
    pub current_z: Option<f64>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl PositionState {
    /// An inactive row with no entry data.
    pub fn scanning(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            is_active: false,
            position_type: None,
            entry_z: None,
            entry_ratio: None,
            current_z: None,
            last_updated: None,
        }
    }
}

/// Built-in rows for the three original pairs.
pub fn placeholder_positions() -> Vec<PositionState> {
    ORIGINAL_PAIRS.iter().map(|s| PositionState::scanning(*s)).collect()
}

// ---------------------------------------------------------------------------
// Trade events (trade_logs)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    #[serde(default)]
    pub id: i64,
    #[serde(deserialize_with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub pair: String,
    #[serde(rename = "type")]
    pub trade_type: TradeType,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub z_score: Option<f64>,
    #[serde(default)]
    pub pnl_percent: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl TradeEvent {
    /// Null PnL counts as zero.
    pub fn pnl(&self) -> f64 {
        self.pnl_percent.unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// System log events (system_logs)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemLogEvent {
    #[serde(default)]
    pub id: i64,
    #[serde(deserialize_with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Sentiment readings (market_sentiment)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    #[serde(default)]
    pub id: i64,
    #[serde(deserialize_with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub risk_score: i32,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default)]
    pub summary: Option<String>,
}

impl SentimentReading {
    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_score(self.risk_score)
    }

    /// Score forced into 0..=100 for gauges.
    pub fn clamped_score(&self) -> u16 {
        self.risk_score.clamp(0, 100) as u16
    }
}

/// Banner predicate: strictly above the threshold, no hysteresis.
pub fn is_halted(risk_score: i32, threshold: i32) -> bool {
    risk_score > threshold
}

// ---------------------------------------------------------------------------
// Timestamp decoding
// ---------------------------------------------------------------------------

/// Parse RFC 3339, falling back to naive Postgres/SQLite forms read as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    // Postgres text output with a short offset, e.g. "2025-01-10 08:00:00+00"
    DateTime::parse_from_str(&format!("{s}00"), "%Y-%m-%d %H:%M:%S%.f%z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("bad timestamp '{raw}'")))
}

fn opt_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("bad timestamp '{s}'"))),
    }
}
