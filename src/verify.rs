/// verify.rs – One-shot check that every backing-store table answers.
///
/// Mirrors the operator's setup check: position rows must exist, the event
/// tables must be queryable, and the sentiment table must hold a reading.
use crate::models::RiskLevel;
use crate::store::{Store, BOT_STATE, MARKET_SENTIMENT, SYSTEM_LOGS, TRADE_LOGS};

#[derive(Debug, Clone, PartialEq)]
pub struct TableCheck {
    pub table: &'static str,
    pub ok: bool,
    /// Short human summary, one line per row of interest.
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerifyReport {
    pub checks: Vec<TableCheck>,
}

impl VerifyReport {
    pub fn all_ok(&self) -> bool {
        self.checks.iter().all(|c| c.ok)
    }
}

/// `system_logs` is optional: a missing table is reported but not a failure.
pub async fn verify_store(store: &dyn Store) -> VerifyReport {
    let mut checks = Vec::with_capacity(4);

    checks.push(match store.positions().await {
        Ok(rows) if !rows.is_empty() => TableCheck {
            table: BOT_STATE,
            ok: true,
            lines: std::iter::once(format!("{} pair(s) found", rows.len()))
                .chain(rows.iter().map(|r| {
                    let status = if r.is_active { "ACTIVE" } else { "SCANNING" };
                    format!("  - {}: {}", r.symbol, status)
                }))
                .collect(),
        },
        Ok(_) => TableCheck {
            table: BOT_STATE,
            ok: false,
            lines: vec!["table exists but is empty".into()],
        },
        Err(e) => TableCheck {
            table: BOT_STATE,
            ok: false,
            lines: vec![e.to_string()],
        },
    });

    checks.push(match store.recent_trades(5).await {
        Ok(rows) => TableCheck {
            table: TRADE_LOGS,
            ok: true,
            lines: std::iter::once(format!("{} recent entries", rows.len()))
                .chain(rows.iter().map(|t| {
                    let comment: String = t.comment.as_deref().unwrap_or("").chars().take(50).collect();
                    format!("  - [{}] {}: {}", t.trade_type, t.pair, comment)
                }))
                .collect(),
        },
        Err(e) => TableCheck {
            table: TRADE_LOGS,
            ok: false,
            lines: vec![e.to_string()],
        },
    });

    checks.push(match store.recent_logs(5).await {
        Ok(rows) => TableCheck {
            table: SYSTEM_LOGS,
            ok: true,
            lines: vec![format!("{} recent entries", rows.len())],
        },
        Err(e) if e.aborts_cycle() => TableCheck {
            table: SYSTEM_LOGS,
            ok: false,
            lines: vec![e.to_string()],
        },
        Err(e) => TableCheck {
            table: SYSTEM_LOGS,
            ok: true,
            lines: vec![format!("unavailable, log panel will stay empty ({e})")],
        },
    });

    checks.push(match store.latest_sentiment().await {
        Ok(Some(s)) => TableCheck {
            table: MARKET_SENTIMENT,
            ok: true,
            lines: vec![format!(
                "latest risk = {}/100 ({}, band {})",
                s.risk_score,
                s.sentiment,
                RiskLevel::from_score(s.risk_score)
            )],
        },
        Ok(None) => TableCheck {
            table: MARKET_SENTIMENT,
            ok: false,
            lines: vec!["table exists but is empty".into()],
        },
        Err(e) => TableCheck {
            table: MARKET_SENTIMENT,
            ok: false,
            lines: vec![e.to_string()],
        },
    });

    VerifyReport { checks }
}
