//! Persistence layer.
//!
//! SQLite store holding the three durable tables — net positions keyed
//! by market, one daily-PnL row per UTC date, and the append-only trade
//! log — plus a view adding a running cumulative-PnL column. The engine
//! is the single writer; the control API reads concurrently, so every
//! write is an atomic row-level upsert.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::types::TradeLogEntry;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// One daily-PnL row.
#[derive(Debug, Clone, Serialize)]
pub struct DailyPnl {
    pub date: String,
    pub realized_pnl: f64,
    pub total_capital: f64,
    pub trade_count: i64,
    pub circuit_breaker_triggered: bool,
}

/// Daily row plus the view's running cumulative column.
#[derive(Debug, Clone, Serialize)]
pub struct DailyPnlCumulative {
    #[serde(flatten)]
    pub row: DailyPnl,
    pub cumulative_pnl: f64,
}

/// A persisted trade-log row, as read back for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct TradeLogRow {
    pub ts: String,
    pub market_id: String,
    pub market_name: String,
    pub action: String,
    pub side: Option<String>,
    pub price: f64,
    pub size: f64,
    pub paper: bool,
    pub note: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Shared handle to the SQLite store. Cheap to clone; constructed once
/// per process.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open store at {path}"))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        info!(path, "Store opened");
        Ok(store)
    }

    /// In-memory store for tests and throwaway deployments. State does
    /// not survive restarts.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS positions (
                market_id    TEXT PRIMARY KEY,
                net_position REAL NOT NULL DEFAULT 0,
                updated_at   TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS daily_pnl (
                date                      TEXT PRIMARY KEY,
                realized_pnl              REAL NOT NULL DEFAULT 0,
                total_capital             REAL NOT NULL DEFAULT 0,
                trade_count               INTEGER NOT NULL DEFAULT 0,
                circuit_breaker_triggered INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS trade_log (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                ts          TEXT NOT NULL,
                market_id   TEXT NOT NULL,
                market_name TEXT NOT NULL,
                action      TEXT NOT NULL,
                side        TEXT,
                price       REAL NOT NULL DEFAULT 0,
                size        REAL NOT NULL DEFAULT 0,
                paper       INTEGER NOT NULL DEFAULT 0,
                note        TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_trade_log_ts ON trade_log(ts DESC);
            CREATE VIEW IF NOT EXISTS daily_pnl_cumulative AS
                SELECT date, realized_pnl, total_capital, trade_count,
                       circuit_breaker_triggered,
                       SUM(realized_pnl) OVER (ORDER BY date) AS cumulative_pnl
                FROM daily_pnl;",
        )
        .context("Store migration failed")?;
        Ok(())
    }

    /// Today's daily-PnL key (UTC calendar date).
    pub fn today() -> String {
        Self::day_key(Utc::now().date_naive())
    }

    pub fn day_key(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    // -- Daily PnL --------------------------------------------------------

    /// Read one daily row, if it exists.
    pub fn daily_row(&self, date: &str) -> Result<Option<DailyPnl>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT date, realized_pnl, total_capital, trade_count,
                    circuit_breaker_triggered
             FROM daily_pnl WHERE date = ?1",
            params![date],
            |row| {
                Ok(DailyPnl {
                    date: row.get(0)?,
                    realized_pnl: row.get(1)?,
                    total_capital: row.get(2)?,
                    trade_count: row.get(3)?,
                    circuit_breaker_triggered: row.get::<_, i64>(4)? != 0,
                })
            },
        )
        .optional()
        .context("daily_pnl read failed")
    }

    /// Add realized PnL for a date, creating the row lazily. Atomic.
    pub fn add_realized(&self, date: &str, delta: f64, total_capital: f64) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO daily_pnl (date, realized_pnl, total_capital)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(date) DO UPDATE SET
                     realized_pnl = realized_pnl + excluded.realized_pnl,
                     total_capital = excluded.total_capital",
                params![date, delta, total_capital],
            )
            .context("daily_pnl upsert failed")?;
        Ok(())
    }

    /// Bump the monotone trade counter for a date. Atomic.
    pub fn bump_trades(&self, date: &str, count: i64) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO daily_pnl (date, trade_count) VALUES (?1, ?2)
                 ON CONFLICT(date) DO UPDATE SET
                     trade_count = trade_count + excluded.trade_count",
                params![date, count],
            )
            .context("trade_count upsert failed")?;
        Ok(())
    }

    /// Latch the circuit breaker for a date. Latches only — there is no
    /// un-latch path; a new calendar date starts clean.
    pub fn latch_breaker(&self, date: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO daily_pnl (date, circuit_breaker_triggered)
                 VALUES (?1, 1)
                 ON CONFLICT(date) DO UPDATE SET circuit_breaker_triggered = 1",
                params![date],
            )
            .context("breaker latch failed")?;
        warn!(date, "Circuit breaker latched for the day");
        Ok(())
    }

    /// Most recent daily rows (up to `limit`) with the cumulative
    /// column, in chronological order.
    pub fn pnl_history(&self, limit: i64) -> Result<Vec<DailyPnlCumulative>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT date, realized_pnl, total_capital, trade_count,
                    circuit_breaker_triggered, cumulative_pnl
             FROM daily_pnl_cumulative
             ORDER BY date DESC LIMIT ?1",
        )?;
        let mut rows: Vec<DailyPnlCumulative> = stmt
            .query_map(params![limit], |row| {
                Ok(DailyPnlCumulative {
                    row: DailyPnl {
                        date: row.get(0)?,
                        realized_pnl: row.get(1)?,
                        total_capital: row.get(2)?,
                        trade_count: row.get(3)?,
                        circuit_breaker_triggered: row.get::<_, i64>(4)? != 0,
                    },
                    cumulative_pnl: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()
            .context("pnl history read failed")?;
        rows.reverse();
        Ok(rows)
    }

    // -- Positions --------------------------------------------------------

    /// Net position for one market; 0 when unknown.
    pub fn net_position(&self, market_id: &str) -> Result<f64> {
        let conn = self.conn();
        let pos: Option<f64> = conn
            .query_row(
                "SELECT net_position FROM positions WHERE market_id = ?1",
                params![market_id],
                |row| row.get(0),
            )
            .optional()
            .context("position read failed")?;
        Ok(pos.unwrap_or(0.0))
    }

    /// All stored positions.
    pub fn positions(&self) -> Result<Vec<(String, f64)>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT market_id, net_position FROM positions ORDER BY market_id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()
            .context("positions read failed")?;
        Ok(rows)
    }

    /// Set a position outright. Atomic upsert.
    pub fn set_position(&self, market_id: &str, value: f64) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO positions (market_id, net_position, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(market_id) DO UPDATE SET
                     net_position = excluded.net_position,
                     updated_at = excluded.updated_at",
                params![market_id, value, Utc::now().to_rfc3339()],
            )
            .context("position upsert failed")?;
        Ok(())
    }

    /// Apply a signed fill delta to a position. Atomic upsert.
    pub fn adjust_position(&self, market_id: &str, delta: f64) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO positions (market_id, net_position, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(market_id) DO UPDATE SET
                     net_position = net_position + excluded.net_position,
                     updated_at = excluded.updated_at",
                params![market_id, delta, Utc::now().to_rfc3339()],
            )
            .context("position adjust failed")?;
        Ok(())
    }

    /// Zero every stored position. Control-surface reset.
    pub fn reset_positions(&self) -> Result<usize> {
        let n = self
            .conn()
            .execute(
                "UPDATE positions SET net_position = 0, updated_at = ?1",
                params![Utc::now().to_rfc3339()],
            )
            .context("position reset failed")?;
        Ok(n)
    }

    /// Zero positions whose magnitude exceeds `cap`; recovery from
    /// historical drift. Returns what was zeroed.
    pub fn zero_oversized(&self, cap: f64) -> Result<Vec<(String, f64)>> {
        let oversized: Vec<(String, f64)> = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT market_id, net_position FROM positions
                 WHERE ABS(net_position) > ?1",
            )?;
            let rows = stmt
                .query_map(params![cap], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<_, _>>()
                .context("oversized scan failed")?;
            rows
        };

        for (market_id, pos) in &oversized {
            warn!(market_id = %market_id, position = pos, cap, "Zeroing oversized position");
            self.set_position(market_id, 0.0)?;
        }
        Ok(oversized)
    }

    // -- Trade log --------------------------------------------------------

    /// Append one trade-log row. Rows are never mutated after insert.
    pub fn log_trade(&self, entry: &TradeLogEntry) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO trade_log
                 (ts, market_id, market_name, action, side, price, size, paper, note)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.ts.to_rfc3339(),
                    entry.market_id,
                    entry.market_name,
                    entry.action.as_str(),
                    entry.side.map(|s| s.as_str()),
                    entry.price,
                    entry.size,
                    entry.paper as i64,
                    entry.note.to_string(),
                ],
            )
            .context("trade log append failed")?;
        debug!(market = %entry.market_id, action = entry.action.as_str(), "Trade logged");
        Ok(())
    }

    /// Most recent trade-log rows, newest first. `live_only` filters out
    /// paper entries.
    pub fn recent_trades(&self, limit: i64, live_only: bool) -> Result<Vec<TradeLogRow>> {
        let conn = self.conn();
        let sql = if live_only {
            "SELECT ts, market_id, market_name, action, side, price, size, paper, note
             FROM trade_log WHERE paper = 0 ORDER BY id DESC LIMIT ?1"
        } else {
            "SELECT ts, market_id, market_name, action, side, price, size, paper, note
             FROM trade_log ORDER BY id DESC LIMIT ?1"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![limit], |row| {
                let note: Option<String> = row.get(8)?;
                Ok(TradeLogRow {
                    ts: row.get(0)?,
                    market_id: row.get(1)?,
                    market_name: row.get(2)?,
                    action: row.get(3)?,
                    side: row.get(4)?,
                    price: row.get(5)?,
                    size: row.get(6)?,
                    paper: row.get::<_, i64>(7)? != 0,
                    note: note
                        .and_then(|n| serde_json::from_str(&n).ok())
                        .unwrap_or(serde_json::Value::Null),
                })
            })?
            .collect::<std::result::Result<_, _>>()
            .context("trade log read failed")?;
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
