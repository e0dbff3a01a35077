//! Shared types for the quoting engine.
//!
//! These form the data model used across all modules: the per-cycle
//! market candidate, book snapshots, resting orders, and the audit
//! trade-log entry. Venue and engine modules depend on them without
//! circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Order side
// ---------------------------------------------------------------------------

/// Order side, venue wire format ("BUY" / "SELL").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

/// How the mid-price of a candidate was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidSource {
    Orderbook,
    LastTrade,
    BidOnly,
    AskOnly,
    Empty,
}

impl MidSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MidSource::Orderbook => "orderbook",
            MidSource::LastTrade => "last_trade",
            MidSource::BidOnly => "bid_only",
            MidSource::AskOnly => "ask_only",
            MidSource::Empty => "empty",
        }
    }
}

impl fmt::Display for MidSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One price level: (price, size).
pub type Level = (f64, f64);

/// Top-of-book snapshot for a single outcome token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub best_bid: Option<Level>,
    pub best_ask: Option<Level>,
    pub last_trade: Option<f64>,
    /// Minimum price increment. Venue default when absent is 0.01.
    pub tick_size: f64,
}

impl BookSnapshot {
    /// Derive the mid-price with the source precedence:
    /// both sides → midpoint, else last trade, else bid, else ask, else 0.
    pub fn derive_mid(&self) -> (f64, MidSource) {
        match (self.best_bid, self.best_ask) {
            (Some((bid, _)), Some((ask, _))) => ((bid + ask) / 2.0, MidSource::Orderbook),
            _ => {
                if let Some(last) = self.last_trade {
                    (last, MidSource::LastTrade)
                } else if let Some((bid, _)) = self.best_bid {
                    (bid, MidSource::BidOnly)
                } else if let Some((ask, _)) = self.best_ask {
                    (ask, MidSource::AskOnly)
                } else {
                    (0.0, MidSource::Empty)
                }
            }
        }
    }

    /// Notional depth resting at the top of the book (both sides, USDC).
    pub fn depth(&self) -> f64 {
        let bid = self.best_bid.map(|(p, s)| p * s).unwrap_or(0.0);
        let ask = self.best_ask.map(|(p, s)| p * s).unwrap_or(0.0);
        bid + ask
    }

    /// Bid-ask spread as a fraction of the mid. 0 when the book is not
    /// two-sided.
    pub fn spread_ratio(&self) -> f64 {
        if let (Some((bid, _)), Some((ask, _))) = (self.best_bid, self.best_ask) {
            let mid = (bid + ask) / 2.0;
            if mid > 0.0 {
                return (ask - bid) / mid;
            }
        }
        0.0
    }
}

// ---------------------------------------------------------------------------
// Sponsor pool
// ---------------------------------------------------------------------------

/// Which lookup path produced the sponsor pool figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SponsorMethod {
    Catalog,
    Condition,
    Token,
    Scan,
    Keyword,
    None,
}

impl SponsorMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SponsorMethod::Catalog => "catalog",
            SponsorMethod::Condition => "condition",
            SponsorMethod::Token => "token",
            SponsorMethod::Scan => "scan",
            SponsorMethod::Keyword => "keyword",
            SponsorMethod::None => "none",
        }
    }
}

impl fmt::Display for SponsorMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sponsor pool amount plus the lookup path that found it.
#[derive(Debug, Clone, Copy)]
pub struct SponsorInfo {
    pub pool: f64,
    pub method: SponsorMethod,
}

impl SponsorInfo {
    pub fn none() -> Self {
        Self {
            pool: 0.0,
            method: SponsorMethod::None,
        }
    }
}

// ---------------------------------------------------------------------------
// Market candidate
// ---------------------------------------------------------------------------

/// A fully enriched quoting candidate. Created by the enricher, consumed
/// by the selector and quoter, discarded at cycle end.
#[derive(Debug, Clone)]
pub struct MarketCandidate {
    pub condition_id: String,
    /// CLOB token id of the YES outcome.
    pub token_id: String,
    pub neg_risk: bool,
    pub title: String,
    pub volume_24h: f64,
    pub book: BookSnapshot,
    pub mid: f64,
    pub mid_source: MidSource,
    /// Bid-ask spread / mid, as a fraction.
    pub spread_ratio: f64,
    /// Spread ratio expressed in percent; feeds the volatility spread
    /// adjustment.
    pub range1h: f64,
    pub tick_size: f64,
    pub sponsor_pool: f64,
    pub sponsor_method: SponsorMethod,
    pub category: String,
    /// Keyword + sponsor score delta, set by the enricher.
    pub category_bonus: f64,
    pub tier1: bool,
    pub score: f64,
}

impl fmt::Display for MarketCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (mid {:.3} [{}] | vol ${:.0} | depth ${:.0} | sponsor ${:.0} [{}] | {} | score {:.0})",
            self.title,
            self.mid,
            self.mid_source,
            self.volume_24h,
            self.book.depth(),
            self.sponsor_pool,
            self.sponsor_method,
            self.category,
            self.score,
        )
    }
}

// ---------------------------------------------------------------------------
// Resting orders
// ---------------------------------------------------------------------------

/// An open order fetched from the venue, as seen by the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestingOrder {
    pub id: String,
    pub asset_id: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
}

// ---------------------------------------------------------------------------
// Trade log
// ---------------------------------------------------------------------------

/// Trade log action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Place,
    Cancel,
    Error,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Place => "place",
            TradeAction::Cancel => "cancel",
            TradeAction::Error => "error",
        }
    }
}

/// One append-only trade log row. Never mutated after insert.
#[derive(Debug, Clone, Serialize)]
pub struct TradeLogEntry {
    pub ts: DateTime<Utc>,
    pub market_id: String,
    pub market_name: String,
    pub action: TradeAction,
    pub side: Option<Side>,
    pub price: f64,
    pub size: f64,
    pub paper: bool,
    /// Structured payload: event type, order id, latency, error text.
    pub note: serde_json::Value,
}

impl TradeLogEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        market_id: &str,
        market_name: &str,
        action: TradeAction,
        side: Option<Side>,
        price: f64,
        size: f64,
        paper: bool,
        note: serde_json::Value,
    ) -> Self {
        Self {
            ts: Utc::now(),
            market_id: market_id.to_string(),
            market_name: market_name.to_string(),
            action,
            side,
            price,
            size,
            paper,
            note,
        }
    }
}

// ---------------------------------------------------------------------------
// Error shaping
// ---------------------------------------------------------------------------

/// Normalize any error chain into a single human-readable string.
///
/// Every error that feeds the trade log passes through here so the log
/// stays stable for querying. Walks the source chain and joins the
/// distinct messages; never returns an empty string.
pub fn err_string(err: &anyhow::Error) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let msg = cause.to_string();
        if !msg.is_empty() && parts.last().map(|p| p != &msg).unwrap_or(true) {
            parts.push(msg);
        }
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(": ")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn two_sided(bid: f64, ask: f64) -> BookSnapshot {
        BookSnapshot {
            best_bid: Some((bid, 100.0)),
            best_ask: Some((ask, 100.0)),
            last_trade: Some(0.5),
            tick_size: 0.01,
        }
    }

    #[test]
    fn test_side_display_and_opposite() {
        assert_eq!(Side::Buy.as_str(), "BUY");
        assert_eq!(Side::Sell.as_str(), "SELL");
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_side_serde_wire_format() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"BUY\"");
        let s: Side = serde_json::from_str("\"SELL\"").unwrap();
        assert_eq!(s, Side::Sell);
    }

    #[test]
    fn test_mid_from_two_sided_book() {
        let (mid, source) = two_sided(0.40, 0.44).derive_mid();
        assert!((mid - 0.42).abs() < 1e-12);
        assert_eq!(source, MidSource::Orderbook);
    }

    #[test]
    fn test_mid_falls_back_to_last_trade() {
        let book = BookSnapshot {
            best_bid: None,
            best_ask: None,
            last_trade: Some(0.37),
            tick_size: 0.01,
        };
        let (mid, source) = book.derive_mid();
        assert!((mid - 0.37).abs() < 1e-12);
        assert_eq!(source, MidSource::LastTrade);
    }

    #[test]
    fn test_mid_one_sided_books() {
        let bid_only = BookSnapshot {
            best_bid: Some((0.30, 10.0)),
            ..Default::default()
        };
        assert_eq!(bid_only.derive_mid(), (0.30, MidSource::BidOnly));

        let ask_only = BookSnapshot {
            best_ask: Some((0.70, 10.0)),
            ..Default::default()
        };
        assert_eq!(ask_only.derive_mid(), (0.70, MidSource::AskOnly));
    }

    #[test]
    fn test_mid_empty_book() {
        let (mid, source) = BookSnapshot::default().derive_mid();
        assert_eq!(mid, 0.0);
        assert_eq!(source, MidSource::Empty);
    }

    #[test]
    fn test_last_trade_beats_one_sided_book() {
        // Precedence: last trade outranks a bid-only book.
        let book = BookSnapshot {
            best_bid: Some((0.30, 10.0)),
            best_ask: None,
            last_trade: Some(0.55),
            tick_size: 0.01,
        };
        assert_eq!(book.derive_mid(), (0.55, MidSource::LastTrade));
    }

    #[test]
    fn test_depth_sums_both_sides() {
        let book = two_sided(0.40, 0.60);
        // 0.40*100 + 0.60*100
        assert!((book.depth() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_spread_ratio() {
        let book = two_sided(0.45, 0.55);
        assert!((book.spread_ratio() - 0.2).abs() < 1e-9);
        assert_eq!(BookSnapshot::default().spread_ratio(), 0.0);
    }

    #[test]
    fn test_mid_source_tags() {
        assert_eq!(MidSource::Orderbook.as_str(), "orderbook");
        assert_eq!(MidSource::LastTrade.as_str(), "last_trade");
        assert_eq!(MidSource::Empty.as_str(), "empty");
    }

    #[test]
    fn test_sponsor_method_tags() {
        assert_eq!(SponsorMethod::Catalog.as_str(), "catalog");
        assert_eq!(SponsorMethod::Keyword.as_str(), "keyword");
        assert_eq!(SponsorInfo::none().pool, 0.0);
        assert_eq!(SponsorInfo::none().method, SponsorMethod::None);
    }

    #[test]
    fn test_trade_action_tags() {
        assert_eq!(TradeAction::Place.as_str(), "place");
        assert_eq!(TradeAction::Cancel.as_str(), "cancel");
        assert_eq!(TradeAction::Error.as_str(), "error");
    }

    #[test]
    fn test_err_string_single() {
        let e = anyhow::anyhow!("boom");
        assert_eq!(err_string(&e), "boom");
    }

    #[test]
    fn test_err_string_chain() {
        let e = anyhow::anyhow!("root cause");
        let e = e.context("while placing order");
        let s = err_string(&e);
        assert!(s.contains("while placing order"));
        assert!(s.contains("root cause"));
    }

    #[test]
    fn test_err_string_never_empty() {
        let e = anyhow::anyhow!("");
        assert_eq!(err_string(&e), "unknown error");
    }

    #[test]
    fn test_trade_log_entry_note_payload() {
        let entry = TradeLogEntry::new(
            "0xc1",
            "Test market",
            TradeAction::Place,
            Some(Side::Buy),
            0.39,
            10.0,
            false,
            serde_json::json!({"event": "order_placed", "latency_ms": 42}),
        );
        assert_eq!(entry.action, TradeAction::Place);
        assert_eq!(entry.note["latency_ms"], 42);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("order_placed"));
    }
}
