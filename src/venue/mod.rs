//! Venue integration.
//!
//! Defines the `ClobVenue` trait — the capabilities the quoting core
//! consumes from the exchange — and provides the REST-backed client plus
//! the catalog, rewards, and spot-oracle lookups. The venue owns
//! matching; this layer only snapshots books and manages resting orders.

pub mod auth;
pub mod catalog;
pub mod clob;
pub mod rewards;
pub mod spot;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{BookSnapshot, RestingOrder, Side};

/// Errors the venue layer distinguishes beyond a plain anyhow chain.
#[derive(Debug, thiserror::Error)]
pub enum VenueError {
    #[error("missing venue credentials: {0}")]
    MissingCredentials(String),

    #[error("venue HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("access blocked by venue geo policy")]
    Geoblocked,
}

/// Arguments for a GTC limit order placement.
#[derive(Debug, Clone)]
pub struct OrderArgs {
    pub token_id: String,
    pub price: f64,
    pub size: f64,
    pub side: Side,
    /// Venue-side options.
    pub tick_size: f64,
    pub neg_risk: bool,
}

/// Result of a placement attempt.
#[derive(Debug, Clone, Default)]
pub struct PlaceResult {
    pub order_id: Option<String>,
}

/// Abstraction over the venue CLOB client.
///
/// The engine holds this behind `Arc<dyn ClobVenue>` so integration tests
/// can substitute an in-memory venue.
#[async_trait]
pub trait ClobVenue: Send + Sync {
    /// Derive (or confirm) API credentials; returns the truncated key
    /// prefix for diagnostics.
    async fn api_key_prefix(&self) -> Result<String>;

    /// Top-of-book snapshot for an outcome token.
    async fn order_book(&self, token_id: &str) -> Result<BookSnapshot>;

    /// All open orders for the account.
    async fn open_orders(&self) -> Result<Vec<RestingOrder>>;

    /// Place a GTC limit order.
    async fn place_order(&self, args: &OrderArgs) -> Result<PlaceResult>;

    /// Cancel a single order by id.
    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    /// Cancel every resting order for the account.
    async fn cancel_all(&self) -> Result<()>;

    /// Whether the venue is reachable and not geo-blocking us.
    async fn geoblock_probe(&self) -> Result<bool>;
}
