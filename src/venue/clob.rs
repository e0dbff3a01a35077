//! REST-backed CLOB venue client.
//!
//! Thin adapter over the venue's HTTP API: book snapshots, open orders,
//! GTC placement, cancellation. Credentials are held for the process
//! lifetime; the derived API key is cached after the first successful
//! derivation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::auth::{l2_headers, ApiCreds};
use super::{ClobVenue, OrderArgs, PlaceResult, VenueError};
use crate::config::VenueCreds;
use crate::types::{BookSnapshot, RestingOrder, Side};

const CLOB_API_URL: &str = "https://clob.polymarket.com";
const DEFAULT_TICK: f64 = 0.01;
const HTTP_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Price levels arrive as strings on the wire.
#[derive(Debug, Deserialize)]
struct RawLevel {
    #[serde(default)]
    price: String,
    #[serde(default)]
    size: String,
}

#[derive(Debug, Deserialize)]
struct RawBook {
    #[serde(default)]
    bids: Vec<RawLevel>,
    #[serde(default)]
    asks: Vec<RawLevel>,
    #[serde(default)]
    tick_size: Option<String>,
    #[serde(default, rename = "min_tick_size")]
    min_tick_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLastTrade {
    #[serde(default)]
    price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOpenOrder {
    #[serde(default)]
    id: String,
    #[serde(default)]
    asset_id: String,
    #[serde(default)]
    side: String,
    #[serde(default)]
    price: String,
    #[serde(default, rename = "original_size")]
    original_size: String,
}

#[derive(Debug, Deserialize)]
struct RawPlaceResponse {
    #[serde(default, rename = "orderID")]
    order_id: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default, rename = "errorMsg")]
    error_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDerivedKey {
    #[serde(default, rename = "apiKey")]
    api_key: Option<String>,
    #[serde(default)]
    secret: Option<String>,
    #[serde(default)]
    passphrase: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ClobClient {
    http: Client,
    base: String,
    creds: VenueCreds,
    /// Derived or env-provisioned API credentials, cached after first use.
    api: RwLock<Option<ApiCreds>>,
}

impl ClobClient {
    pub fn new(creds: VenueCreds) -> Result<Self> {
        Self::with_base(creds, CLOB_API_URL)
    }

    pub fn with_base(creds: VenueCreds, base: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to build CLOB HTTP client")?;

        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            creds,
            api: RwLock::new(ApiCreds::from_env()),
        })
    }

    /// Current API credentials, deriving them from the venue on first use.
    async fn api_creds(&self) -> Result<ApiCreds> {
        if let Some(creds) = self.api.read().await.clone() {
            return Ok(creds);
        }

        let url = format!("{}/auth/derive-api-key", self.base);
        let resp = self
            .http
            .get(&url)
            .header("POLY_ADDRESS", &self.creds.funder_address)
            .send()
            .await
            .context("derive-api-key request failed")?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(VenueError::Http { status, body })
                .context("API key derivation rejected");
        }

        let raw: RawDerivedKey = resp
            .json()
            .await
            .context("Failed to parse derive-api-key response")?;
        let derived = match (raw.api_key, raw.secret, raw.passphrase) {
            (Some(key), Some(secret), Some(passphrase)) => ApiCreds {
                key,
                secret,
                passphrase,
            },
            _ => {
                return Err(VenueError::MissingCredentials(
                    "derive-api-key returned incomplete credentials".into(),
                )
                .into())
            }
        };

        *self.api.write().await = Some(derived.clone());
        debug!(key_prefix = %derived.key_prefix(), "API credentials derived");
        Ok(derived)
    }

    /// Authenticated request builder for one L2 call.
    async fn signed(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&str>,
    ) -> Result<reqwest::RequestBuilder> {
        let creds = self.api_creds().await?;
        let ts = Utc::now().timestamp();
        let headers = l2_headers(
            &self.creds.funder_address,
            &creds,
            ts,
            method.as_str(),
            path,
            body,
        )?;

        let mut req = self.http.request(method, format!("{}{}", self.base, path));
        for (name, value) in headers {
            req = req.header(name, value);
        }
        Ok(req)
    }

    fn parse_level(level: &RawLevel) -> Option<(f64, f64)> {
        let price = level.price.parse::<f64>().ok()?;
        let size = level.size.parse::<f64>().ok()?;
        if price > 0.0 && size > 0.0 {
            Some((price, size))
        } else {
            None
        }
    }

    fn book_from_raw(raw: RawBook) -> BookSnapshot {
        // Best bid is the highest bid, best ask the lowest ask; the wire
        // ordering is not guaranteed.
        let best_bid = raw
            .bids
            .iter()
            .filter_map(Self::parse_level)
            .max_by(|a, b| a.0.total_cmp(&b.0));
        let best_ask = raw
            .asks
            .iter()
            .filter_map(Self::parse_level)
            .min_by(|a, b| a.0.total_cmp(&b.0));

        let tick_size = raw
            .tick_size
            .or(raw.min_tick_size)
            .and_then(|t| t.parse::<f64>().ok())
            .filter(|t| *t > 0.0)
            .unwrap_or(DEFAULT_TICK);

        BookSnapshot {
            best_bid,
            best_ask,
            last_trade: None,
            tick_size,
        }
    }
}

#[async_trait]
impl ClobVenue for ClobClient {
    async fn api_key_prefix(&self) -> Result<String> {
        Ok(self.api_creds().await?.key_prefix())
    }

    async fn order_book(&self, token_id: &str) -> Result<BookSnapshot> {
        let url = format!("{}/book", self.base);
        let resp = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await
            .context("book request failed")?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(VenueError::Http { status, body }.into());
        }

        let raw: RawBook = resp.json().await.context("Failed to parse book")?;
        let mut book = Self::book_from_raw(raw);

        // A one-sided or empty book falls back to the last trade print
        // for mid derivation.
        if book.best_bid.is_none() || book.best_ask.is_none() {
            match self.last_trade_price(token_id).await {
                Ok(last) => book.last_trade = last,
                Err(e) => debug!(token_id, error = %e, "last-trade lookup failed"),
            }
        }

        Ok(book)
    }

    async fn open_orders(&self) -> Result<Vec<RestingOrder>> {
        let req = self.signed(reqwest::Method::GET, "/data/orders", None).await?;
        let resp = req.send().await.context("open-orders request failed")?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(VenueError::Http { status, body }.into());
        }

        let raw: Vec<RawOpenOrder> = resp
            .json()
            .await
            .context("Failed to parse open orders")?;

        let orders = raw
            .into_iter()
            .filter_map(|o| {
                let side = match o.side.to_uppercase().as_str() {
                    "BUY" => Side::Buy,
                    "SELL" => Side::Sell,
                    other => {
                        warn!(order_id = %o.id, side = other, "Unknown order side, skipping");
                        return None;
                    }
                };
                let price = o.price.parse::<f64>().ok()?;
                let size = o.original_size.parse::<f64>().ok()?;
                Some(RestingOrder {
                    id: o.id,
                    asset_id: o.asset_id,
                    side,
                    price,
                    size,
                })
            })
            .collect();

        Ok(orders)
    }

    async fn place_order(&self, args: &OrderArgs) -> Result<PlaceResult> {
        let body = serde_json::json!({
            "order": {
                "tokenID": args.token_id,
                "price": args.price,
                "size": args.size,
                "side": args.side.as_str(),
            },
            "options": {
                "tickSize": args.tick_size,
                "negRisk": args.neg_risk,
            },
            "orderType": "GTC",
            "owner": self.creds.funder_address,
        });
        let body_str = body.to_string();

        let req = self
            .signed(reqwest::Method::POST, "/order", Some(&body_str))
            .await?;
        let resp = req
            .header("Content-Type", "application/json")
            .body(body_str)
            .send()
            .await
            .context("order placement request failed")?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(VenueError::Http { status, body }.into());
        }

        let raw: RawPlaceResponse = resp
            .json()
            .await
            .context("Failed to parse placement response")?;

        if raw.success == Some(false) {
            anyhow::bail!(
                "venue rejected order: {}",
                raw.error_msg.unwrap_or_else(|| "no reason given".into())
            );
        }

        Ok(PlaceResult {
            order_id: raw.order_id,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let body = serde_json::json!({ "orderID": order_id }).to_string();
        let req = self
            .signed(reqwest::Method::DELETE, "/order", Some(&body))
            .await?;
        let resp = req
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .context("cancel request failed")?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(VenueError::Http { status, body }.into());
        }
        Ok(())
    }

    async fn cancel_all(&self) -> Result<()> {
        let req = self
            .signed(reqwest::Method::DELETE, "/cancel-all", None)
            .await?;
        let resp = req.send().await.context("cancel-all request failed")?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(VenueError::Http { status, body }.into());
        }
        Ok(())
    }

    async fn geoblock_probe(&self) -> Result<bool> {
        let resp = self
            .http
            .get(format!("{}/", self.base))
            .send()
            .await
            .context("geoblock probe failed")?;
        if resp.status().as_u16() == 403 {
            return Err(VenueError::Geoblocked.into());
        }
        Ok(resp.status().is_success())
    }
}

impl ClobClient {
    async fn last_trade_price(&self, token_id: &str) -> Result<Option<f64>> {
        let url = format!("{}/last-trade-price", self.base);
        let resp = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await
            .context("last-trade request failed")?;

        if !resp.status().is_success() {
            return Ok(None);
        }

        let raw: RawLastTrade = resp.json().await.unwrap_or(RawLastTrade { price: None });
        Ok(raw.price.and_then(|p| p.parse::<f64>().ok()).filter(|p| *p > 0.0))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
