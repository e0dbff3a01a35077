//! External spot-price oracle (advisory).
//!
//! When enabled, crypto-titled markets get a reference spot price from a
//! public exchange ticker. The figure is logged next to the book-derived
//! mid for observability; it never overrides the quoting mid.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;

use crate::keywords;

const SPOT_API_URL: &str = "https://api.binance.com";
const HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct RawTicker {
    #[serde(default)]
    price: String,
}

pub struct SpotClient {
    http: Client,
    base: String,
}

impl SpotClient {
    pub fn new() -> Result<Self> {
        Self::with_base(SPOT_API_URL)
    }

    pub fn with_base(base: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to build spot HTTP client")?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    /// Reference spot price for a market title, if it names a tracked
    /// crypto asset. `Ok(None)` when the title is not crypto.
    pub async fn price_for_title(&self, title: &str) -> Result<Option<f64>> {
        let Some(symbol) = keywords::spot_symbol(title) else {
            return Ok(None);
        };

        let url = format!("{}/api/v3/ticker/price", self.base);
        let resp = self
            .http
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .context("spot ticker request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("spot ticker error {}", resp.status());
        }

        let raw: RawTicker = resp.json().await.context("Failed to parse ticker")?;
        Ok(raw.price.parse::<f64>().ok().filter(|p| *p > 0.0))
    }
}
