//! Market catalog client.
//!
//! Fetches candidate markets from the catalog API, ordered by 24-hour
//! volume. Responses are parsed once, here, into typed rows; downstream
//! code never re-parses catalog JSON. Malformed rows are collected and
//! skipped with a per-record warning.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const CATALOG_API_URL: &str = "https://gamma-api.polymarket.com";
const HTTP_TIMEOUT_SECS: u64 = 10;

/// Maximum markets pulled per cycle, before any filtering.
pub const CATALOG_FETCH_LIMIT: u32 = 90;

// ---------------------------------------------------------------------------
// Typed catalog row
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CatalogMarket {
    #[serde(default, rename = "conditionId")]
    pub condition_id: String,
    #[serde(default)]
    pub question: String,
    /// Outcome token ids as a JSON-encoded string: "[\"123...\",\"456...\"]"
    #[serde(default, rename = "clobTokenIds")]
    pub clob_token_ids: Option<String>,
    #[serde(default, rename = "volume24hr")]
    pub volume_24hr: Option<f64>,
    #[serde(default, rename = "negRisk")]
    pub neg_risk: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub closed: bool,
    /// Sponsor-reward figures as they appear on catalog rows; field
    /// names vary across API revisions so all observed ones are kept.
    #[serde(default, rename = "rewardsDailyRate")]
    pub rewards_daily_rate: Option<f64>,
    #[serde(default, rename = "clobRewards")]
    pub clob_rewards: Option<Vec<ClobReward>>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClobReward {
    #[serde(default, rename = "rewardsDailyRate")]
    pub rewards_daily_rate: Option<f64>,
    #[serde(default, rename = "rewardsAmount")]
    pub rewards_amount: Option<f64>,
}

impl CatalogMarket {
    /// The YES outcome token id, parsed from the JSON-string-encoded
    /// id list. Malformed lists are a per-market recoverable error.
    pub fn yes_token_id(&self) -> Result<String> {
        let raw = self
            .clob_token_ids
            .as_deref()
            .context("catalog row has no clobTokenIds")?;

        let ids: Vec<String> = serde_json::from_str(raw)
            .with_context(|| format!("malformed clobTokenIds: {raw}"))?;

        ids.into_iter()
            .next()
            .filter(|id| !id.is_empty())
            .context("clobTokenIds is empty")
    }

    /// First positive sponsor figure found on the row itself, if any.
    pub fn sponsor_pool(&self) -> Option<f64> {
        if let Some(rate) = self.rewards_daily_rate.filter(|r| *r > 0.0) {
            return Some(rate);
        }
        self.clob_rewards.as_ref().and_then(|rewards| {
            rewards
                .iter()
                .flat_map(|r| [r.rewards_daily_rate, r.rewards_amount])
                .flatten()
                .find(|v| *v > 0.0)
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct CatalogClient {
    http: Client,
    base: String,
}

impl CatalogClient {
    pub fn new() -> Result<Self> {
        Self::with_base(CATALOG_API_URL)
    }

    pub fn with_base(base: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to build catalog HTTP client")?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch active markets ordered by 24h volume descending. If the
    /// ordered query fails, retry once without the ordering parameter
    /// (some catalog deployments reject it).
    pub async fn fetch_markets(&self, limit: u32) -> Result<Vec<CatalogMarket>> {
        match self.fetch(limit, true).await {
            Ok(markets) => Ok(markets),
            Err(e) => {
                warn!(error = %e, "Ordered catalog fetch failed, retrying unordered");
                self.fetch(limit, false).await
            }
        }
    }

    async fn fetch(&self, limit: u32, ordered: bool) -> Result<Vec<CatalogMarket>> {
        let url = format!("{}/markets", self.base);
        let limit_str = limit.to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("limit", limit_str.as_str()),
            ("active", "true"),
            ("closed", "false"),
        ];
        if ordered {
            query.push(("order", "volume24hr"));
            query.push(("ascending", "false"));
        }

        debug!(limit, ordered, "Fetching catalog markets");
        let resp = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .context("catalog request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("catalog API error {status}: {body}");
        }

        let rows: Vec<serde_json::Value> = resp
            .json()
            .await
            .context("Failed to parse catalog response")?;

        // Typed parse boundary: one bad row never sinks the fetch.
        let mut markets = Vec::with_capacity(rows.len());
        let mut parse_errors = 0usize;
        for row in rows {
            match serde_json::from_value::<CatalogMarket>(row) {
                Ok(m) if !m.condition_id.is_empty() && !m.question.is_empty() => {
                    markets.push(m)
                }
                Ok(m) => {
                    debug!(condition_id = %m.condition_id, "Skipping incomplete catalog row");
                    parse_errors += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Skipping malformed catalog row");
                    parse_errors += 1;
                }
            }
        }

        info!(
            count = markets.len(),
            skipped = parse_errors,
            "Catalog markets fetched"
        );
        Ok(markets)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
