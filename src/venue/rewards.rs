//! Layered sponsor-pool lookup.
//!
//! The rewards data lives in several places depending on API revision:
//! the catalog row itself, `/rewards?condition_id=`, `/rewards?token_id=`,
//! and the bulk `/rewards/markets` listing. Field names vary across those
//! shapes, so extraction treats them as a union and accepts the first
//! positive value. Every path is tagged with a method for observability.

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::keywords;
use crate::types::{SponsorInfo, SponsorMethod};

const REWARDS_API_URL: &str = "https://clob.polymarket.com";
const HTTP_TIMEOUT_SECS: u64 = 10;

/// Field names observed carrying a sponsor amount, across all endpoint
/// revisions. `max_spread_bps` and friends are deliberately absent: a
/// payload with only spread parameters has no pool.
const POOL_FIELDS: &[&str] = &[
    "rate_per_day",
    "rewards_daily_rate",
    "rewardsDailyRate",
    "daily_rate",
    "rewards_amount",
    "rewardsAmount",
    "amount",
];

/// Pull the first positive pool figure out of a rewards payload.
/// Handles flat objects, `{rewards: {...}}` wrappers, and arrays.
pub fn extract_pool(value: &Value) -> Option<f64> {
    match value {
        Value::Object(map) => {
            for field in POOL_FIELDS {
                if let Some(v) = map.get(*field).and_then(Value::as_f64) {
                    if v > 0.0 {
                        return Some(v);
                    }
                }
            }
            // Nested shapes: {rewards: {...}} or {data: [...]}
            for key in ["rewards", "data", "markets"] {
                if let Some(inner) = map.get(key) {
                    if let Some(v) = extract_pool(inner) {
                        return Some(v);
                    }
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(extract_pool),
        _ => None,
    }
}

pub struct RewardsClient {
    http: Client,
    base: String,
}

impl RewardsClient {
    pub fn new() -> Result<Self> {
        Self::with_base(REWARDS_API_URL)
    }

    pub fn with_base(base: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to build rewards HTTP client")?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    /// Full layered lookup. `catalog_pool` is the figure already present
    /// on the catalog row, if any; it short-circuits the HTTP paths.
    pub async fn lookup(
        &self,
        catalog_pool: Option<f64>,
        condition_id: &str,
        token_id: &str,
        title: &str,
    ) -> SponsorInfo {
        if let Some(pool) = catalog_pool.filter(|p| *p > 0.0) {
            return SponsorInfo {
                pool,
                method: SponsorMethod::Catalog,
            };
        }

        if let Some(pool) = self.query(&[("condition_id", condition_id)]).await {
            return SponsorInfo {
                pool,
                method: SponsorMethod::Condition,
            };
        }

        if let Some(pool) = self.query(&[("token_id", token_id)]).await {
            return SponsorInfo {
                pool,
                method: SponsorMethod::Token,
            };
        }

        if let Some(pool) = self.scan_markets(condition_id, token_id).await {
            return SponsorInfo {
                pool,
                method: SponsorMethod::Scan,
            };
        }

        if let Some(pool) = keywords::forced_sponsor(title) {
            return SponsorInfo {
                pool,
                method: SponsorMethod::Keyword,
            };
        }

        SponsorInfo::none()
    }

    /// One `/rewards` query; lookup failures degrade to "no pool".
    async fn query(&self, params: &[(&str, &str)]) -> Option<f64> {
        let url = format!("{}/rewards", self.base);
        let resp = match self.http.get(&url).query(params).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(status = %r.status(), ?params, "rewards query rejected");
                return None;
            }
            Err(e) => {
                debug!(error = %e, ?params, "rewards query failed");
                return None;
            }
        };

        let body: Value = resp.json().await.ok()?;
        extract_pool(&body)
    }

    /// Scan the bulk listing for a row matching either id.
    async fn scan_markets(&self, condition_id: &str, token_id: &str) -> Option<f64> {
        let url = format!("{}/rewards/markets", self.base);
        let resp = match self.http.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            _ => return None,
        };

        let body: Value = resp.json().await.ok()?;
        let rows = body.as_array().or_else(|| body.get("data")?.as_array())?;

        rows.iter()
            .find(|row| {
                ["condition_id", "conditionId", "token_id", "asset_id", "market"]
                    .iter()
                    .filter_map(|f| row.get(*f))
                    .filter_map(Value::as_str)
                    .any(|id| id == condition_id || id == token_id)
            })
            .and_then(extract_pool)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
