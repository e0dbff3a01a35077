//! Engine configuration.
//!
//! The same recognized names exist in two flavors: camelCase request
//! parameters (web control surface, via serde) and `MAKER_*` environment
//! variables (headless deployment). Venue credentials are env-only and
//! never appear in request payloads.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Quoting configuration. May change between cycles.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MakerConfig {
    /// Per-order size in USDC.
    pub order_size: f64,
    /// Base half-spread in basis points, before adjustments.
    pub base_spread_bp: u32,
    pub interval_secs: u64,
    /// Markets quoted per cycle after selection.
    pub max_markets: usize,
    /// Per-market net position cap in USDC.
    pub max_position: f64,
    pub min_sponsor_pool: f64,
    pub min_liquidity_depth: f64,
    pub min_volume_24h: f64,
    pub total_capital: f64,
    /// Paper mode: no venue orders, probabilistic simulated fills.
    pub paper: bool,
    pub external_oracle: bool,
    pub aggressive_short_term: bool,
}

impl Default for MakerConfig {
    fn default() -> Self {
        Self {
            order_size: 10.0,
            base_spread_bp: 20,
            interval_secs: 60,
            max_markets: 8,
            max_position: 40.0,
            min_sponsor_pool: 0.0,
            min_liquidity_depth: 100.0,
            min_volume_24h: 500.0,
            total_capital: 100.0,
            paper: true,
            external_oracle: false,
            aggressive_short_term: false,
        }
    }
}

impl MakerConfig {
    /// Build from `MAKER_*` environment variables, defaulting anything
    /// unset.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            order_size: env_f64("MAKER_ORDER_SIZE", d.order_size),
            base_spread_bp: env_u64("MAKER_BASE_SPREAD_BP", d.base_spread_bp as u64) as u32,
            interval_secs: env_u64("MAKER_INTERVAL_SECS", d.interval_secs).max(1),
            max_markets: env_u64("MAKER_MAX_MARKETS", d.max_markets as u64) as usize,
            max_position: env_f64("MAKER_MAX_POSITION", d.max_position),
            min_sponsor_pool: env_f64("MAKER_MIN_SPONSOR_POOL", d.min_sponsor_pool),
            min_liquidity_depth: env_f64("MAKER_MIN_LIQUIDITY", d.min_liquidity_depth),
            min_volume_24h: env_f64("MAKER_MIN_VOLUME_24H", d.min_volume_24h),
            total_capital: env_f64("MAKER_TOTAL_CAPITAL", d.total_capital),
            paper: env_bool("MAKER_PAPER", d.paper),
            external_oracle: env_bool("MAKER_EXTERNAL_ORACLE", d.external_oracle),
            aggressive_short_term: env_bool("MAKER_AGGRESSIVE_SHORT_TERM", d.aggressive_short_term),
        }
    }

    /// Apply the capital caps: order size ≤ 8% of capital (min 1),
    /// max position ≤ 48% of capital. Returns the clamped copy.
    pub fn normalized(&self) -> Self {
        let mut cfg = self.clone();
        let size_cap = (0.08 * cfg.total_capital).floor().max(1.0);
        if cfg.order_size > size_cap {
            cfg.order_size = size_cap;
        }
        let pos_cap = (0.48 * cfg.total_capital).floor();
        if cfg.max_position > pos_cap {
            cfg.max_position = pos_cap;
        }
        cfg
    }

    /// Number of pre-filtered candidates carried into enrichment.
    pub fn enrich_cap(&self) -> usize {
        (3 * self.max_markets).min(50)
    }
}

/// Venue signing credentials, env-only.
#[derive(Debug, Clone)]
pub struct VenueCreds {
    pub private_key: String,
    pub funder_address: String,
    pub signature_type: u8,
}

impl VenueCreds {
    /// Missing signer key is an unrecoverable init failure.
    pub fn from_env() -> Result<Self> {
        let private_key =
            std::env::var("PM_PRIVATE_KEY").context("PM_PRIVATE_KEY not set")?;
        let funder_address = std::env::var("PM_FUNDER_ADDRESS").unwrap_or_default();
        let signature_type = std::env::var("PM_SIGNATURE_TYPE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Ok(Self {
            private_key,
            funder_address,
            signature_type,
        })
    }
}

/// SQLite path for the persistent store.
pub fn db_path_from_env() -> String {
    std::env::var("MAKER_DB_PATH").unwrap_or_else(|_| "polymaker.db".to_string())
}

fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = MakerConfig::default();
        assert!(cfg.order_size > 0.0);
        assert!(cfg.base_spread_bp >= 5 && cfg.base_spread_bp <= 60);
        assert!(cfg.paper);
    }

    #[test]
    fn test_request_params_camel_case() {
        let cfg: MakerConfig = serde_json::from_value(serde_json::json!({
            "orderSize": 5.0,
            "baseSpreadBp": 22,
            "maxMarkets": 3,
            "paper": false
        }))
        .unwrap();
        assert_eq!(cfg.order_size, 5.0);
        assert_eq!(cfg.base_spread_bp, 22);
        assert_eq!(cfg.max_markets, 3);
        assert!(!cfg.paper);
        // Unspecified fields fall back to defaults.
        assert_eq!(cfg.interval_secs, MakerConfig::default().interval_secs);
    }

    #[test]
    fn test_normalized_clamps_order_size() {
        let cfg = MakerConfig {
            order_size: 50.0,
            total_capital: 100.0,
            ..Default::default()
        };
        // 8% of 100 = 8
        assert_eq!(cfg.normalized().order_size, 8.0);
    }

    #[test]
    fn test_normalized_order_size_floor_one() {
        let cfg = MakerConfig {
            order_size: 5.0,
            total_capital: 10.0,
            ..Default::default()
        };
        // floor(0.8) = 0, raised to the minimum of 1
        assert_eq!(cfg.normalized().order_size, 1.0);
    }

    #[test]
    fn test_normalized_clamps_max_position() {
        let cfg = MakerConfig {
            max_position: 100.0,
            total_capital: 100.0,
            ..Default::default()
        };
        assert_eq!(cfg.normalized().max_position, 48.0);
    }

    #[test]
    fn test_normalized_leaves_compliant_values() {
        let cfg = MakerConfig {
            order_size: 5.0,
            max_position: 30.0,
            total_capital: 100.0,
            ..Default::default()
        };
        let norm = cfg.normalized();
        assert_eq!(norm.order_size, 5.0);
        assert_eq!(norm.max_position, 30.0);
    }

    #[test]
    fn test_enrich_cap_bounds() {
        let mut cfg = MakerConfig {
            max_markets: 8,
            ..Default::default()
        };
        assert_eq!(cfg.enrich_cap(), 24);
        cfg.max_markets = 30;
        assert_eq!(cfg.enrich_cap(), 50);
    }
}
