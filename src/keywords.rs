//! Static keyword tables for market classification.
//!
//! The tables are data, not code: the enricher matches titles against
//! them case-insensitively and the selector consumes the resulting
//! bonus/label/tier signals. Keep additions here, not inline in the
//! pipeline.

/// Absolute-priority names. A Tier-1 match multiplies the whole
/// composite score by 4.
pub const TIER1: &[&str] = &[
    "presidential election",
    "fomc",
    "rate cut",
    "rate hike",
    "super bowl",
    "world cup final",
    "bitcoin above",
    "ethereum above",
];

/// Macro / crypto / sports names, each with its category label.
pub const TIER2: &[(&str, &str)] = &[
    ("inflation", "macro"),
    ("cpi", "macro"),
    ("gdp", "macro"),
    ("recession", "macro"),
    ("fed", "macro"),
    ("tariff", "macro"),
    ("bitcoin", "crypto"),
    ("btc", "crypto"),
    ("ethereum", "crypto"),
    ("eth", "crypto"),
    ("solana", "crypto"),
    ("crypto", "crypto"),
    ("nba", "sports"),
    ("nfl", "sports"),
    ("mlb", "sports"),
    ("nhl", "sports"),
    ("premier league", "sports"),
    ("champions league", "sports"),
    ("ufc", "sports"),
    ("grand prix", "sports"),
];

/// Long-horizon names that rarely trade and tie up inventory.
pub const NEGATIVE: &[&str] = &[
    "by 2030",
    "by 2035",
    "by 2040",
    "by 2050",
    "before 2030",
    "this decade",
    "within 10 years",
];

/// Titles the rewards endpoints chronically miss; each forces a small
/// nominal sponsor pool so the market is not filtered out.
pub const FORCE_SPONSOR: &[(&str, f64)] = &[
    ("bitcoin", 50.0),
    ("ethereum", 50.0),
    ("fed", 50.0),
    ("presidential election", 50.0),
];

/// Crypto title → spot-exchange ticker symbol, for the advisory oracle.
pub const CRYPTO_SPOT: &[(&str, &str)] = &[
    ("bitcoin", "BTCUSDT"),
    ("btc", "BTCUSDT"),
    ("ethereum", "ETHUSDT"),
    ("eth", "ETHUSDT"),
    ("solana", "SOLUSDT"),
    ("xrp", "XRPUSDT"),
];

/// Score delta for a Tier-2 match.
pub const TIER2_BONUS: f64 = 800.0;
/// Score delta for a long-horizon match.
pub const NEGATIVE_PENALTY: f64 = -800.0;
/// Score delta for any positive sponsor pool.
pub const SPONSOR_BONUS: f64 = 500.0;

/// Category signal extracted from a market title.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySignal {
    pub bonus: f64,
    pub label: &'static str,
    pub tier1: bool,
}

/// Classify a title against the keyword tables. Precedence: Tier-1,
/// then Tier-2, then negative, else "other". Matching is
/// case-insensitive substring.
pub fn classify(title: &str) -> CategorySignal {
    let t = title.to_lowercase();

    if TIER1.iter().any(|k| t.contains(k)) {
        return CategorySignal {
            bonus: 0.0,
            label: "tier1",
            tier1: true,
        };
    }

    if let Some((_, label)) = TIER2.iter().find(|(k, _)| t.contains(k)) {
        return CategorySignal {
            bonus: TIER2_BONUS,
            label,
            tier1: false,
        };
    }

    if NEGATIVE.iter().any(|k| t.contains(k)) {
        return CategorySignal {
            bonus: NEGATIVE_PENALTY,
            label: "long-term",
            tier1: false,
        };
    }

    CategorySignal {
        bonus: 0.0,
        label: "other",
        tier1: false,
    }
}

/// Nominal sponsor pool for well-known titles the rewards API misses.
pub fn forced_sponsor(title: &str) -> Option<f64> {
    let t = title.to_lowercase();
    FORCE_SPONSOR
        .iter()
        .find(|(k, _)| t.contains(k))
        .map(|(_, pool)| *pool)
}

/// Spot ticker symbol for crypto titles, if any.
pub fn spot_symbol(title: &str) -> Option<&'static str> {
    let t = title.to_lowercase();
    CRYPTO_SPOT
        .iter()
        .find(|(k, _)| t.contains(k))
        .map(|(_, sym)| *sym)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
