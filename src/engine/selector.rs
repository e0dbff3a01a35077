//! Composite scoring and top-K selection.
//!
//! Every signal is capped or clamped so no single input dominates the
//! ranking. Tier-1 markets multiply the whole base score; penalties
//! mark coin-flips, wide books, and shallow books.

use std::collections::BTreeMap;

use tracing::info;

use crate::config::MakerConfig;
use crate::types::MarketCandidate;

/// Volume contribution is capped here so mega-markets don't drown the
/// sponsor and depth signals.
const VOLUME_CAP: f64 = 500_000.0;
const DEPTH_CAP: f64 = 50_000.0;

const VOLUME_WEIGHT: f64 = 0.03;
const SPONSOR_WEIGHT: f64 = 30.0;
const DEPTH_WEIGHT: f64 = 0.8;
const TIER1_MULTIPLIER: f64 = 4.0;

const COIN_FLIP_PENALTY: f64 = -2000.0;
const WIDE_BOOK_PENALTY: f64 = -3000.0;
const WIDISH_BOOK_PENALTY: f64 = -1000.0;
const SHALLOW_BOOK_PENALTY: f64 = -1500.0;

/// What the selector kept, summarized for the cycle report.
#[derive(Debug, Clone, Default)]
pub struct SelectionReport {
    pub considered: usize,
    pub selected: usize,
    pub sponsored: usize,
    pub avg_sponsor: f64,
    pub by_category: BTreeMap<String, usize>,
}

/// Composite score for one enriched candidate.
pub fn composite_score(c: &MarketCandidate, cfg: &MakerConfig) -> f64 {
    let capped_vol = c.volume_24h.min(VOLUME_CAP);
    let capped_depth = c.book.depth().min(DEPTH_CAP);

    let mut base = VOLUME_WEIGHT * capped_vol
        + SPONSOR_WEIGHT * c.sponsor_pool
        + DEPTH_WEIGHT * capped_depth
        + c.category_bonus;

    if (c.mid - 0.5).abs() < 0.005 {
        base += COIN_FLIP_PENALTY;
    }

    if c.spread_ratio > 0.10 {
        base += WIDE_BOOK_PENALTY;
    } else if c.spread_ratio > 0.05 {
        base += WIDISH_BOOK_PENALTY;
    }

    if c.book.depth() < cfg.min_liquidity_depth {
        base += SHALLOW_BOOK_PENALTY;
    }

    if c.tier1 {
        base * TIER1_MULTIPLIER
    } else {
        base
    }
}

/// Score, sort descending, and keep the top `max_markets` candidates.
pub fn select(
    mut candidates: Vec<MarketCandidate>,
    cfg: &MakerConfig,
) -> (Vec<MarketCandidate>, SelectionReport) {
    let considered = candidates.len();

    for c in candidates.iter_mut() {
        c.score = composite_score(c, cfg);
    }
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(cfg.max_markets);

    let mut report = SelectionReport {
        considered,
        selected: candidates.len(),
        ..Default::default()
    };
    for c in &candidates {
        *report.by_category.entry(c.category.clone()).or_insert(0) += 1;
        if c.sponsor_pool > 0.0 {
            report.sponsored += 1;
        }
    }
    if !candidates.is_empty() {
        report.avg_sponsor =
            candidates.iter().map(|c| c.sponsor_pool).sum::<f64>() / candidates.len() as f64;
    }

    info!(
        considered,
        selected = report.selected,
        sponsored = report.sponsored,
        avg_sponsor = format!("{:.0}", report.avg_sponsor),
        categories = ?report.by_category,
        "Markets selected"
    );

    (candidates, report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
