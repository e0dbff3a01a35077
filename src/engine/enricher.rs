//! Candidate enrichment.
//!
//! Takes pre-filtered catalog rows and turns each into a fully enriched
//! `MarketCandidate`: book snapshot with mid derivation, layered sponsor
//! lookup, and keyword classification. Network I/O is sequential per
//! market — bounded work per cycle, no rate-limit spikes, and a readable
//! linear log. Per-market failures are recovered locally.

use tracing::{debug, info, warn};

use crate::config::MakerConfig;
use crate::keywords::{self, SPONSOR_BONUS};
use crate::types::{err_string, MarketCandidate, MidSource};
use crate::venue::catalog::CatalogMarket;
use crate::venue::rewards::RewardsClient;
use crate::venue::spot::SpotClient;
use crate::venue::ClobVenue;

/// Books shallower than this are unquotable regardless of config.
const MIN_ENRICH_DEPTH: f64 = 80.0;

/// Drop low-volume rows and cap the survivors carried into enrichment.
pub fn prefilter(rows: Vec<CatalogMarket>, cfg: &MakerConfig) -> Vec<CatalogMarket> {
    let before = rows.len();
    let mut survivors: Vec<CatalogMarket> = rows
        .into_iter()
        .filter(|r| r.volume_24hr.unwrap_or(0.0) >= cfg.min_volume_24h)
        .collect();
    survivors.truncate(cfg.enrich_cap());
    debug!(
        before,
        after = survivors.len(),
        min_volume = cfg.min_volume_24h,
        "Candidates pre-filtered"
    );
    survivors
}

pub struct Enricher<'a> {
    venue: &'a dyn ClobVenue,
    rewards: &'a RewardsClient,
    spot: Option<&'a SpotClient>,
    cfg: &'a MakerConfig,
}

impl<'a> Enricher<'a> {
    pub fn new(
        venue: &'a dyn ClobVenue,
        rewards: &'a RewardsClient,
        spot: Option<&'a SpotClient>,
        cfg: &'a MakerConfig,
    ) -> Self {
        Self {
            venue,
            rewards,
            spot,
            cfg,
        }
    }

    /// Enrich each survivor in turn. Markets that fail a lookup or a
    /// hard filter are skipped, not fatal.
    pub async fn enrich_batch(&self, rows: &[CatalogMarket]) -> Vec<MarketCandidate> {
        let mut candidates = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;

        for row in rows {
            match self.enrich_one(row).await {
                Some(candidate) => candidates.push(candidate),
                None => skipped += 1,
            }
        }

        info!(enriched = candidates.len(), skipped, "Enrichment complete");
        candidates
    }

    async fn enrich_one(&self, row: &CatalogMarket) -> Option<MarketCandidate> {
        let token_id = match row.yes_token_id() {
            Ok(id) => id,
            Err(e) => {
                warn!(market = %row.question, error = %err_string(&e), "Skipping: bad token ids");
                return None;
            }
        };

        let book = match self.venue.order_book(&token_id).await {
            Ok(book) => book,
            Err(e) => {
                warn!(market = %row.question, error = %err_string(&e), "Skipping: book fetch failed");
                return None;
            }
        };

        let (mid, mid_source) = book.derive_mid();
        if mid <= 0.0 || mid_source == MidSource::Empty {
            debug!(market = %row.question, "Skipping: empty book");
            return None;
        }

        let depth = book.depth();
        if depth < MIN_ENRICH_DEPTH {
            debug!(market = %row.question, depth, "Skipping: book too shallow");
            return None;
        }

        let sponsor = self
            .rewards
            .lookup(row.sponsor_pool(), &row.condition_id, &token_id, &row.question)
            .await;
        if sponsor.pool < self.cfg.min_sponsor_pool {
            debug!(
                market = %row.question,
                sponsor = sponsor.pool,
                floor = self.cfg.min_sponsor_pool,
                "Skipping: sponsor pool below floor"
            );
            return None;
        }

        let signal = keywords::classify(&row.question);
        let mut category_bonus = signal.bonus;
        let mut category = signal.label.to_string();
        if sponsor.pool > 0.0 {
            category_bonus += SPONSOR_BONUS;
            if category == "other" {
                category = "sponsored".to_string();
            }
        }

        // Advisory spot reference for crypto titles; logged only.
        if self.cfg.external_oracle {
            if let Some(spot) = self.spot {
                match spot.price_for_title(&row.question).await {
                    Ok(Some(price)) => {
                        info!(market = %row.question, spot = price, mid, "External spot reference")
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(market = %row.question, error = %err_string(&e), "Spot lookup failed")
                    }
                }
            }
        }

        let spread_ratio = book.spread_ratio();
        let tick_size = book.tick_size;

        debug!(
            market = %row.question,
            mid,
            source = %mid_source,
            depth,
            sponsor = sponsor.pool,
            method = %sponsor.method,
            category = %category,
            "Candidate enriched"
        );

        Some(MarketCandidate {
            condition_id: row.condition_id.clone(),
            token_id,
            neg_risk: row.neg_risk,
            title: row.question.clone(),
            volume_24h: row.volume_24hr.unwrap_or(0.0),
            book,
            mid,
            mid_source,
            spread_ratio,
            range1h: spread_ratio * 100.0,
            tick_size,
            sponsor_pool: sponsor.pool,
            sponsor_method: sponsor.method,
            category,
            category_bonus,
            tier1: signal.tier1,
            score: 0.0,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
