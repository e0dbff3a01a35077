//! Quote construction.
//!
//! Per selected market: dynamic spread (sponsor and volatility
//! adjustments), near-certain edge handling, inventory skew, and tick
//! alignment. All pure math — the reconciler and paper simulator act on
//! the resulting plan.

use tracing::debug;

use crate::config::MakerConfig;
use crate::types::MarketCandidate;

/// Spread clamp, basis points.
const MIN_SPREAD_BP: u32 = 5;
const MAX_SPREAD_BP: u32 = 60;

/// Mid beyond which one outcome is near-certain.
const NEAR_CERTAIN_HIGH: f64 = 0.92;
const NEAR_CERTAIN_LOW: f64 = 0.08;

/// Inventory skew kicks in at this fraction of the position cap.
const SKEW_THRESHOLD_FRAC: f64 = 0.6;

/// Guard against float noise when snapping prices to tick multiples.
const TICK_EPS: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

/// One side of a target quote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteSide {
    pub price: f64,
    pub size: f64,
}

/// The per-market quoting target the reconciler acts on.
#[derive(Debug, Clone)]
pub struct QuotePlan {
    pub condition_id: String,
    pub token_id: String,
    pub title: String,
    pub tick_size: f64,
    pub neg_risk: bool,
    pub mid: f64,
    pub spread_bp: u32,
    /// None = side paused this cycle.
    pub buy: Option<QuoteSide>,
    pub sell: Option<QuoteSide>,
    pub skew_label: Option<&'static str>,
}

/// Outcome of quote construction for one market.
#[derive(Debug, Clone)]
pub enum QuoteOutcome {
    Quote(QuotePlan),
    Skip { reason: String },
}

// ---------------------------------------------------------------------------
// Spread
// ---------------------------------------------------------------------------

/// Dynamic half-spread in bp: base, scaled down for sponsored markets
/// and up for volatile ones, clamped to [5, 60].
pub fn dynamic_spread_bp(cfg: &MakerConfig, sponsor_pool: f64, range1h: f64) -> u32 {
    let mut spread = cfg.base_spread_bp as f64;

    if cfg.aggressive_short_term {
        spread *= 0.85;
    }

    if sponsor_pool > 2000.0 {
        spread *= 0.5;
    } else if sponsor_pool > 1000.0 {
        spread *= 0.7;
    } else if sponsor_pool > 500.0 {
        spread *= 0.85;
    }

    if range1h > 4.0 {
        spread *= 1.4;
    } else if range1h > 2.0 {
        spread *= 1.2;
    }

    (spread.round() as u32).clamp(MIN_SPREAD_BP, MAX_SPREAD_BP)
}

// ---------------------------------------------------------------------------
// Tick alignment
// ---------------------------------------------------------------------------

/// Decimal places implied by a tick size (0.01 → 2, 0.001 → 3).
fn tick_decimals(tick: f64) -> u32 {
    let mut decimals = 0u32;
    let mut t = tick;
    while t < 0.999_999 && decimals < 6 {
        t *= 10.0;
        decimals += 1;
    }
    decimals
}

fn round_dp(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Snap a price down to the nearest tick multiple.
pub fn align_floor(price: f64, tick: f64) -> f64 {
    round_dp((price / tick + TICK_EPS).floor() * tick, tick_decimals(tick))
}

/// Snap a price up to the nearest tick multiple.
pub fn align_ceil(price: f64, tick: f64) -> f64 {
    round_dp((price / tick - TICK_EPS).ceil() * tick, tick_decimals(tick))
}

/// Clamp into the venue's valid price band [tick, 1 − tick].
fn clamp_band(price: f64, tick: f64) -> f64 {
    round_dp(price.clamp(tick, 1.0 - tick), tick_decimals(tick))
}

// ---------------------------------------------------------------------------
// Quote construction
// ---------------------------------------------------------------------------

/// Build the target quote for one market given the current net position.
pub fn build_quote(c: &MarketCandidate, position: f64, cfg: &MakerConfig) -> QuoteOutcome {
    let mut spread_bp = dynamic_spread_bp(cfg, c.sponsor_pool, c.range1h);

    // Near-certain edge: tighten the spread and stop quoting the side
    // that would accumulate the near-worthless outcome.
    let mut buy_paused = false;
    let mut sell_paused = false;
    if c.mid > NEAR_CERTAIN_HIGH {
        spread_bp = spread_bp.min(MIN_SPREAD_BP);
        sell_paused = true;
    } else if c.mid < NEAR_CERTAIN_LOW {
        spread_bp = spread_bp.min(MIN_SPREAD_BP);
        buy_paused = true;
    }

    let s = spread_bp as f64 / 10_000.0;
    let mut buy_price = c.mid - s;
    let mut sell_price = c.mid + s;
    let mut buy_size = cfg.order_size;
    let mut sell_size = cfg.order_size;
    let mut skew_label = None;

    // Inventory skew: shade both prices away from the heavy side and
    // shrink the size that would grow it further.
    let cap = cfg.max_position;
    let threshold = SKEW_THRESHOLD_FRAC * cap;
    if position > threshold {
        buy_price -= 0.5 * s;
        sell_price -= 0.3 * s;
        buy_size = (buy_size * 0.5).round().max(2.0);
        skew_label = Some("LONG heavy");
    } else if position < -threshold {
        sell_price += 0.5 * s;
        buy_price += 0.3 * s;
        sell_size = (sell_size * 0.5).round().max(2.0);
        skew_label = Some("SHORT heavy");
    }

    // Hard cap: past the position limit the growing side stops entirely.
    if position > cap {
        buy_paused = true;
    }
    if position < -cap {
        sell_paused = true;
    }

    let tick = c.tick_size;
    let buy_aligned = clamp_band(align_floor(buy_price, tick), tick);
    let sell_aligned = clamp_band(align_ceil(sell_price, tick), tick);

    if buy_aligned >= sell_aligned {
        return QuoteOutcome::Skip {
            reason: format!(
                "crossed after alignment (buy {buy_aligned} >= sell {sell_aligned})"
            ),
        };
    }

    debug!(
        market = %c.title,
        mid = c.mid,
        spread_bp,
        buy = buy_aligned,
        sell = sell_aligned,
        skew = ?skew_label,
        "Quote built"
    );

    QuoteOutcome::Quote(QuotePlan {
        condition_id: c.condition_id.clone(),
        token_id: c.token_id.clone(),
        title: c.title.clone(),
        tick_size: tick,
        neg_risk: c.neg_risk,
        mid: c.mid,
        spread_bp,
        buy: (!buy_paused).then_some(QuoteSide {
            price: buy_aligned,
            size: buy_size,
        }),
        sell: (!sell_paused).then_some(QuoteSide {
            price: sell_aligned,
            size: sell_size,
        }),
        skew_label,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BookSnapshot, MidSource, SponsorMethod};

    fn candidate(mid: f64, tick: f64) -> MarketCandidate {
        MarketCandidate {
            condition_id: "0xc1".into(),
            token_id: "111".into(),
            neg_risk: false,
            title: "Quiet test market".into(),
            volume_24h: 5000.0,
            book: BookSnapshot {
                best_bid: Some((mid - 0.001, 100.0)),
                best_ask: Some((mid + 0.001, 100.0)),
                last_trade: None,
                tick_size: tick,
            },
            mid,
            mid_source: MidSource::Orderbook,
            spread_ratio: 0.005,
            range1h: 0.5,
            tick_size: tick,
            sponsor_pool: 0.0,
            sponsor_method: SponsorMethod::None,
            category: "other".into(),
            category_bonus: 0.0,
            tier1: false,
            score: 0.0,
        }
    }

    fn cfg(base_bp: u32) -> MakerConfig {
        MakerConfig {
            base_spread_bp: base_bp,
            order_size: 10.0,
            max_position: 30.0,
            ..Default::default()
        }
    }

    fn quote(c: &MarketCandidate, position: f64, cfg: &MakerConfig) -> QuotePlan {
        match build_quote(c, position, cfg) {
            QuoteOutcome::Quote(plan) => plan,
            QuoteOutcome::Skip { reason } => panic!("unexpected skip: {reason}"),
        }
    }

    // -- Dynamic spread ----------------------------------------------------

    #[test]
    fn test_spread_no_adjustments() {
        assert_eq!(dynamic_spread_bp(&cfg(22), 0.0, 0.0), 22);
    }

    #[test]
    fn test_spread_sponsor_tiers() {
        let c = cfg(22);
        assert_eq!(dynamic_spread_bp(&c, 2500.0, 0.0), 11); // ×0.5
        assert_eq!(dynamic_spread_bp(&c, 1500.0, 0.0), 15); // ×0.7, round(15.4)
        assert_eq!(dynamic_spread_bp(&c, 600.0, 0.0), 19); // ×0.85, round(18.7)
    }

    #[test]
    fn test_spread_sponsor_tier_boundaries_strict() {
        let c = cfg(40);
        // Exactly at the boundary falls through to the next tier.
        assert_eq!(dynamic_spread_bp(&c, 2000.0, 0.0), 28); // ×0.7, not ×0.5
        assert_eq!(dynamic_spread_bp(&c, 1000.0, 0.0), 34); // ×0.85, not ×0.7
        assert_eq!(dynamic_spread_bp(&c, 500.0, 0.0), 40); // untouched
    }

    #[test]
    fn test_spread_volatility() {
        let c = cfg(20);
        assert_eq!(dynamic_spread_bp(&c, 0.0, 4.5), 28); // ×1.4
        assert_eq!(dynamic_spread_bp(&c, 0.0, 2.5), 24); // ×1.2
        assert_eq!(dynamic_spread_bp(&c, 0.0, 2.0), 20); // boundary: no bump
    }

    #[test]
    fn test_spread_clamped_low() {
        // 8 × 0.5 = 4 → clamped up to 5.
        assert_eq!(dynamic_spread_bp(&cfg(8), 2500.0, 0.0), 5);
    }

    #[test]
    fn test_spread_clamped_high() {
        // 55 × 1.4 = 77 → clamped down to 60.
        assert_eq!(dynamic_spread_bp(&cfg(55), 0.0, 5.0), 60);
    }

    #[test]
    fn test_spread_aggressive_short_term() {
        let mut c = cfg(20);
        c.aggressive_short_term = true;
        assert_eq!(dynamic_spread_bp(&c, 0.0, 0.0), 17); // round(20 × 0.85)
    }

    // -- Tick alignment ----------------------------------------------------

    #[test]
    fn test_align_floor_and_ceil() {
        assert_eq!(align_floor(0.3978, 0.01), 0.39);
        assert_eq!(align_ceil(0.4022, 0.01), 0.41);
        assert_eq!(align_floor(0.39, 0.01), 0.39); // exact multiple stays
        assert_eq!(align_ceil(0.41, 0.01), 0.41);
    }

    #[test]
    fn test_align_fine_tick() {
        assert_eq!(align_floor(0.9495, 0.001), 0.949);
        assert_eq!(align_ceil(0.9501, 0.001), 0.951);
        assert_eq!(align_ceil(0.951, 0.001), 0.951);
    }

    #[test]
    fn test_tick_decimals() {
        assert_eq!(tick_decimals(0.01), 2);
        assert_eq!(tick_decimals(0.001), 3);
        assert_eq!(tick_decimals(0.1), 1);
    }

    // -- Quote construction ------------------------------------------------

    #[test]
    fn test_clean_quote() {
        // Worked example: mid 0.40, base 22 bp, no adjustments.
        let c = candidate(0.40, 0.01);
        let plan = quote(&c, 0.0, &cfg(22));
        assert_eq!(plan.spread_bp, 22);
        let buy = plan.buy.unwrap();
        let sell = plan.sell.unwrap();
        assert_eq!(buy.price, 0.39);
        assert_eq!(sell.price, 0.41);
        assert_eq!(buy.size, 10.0);
        assert_eq!(sell.size, 10.0);
        assert!(plan.skew_label.is_none());
    }

    #[test]
    fn test_sponsor_adjusted_quote() {
        // Sponsor tier ×0.7: 22 bp → 15 bp at mid 0.50.
        let mut c = candidate(0.50, 0.01);
        c.sponsor_pool = 1500.0;
        let plan = quote(&c, 0.0, &cfg(22));
        assert_eq!(plan.spread_bp, 15);
        assert_eq!(plan.buy.unwrap().price, 0.49); // 0.4985 floored
        assert_eq!(plan.sell.unwrap().price, 0.51); // 0.5015 ceiled
    }

    #[test]
    fn test_long_heavy_skew() {
        // Cap 30, position 20 > threshold 18; base 20 bp at mid 0.5.
        let c = candidate(0.50, 0.001);
        let plan = quote(&c, 20.0, &cfg(20));
        assert_eq!(plan.skew_label, Some("LONG heavy"));
        let buy = plan.buy.unwrap();
        let sell = plan.sell.unwrap();
        // buy 0.5 − 0.002 − 0.001 = 0.497; sell 0.5 + 0.002 − 0.0006 = 0.5014
        assert_eq!(buy.price, 0.497);
        assert_eq!(sell.price, 0.502); // ceil at 0.001 tick
        assert_eq!(buy.size, 5.0); // halved
        assert_eq!(sell.size, 10.0); // untouched
    }

    #[test]
    fn test_short_heavy_skew_mirrored() {
        let c = candidate(0.50, 0.001);
        let plan = quote(&c, -20.0, &cfg(20));
        assert_eq!(plan.skew_label, Some("SHORT heavy"));
        let buy = plan.buy.unwrap();
        let sell = plan.sell.unwrap();
        // sell 0.5 + 0.002 + 0.001 = 0.503; buy 0.5 − 0.002 + 0.0006 = 0.4986
        assert_eq!(sell.price, 0.503);
        assert_eq!(buy.price, 0.498); // floor at 0.001 tick
        assert_eq!(sell.size, 5.0);
        assert_eq!(buy.size, 10.0);
    }

    #[test]
    fn test_skew_size_floor_two() {
        let c = candidate(0.50, 0.01);
        let mut config = cfg(20);
        config.order_size = 3.0;
        let plan = quote(&c, 20.0, &config);
        // round(1.5) = 2, already at floor
        assert_eq!(plan.buy.unwrap().size, 2.0);
    }

    #[test]
    fn test_position_exactly_at_threshold_no_skew() {
        let c = candidate(0.50, 0.01);
        let plan = quote(&c, 18.0, &cfg(20)); // T = 0.6 × 30 = 18
        assert!(plan.skew_label.is_none());
    }

    #[test]
    fn test_position_beyond_cap_pauses_buy() {
        let c = candidate(0.50, 0.01);
        let plan = quote(&c, 31.0, &cfg(20));
        assert!(plan.buy.is_none());
        assert!(plan.sell.is_some());
    }

    #[test]
    fn test_position_exactly_at_cap_not_paused() {
        let c = candidate(0.50, 0.01);
        let plan = quote(&c, 30.0, &cfg(20));
        assert!(plan.buy.is_some());
    }

    #[test]
    fn test_short_beyond_cap_pauses_sell() {
        let c = candidate(0.50, 0.01);
        let plan = quote(&c, -31.0, &cfg(20));
        assert!(plan.sell.is_none());
        assert!(plan.buy.is_some());
    }

    #[test]
    fn test_near_yes_lock_in() {
        // Mid 0.95: spread capped at 5 bp, SELL paused.
        let c = candidate(0.95, 0.01);
        let plan = quote(&c, 0.0, &cfg(22));
        assert_eq!(plan.spread_bp, 5);
        assert!(plan.sell.is_none());
        assert_eq!(plan.buy.unwrap().price, 0.94); // 0.9495 floored
    }

    #[test]
    fn test_near_no_lock_in() {
        let c = candidate(0.05, 0.01);
        let plan = quote(&c, 0.0, &cfg(22));
        assert_eq!(plan.spread_bp, 5);
        assert!(plan.buy.is_none());
        assert!(plan.sell.is_some());
    }

    #[test]
    fn test_near_certain_boundaries() {
        // 0.925 is inside the near-certain band; 0.92 exactly is not.
        let plan = quote(&candidate(0.925, 0.01), 0.0, &cfg(22));
        assert!(plan.sell.is_none());
        let plan = quote(&candidate(0.92, 0.01), 0.0, &cfg(22));
        assert!(plan.sell.is_some());

        // 0.075 is inside; 0.08 exactly is not.
        let plan = quote(&candidate(0.075, 0.01), 0.0, &cfg(22));
        assert!(plan.buy.is_none());
        let plan = quote(&candidate(0.08, 0.01), 0.0, &cfg(22));
        assert!(plan.buy.is_some());
    }

    #[test]
    fn test_crossed_quote_skipped() {
        // At mid 0.995 both aligned prices collapse onto 0.99.
        let c = candidate(0.995, 0.01);
        match build_quote(&c, 0.0, &cfg(22)) {
            QuoteOutcome::Skip { reason } => assert!(reason.contains("crossed")),
            QuoteOutcome::Quote(_) => panic!("expected crossed-quote skip"),
        }
    }

    #[test]
    fn test_prices_always_in_band_and_on_tick() {
        for &mid in &[0.10, 0.25, 0.50, 0.75, 0.91] {
            for &tick in &[0.01, 0.001] {
                let c = candidate(mid, tick);
                for &pos in &[0.0, 20.0, -20.0] {
                    if let QuoteOutcome::Quote(plan) = build_quote(&c, pos, &cfg(30)) {
                        for side in [plan.buy, plan.sell].into_iter().flatten() {
                            assert!(side.price >= tick - 1e-12);
                            assert!(side.price <= 1.0 - tick + 1e-12);
                            let ticks = side.price / tick;
                            assert!(
                                (ticks - ticks.round()).abs() < 1e-6,
                                "price {} not a multiple of tick {}",
                                side.price,
                                tick
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_buy_below_sell_always() {
        for &mid in &[0.10, 0.30, 0.50, 0.70, 0.90] {
            let c = candidate(mid, 0.01);
            if let QuoteOutcome::Quote(plan) = build_quote(&c, 0.0, &cfg(5)) {
                if let (Some(b), Some(s)) = (plan.buy, plan.sell) {
                    assert!(b.price < s.price);
                }
            }
        }
    }
}
