//! Paper-trading fill simulator.
//!
//! In paper mode no orders reach the venue. For each unpaused side the
//! simulator rolls a fill with probability 0.65 on tight quotes
//! (≤ 12 bp) and 0.40 otherwise, sizes it as a random partial of the
//! remaining position headroom, and credits half the captured spread to
//! daily PnL. Every intention and every fill is logged; simulated rows
//! are flagged `paper` in the trade log.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::config::MakerConfig;
use crate::engine::quoter::QuotePlan;
use crate::engine::CycleLog;
use crate::storage::Store;
use crate::types::{err_string, Side, TradeAction, TradeLogEntry};

/// Fill probability for quotes at or inside this spread.
const TIGHT_SPREAD_BP: u32 = 12;
const TIGHT_FILL_PROB: f64 = 0.65;
const WIDE_FILL_PROB: f64 = 0.40;

/// Fraction of paper spread capture credited to PnL. Deliberately
/// conservative: half the quoted edge.
const CAPTURE_FRACTION: f64 = 0.5;

pub struct PaperBroker {
    rng: StdRng,
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperBroker {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic broker for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Simulate fills for one market. Returns the number of fills
    /// applied.
    pub fn simulate_market(
        &mut self,
        plan: &QuotePlan,
        store: &Store,
        cfg: &MakerConfig,
        log: &mut CycleLog,
    ) -> Result<u32> {
        let mut fills = 0;
        for side in [Side::Buy, Side::Sell] {
            let target = match side {
                Side::Buy => plan.buy,
                Side::Sell => plan.sell,
            };
            let Some(target) = target else { continue };

            log.push(format!(
                "📝 paper {} {} @ {} × {}",
                side, plan.title, target.price, target.size
            ));

            let fill_prob = if plan.spread_bp <= TIGHT_SPREAD_BP {
                TIGHT_FILL_PROB
            } else {
                WIDE_FILL_PROB
            };
            if self.rng.gen::<f64>() >= fill_prob {
                debug!(market = %plan.title, side = %side, "Paper quote rested unfilled");
                continue;
            }

            let position = store.net_position(&plan.condition_id)?;
            let headroom = cfg.max_position - position.abs();
            let u: f64 = self.rng.gen();
            let fill = (target.size.min(headroom) * (0.3 + 0.7 * u))
                .round()
                .max(0.0);
            if fill <= 0.0 {
                debug!(market = %plan.title, side = %side, "No headroom for paper fill");
                continue;
            }

            let delta = match side {
                Side::Buy => fill,
                Side::Sell => -fill,
            };
            if (position + delta).abs() > cfg.max_position {
                debug!(
                    market = %plan.title,
                    side = %side,
                    position,
                    fill,
                    "Paper fill would breach position cap, skipped"
                );
                continue;
            }

            store.adjust_position(&plan.condition_id, delta)?;
            let spread_decimal = plan.spread_bp as f64 / 10_000.0;
            let pnl = spread_decimal * fill * CAPTURE_FRACTION;
            let today = Store::today();
            store.add_realized(&today, pnl, cfg.total_capital)?;
            store.bump_trades(&today, 1)?;

            log.push(format!(
                "✅ paper fill {} {} × {} (pnl +{:.4}, position {:.1})",
                side,
                plan.title,
                fill,
                pnl,
                position + delta
            ));

            let entry = TradeLogEntry::new(
                &plan.condition_id,
                &plan.title,
                TradeAction::Place,
                Some(side),
                target.price,
                fill,
                true,
                serde_json::json!({
                    "event": "paper_fill",
                    "order_id": format!("paper-{}", uuid::Uuid::new_v4()),
                    "fill_size": fill,
                    "pnl_credit": pnl,
                }),
            );
            if let Err(e) = store.log_trade(&entry) {
                warn!(error = %err_string(&e), "paper trade log write failed");
            }

            fills += 1;
        }
        Ok(fills)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
