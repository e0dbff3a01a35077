//! Order reconciliation.
//!
//! Aligns the venue's resting orders with a freshly computed quote plan,
//! per (token, side): keep an order already at the target price, cancel
//! and replace one that drifted, cancel everything on a paused side, and
//! sweep duplicates. Each venue call is attempted independently — one
//! failure never aborts the cycle — and every placement/cancellation is
//! written to the trade log after its remote result is known.

use std::time::Instant;

use anyhow::Result;
use tracing::{info, warn};

use crate::engine::quoter::{QuotePlan, QuoteSide};
use crate::engine::CycleLog;
use crate::storage::Store;
use crate::types::{err_string, RestingOrder, Side, TradeAction, TradeLogEntry};
use crate::venue::{ClobVenue, OrderArgs};

/// Resting orders within this distance of the target are kept (0.5 bp).
const PRICE_TOLERANCE: f64 = 0.5 / 10_000.0;

pub struct Reconciler<'a> {
    venue: &'a dyn ClobVenue,
    store: &'a Store,
}

impl<'a> Reconciler<'a> {
    pub fn new(venue: &'a dyn ClobVenue, store: &'a Store) -> Self {
        Self { venue, store }
    }

    /// Reconcile both sides of one market. BUY before SELL. Returns the
    /// number of new orders placed.
    pub async fn reconcile_market(
        &self,
        plan: &QuotePlan,
        existing: &[RestingOrder],
        log: &mut CycleLog,
    ) -> u32 {
        let mut placed = 0;
        for side in [Side::Buy, Side::Sell] {
            let target = match side {
                Side::Buy => plan.buy,
                Side::Sell => plan.sell,
            };
            let on_side: Vec<&RestingOrder> = existing
                .iter()
                .filter(|o| o.asset_id == plan.token_id && o.side == side)
                .collect();
            placed += self.reconcile_side(plan, side, target, &on_side, log).await;
        }
        placed
    }

    async fn reconcile_side(
        &self,
        plan: &QuotePlan,
        side: Side,
        target: Option<QuoteSide>,
        existing: &[&RestingOrder],
        log: &mut CycleLog,
    ) -> u32 {
        let Some(target) = target else {
            // Paused side: clear everything, place nothing.
            if !existing.is_empty() {
                log.push(format!(
                    "⏸️ {} {}: paused, cancelling {} resting order(s)",
                    plan.title,
                    side,
                    existing.len()
                ));
            }
            for order in existing {
                self.cancel_one(plan, side, order).await;
            }
            return 0;
        };

        let mut placed = 0;
        let mut keep_first = false;

        if let Some(first) = existing.first() {
            if within_tolerance(first.price, target.price) {
                keep_first = true;
                log.push(format!(
                    "♻️ {} {} @ {} kept (within tolerance)",
                    plan.title, side, first.price
                ));
            } else {
                self.cancel_one(plan, side, first).await;
            }
        }

        if !keep_first && self.place_one(plan, side, target).await {
            placed += 1;
        }

        // Duplicates past the first are never kept.
        for order in existing.iter().skip(1) {
            self.cancel_one(plan, side, order).await;
        }

        placed
    }

    /// Place one GTC order; logs and audits either way. Returns whether
    /// the placement succeeded.
    async fn place_one(&self, plan: &QuotePlan, side: Side, target: QuoteSide) -> bool {
        let args = OrderArgs {
            token_id: plan.token_id.clone(),
            price: target.price,
            size: target.size,
            side,
            tick_size: plan.tick_size,
            neg_risk: plan.neg_risk,
        };

        let start = Instant::now();
        match self.venue.place_order(&args).await {
            Ok(result) => {
                let latency = start.elapsed().as_millis() as u64;
                info!(
                    market = %plan.title,
                    side = %side,
                    price = target.price,
                    size = target.size,
                    order_id = ?result.order_id,
                    latency_ms = latency,
                    "Order placed"
                );
                self.audit(TradeLogEntry::new(
                    &plan.condition_id,
                    &plan.title,
                    TradeAction::Place,
                    Some(side),
                    target.price,
                    target.size,
                    false,
                    serde_json::json!({
                        "event": "order_placed",
                        "order_id": result.order_id,
                        "latency_ms": latency,
                    }),
                ));
                if let Err(e) = self.store.bump_trades(&Store::today(), 1) {
                    warn!(error = %err_string(&e), "trade_count bump failed");
                }
                true
            }
            Err(e) => {
                let latency = start.elapsed().as_millis() as u64;
                let reason = err_string(&e);
                warn!(
                    market = %plan.title,
                    side = %side,
                    price = target.price,
                    error = %reason,
                    "Order placement failed"
                );
                self.audit(TradeLogEntry::new(
                    &plan.condition_id,
                    &plan.title,
                    TradeAction::Error,
                    Some(side),
                    target.price,
                    target.size,
                    false,
                    serde_json::json!({
                        "event": "order_place_failed",
                        "latency_ms": latency,
                        "error": reason,
                    }),
                ));
                false
            }
        }
    }

    async fn cancel_one(&self, plan: &QuotePlan, side: Side, order: &RestingOrder) {
        let start = Instant::now();
        match self.venue.cancel_order(&order.id).await {
            Ok(()) => {
                let latency = start.elapsed().as_millis() as u64;
                info!(
                    market = %plan.title,
                    side = %side,
                    order_id = %order.id,
                    latency_ms = latency,
                    "Order cancelled"
                );
                self.audit(TradeLogEntry::new(
                    &plan.condition_id,
                    &plan.title,
                    TradeAction::Cancel,
                    Some(side),
                    order.price,
                    order.size,
                    false,
                    serde_json::json!({
                        "event": "order_cancelled",
                        "order_id": order.id,
                        "latency_ms": latency,
                    }),
                ));
            }
            Err(e) => {
                let latency = start.elapsed().as_millis() as u64;
                let reason = err_string(&e);
                warn!(
                    market = %plan.title,
                    order_id = %order.id,
                    error = %reason,
                    "Cancel failed"
                );
                self.audit(TradeLogEntry::new(
                    &plan.condition_id,
                    &plan.title,
                    TradeAction::Error,
                    Some(side),
                    order.price,
                    order.size,
                    false,
                    serde_json::json!({
                        "event": "cancel_failed",
                        "order_id": order.id,
                        "latency_ms": latency,
                        "error": reason,
                    }),
                ));
            }
        }
    }

    /// Audit-log write failures are logged, never propagated — the
    /// remote action already happened.
    fn audit(&self, entry: TradeLogEntry) {
        if let Err(e) = self.store.log_trade(&entry) {
            warn!(error = %err_string(&e), "trade log write failed");
        }
    }
}

/// Keep-check shared with tests: is a resting price close enough?
pub fn within_tolerance(resting: f64, target: f64) -> bool {
    (resting - target).abs() <= PRICE_TOLERANCE
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
