//! Risk governor.
//!
//! Runs before any quoting work each cycle: checks the daily circuit
//! breaker, clamps the config to the capital caps, and auto-repairs
//! stored positions that drifted past the recovery bound. A tripped
//! breaker halts quoting for the remainder of the UTC day.

use anyhow::Result;
use tracing::warn;

use crate::config::MakerConfig;
use crate::engine::CycleLog;
use crate::storage::Store;

/// Daily loss limit as a fraction of total capital.
const DAILY_LOSS_FRACTION: f64 = 0.03;

/// Stored positions beyond this multiple of the cap are treated as
/// drift and zeroed.
const POSITION_REPAIR_MULTIPLE: f64 = 1.5;

/// Outcome of the pre-cycle risk evaluation.
#[derive(Debug, Clone)]
pub enum RiskVerdict {
    /// Quote this cycle with the clamped config.
    Proceed(MakerConfig),
    /// No quoting: the breaker is (or just became) latched.
    Halt { reason: String },
}

impl RiskVerdict {
    pub fn halted(&self) -> bool {
        matches!(self, RiskVerdict::Halt { .. })
    }
}

/// Evaluate the circuit breaker and capital caps for today.
pub fn evaluate(store: &Store, cfg: &MakerConfig, log: &mut CycleLog) -> Result<RiskVerdict> {
    let cfg = clamped(cfg, log);
    let today = Store::today();

    if let Some(row) = store.daily_row(&today)? {
        if row.circuit_breaker_triggered {
            let reason = format!(
                "🚨 circuit breaker latched for {today} (realized {:.2})",
                row.realized_pnl
            );
            log.push(reason.clone());
            return Ok(RiskVerdict::Halt { reason });
        }

        let threshold = -(DAILY_LOSS_FRACTION * cfg.total_capital);
        if row.realized_pnl <= threshold {
            store.latch_breaker(&today)?;
            let reason = format!(
                "🚨 daily loss limit hit: {:.2} ≤ {:.2}, quoting halted for {today}",
                row.realized_pnl, threshold
            );
            log.push(reason.clone());
            return Ok(RiskVerdict::Halt { reason });
        }
    }

    // Recovery from historical drift: anything 1.5× past the cap is
    // stale data, not a live position.
    let zeroed = store.zero_oversized(POSITION_REPAIR_MULTIPLE * cfg.max_position)?;
    for (market_id, pos) in zeroed {
        log.push(format!(
            "🧹 zeroed drifted position {market_id} ({pos:.1})"
        ));
    }

    Ok(RiskVerdict::Proceed(cfg))
}

/// Clamp to the capital caps, logging any adjustment.
fn clamped(cfg: &MakerConfig, log: &mut CycleLog) -> MakerConfig {
    let norm = cfg.normalized();
    if norm.order_size != cfg.order_size {
        warn!(
            requested = cfg.order_size,
            clamped = norm.order_size,
            "Order size clamped to 8% of capital"
        );
        log.push(format!(
            "order size clamped {} → {}",
            cfg.order_size, norm.order_size
        ));
    }
    if norm.max_position != cfg.max_position {
        warn!(
            requested = cfg.max_position,
            clamped = norm.max_position,
            "Max position clamped to 48% of capital"
        );
        log.push(format!(
            "max position clamped {} → {}",
            cfg.max_position, norm.max_position
        ));
    }
    norm
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
