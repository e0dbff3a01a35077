//! Cycle driver.
//!
//! Fires one quoting cycle per configured interval. A single in-flight
//! flag guarantees no two cycles ever run concurrently: a tick that
//! lands while the previous cycle is still working is dropped, and the
//! overlap warning is rate-limited. Stop is idempotent — it disables
//! future ticks and lets the current cycle finish.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::MakerConfig;
use crate::engine::{CycleOutcome, Engine};
use crate::types::err_string;

/// Overlap warnings within this window of the previous one are
/// suppressed.
const OVERLAP_WARN_SUPPRESS: Duration = Duration::from_secs(15);

/// Clears the in-flight flag on every exit path, including panics.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct CycleDriver {
    engine: Arc<Engine>,
    cfg: MakerConfig,
    running: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
    last_overlap_warn: Arc<Mutex<Option<Instant>>>,
    cycles: Arc<AtomicU64>,
    total_orders: Arc<AtomicU64>,
    last_cycle_unix: Arc<AtomicI64>,
}

impl CycleDriver {
    pub fn new(engine: Arc<Engine>, cfg: MakerConfig) -> Self {
        Self {
            engine,
            cfg,
            running: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicBool::new(false)),
            last_overlap_warn: Arc::new(Mutex::new(None)),
            cycles: Arc::new(AtomicU64::new(0)),
            total_orders: Arc::new(AtomicU64::new(0)),
            last_cycle_unix: Arc::new(AtomicI64::new(0)),
        }
    }

    // -- Introspection (health endpoint) ----------------------------------

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    pub fn total_orders(&self) -> u64 {
        self.total_orders.load(Ordering::SeqCst)
    }

    /// Unix timestamp of the last completed cycle; 0 before the first.
    pub fn last_cycle_unix(&self) -> i64 {
        self.last_cycle_unix.load(Ordering::SeqCst)
    }

    pub fn paper(&self) -> bool {
        self.cfg.paper
    }

    // -- Lifecycle ---------------------------------------------------------

    /// Run the driver until `stop` is called: an immediate first cycle,
    /// then one tick per interval. Each tick runs detached so a slow
    /// cycle shows up as dropped ticks, not a stalled timer.
    pub async fn run(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Driver already running, start ignored");
            return;
        }

        info!(
            interval_secs = self.cfg.interval_secs,
            paper = self.cfg.paper,
            "Driver starting; running immediate first cycle"
        );
        self.tick().await;

        let mut interval = tokio::time::interval(Duration::from_secs(self.cfg.interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await; // consume the immediate tick

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            let driver = self.clone();
            tokio::spawn(async move {
                driver.tick().await;
            });
        }
        info!("Driver loop exited");
    }

    /// One guarded tick. Returns the outcome, or `None` when the tick
    /// was dropped (overlap) or the cycle failed.
    pub async fn tick(&self) -> Option<CycleOutcome> {
        let Some(_guard) = self.try_acquire() else {
            self.warn_overlap();
            return None;
        };

        match self.engine.run_cycle(&self.cfg).await {
            Ok(outcome) => {
                self.cycles.fetch_add(1, Ordering::SeqCst);
                self.total_orders
                    .fetch_add(outcome.orders_placed as u64, Ordering::SeqCst);
                self.last_cycle_unix
                    .store(Utc::now().timestamp(), Ordering::SeqCst);
                Some(outcome)
            }
            Err(e) => {
                error!(error = %err_string(&e), "Cycle failed — next tick will retry");
                None
            }
        }
    }

    /// Deactivate the timer and best-effort cancel all resting orders.
    /// Idempotent; never interrupts an in-flight cycle. Returns whether
    /// the driver was running.
    pub async fn stop(&self) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            info!("Driver already stopped");
            return false;
        }

        if let Err(e) = self.engine.venue.cancel_all().await {
            warn!(error = %err_string(&e), "Best-effort cancel-all on stop failed");
        }
        info!("Driver stopped; in-flight cycle (if any) will finish");
        true
    }

    // -- Overlap guard -----------------------------------------------------

    fn try_acquire(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InFlightGuard(&self.in_flight))
    }

    fn warn_overlap(&self) {
        let mut last = self.last_overlap_warn.lock().unwrap_or_else(|e| e.into_inner());
        if overlap_warn_due(*last) {
            warn!("Cycle still running — tick dropped");
            *last = Some(Instant::now());
        } else {
            debug!("Cycle overlap (warning suppressed)");
        }
    }
}

/// A new overlap warning is due when none was emitted in the suppress
/// window.
fn overlap_warn_due(last: Option<Instant>) -> bool {
    last.map(|t| t.elapsed() >= OVERLAP_WARN_SUPPRESS)
        .unwrap_or(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
