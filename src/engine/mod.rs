//! Core engine — the periodic quoting cycle.
//!
//! One cycle: risk gate → candidate fetch → enrichment → scoring and
//! selection → per-market quoting → reconciliation (live) or simulated
//! fills (paper). Markets are processed in score-descending order;
//! per-market failures never abort the cycle.

pub mod driver;
pub mod enricher;
pub mod paper;
pub mod quoter;
pub mod reconciler;
pub mod risk;
pub mod selector;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::MakerConfig;
use crate::storage::Store;
use crate::types::err_string;
use crate::venue::catalog::{CatalogClient, CatalogMarket, CATALOG_FETCH_LIMIT};
use crate::venue::rewards::RewardsClient;
use crate::venue::spot::SpotClient;
use crate::venue::ClobVenue;

use self::enricher::Enricher;
use self::paper::PaperBroker;
use self::quoter::{build_quote, QuoteOutcome};
use self::reconciler::Reconciler;
use self::risk::RiskVerdict;

// ---------------------------------------------------------------------------
// Cycle log
// ---------------------------------------------------------------------------

/// Human-readable cycle narration, collected for the control API and
/// mirrored to tracing.
#[derive(Debug, Default)]
pub struct CycleLog {
    lines: Vec<String>,
}

impl CycleLog {
    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!("{line}");
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

// ---------------------------------------------------------------------------
// Cycle outcome
// ---------------------------------------------------------------------------

/// Summary of one quoting cycle.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub orders_placed: u32,
    pub circuit_breaker: bool,
    /// Markets actually quoted this cycle.
    pub total_markets: usize,
    pub sponsored_markets: usize,
    pub avg_sponsor: f64,
    pub logs: Vec<String>,
}

impl CycleOutcome {
    fn halted(logs: Vec<String>) -> Self {
        Self {
            orders_placed: 0,
            circuit_breaker: true,
            total_markets: 0,
            sponsored_markets: 0,
            avg_sponsor: 0.0,
            logs,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Process-wide engine: cached venue client, data clients, and store.
/// Constructed once and shared.
pub struct Engine {
    pub venue: Arc<dyn ClobVenue>,
    pub catalog: CatalogClient,
    pub rewards: RewardsClient,
    pub spot: Option<SpotClient>,
    pub store: Store,
    paper: tokio::sync::Mutex<PaperBroker>,
}

impl Engine {
    pub fn new(
        venue: Arc<dyn ClobVenue>,
        catalog: CatalogClient,
        rewards: RewardsClient,
        spot: Option<SpotClient>,
        store: Store,
    ) -> Self {
        Self {
            venue,
            catalog,
            rewards,
            spot,
            store,
            paper: tokio::sync::Mutex::new(PaperBroker::new()),
        }
    }

    /// Swap in a deterministic paper broker (tests).
    pub fn with_paper_seed(mut self, seed: u64) -> Self {
        self.paper = tokio::sync::Mutex::new(PaperBroker::seeded(seed));
        self
    }

    /// One full cycle: fetch candidates, then quote. Catalog failure is
    /// cycle-fatal — the caller logs it and the next tick retries.
    pub async fn run_cycle(&self, cfg: &MakerConfig) -> Result<CycleOutcome> {
        let rows = self.catalog.fetch_markets(CATALOG_FETCH_LIMIT).await?;
        self.run_with_candidates(rows, cfg).await
    }

    /// Quote a cycle from pre-fetched catalog rows.
    pub async fn run_with_candidates(
        &self,
        rows: Vec<CatalogMarket>,
        cfg: &MakerConfig,
    ) -> Result<CycleOutcome> {
        let mut log = CycleLog::default();

        // Risk gate runs before any quoting work.
        let cfg = match risk::evaluate(&self.store, cfg, &mut log)? {
            RiskVerdict::Proceed(cfg) => cfg,
            RiskVerdict::Halt { .. } => return Ok(CycleOutcome::halted(log.into_lines())),
        };

        let rows = enricher::prefilter(rows, &cfg);
        let enricher = Enricher::new(self.venue.as_ref(), &self.rewards, self.spot.as_ref(), &cfg);
        let candidates = enricher.enrich_batch(&rows).await;

        let (selected, report) = selector::select(candidates, &cfg);
        log.push(format!(
            "🎯 quoting {} market(s) ({} sponsored, avg sponsor ${:.0})",
            report.selected, report.sponsored, report.avg_sponsor
        ));

        let mut placed = 0u32;
        if cfg.paper {
            let mut broker = self.paper.lock().await;
            for candidate in &selected {
                let position = self.store.net_position(&candidate.condition_id)?;
                match build_quote(candidate, position, &cfg) {
                    QuoteOutcome::Quote(plan) => {
                        if let Some(label) = plan.skew_label {
                            log.push(format!("⚖️ {} skew: {label}", plan.title));
                        }
                        placed += broker.simulate_market(&plan, &self.store, &cfg, &mut log)?;
                    }
                    QuoteOutcome::Skip { reason } => {
                        log.push(format!("⏭️ {} skipped: {reason}", candidate.title));
                    }
                }
            }
        } else {
            // One snapshot of resting orders serves the whole cycle.
            let existing = match self.venue.open_orders().await {
                Ok(orders) => orders,
                Err(e) => {
                    warn!(error = %err_string(&e), "Open-orders fetch failed, assuming none");
                    Vec::new()
                }
            };
            let reconciler = Reconciler::new(self.venue.as_ref(), &self.store);
            for candidate in &selected {
                let position = self.store.net_position(&candidate.condition_id)?;
                match build_quote(candidate, position, &cfg) {
                    QuoteOutcome::Quote(plan) => {
                        if let Some(label) = plan.skew_label {
                            log.push(format!("⚖️ {} skew: {label}", plan.title));
                        }
                        placed += reconciler.reconcile_market(&plan, &existing, &mut log).await;
                    }
                    QuoteOutcome::Skip { reason } => {
                        log.push(format!("⏭️ {} skipped: {reason}", candidate.title));
                    }
                }
            }
        }

        log.push(format!(
            "✅ cycle complete: {placed} order(s) placed across {} market(s)",
            report.selected
        ));

        Ok(CycleOutcome {
            orders_placed: placed,
            circuit_breaker: false,
            total_markets: report.selected,
            sponsored_markets: report.sponsored,
            avg_sponsor: report.avg_sponsor,
            logs: log.into_lines(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
