//! End-to-end quoting cycle scenarios against an in-memory mock venue.
//!
//! Exercises the full pipeline — risk gate, enrichment, selection,
//! quoting, reconciliation, paper fills — with deterministic inputs and
//! a seeded RNG where randomness is involved.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use polymaker::config::MakerConfig;
use polymaker::engine::Engine;
use polymaker::storage::Store;
use polymaker::types::{BookSnapshot, RestingOrder, Side};
use polymaker::venue::catalog::{CatalogClient, CatalogMarket};
use polymaker::venue::rewards::RewardsClient;
use polymaker::venue::{ClobVenue, OrderArgs, PlaceResult};

// ---------------------------------------------------------------------------
// Mock venue
// ---------------------------------------------------------------------------

/// Deterministic in-memory venue: known books, controllable resting
/// orders, and full capture of placements and cancellations.
#[derive(Default)]
struct MockVenue {
    books: Mutex<HashMap<String, BookSnapshot>>,
    open: Mutex<Vec<RestingOrder>>,
    placed: Mutex<Vec<OrderArgs>>,
    cancelled: Mutex<Vec<String>>,
}

impl MockVenue {
    fn with_book(self, token_id: &str, book: BookSnapshot) -> Self {
        self.books.lock().unwrap().insert(token_id.into(), book);
        self
    }

    fn add_open_order(&self, order: RestingOrder) {
        self.open.lock().unwrap().push(order);
    }

    fn placements(&self) -> Vec<OrderArgs> {
        self.placed.lock().unwrap().clone()
    }

    fn cancellations(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClobVenue for MockVenue {
    async fn api_key_prefix(&self) -> Result<String> {
        Ok("mock-key…".into())
    }

    async fn order_book(&self, token_id: &str) -> Result<BookSnapshot> {
        self.books
            .lock()
            .unwrap()
            .get(token_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no book for {token_id}"))
    }

    async fn open_orders(&self) -> Result<Vec<RestingOrder>> {
        Ok(self.open.lock().unwrap().clone())
    }

    async fn place_order(&self, args: &OrderArgs) -> Result<PlaceResult> {
        self.placed.lock().unwrap().push(args.clone());
        let n = self.placed.lock().unwrap().len();
        Ok(PlaceResult {
            order_id: Some(format!("mock-{n}")),
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.cancelled.lock().unwrap().push(order_id.to_string());
        Ok(())
    }

    async fn cancel_all(&self) -> Result<()> {
        self.open.lock().unwrap().clear();
        Ok(())
    }

    async fn geoblock_probe(&self) -> Result<bool> {
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn two_sided(bid: f64, ask: f64, size: f64, tick: f64) -> BookSnapshot {
    BookSnapshot {
        best_bid: Some((bid, size)),
        best_ask: Some((ask, size)),
        last_trade: None,
        tick_size: tick,
    }
}

fn catalog_row(condition: &str, token: &str, title: &str, volume: f64) -> CatalogMarket {
    serde_json::from_value(serde_json::json!({
        "conditionId": condition,
        "question": title,
        "clobTokenIds": format!("[\"{token}\",\"{token}-no\"]"),
        "volume24hr": volume,
        "active": true,
        "closed": false
    }))
    .unwrap()
}

fn sponsored_row(
    condition: &str,
    token: &str,
    title: &str,
    volume: f64,
    pool: f64,
) -> CatalogMarket {
    let mut row = catalog_row(condition, token, title, volume);
    row.rewards_daily_rate = Some(pool);
    row
}

fn engine_with(venue: Arc<MockVenue>, store: Store) -> Engine {
    Engine::new(
        venue,
        CatalogClient::with_base("http://127.0.0.1:1").unwrap(),
        // Unroutable rewards base: lookups degrade to the catalog row /
        // keyword layers without network.
        RewardsClient::with_base("http://127.0.0.1:1").unwrap(),
        None,
        store,
    )
    .with_paper_seed(11)
}

fn live_cfg() -> MakerConfig {
    MakerConfig {
        paper: false,
        order_size: 5.0,
        base_spread_bp: 22,
        max_markets: 4,
        max_position: 30.0,
        total_capital: 100.0,
        min_volume_24h: 500.0,
        min_liquidity_depth: 100.0,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clean_quote_places_both_sides() {
    let venue = Arc::new(
        MockVenue::default().with_book("tok-a", two_sided(0.399, 0.401, 250.0, 0.01)),
    );
    let store = Store::open_in_memory().unwrap();
    let engine = engine_with(venue.clone(), store);

    let outcome = engine
        .run_with_candidates(
            vec![catalog_row("0xa", "tok-a", "Quiet market one", 5000.0)],
            &live_cfg(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.orders_placed, 2);
    assert!(!outcome.circuit_breaker);
    assert_eq!(outcome.total_markets, 1);

    let placed = venue.placements();
    assert_eq!(placed.len(), 2);
    // BUY reconciled before SELL; prices tick-floored/ceiled from
    // 0.3978 / 0.4022.
    assert_eq!(placed[0].side, Side::Buy);
    assert_eq!(placed[0].price, 0.39);
    assert_eq!(placed[0].size, 5.0);
    assert_eq!(placed[1].side, Side::Sell);
    assert_eq!(placed[1].price, 0.41);
    assert_eq!(placed[1].size, 5.0);
    assert!(venue.cancellations().is_empty());
}

#[tokio::test]
async fn sponsor_pool_tightens_spread() {
    let venue = Arc::new(
        MockVenue::default().with_book("tok-b", two_sided(0.499, 0.501, 250.0, 0.01)),
    );
    let store = Store::open_in_memory().unwrap();
    let engine = engine_with(venue.clone(), store);

    let outcome = engine
        .run_with_candidates(
            vec![sponsored_row("0xb", "tok-b", "Quiet market two", 8000.0, 1500.0)],
            &live_cfg(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.orders_placed, 2);
    assert_eq!(outcome.sponsored_markets, 1);
    assert!((outcome.avg_sponsor - 1500.0).abs() < 1e-9);

    let placed = venue.placements();
    // 22 bp × 0.7 = 15 bp → raw 0.4985 / 0.5015 → aligned 0.49 / 0.51.
    assert_eq!(placed[0].price, 0.49);
    assert_eq!(placed[1].price, 0.51);
}

#[tokio::test]
async fn long_inventory_skews_and_halves_buy() {
    let venue = Arc::new(
        MockVenue::default().with_book("tok-c", two_sided(0.499, 0.501, 250.0, 0.01)),
    );
    let store = Store::open_in_memory().unwrap();
    store.set_position("0xc", 20.0).unwrap(); // > 0.6 × 30
    let engine = engine_with(venue.clone(), store);

    let mut cfg = live_cfg();
    cfg.base_spread_bp = 20;

    let outcome = engine
        .run_with_candidates(
            vec![catalog_row("0xc", "tok-c", "Quiet market three", 5000.0)],
            &cfg,
        )
        .await
        .unwrap();

    assert!(outcome.logs.iter().any(|l| l.contains("LONG heavy")));

    let placed = venue.placements();
    assert_eq!(placed.len(), 2);
    // buy 0.5 − 0.002 − 0.001 = 0.497 → floor 0.49; size halved
    // round(2.5) → 3.
    assert_eq!(placed[0].side, Side::Buy);
    assert_eq!(placed[0].price, 0.49);
    assert_eq!(placed[0].size, 3.0);
    // sell 0.5 + 0.002 − 0.0006 = 0.5014 → ceil 0.51; size untouched.
    assert_eq!(placed[1].side, Side::Sell);
    assert_eq!(placed[1].price, 0.51);
    assert_eq!(placed[1].size, 5.0);
}

#[tokio::test]
async fn near_yes_pauses_sell_side() {
    let venue = Arc::new(
        MockVenue::default().with_book("tok-d", two_sided(0.949, 0.951, 250.0, 0.01)),
    );
    let store = Store::open_in_memory().unwrap();
    let engine = engine_with(venue.clone(), store);

    let outcome = engine
        .run_with_candidates(
            vec![catalog_row("0xd", "tok-d", "Quiet market four", 5000.0)],
            &live_cfg(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.orders_placed, 1);
    let placed = venue.placements();
    assert_eq!(placed.len(), 1);
    // Spread capped at 5 bp: 0.9495 → tick-floored 0.94. No SELL.
    assert_eq!(placed[0].side, Side::Buy);
    assert_eq!(placed[0].price, 0.94);
}

#[tokio::test]
async fn circuit_breaker_halts_cycle() {
    let venue = Arc::new(
        MockVenue::default().with_book("tok-e", two_sided(0.399, 0.401, 250.0, 0.01)),
    );
    let store = Store::open_in_memory().unwrap();
    // Capital 65 → limit −1.95; −2.00 trips.
    store.add_realized(&Store::today(), -2.0, 65.0).unwrap();
    let engine = engine_with(venue.clone(), store.clone());

    let mut cfg = live_cfg();
    cfg.total_capital = 65.0;

    let outcome = engine
        .run_with_candidates(
            vec![catalog_row("0xe", "tok-e", "Quiet market five", 5000.0)],
            &cfg,
        )
        .await
        .unwrap();

    assert!(outcome.circuit_breaker);
    assert_eq!(outcome.orders_placed, 0);
    assert!(venue.placements().is_empty());
    assert!(store
        .daily_row(&Store::today())
        .unwrap()
        .unwrap()
        .circuit_breaker_triggered);

    // Latch holds on the next cycle even though no further loss accrued.
    let again = engine
        .run_with_candidates(
            vec![catalog_row("0xe", "tok-e", "Quiet market five", 5000.0)],
            &cfg,
        )
        .await
        .unwrap();
    assert!(again.circuit_breaker);
    assert!(venue.placements().is_empty());
}

#[tokio::test]
async fn reconcile_keeps_order_within_tolerance() {
    let venue = Arc::new(
        MockVenue::default().with_book("tok-f", two_sided(0.399, 0.401, 250.0, 0.01)),
    );
    // Resting BUY already at the aligned target.
    venue.add_open_order(RestingOrder {
        id: "resting-buy".into(),
        asset_id: "tok-f".into(),
        side: Side::Buy,
        price: 0.39,
        size: 5.0,
    });
    venue.add_open_order(RestingOrder {
        id: "resting-sell".into(),
        asset_id: "tok-f".into(),
        side: Side::Sell,
        price: 0.41,
        size: 5.0,
    });
    let store = Store::open_in_memory().unwrap();
    let engine = engine_with(venue.clone(), store);

    let outcome = engine
        .run_with_candidates(
            vec![catalog_row("0xf", "tok-f", "Quiet market six", 5000.0)],
            &live_cfg(),
        )
        .await
        .unwrap();

    // Both sides kept: zero placements, zero cancellations.
    assert_eq!(outcome.orders_placed, 0);
    assert!(venue.placements().is_empty());
    assert!(venue.cancellations().is_empty());
    assert!(outcome.logs.iter().any(|l| l.contains("♻️")));
}

#[tokio::test]
async fn two_identical_cycles_are_idempotent() {
    let venue = Arc::new(
        MockVenue::default().with_book("tok-g", two_sided(0.399, 0.401, 250.0, 0.01)),
    );
    let store = Store::open_in_memory().unwrap();
    let engine = engine_with(venue.clone(), store);
    let rows = || vec![catalog_row("0xg", "tok-g", "Quiet market seven", 5000.0)];

    let first = engine.run_with_candidates(rows(), &live_cfg()).await.unwrap();
    assert_eq!(first.orders_placed, 2);

    // Feed the first cycle's placements back as resting orders.
    for (i, args) in venue.placements().into_iter().enumerate() {
        venue.add_open_order(RestingOrder {
            id: format!("open-{i}"),
            asset_id: args.token_id,
            side: args.side,
            price: args.price,
            size: args.size,
        });
    }

    let second = engine.run_with_candidates(rows(), &live_cfg()).await.unwrap();
    assert_eq!(second.orders_placed, 0);
    assert!(venue.cancellations().is_empty());
}

#[tokio::test]
async fn stale_orders_replaced_and_duplicates_swept() {
    let venue = Arc::new(
        MockVenue::default().with_book("tok-h", two_sided(0.399, 0.401, 250.0, 0.01)),
    );
    venue.add_open_order(RestingOrder {
        id: "stale-buy".into(),
        asset_id: "tok-h".into(),
        side: Side::Buy,
        price: 0.33,
        size: 5.0,
    });
    venue.add_open_order(RestingOrder {
        id: "dup-buy".into(),
        asset_id: "tok-h".into(),
        side: Side::Buy,
        price: 0.35,
        size: 5.0,
    });
    let store = Store::open_in_memory().unwrap();
    let engine = engine_with(venue.clone(), store.clone());

    let outcome = engine
        .run_with_candidates(
            vec![catalog_row("0xh", "tok-h", "Quiet market eight", 5000.0)],
            &live_cfg(),
        )
        .await
        .unwrap();

    // Stale BUY replaced, duplicate swept, SELL placed fresh.
    assert_eq!(outcome.orders_placed, 2);
    let cancelled = venue.cancellations();
    assert!(cancelled.contains(&"stale-buy".to_string()));
    assert!(cancelled.contains(&"dup-buy".to_string()));

    // Audit trail: placements and cancellations all recorded.
    let rows = store.recent_trades(20, false).unwrap();
    assert_eq!(rows.iter().filter(|r| r.action == "place").count(), 2);
    assert_eq!(rows.iter().filter(|r| r.action == "cancel").count(), 2);
}

#[tokio::test]
async fn markets_quoted_in_score_order() {
    // Higher-volume market must be reconciled first.
    let venue = Arc::new(
        MockVenue::default()
            .with_book("tok-lo", two_sided(0.399, 0.401, 250.0, 0.01))
            .with_book("tok-hi", two_sided(0.299, 0.301, 250.0, 0.01)),
    );
    let store = Store::open_in_memory().unwrap();
    let engine = engine_with(venue.clone(), store);

    engine
        .run_with_candidates(
            vec![
                catalog_row("0xlo", "tok-lo", "Quiet market nine", 1000.0),
                catalog_row("0xhi", "tok-hi", "Quiet market ten", 400_000.0),
            ],
            &live_cfg(),
        )
        .await
        .unwrap();

    let placed = venue.placements();
    assert_eq!(placed.len(), 4);
    assert_eq!(placed[0].token_id, "tok-hi");
    assert_eq!(placed[1].token_id, "tok-hi");
    assert_eq!(placed[2].token_id, "tok-lo");
}

#[tokio::test]
async fn paper_mode_places_nothing_at_the_venue() {
    let venue = Arc::new(
        MockVenue::default().with_book("tok-p", two_sided(0.399, 0.401, 250.0, 0.01)),
    );
    let store = Store::open_in_memory().unwrap();
    let engine = engine_with(venue.clone(), store.clone());

    let mut cfg = live_cfg();
    cfg.paper = true;

    // Several cycles: whatever the seeded rolls produce, nothing may
    // reach the venue and the position must respect the cap.
    for _ in 0..10 {
        engine
            .run_with_candidates(
                vec![catalog_row("0xp", "tok-p", "Quiet market eleven", 5000.0)],
                &cfg,
            )
            .await
            .unwrap();
    }

    assert!(venue.placements().is_empty());
    assert!(venue.cancellations().is_empty());

    let position = store.net_position("0xp").unwrap();
    assert!(position.abs() <= cfg.max_position);

    // Any simulated fills are paper-flagged and credited non-negative
    // PnL.
    let rows = store.recent_trades(100, false).unwrap();
    assert!(rows.iter().all(|r| r.paper));
    if let Some(day) = store.daily_row(&Store::today()).unwrap() {
        assert!(day.realized_pnl >= 0.0);
    }
}

#[tokio::test]
async fn empty_book_market_is_skipped() {
    let venue = Arc::new(MockVenue::default().with_book("tok-x", BookSnapshot::default()));
    let store = Store::open_in_memory().unwrap();
    let engine = engine_with(venue.clone(), store);

    let outcome = engine
        .run_with_candidates(
            vec![catalog_row("0xx", "tok-x", "Quiet market twelve", 5000.0)],
            &live_cfg(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.total_markets, 0);
    assert_eq!(outcome.orders_placed, 0);
    assert!(venue.placements().is_empty());
}
