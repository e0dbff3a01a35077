//! Action-dispatch handlers for the control API.
//!
//! Every request is `{action, …params}`; responses are JSON. Errors come
//! back as `{error}` with a 4xx/5xx status. All actions are safe to call
//! during an active cycle — `cancel_all` and `reset_positions` may race
//! with quoting, which is accepted because the next cycle re-quotes.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::warn;

use super::AppState;
use crate::config::MakerConfig;
use crate::storage::Store;
use crate::types::err_string;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn bad_request(msg: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg })))
}

fn internal(err: &anyhow::Error) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err_string(err) })),
    )
}

/// POST /api
pub async fn dispatch(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult {
    let action = body
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| bad_request("missing action"))?;

    match action {
        "derive_creds" => derive_creds(&state).await,
        "get_markets" => get_markets(&state, &body).await,
        "get_stats" => get_stats(&state).await,
        "get_positions" => get_positions(&state),
        "get_pnl_history" => get_pnl_history(&state),
        "cancel_all" => cancel_all(&state).await,
        "reset_positions" => reset_positions(&state),
        "run_cycle" => run_cycle(&state, body.clone()).await,
        "whoami" => whoami(&state).await,
        other => Err(bad_request(&format!("unknown action: {other}"))),
    }
}

async fn derive_creds(state: &AppState) -> ApiResult {
    let prefix = state
        .engine
        .venue
        .api_key_prefix()
        .await
        .map_err(|e| internal(&e))?;
    Ok(Json(json!({ "apiKeyPrefix": prefix })))
}

async fn get_markets(state: &AppState, body: &Value) -> ApiResult {
    let limit = body
        .get("limit")
        .and_then(Value::as_u64)
        .unwrap_or(20)
        .min(90) as u32;
    let rows = state
        .engine
        .catalog
        .fetch_markets(limit)
        .await
        .map_err(|e| internal(&e))?;
    Ok(Json(json!({ "markets": rows })))
}

async fn get_stats(state: &AppState) -> ApiResult {
    let store = &state.engine.store;
    let positions = store.positions().map_err(|e| internal(&e))?;
    let open_positions: Vec<&(String, f64)> =
        positions.iter().filter(|(_, p)| *p != 0.0).collect();
    let total_value: f64 = open_positions.iter().map(|(_, p)| p.abs()).sum();

    let today = store
        .daily_row(&Store::today())
        .map_err(|e| internal(&e))?;
    let history = store.pnl_history(30).map_err(|e| internal(&e))?;
    let cumulative = history.last().map(|h| h.cumulative_pnl).unwrap_or(0.0);

    // Open-orders count degrades to zero when the venue is unreachable;
    // stats must stay callable mid-cycle.
    let open_orders = match state.engine.venue.open_orders().await {
        Ok(orders) => orders.len(),
        Err(e) => {
            warn!(error = %err_string(&e), "open-orders fetch failed in get_stats");
            0
        }
    };

    Ok(Json(json!({
        "openOrders": open_orders,
        "totalValue": total_value,
        "pnl": today.as_ref().map(|r| r.realized_pnl).unwrap_or(0.0),
        "cumulativePnl": cumulative,
        "openPositions": open_positions.len(),
        "positions": positions
            .iter()
            .map(|(id, p)| json!({ "marketId": id, "position": p }))
            .collect::<Vec<_>>(),
        "circuitBreaker": today.map(|r| r.circuit_breaker_triggered).unwrap_or(false),
    })))
}

fn get_positions(state: &AppState) -> ApiResult {
    let positions = state.engine.store.positions().map_err(|e| internal(&e))?;
    Ok(Json(json!({
        "positions": positions
            .iter()
            .map(|(id, p)| json!({ "marketId": id, "position": p }))
            .collect::<Vec<_>>(),
    })))
}

fn get_pnl_history(state: &AppState) -> ApiResult {
    let history = state
        .engine
        .store
        .pnl_history(30)
        .map_err(|e| internal(&e))?;
    Ok(Json(json!({ "history": history })))
}

async fn cancel_all(state: &AppState) -> ApiResult {
    state
        .engine
        .venue
        .cancel_all()
        .await
        .map_err(|e| internal(&e))?;
    Ok(Json(json!({ "cancelled": true })))
}

fn reset_positions(state: &AppState) -> ApiResult {
    let n = state
        .engine
        .store
        .reset_positions()
        .map_err(|e| internal(&e))?;
    Ok(Json(json!({ "reset": n })))
}

async fn run_cycle(state: &AppState, body: Value) -> ApiResult {
    // The request params ARE the config, camelCase; anything omitted
    // falls back to defaults.
    let cfg: MakerConfig =
        serde_json::from_value(body).map_err(|_| bad_request("invalid config params"))?;

    let outcome = state
        .engine
        .run_cycle(&cfg)
        .await
        .map_err(|e| internal(&e))?;

    Ok(Json(json!({
        "logs": outcome.logs,
        "ordersPlaced": outcome.orders_placed,
        "circuitBreaker": outcome.circuit_breaker,
        "sponsoredMarkets": outcome.sponsored_markets,
        "totalMarkets": outcome.total_markets,
        "avgSponsor": outcome.avg_sponsor,
    })))
}

async fn whoami(state: &AppState) -> ApiResult {
    let venue = &state.engine.venue;
    let key_prefix = venue
        .api_key_prefix()
        .await
        .unwrap_or_else(|e| format!("unavailable ({})", err_string(&e)));
    let geoblock_ok = venue.geoblock_probe().await.unwrap_or(false);
    let sample: Vec<Value> = match venue.open_orders().await {
        Ok(orders) => orders
            .iter()
            .take(5)
            .map(|o| {
                json!({
                    "id": o.id,
                    "assetId": o.asset_id,
                    "side": o.side,
                    "price": o.price,
                    "size": o.size,
                })
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    let recent = state
        .engine
        .store
        .recent_trades(10, true)
        .map_err(|e| internal(&e))?;

    Ok(Json(json!({
        "address": state.address,
        "apiKeyPrefix": key_prefix,
        "geoblockOk": geoblock_ok,
        "openOrdersSample": sample,
        "recentLiveActions": recent,
    })))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
