//! Control API server.
//!
//! Axum router exposing the JSON action-dispatch endpoint plus the
//! health probes used by headless deployments. CORS is permissive; the
//! dashboard may call at any time, including mid-cycle.

pub mod actions;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::engine::driver::CycleDriver;
use crate::engine::Engine;

/// Shared state for all handlers.
pub struct ServerState {
    pub engine: Arc<Engine>,
    pub driver: CycleDriver,
    /// Funder address, surfaced by `whoami`.
    pub address: String,
    pub started_at: DateTime<Utc>,
}

pub type AppState = Arc<ServerState>;

/// Start the control server in the background.
pub async fn spawn_server(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind control port {port}"))?;
    info!(port, "Control server listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Control server error");
        }
    });
    Ok(())
}

/// Build the router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api", post(actions::dispatch))
        .route("/", get(health_summary))
        .route("/health", get(|| async { "OK" }))
        .layer(cors)
        .with_state(state)
}

/// GET / — deployment health summary.
async fn health_summary(State(state): State<AppState>) -> Json<serde_json::Value> {
    let driver = &state.driver;
    let last_cycle = match driver.last_cycle_unix() {
        0 => serde_json::Value::Null,
        ts => serde_json::json!(ts),
    };
    Json(serde_json::json!({
        "status": if driver.is_running() { "running" } else { "idle" },
        "mode": if driver.paper() { "paper" } else { "live" },
        "cycles": driver.cycles(),
        "lastCycle": last_cycle,
        "totalOrders": driver.total_orders(),
        "uptime": (Utc::now() - state.started_at).num_seconds(),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
