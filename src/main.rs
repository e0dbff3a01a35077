//! POLYMAKER — passive market-making engine for a CLOB prediction exchange.
//!
//! Headless entry point. Loads configuration from the environment,
//! initialises structured logging, opens the store, and runs the
//! periodic quoting loop with graceful shutdown. Exits 1 on
//! unrecoverable init failure (e.g. missing signer key).

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use polymaker::config::{db_path_from_env, MakerConfig, VenueCreds};
use polymaker::engine::driver::CycleDriver;
use polymaker::engine::Engine;
use polymaker::server::{self, ServerState};
use polymaker::storage::Store;
use polymaker::venue::catalog::CatalogClient;
use polymaker::venue::clob::ClobClient;
use polymaker::venue::rewards::RewardsClient;
use polymaker::venue::spot::SpotClient;
use polymaker::venue::ClobVenue;

const BANNER: &str = r#"
 ____   ___  _   __   ____  __    _   _  _____ ____
|  _ \ / _ \| |  \ \ / /  \/  |  / \ | |/ / ____|  _ \
| |_) | | | | |   \ V /| |\/| | / _ \| ' /|  _| | |_) |
|  __/| |_| | |___ | | | |  | |/ ___ \ . \| |___|  _ <
|_|    \___/|_____||_| |_|  |_/_/   \_\_|\_\_____|_| \_\

  Passive spread capture with inventory control
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = MakerConfig::from_env().normalized();
    init_logging();

    println!("{BANNER}");
    info!(
        interval_secs = cfg.interval_secs,
        max_markets = cfg.max_markets,
        order_size = cfg.order_size,
        total_capital = cfg.total_capital,
        paper = cfg.paper,
        "POLYMAKER starting up"
    );

    // Missing signer key is the unrecoverable init failure: exit 1.
    let creds = VenueCreds::from_env().context("venue credentials missing")?;

    let store = Store::open(&db_path_from_env())?;
    let venue: Arc<dyn ClobVenue> = Arc::new(ClobClient::new(creds.clone())?);
    let spot = if cfg.external_oracle {
        Some(SpotClient::new()?)
    } else {
        None
    };
    let engine = Arc::new(Engine::new(
        venue,
        CatalogClient::new()?,
        RewardsClient::new()?,
        spot,
        store,
    ));

    let driver = CycleDriver::new(engine.clone(), cfg.clone());

    let port = std::env::var("MAKER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080u16);
    server::spawn_server(
        Arc::new(ServerState {
            engine,
            driver: driver.clone(),
            address: creds.funder_address.clone(),
            started_at: Utc::now(),
        }),
        port,
    )
    .await?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tokio::select! {
        _ = driver.run() => {}
        _ = &mut shutdown => {
            info!("Shutdown signal received.");
            driver.stop().await;
        }
    }

    info!(
        cycles = driver.cycles(),
        orders = driver.total_orders(),
        "POLYMAKER shut down cleanly."
    );
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("polymaker=info"));

    if std::env::var("MAKER_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
