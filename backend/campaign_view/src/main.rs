//! Campaign view service entry point.
//!
//! Loads every campaign from the ledger gateway, keeps their active/ended
//! classification current with a one-second ticker and exposes the view,
//! donor panels and donate/withdraw/create actions over a small Axum API.

mod account;
mod amount;
mod api;
mod campaign;
mod classifier;
mod config;
mod coordinator;
mod db;
mod donors;
mod errors;
mod ledger;
mod loader;
#[cfg(test)]
mod mock_ledger;
mod rpc;
mod session;
mod ticker;
mod view;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::Config;
use rpc::JsonRpcGateway;
use session::SessionContext;
use ticker::SystemClock;
use view::CampaignView;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // SQLite holds the connected wallet across restarts.
    let pool = db::init_pool(&config.database_url).await?;
    let session = Arc::new(SessionContext::restore(pool).await?);

    let client = Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()?;
    let gateway = Arc::new(JsonRpcGateway::new(client, &config));

    let view = Arc::new(CampaignView::new(
        gateway,
        session,
        Arc::new(SystemClock),
        config.tick_interval(),
        config.load_concurrency,
    ));

    // ─── Initial load ─────────────────────────────────────
    // A failed first load leaves an empty view; POST /campaigns/refresh retries.
    match view.refresh().await {
        Ok(records) => info!("Loaded {} campaigns", records.len()),
        Err(e) => error!("Initial campaign load failed: {e}"),
    }

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState { view: view.clone() });

    let app = api::router(api_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    view.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
