use std::time::Duration;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trade_engine::api;
use trade_engine::engine::DEFAULT_QUEUE_CAPACITY;
use trade_engine::state::AppState;
use trade_engine::store;
use trade_engine::utils;

/// Spot exchange order service: HTTP ingress plus one matching engine per
/// symbol.
#[derive(Parser)]
#[command(name = "trade-engine", version, about)]
struct Config {
    /// Address the HTTP server binds to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen_addr: String,

    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Bound of each engine's submit and cancel queues.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(&cfg.database_url)
        .await?;
    store::init(&pool).await?;

    let state = AppState::postgres(pool, cfg.queue_capacity);
    let registry = state.registry.clone();
    let app = api::router(state);

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!(addr = %cfg.listen_addr, "listening");

    let token = utils::shutdown_token();
    let serve_token = token.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { serve_token.cancelled().await })
            .await
    });

    token.cancelled().await;

    // engines first, then give HTTP one second to drain
    registry.close_all().await;
    match tokio::time::timeout(Duration::from_secs(1), server).await {
        Ok(served) => served??,
        Err(_) => warn!("timeout of 1 second, http server did not drain"),
    }
    info!("server exiting");
    Ok(())
}
