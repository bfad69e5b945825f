// =============================================================================
// Futures Sentinel — Main Entry Point
// =============================================================================
//
// Read-only market observer: polls public derivatives endpoints, folds the
// readings into snapshots, derives indicators, detects anomalies, and scores
// both sides of the market. It holds no credentials that can place orders.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod detector;
mod engine;
mod engine_config;
mod history;
mod indicators;
mod scoring;
mod snapshot;
mod sources;
mod types;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::engine::SentinelState;
use crate::engine_config::EngineConfig;
use crate::sources::{
    run_poll_loop, BinanceSource, BybitSource, CoinglassSource, ProviderFetcher, SentimentSource,
    SourceAdapter,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Futures Sentinel — Starting Up                   ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = EngineConfig::load("sentinel_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        EngineConfig::default()
    });

    // Override the symbol from env if available.
    if let Ok(symbol) = std::env::var("SENTINEL_SYMBOL") {
        let symbol = symbol.trim().to_uppercase();
        if !symbol.is_empty() {
            config.symbol = symbol;
        }
    }

    config.validate()?;

    info!(
        symbol = %config.symbol,
        cycle_interval_secs = config.cycle_interval_secs,
        "Engine configured"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = Arc::new(SentinelState::new(config.clone()));

    // ── 3. Spawn source adapters ─────────────────────────────────────────
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.http_timeout_secs()))
        .build()?;

    let adapters = [
        (
            config.binance.clone(),
            ProviderFetcher::Binance(BinanceSource::new(client.clone())),
        ),
        (
            config.bybit.clone(),
            ProviderFetcher::Bybit(BybitSource::new(client.clone())),
        ),
        (
            config.coinglass.clone(),
            ProviderFetcher::Coinglass(CoinglassSource::new(client.clone())),
        ),
        (
            config.sentiment.clone(),
            ProviderFetcher::Sentiment(SentimentSource::new(client.clone())),
        ),
    ];

    let mut spawned = 0usize;
    for (provider_config, fetcher) in adapters {
        if !provider_config.enabled {
            info!(provider = %fetcher.provider(), "adapter disabled, not spawned");
            continue;
        }
        let adapter = SourceAdapter::new(fetcher, provider_config);
        let symbol = config.symbol.clone();
        let board = state.board.clone();
        tokio::spawn(run_poll_loop(adapter, symbol, board));
        spawned += 1;
    }
    info!(count = spawned, "Source adapters launched");

    // ── 4. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr =
        std::env::var("SENTINEL_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());

    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => {
                info!(addr = %bind_addr, "API server listening");
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "API server failed");
                }
            }
            Err(e) => tracing::error!(addr = %bind_addr, error = %e, "Failed to bind API server"),
        }
    });

    // ── 5. Pipeline cycle loop ───────────────────────────────────────────
    let cycle_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(
            cycle_state.config.cycle_interval_secs,
        ));
        // First tick fires immediately; let the adapters get a poll in.
        interval.tick().await;
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            interval.tick().await;
            if let Err(e) = cycle_state.run_cycle(chrono::Utc::now()) {
                tracing::error!(error = %e, "pipeline cycle halted");
                break;
            }
        }
    });

    // ── 6. Wait for shutdown signal ──────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    info!(
        cycles = state.cycles_completed(),
        "Shutdown signal received, exiting"
    );
    Ok(())
}
