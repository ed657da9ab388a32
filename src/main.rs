//! Stock Rate Relay binary entrypoint.
//! Boots the background polling loop and the Axum HTTP server, wiring
//! routes, shared state, and graceful shutdown.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stock_rate_relay::api::{create_router, AppState};
use stock_rate_relay::config::Config;
use stock_rate_relay::feed::{http::HttpSource, SourceHealth, SourceId, SourcePair};
use stock_rate_relay::metrics::Metrics;
use stock_rate_relay::poller::Poller;
use stock_rate_relay::stream::Registry;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stock_rate_relay=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::from_env();
    config.log_summary();

    let metrics = Metrics::init();

    let sources = SourcePair {
        api1: Arc::new(HttpSource::new(
            SourceId::Api1,
            &config.api1_url,
            config.fetch_timeout(),
        )?),
        api2: Arc::new(HttpSource::new(
            SourceId::Api2,
            &config.api2_url,
            config.fetch_timeout(),
        )?),
    };
    let registry = Arc::new(Registry::new(config.queue_capacity));
    let health = Arc::new(SourceHealth::default());

    let poller = Poller::new(
        sources.clone(),
        registry.clone(),
        health.clone(),
        config.poll_interval(),
    );
    tokio::spawn(poller.run());

    let state = AppState {
        sources,
        registry: registry.clone(),
        health,
        keepalive: config.keepalive(),
    };
    let router = create_router(state).merge(metrics.router());

    let listener = TcpListener::bind(&config.bind_address).await?;
    tracing::info!(addr = %config.bind_address, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await?;

    Ok(())
}

/// Resolves on SIGINT/SIGTERM; notifies subscribers before the server stops
/// accepting work.
async fn shutdown_signal(registry: Arc<Registry>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutting down gracefully");
    registry.shutdown();
}
