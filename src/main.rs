mod catalog;
mod catalog_api;
mod config;
mod device_api;
mod normalizer;
mod object_store;
mod publisher;

use anyhow::{Context, Result};
use catalog_api::{start_api_server, AppState};
use config::Config;
use device_api::ProxyClient;
use object_store::{ObjectStore, S3CatalogStore};
use publisher::CatalogPublisher;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting catalog service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let store: Arc<dyn ObjectStore> = Arc::new(S3CatalogStore::new(&config.storage).await);

    let client = ProxyClient::new(&config.proxy).context("Failed to initialize proxy client")?;
    let publisher = CatalogPublisher::new(Arc::new(client), store.clone(), config.fetch.clone());

    // Create API state
    let api_state = AppState {
        store: store.clone(),
        http: reqwest::Client::new(),
        api: config.api.clone(),
        relay: config.relay.clone(),
        catalog_key: config.fetch.catalog_key.clone(),
    };

    // Spawn the publish schedule loop
    let schedule_interval = config.schedule_interval();
    let run_on_start = config.fetch.run_on_start;
    let publisher_handle = tokio::spawn(async move {
        run_schedule(publisher, schedule_interval, run_on_start).await;
    });

    // Spawn API server task
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Catalog service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down catalog service");

    // Abort tasks
    publisher_handle.abort();
    api_handle.abort();

    info!("Catalog service stopped");

    Ok(())
}

/// Invoke the publisher on a fixed schedule, logging each run's terminal
/// state. A failed run never stops the schedule.
async fn run_schedule(
    publisher: CatalogPublisher,
    interval: std::time::Duration,
    run_on_start: bool,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    if !run_on_start {
        ticker.tick().await; // Consume the immediate first tick
    }

    loop {
        ticker.tick().await;
        match publisher.run().await {
            Ok(summary) => {
                info!(
                    run_id = %summary.run_id,
                    manufacturers_processed = summary.manufacturers_processed,
                    manufacturers_skipped = summary.manufacturers_skipped,
                    models = summary.stats.models,
                    variants = summary.stats.variants,
                    "Catalog publish run succeeded"
                );
            }
            Err(e) => {
                error!(error = %e, "Catalog publish run failed");
            }
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
