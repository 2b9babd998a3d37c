//! firebridge - telemetry bridge for fire and gas sensor devices
//!
//! Receives topic-scoped device reports over MQTT, merges them into
//! per-device state snapshots, appends every report to disk, and fans
//! reconciled updates out to dashboard observers over WebSocket.
//! Operator commands flow back to devices through a dedicated relay
//! connection.
//!
//! Module structure:
//! - `domain/` - Core types (IngestedReport, DeviceState, Command)
//! - `io/` - External interfaces (MQTT ingest, relay, store, HTTP/WS)
//! - `services/` - Business logic (Reconciler, Hub, Pipeline)
//! - `infra/` - Infrastructure (Config, Metrics, Broker)

use clap::Parser;
use firebridge::infra::{Config, Metrics};
use firebridge::io::http::{self, AppState};
use firebridge::io::{CommandRelay, ReportStore};
use firebridge::services::{AlarmNotifier, DeviceTable, Hub, Pipeline};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// firebridge - fire/gas telemetry ingestion and fan-out bridge
#[derive(Parser, Debug)]
#[command(name = "firebridge", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Structured logging, level via RUST_LOG (default INFO)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("firebridge starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    // Serve field devices without an external broker, unless disabled
    firebridge::infra::broker::start_embedded_broker(&config);

    info!(
        config_file = %config.config_file(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        topic_prefix = %config.topic_prefix(),
        devices = ?config.devices(),
        auto_register = %config.auto_register(),
        store_dir = %config.store_dir(),
        http_bind = %config.http_bind(),
        notifier_enabled = %config.notifier_enabled(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());
    let table = DeviceTable::shared(&config);
    let hub = Arc::new(Hub::new());
    let relay = Arc::new(CommandRelay::new(&config, metrics.clone()));

    // Alarm transitions push to Telegram through an ordinary hub session
    if config.notifier_enabled() {
        match (config.notifier_bot_token(), config.notifier_chat_id()) {
            (Some(token), Some(chat_id)) => {
                let notifier = AlarmNotifier::new(token, chat_id);
                let (_session_id, notifier_rx) = hub.join();
                let notifier_shutdown = shutdown_rx.clone();
                tokio::spawn(notifier.run(notifier_rx, notifier_shutdown));
            }
            _ => {
                tracing::warn!("notifier enabled but bot_token or chat_id is missing");
            }
        }
    }

    // Bounded report channel for backpressure between ingest and pipeline
    let (report_tx, report_rx) = mpsc::channel(1000);

    // Start the ingest MQTT client
    let ingest_config = config.clone();
    let ingest_metrics = metrics.clone();
    let ingest_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = firebridge::io::mqtt::start_ingest_client(
            &ingest_config,
            report_tx,
            ingest_metrics,
            ingest_shutdown,
        )
        .await
        {
            tracing::error!(error = %e, "ingest client error");
        }
    });

    // Start the dashboard API / WebSocket server
    let app_state = AppState { table: table.clone(), hub: hub.clone(), relay };
    let http_bind = config.http_bind().to_string();
    let http_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = http::serve(&http_bind, app_state, http_shutdown).await {
            tracing::error!(error = %e, "http server error");
        }
    });

    // Periodic metrics summary
    let report_metrics = metrics.clone();
    let report_table = table.clone();
    let report_hub = hub.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            report_metrics.report(report_table.read().len(), report_hub.session_count());
        }
    });

    // Shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run the pipeline - consumes reports until shutdown or channel close
    let pipeline = Pipeline::new(table, ReportStore::new(config.store_dir()), hub, metrics);
    info!("pipeline_started");
    pipeline.run(report_rx, shutdown_rx).await;

    info!("firebridge shutdown complete");
    Ok(())
}
