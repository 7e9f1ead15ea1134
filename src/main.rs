//! VitalWatch Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - VITALWATCH_HOST: Bind address (default: 0.0.0.0)
//! - VITALWATCH_PORT: Port number (default: 8080)
//! - VITALWATCH_DATA_DIR: Directory for the alert ledger and connection registry (default: in-memory)
//! - VITALWATCH_WORKERS: Readings processed concurrently per batch (default: CPU count)
//! - VITALWATCH_BROADCAST_CONCURRENCY: Deliveries in flight per broadcast (default: 32)
//! - VITALWATCH_DELIVERY_TIMEOUT_MS: Per-connection delivery timeout (default: 2000)
//! - VITALWATCH_GATEWAY_ENDPOINT: External WebSocket gateway callback URL (default: local hub on /ws)
//! - VITALWATCH_WEBHOOK_URL: Webhook for critical alert notifications (default: log only)
//! - VITALWATCH_DEDUP_WINDOW_SECS: Suppress replayed alerts within this window (default: 0, disabled)
//! - RUST_LOG: Log level (default: info)
//!
//! With the `kafka` feature, `KAFKA_TOPICS` enables the change-feed consumer.

use vitalwatch::api::{run_server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vitalwatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    tracing::info!("VitalWatch configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    match &config.data_dir {
        Some(dir) => tracing::info!("  Data directory: {}", dir.display()),
        None => tracing::info!("  Data directory: none (in-memory)"),
    }
    tracing::info!("  Workers: {}", config.workers);
    tracing::info!(
        "  Broadcast: {} concurrent, {} ms timeout",
        config.broadcast_concurrency,
        config.delivery_timeout_ms
    );
    match &config.gateway_endpoint {
        Some(endpoint) => tracing::info!("  Transport: gateway @ {}", endpoint),
        None => tracing::info!("  Transport: local WebSocket hub (/ws)"),
    }
    match &config.webhook_url {
        Some(url) => tracing::info!("  Notifications: webhook @ {}", url),
        None => tracing::info!("  Notifications: log only"),
    }
    tracing::info!(
        "  Thresholds: HR {}-{} bpm, SYS > {} mmHg, SpO2 < {}%, T > {}°C",
        config.thresholds.heart_rate_low,
        config.thresholds.heart_rate_high,
        config.thresholds.bp_systolic_high,
        config.thresholds.spo2_low,
        config.thresholds.temperature_high
    );
    if config.dedup_window_secs > 0 {
        tracing::info!("  Alert dedup window: {} seconds", config.dedup_window_secs);
    } else {
        tracing::info!("  Alert dedup: DISABLED");
    }

    println!(
        r#"
 __      ___ _        ___          __   _       _
 \ \    / (_) |      | \ \        / /  | |     | |
  \ \  / / _| |_ __ _| |\ \  /\  / /_ _| |_ ___| |__
   \ \/ / | | __/ _` | | \ \/  \/ / _` | __/ __| '_ \
    \  /  | | || (_| | |  \  /\  / (_| | || (__| | | |
     \/   |_|\__\__,_|_|   \/  \/ \__,_|\__\___|_| |_|

 Real-Time Vital-Sign Alerting
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
