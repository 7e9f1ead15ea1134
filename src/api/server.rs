use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    add_connection, dispatch_events, health_check, list_connections, remove_connection, stats,
    ws_upgrade, AppState,
};
use crate::alerts::{Notifier, NotifyTarget, Thresholds};
use crate::broadcast::{
    BroadcastConfig, Broadcaster, DeliveryTransport, GatewayTransport, WebSocketHub,
};
use crate::dispatch::{Dispatcher, DispatcherConfig};
use crate::storage::{
    AlertLedger, ConnectionRegistry, FileBackend, JsonlLedger, MemoryLedger, PersistenceBackend,
    PersistenceConfig,
};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Durable ledger and registry location; in-memory when unset
    pub data_dir: Option<PathBuf>,
    /// fsync every ledger append and registry rewrite
    pub sync_writes: bool,
    pub workers: usize,
    pub broadcast_concurrency: usize,
    pub delivery_timeout_ms: u64,
    /// External gateway callback endpoint; local WebSocket hub when unset
    pub gateway_endpoint: Option<String>,
    /// Webhook for the notification sink; log-only when unset
    pub webhook_url: Option<String>,
    pub dedup_window_secs: u64,
    pub thresholds: Thresholds,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            data_dir: None,
            sync_writes: true,
            workers: num_cpus::get().max(1),
            broadcast_concurrency: 32,
            delivery_timeout_ms: 2000,
            gateway_endpoint: None,
            webhook_url: None,
            dedup_window_secs: 0,
            thresholds: Thresholds::default(),
        }
    }
}

impl ServerConfig {
    /// Read `VITALWATCH_*` variables; anything unset or unparsable keeps its default
    pub fn from_env() -> Self {
        let defaults = Self::default();

        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }
        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            var(name).and_then(|v| v.trim().parse().ok())
        }

        Self {
            host: var("VITALWATCH_HOST").unwrap_or(defaults.host),
            port: parsed("VITALWATCH_PORT").unwrap_or(defaults.port),
            data_dir: var("VITALWATCH_DATA_DIR").map(PathBuf::from),
            sync_writes: parsed("VITALWATCH_SYNC_WRITES").unwrap_or(defaults.sync_writes),
            workers: parsed::<usize>("VITALWATCH_WORKERS")
                .filter(|w| *w > 0)
                .unwrap_or(defaults.workers),
            broadcast_concurrency: parsed::<usize>("VITALWATCH_BROADCAST_CONCURRENCY")
                .filter(|c| *c > 0)
                .unwrap_or(defaults.broadcast_concurrency),
            delivery_timeout_ms: parsed("VITALWATCH_DELIVERY_TIMEOUT_MS")
                .unwrap_or(defaults.delivery_timeout_ms),
            gateway_endpoint: var("VITALWATCH_GATEWAY_ENDPOINT"),
            webhook_url: var("VITALWATCH_WEBHOOK_URL"),
            dedup_window_secs: parsed("VITALWATCH_DEDUP_WINDOW_SECS")
                .unwrap_or(defaults.dedup_window_secs),
            thresholds: var("VITALWATCH_THRESHOLDS")
                .and_then(|raw| parse_thresholds(&raw))
                .unwrap_or(defaults.thresholds),
        }
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms.max(1))
    }
}

/// Parse a JSON threshold override; missing fields keep their defaults
fn parse_thresholds(raw: &str) -> Option<Thresholds> {
    match serde_json::from_str(raw) {
        Ok(thresholds) => Some(thresholds),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring invalid VITALWATCH_THRESHOLDS");
            None
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Change feed
        .route("/events", post(dispatch_events))
        // Connection lifecycle
        .route("/connections", get(list_connections))
        .route("/connections", post(add_connection))
        .route("/connections/:id", delete(remove_connection))
        .route("/ws", get(ws_upgrade))
        // Stats
        .route("/stats", get(stats))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Assemble ledger, registry, transport and dispatcher from configuration
pub fn build_state(config: &ServerConfig) -> Result<Arc<AppState>, Box<dyn std::error::Error>> {
    let (ledger, registry): (Arc<dyn AlertLedger>, Arc<ConnectionRegistry>) =
        match &config.data_dir {
            Some(dir) => {
                let backend: Arc<dyn PersistenceBackend> =
                    Arc::new(FileBackend::new(
                        PersistenceConfig::new(dir).with_sync_writes(config.sync_writes),
                    )?);
                let registry = ConnectionRegistry::open(Arc::clone(&backend))?;
                tracing::info!(
                    data_dir = %dir.display(),
                    connections = registry.len(),
                    "Using durable ledger and registry"
                );
                (
                    Arc::new(JsonlLedger::new(backend)) as Arc<dyn AlertLedger>,
                    Arc::new(registry),
                )
            }
            None => {
                tracing::info!("No data directory configured, ledger and registry are in-memory");
                (
                    Arc::new(MemoryLedger::new()) as Arc<dyn AlertLedger>,
                    Arc::new(ConnectionRegistry::in_memory()),
                )
            }
        };

    let (transport, hub): (Arc<dyn DeliveryTransport>, Option<Arc<WebSocketHub>>) =
        match &config.gateway_endpoint {
            Some(endpoint) => {
                tracing::info!(endpoint = %endpoint, "Delivering through external gateway");
                let gateway = GatewayTransport::new(endpoint, config.delivery_timeout())?;
                (Arc::new(gateway) as Arc<dyn DeliveryTransport>, None)
            }
            None => {
                let hub = Arc::new(WebSocketHub::default());
                (hub.clone() as Arc<dyn DeliveryTransport>, Some(hub))
            }
        };

    let broadcaster = Arc::new(Broadcaster::new(
        Arc::clone(&registry),
        transport,
        BroadcastConfig {
            max_concurrency: config.broadcast_concurrency,
            delivery_timeout: config.delivery_timeout(),
        },
    ));

    let notify_target = match &config.webhook_url {
        Some(url) => NotifyTarget::Webhook {
            url: url.clone(),
            headers: Default::default(),
        },
        None => NotifyTarget::Log,
    };
    let notifier = Arc::new(Notifier::new().with_target(notify_target));

    let dispatcher_config = DispatcherConfig::default()
        .with_workers(config.workers)
        .with_thresholds(config.thresholds.clone())
        .with_dedup_window(Duration::from_secs(config.dedup_window_secs));
    let dispatcher = Arc::new(
        Dispatcher::new(dispatcher_config, ledger, broadcaster).with_notifier(notifier),
    );

    Ok(Arc::new(AppState {
        dispatcher,
        registry,
        hub,
    }))
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(&config)?;
    let hub = state.hub.clone();

    #[cfg(feature = "kafka")]
    let kafka = match crate::ingest::KafkaConfig::from_env() {
        Some(kafka_config) => {
            let consumer =
                crate::ingest::KafkaConsumer::new(kafka_config, Arc::clone(&state.dispatcher))?;
            consumer.subscribe()?;
            Some(consumer.start())
        }
        None => None,
    };

    // Build router
    let app = build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting VitalWatch server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;

    #[cfg(feature = "kafka")]
    {
        if let Some(handle) = kafka {
            handle.stop().await;
        }
    }

    tracing::info!("VitalWatch server stopped");
    Ok(())
}

async fn shutdown_signal(hub: Option<Arc<WebSocketHub>>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutdown signal received, closing connections...");
    if let Some(hub) = hub {
        hub.close_all().await;
    }
}
