//! depeg-daemon: the oracle attestation service.
//!
//! Single OS process running a Tokio runtime. Aggregates stablecoin prices
//! from the configured venues, keeps a persisted price history, and serves
//! signed index, probability and trigger attestations over HTTP.

mod api;
mod config;
mod events;
mod poller;
mod sources;
mod storage;

use std::sync::Arc;

use anyhow::Context;
use depeg_crypto::ed25519::SigningKey;
use depeg_oracle::aggregator::Aggregator;
use depeg_oracle::history::PriceHistoryStore;
use depeg_oracle::service::OracleService;
use depeg_oracle::signer::AttestationSigner;
use depeg_types::events::EventType;
use depeg_types::time::{Clock, SystemClock};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;
use crate::events::EventBus;
use crate::storage::{SharedDb, SqliteHistorySink};

/// Daemon-wide shared state.
pub struct DaemonState {
    pub oracle: OracleService,
    /// Database connection. Shared with the history sink.
    pub db: SharedDb,
    pub config: DaemonConfig,
    pub event_bus: EventBus,
    pub shutdown_tx: broadcast::Sender<()>,
}

fn signing_key(config: &DaemonConfig) -> anyhow::Result<SigningKey> {
    match config.oracle.signing_key_hex() {
        Some(hex) => SigningKey::from_hex(hex.trim().trim_start_matches("0x"))
            .context("invalid oracle signing key"),
        None => {
            warn!("no oracle signing key configured; generated an ephemeral key");
            Ok(SigningKey::generate())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.log_level))?,
        )
        .init();

    info!("depeg oracle daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 2. Open database
    let db_path = data_dir.join("depeg.db");
    let db: SharedDb = Arc::new(parking_lot::Mutex::new(depeg_db::open(&db_path)?));

    // 3. History, restored from disk
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let history = Arc::new(
        PriceHistoryStore::new(config.oracle.history_retention_days)
            .with_sink(Arc::new(SqliteHistorySink::new(db.clone()))),
    );
    let restored = storage::restore_history(&db, &history, clock.now())?;
    info!(symbols = restored, "price history loaded");

    // 4. Oracle
    let key = signing_key(&config)?;
    let client = depeg_oracle::sources::http_client()?;
    let aggregator = Aggregator::new(
        sources::build_sources(&config, &client),
        history,
        clock.clone(),
        config.oracle.quorum(),
    );
    let signer = AttestationSigner::new(key, config.oracle.chain_id, clock.clone());
    let oracle = OracleService::new(aggregator, signer, sources::build_spot(&config, &client), clock.clone());
    info!(signer = %oracle.signer(), chain_id = oracle.chain_id(), "oracle signer ready");

    // 5. Shared state
    let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
    let listen_addr = config.server.listen_addr.clone();
    let state = Arc::new(DaemonState {
        oracle,
        db,
        config,
        event_bus: EventBus::new(1000),
        shutdown_tx: shutdown_tx.clone(),
    });

    state.event_bus.publish(
        EventType::DaemonStatus,
        clock.now(),
        &serde_json::json!({
            "status": "started",
            "version": env!("CARGO_PKG_VERSION"),
        }),
    );

    // 6. Background poller
    let poller = if state.config.poller.enabled {
        Some(tokio::spawn(poller::run(state.clone(), shutdown_tx.subscribe())))
    } else {
        None
    };

    // 7. HTTP server until shutdown
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    info!("listening on http://{listen_addr}");

    let app = api::create_router(state.clone());
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("HTTP server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    info!("Daemon shutting down gracefully");
    let _ = shutdown_tx.send(());
    if let Some(handle) = poller {
        let _ = handle.await;
    }

    info!("Daemon stopped");
    Ok(())
}
