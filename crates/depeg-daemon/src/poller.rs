//! Background index polling.
//!
//! Aggregates every configured symbol on a fixed interval so trigger
//! evaluation has history even when no client is requesting prices. A failed
//! symbol is logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use depeg_types::events::EventType;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::storage::with_db;
use crate::DaemonState;

pub const LAST_POLL_KEY: &str = "last_poll_at";
pub const POLLS_COMPLETED_KEY: &str = "polls_completed";

/// Run one polling round. Returns the number of symbols updated.
pub async fn poll_once(state: &DaemonState) -> usize {
    let mut updated = 0;
    for symbol in &state.config.poller.symbols {
        match state.oracle.index(symbol).await {
            Ok(index) => {
                debug!(symbol = %index.symbol, price = index.price, sources = index.source_count, "polled");
                state
                    .event_bus
                    .publish(EventType::IndexUpdated, index.timestamp, &index);
                updated += 1;
            }
            Err(e) => {
                warn!(%symbol, error = %e, "poll failed");
                state.event_bus.publish(
                    EventType::SourceQuorumFailed,
                    state.oracle.now(),
                    &json!({ "symbol": symbol, "error": e.to_string() }),
                );
            }
        }
    }
    record_round(state).await;
    updated
}

async fn record_round(state: &DaemonState) {
    use depeg_db::queries::settings;

    let now = state.oracle.now();
    let result = with_db(&state.db, move |conn| {
        let n = settings::get_u64(conn, POLLS_COMPLETED_KEY, 0)?;
        settings::set(conn, POLLS_COMPLETED_KEY, &(n + 1).to_string())?;
        settings::set(conn, LAST_POLL_KEY, &now.to_string())
    })
    .await;
    if let Err(e) = result {
        warn!(error = %e, "failed to record poll round");
    }
}

/// Poll until a shutdown signal arrives.
pub async fn run(state: Arc<DaemonState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let period = Duration::from_secs(state.config.poller.interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(interval_secs = period.as_secs(), symbols = ?state.config.poller.symbols, "poller started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let updated = poll_once(&state).await;
                debug!(updated, "poll round complete");
            }
            _ = shutdown_rx.recv() => {
                info!("poller stopping");
                break;
            }
        }
    }
}
