//! SQLite write-through for price history and the attestation log.

use std::sync::Arc;

use depeg_oracle::history::{HistorySink, PriceHistoryStore};
use depeg_oracle::OracleError;
use depeg_types::attestation::SignedAttestation;
use depeg_types::price::PricePoint;
use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{info, warn};

pub type SharedDb = Arc<Mutex<Connection>>;

/// Mirrors every history append into `price_history` and prunes behind it.
pub struct SqliteHistorySink {
    db: SharedDb,
}

impl SqliteHistorySink {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }
}

impl HistorySink for SqliteHistorySink {
    fn record(&self, symbol: &str, point: &PricePoint, cutoff: u64) -> depeg_oracle::Result<()> {
        let conn = self.db.lock();
        let persist = |e: depeg_db::DbError| OracleError::Persistence(e.to_string());
        depeg_db::queries::history::insert(&conn, symbol, point).map_err(persist)?;
        depeg_db::queries::history::prune_before(&conn, symbol, cutoff).map_err(persist)?;
        Ok(())
    }
}

/// Load persisted samples inside the retention window into `store`.
/// Returns the number of symbols restored.
pub fn restore_history(db: &SharedDb, store: &PriceHistoryStore, now: u64) -> depeg_db::Result<usize> {
    let since = now.saturating_sub(store.retention_secs());
    let series = {
        let conn = db.lock();
        depeg_db::queries::history::load_since(&conn, since)?
    };
    let restored = series.len();
    for (symbol, points) in series {
        info!(%symbol, points = points.len(), "restoring price history");
        store.restore(&symbol, points, now);
    }
    Ok(restored)
}

/// Run `f` against the connection on the blocking pool, off the async workers.
pub async fn with_db<T, F>(db: &SharedDb, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Connection) -> depeg_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = Arc::clone(db);
    let out = tokio::task::spawn_blocking(move || f(&*db.lock())).await??;
    Ok(out)
}

/// Append a signed attestation to the log. Failures are logged, not returned.
pub async fn log_attestation(db: &SharedDb, signed: &SignedAttestation) {
    let tag = signed.attestation.tag();
    let row = signed.clone();
    if let Err(e) = with_db(db, move |conn| depeg_db::queries::attestations::insert(conn, &row)).await {
        warn!(tag, error = %e, "failed to log attestation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> SharedDb {
        Arc::new(Mutex::new(depeg_db::open_memory().expect("open")))
    }

    #[test]
    fn test_sink_writes_and_prunes() {
        let db = db();
        let store = PriceHistoryStore::new(1).with_sink(Arc::new(SqliteHistorySink::new(db.clone())));
        store.append("USDC-USD", PricePoint::new(1_000, 0.99));
        store.append("USDC-USD", PricePoint::new(1_000 + 86_400 + 1, 0.98));

        let conn = db.lock();
        assert_eq!(
            depeg_db::queries::history::count(&conn, "USDC-USD").expect("count"),
            1
        );
    }

    #[test]
    fn test_restore_round_trip() {
        let db = db();
        {
            let conn = db.lock();
            for (ts, price) in [(100u64, 0.99), (200, 0.97), (300, 1.0)] {
                depeg_db::queries::history::insert(&conn, "USDT-USD", &PricePoint::new(ts, price))
                    .expect("insert");
            }
        }
        let store = PriceHistoryStore::default();
        let restored = restore_history(&db, &store, 400).expect("restore");
        assert_eq!(restored, 1);
        assert_eq!(store.len("USDT-USD"), 3);
        assert_eq!(store.range("USDT-USD", 150, 250), vec![PricePoint::new(200, 0.97)]);
    }

    #[test]
    fn test_same_second_samples_survive_restart_unchanged() {
        let db = db();
        let live = PriceHistoryStore::default().with_sink(Arc::new(SqliteHistorySink::new(db.clone())));
        live.append("USDC-USD", PricePoint::new(1_000, 0.97));
        live.append("USDC-USD", PricePoint::new(1_000, 1.0));
        live.append("USDC-USD", PricePoint::new(1_060, 0.99));

        let restored = PriceHistoryStore::default();
        restore_history(&db, &restored, 2_000).expect("restore");
        assert_eq!(restored.snapshot("USDC-USD"), live.snapshot("USDC-USD"));
        assert_eq!(
            live.snapshot("USDC-USD").as_slice(),
            &[PricePoint::new(1_000, 1.0), PricePoint::new(1_060, 0.99)]
        );
    }

    #[tokio::test]
    async fn test_log_attestation_off_worker() {
        use depeg_crypto::ed25519::SigningKey;
        use depeg_oracle::signer::AttestationSigner;
        use depeg_types::time::ManualClock;
        use depeg_types::{Address, FeedId};

        let db = db();
        let signer = AttestationSigner::new(SigningKey::from_bytes(&[5u8; 32]), 114, Arc::new(ManualClock::new(500)));
        let market = Address([3u8; 20]);
        let signed = signer.sign_probability(market, FeedId::for_symbol("USDC"), 604_800, 150);
        log_attestation(&db, &signed).await;

        let rows = with_db(&db, move |conn| {
            depeg_db::queries::attestations::recent_for_market(conn, &market.to_string(), 5)
        })
        .await
        .expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].issued_at, 490);
    }
}
