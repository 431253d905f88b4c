//! Request-level oracle operations.
//!
//! Each call is independent: it reads (and for price/quote calls, advances)
//! the shared history, computes, signs, and returns. Nothing here holds
//! state between requests besides the history store.

use std::sync::Arc;

use depeg_crypto::ed25519::{Signature, VerifyingKey};
use depeg_types::attestation::SignedAttestation;
use depeg_types::price::{AggregatedIndex, SpotPrice};
use depeg_types::time::Clock;
use depeg_types::{feed_symbol, normalize_symbol, price_to_ppm, Address, FeedId, BPS_SCALE, PPM_SCALE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregator::Aggregator;
use crate::history::PriceHistoryStore;
use crate::quote::{probability_bps, signed_distance};
use crate::signer::AttestationSigner;
use crate::sources::PriceSource;
use crate::trigger::evaluate_trigger;
use crate::{validate_price, OracleError, Result};

/// Body of a protection quote request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionQuoteRequest {
    pub stablecoin: String,
    pub market_address: Address,
    pub barrier_ppm: u64,
    pub horizon_sec: u64,
}

/// Body of a trigger attestation request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub stablecoin: String,
    pub market_address: Address,
    pub barrier_ppm: u64,
    pub window_sec: u64,
    pub start_time: u64,
    pub end_time: u64,
}

/// Index plus, when a market was named, a signed index update for it.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    #[serde(flatten)]
    pub index: AggregatedIndex,
    pub feed_id: FeedId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<SignedAttestation>,
}

/// Display-only summary of the index a quote was priced from.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub sources: usize,
    pub timestamp: u64,
}

/// A signed probability quote. Only `pBps`, `horizonSec`, `issuedAt` and the
/// binding context are covered by the signature.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionQuote {
    pub p_bps: u64,
    pub probability: f64,
    pub current_ppm: u64,
    pub distance: f64,
    pub volatility: f64,
    pub horizon_sec: u64,
    pub issued_at: u64,
    pub signature: Signature,
    pub feed_id: FeedId,
    pub market_address: Address,
    pub chain_id: u64,
    pub signer: VerifyingKey,
    pub index_stats: IndexStats,
    #[serde(skip)]
    pub attestation: SignedAttestation,
}

/// A signed trigger attestation with the scan result that produced it.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAttestationResponse {
    pub triggered: bool,
    pub event_start: u64,
    pub event_end: u64,
    pub duration: u64,
    pub barrier_ppm: u64,
    pub window_sec: u64,
    pub issued_at: u64,
    pub signature: Signature,
    pub feed_id: FeedId,
    pub market_address: Address,
    pub chain_id: u64,
    pub signer: VerifyingKey,
    #[serde(skip)]
    pub attestation: SignedAttestation,
}

fn check_barrier(barrier_ppm: u64) -> Result<()> {
    if barrier_ppm == 0 || barrier_ppm > PPM_SCALE {
        return Err(OracleError::InvalidRequest(format!(
            "barrierPpm must be in (0, {PPM_SCALE}]"
        )));
    }
    Ok(())
}

pub struct OracleService {
    aggregator: Aggregator,
    signer: AttestationSigner,
    spot: Option<Arc<dyn PriceSource>>,
    clock: Arc<dyn Clock>,
}

impl OracleService {
    pub fn new(
        aggregator: Aggregator,
        signer: AttestationSigner,
        spot: Option<Arc<dyn PriceSource>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            aggregator,
            signer,
            spot,
            clock,
        }
    }

    pub fn signer(&self) -> VerifyingKey {
        self.signer.signer()
    }

    pub fn chain_id(&self) -> u64 {
        self.signer.chain_id()
    }

    pub fn history(&self) -> &Arc<PriceHistoryStore> {
        self.aggregator.history()
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Aggregate a fresh index for `symbol`, advancing its history.
    pub async fn index(&self, symbol: &str) -> Result<AggregatedIndex> {
        self.aggregator.aggregate(symbol).await
    }

    /// Aggregate and, if `market` is given, sign an index update bound to it.
    pub async fn price_quote(&self, symbol: &str, market: Option<Address>) -> Result<PriceQuote> {
        let index = self.index(symbol).await?;
        let feed_id = FeedId::for_symbol(&index.symbol);
        let update = market.map(|m| self.signer.sign_index_update(m, feed_id, index.price_ppm, index.timestamp));
        Ok(PriceQuote {
            index,
            feed_id,
            market_address: market,
            update,
        })
    }

    /// Price protection against the current index and sign the probability.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidRequest`] for a barrier outside `(0, 1e6]` or
    ///   a zero horizon
    /// - any aggregation error; no quote is produced without a fresh index
    pub async fn protection_quote(&self, req: &ProtectionQuoteRequest) -> Result<ProtectionQuote> {
        check_barrier(req.barrier_ppm)?;
        if req.horizon_sec == 0 {
            return Err(OracleError::InvalidRequest("horizonSec must be positive".into()));
        }
        let index = self.index(&req.stablecoin).await?;
        let p_bps = probability_bps(index.price_ppm, req.barrier_ppm, req.horizon_sec);
        let feed_id = FeedId::for_symbol(&index.symbol);
        let attestation = self
            .signer
            .sign_probability(req.market_address, feed_id, req.horizon_sec, p_bps);
        debug!(symbol = %index.symbol, p_bps, current_ppm = index.price_ppm, "protection quoted");

        Ok(ProtectionQuote {
            p_bps,
            probability: p_bps as f64 / BPS_SCALE as f64,
            current_ppm: index.price_ppm,
            distance: signed_distance(index.price_ppm, req.barrier_ppm),
            volatility: 0.0,
            horizon_sec: req.horizon_sec,
            issued_at: attestation.attestation.issued_at(),
            signature: attestation.signature,
            feed_id,
            market_address: req.market_address,
            chain_id: self.chain_id(),
            signer: attestation.signer,
            index_stats: IndexStats {
                price: index.price,
                min_price: index.min_price,
                max_price: index.max_price,
                sources: index.source_count,
                timestamp: index.timestamp,
            },
            attestation,
        })
    }

    /// Scan stored history and sign the outcome. Does not fetch prices.
    ///
    /// # Errors
    ///
    /// [`OracleError::InvalidRequest`] for a bad barrier or `startTime > endTime`.
    pub fn trigger_attestation(&self, req: &TriggerRequest) -> Result<TriggerAttestationResponse> {
        check_barrier(req.barrier_ppm)?;
        if req.start_time > req.end_time {
            return Err(OracleError::InvalidRequest("startTime must not exceed endTime".into()));
        }
        let symbol = normalize_symbol(&req.stablecoin)?;
        let history = self.history().snapshot(&feed_symbol(&symbol));
        let outcome = evaluate_trigger(
            &history,
            req.barrier_ppm,
            req.window_sec,
            req.start_time,
            req.end_time,
        );
        let feed_id = FeedId::for_symbol(&symbol);
        let attestation =
            self.signer
                .sign_trigger(req.market_address, feed_id, req.barrier_ppm, req.window_sec, &outcome);
        let issued_at = attestation.attestation.issued_at();
        Ok(TriggerAttestationResponse {
            triggered: outcome.triggered,
            event_start: outcome.event_start,
            event_end: outcome.event_end,
            duration: outcome.duration,
            barrier_ppm: req.barrier_ppm,
            window_sec: req.window_sec,
            issued_at,
            signature: attestation.signature,
            feed_id,
            market_address: req.market_address,
            chain_id: self.chain_id(),
            signer: attestation.signer,
            attestation,
        })
    }

    /// Unsigned FLR/USD spot price for display conversions.
    pub async fn flr_spot(&self) -> Result<SpotPrice> {
        let source = self
            .spot
            .as_ref()
            .ok_or_else(|| OracleError::UnknownSymbol("FLR".into()))?;
        let timeout = source.timeout();
        let price = tokio::time::timeout(timeout, source.fetch_price("FLR"))
            .await
            .map_err(|_| OracleError::SourceTimeout {
                venue: source.name().to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })??;
        let price = validate_price(price)?;
        Ok(SpotPrice {
            price,
            price_ppm: price_to_ppm(price),
            timestamp: self.clock.now(),
            source: source.name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::QuorumPolicy;
    use async_trait::async_trait;
    use depeg_crypto::ed25519::SigningKey;
    use depeg_types::price::PricePoint;
    use depeg_types::time::ManualClock;
    use std::time::Duration;

    struct Fixed(&'static str, f64);

    #[async_trait]
    impl PriceSource for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
        fn weight(&self, symbol: &str) -> Option<f64> {
            matches!(symbol, "USDC" | "FLR").then_some(1.0)
        }
        async fn fetch_price(&self, _symbol: &str) -> Result<f64> {
            Ok(self.1)
        }
    }

    fn service(price: f64, clock: Arc<ManualClock>) -> OracleService {
        let sources: Vec<Arc<dyn PriceSource>> = vec![
            Arc::new(Fixed("a", price)),
            Arc::new(Fixed("b", price)),
            Arc::new(Fixed("c", price)),
        ];
        let aggregator = Aggregator::new(
            sources,
            Arc::new(PriceHistoryStore::default()),
            clock.clone(),
            QuorumPolicy::default(),
        );
        let signer = AttestationSigner::new(SigningKey::from_bytes(&[5u8; 32]), 114, clock.clone());
        OracleService::new(aggregator, signer, Some(Arc::new(Fixed("coingecko", 0.0231))), clock)
    }

    #[tokio::test]
    async fn test_protection_quote_is_signed_over_p_bps() {
        let clock = Arc::new(ManualClock::new(50_000));
        let svc = service(0.992, clock);
        let req = ProtectionQuoteRequest {
            stablecoin: "usdc".into(),
            market_address: Address([7u8; 20]),
            barrier_ppm: 985_000,
            horizon_sec: 604_800,
        };
        let quote = svc.protection_quote(&req).await.expect("quote");
        assert_eq!(quote.p_bps, 150);
        assert_eq!(quote.issued_at, 49_990);
        assert_eq!(quote.current_ppm, 992_000);
        assert_eq!(quote.feed_id, FeedId::for_symbol("USDC"));
        assert!(quote.attestation.verify(&svc.signer()).is_ok());
        let json = serde_json::to_value(&quote).expect("serialize");
        assert_eq!(json["pBps"], 150);
        assert_eq!(json["indexStats"]["sources"], 3);
        assert!(json.get("attestation").is_none());
    }

    #[tokio::test]
    async fn test_protection_quote_rejects_bad_barrier() {
        let svc = service(1.0, Arc::new(ManualClock::new(1)));
        let req = ProtectionQuoteRequest {
            stablecoin: "USDC".into(),
            market_address: Address::ZERO,
            barrier_ppm: 0,
            horizon_sec: 1,
        };
        assert!(matches!(
            svc.protection_quote(&req).await,
            Err(OracleError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_trigger_attestation_reads_history() {
        let clock = Arc::new(ManualClock::new(5_000));
        let svc = service(1.0, clock);
        for (t, p) in [(1_000, 0.99), (1_100, 0.98), (2_020, 0.98), (2_100, 1.0)] {
            svc.history().append("USDC-USD", PricePoint::new(t, p));
        }
        let req = TriggerRequest {
            stablecoin: "USDC".into(),
            market_address: Address([1u8; 20]),
            barrier_ppm: 985_000,
            window_sec: 900,
            start_time: 0,
            end_time: 5_000,
        };
        let res = svc.trigger_attestation(&req).expect("attestation");
        assert!(res.triggered);
        assert_eq!((res.event_start, res.event_end, res.duration), (1_100, 2_020, 920));
        assert_eq!(res.issued_at, 4_990);
        assert!(res.attestation.verify(&svc.signer()).is_ok());
    }

    #[test]
    fn test_trigger_attestation_rejects_inverted_range() {
        let svc = service(1.0, Arc::new(ManualClock::new(1)));
        let req = TriggerRequest {
            stablecoin: "USDC".into(),
            market_address: Address::ZERO,
            barrier_ppm: 985_000,
            window_sec: 900,
            start_time: 10,
            end_time: 5,
        };
        assert!(svc.trigger_attestation(&req).is_err());
    }

    #[tokio::test]
    async fn test_price_quote_signs_only_with_market() {
        let svc = service(1.0, Arc::new(ManualClock::new(1_000)));
        let bare = svc.price_quote("USDC", None).await.expect("quote");
        assert!(bare.update.is_none());
        let signed = svc
            .price_quote("USDC", Some(Address([2u8; 20])))
            .await
            .expect("quote");
        let update = signed.update.expect("signed update");
        assert!(update.verify(&svc.signer()).is_ok());
        assert_eq!(update.attestation.issued_at(), 1_000);
    }

    #[tokio::test]
    async fn test_flr_spot() {
        let svc = service(1.0, Arc::new(ManualClock::new(77)));
        let spot = svc.flr_spot().await.expect("spot");
        assert_eq!(spot.price_ppm, 23_100);
        assert_eq!(spot.timestamp, 77);
        assert_eq!(spot.source, "coingecko");
    }
}
