//! Attestation signing.
//!
//! One long-lived Ed25519 key signs all three attestation families. The
//! `issuedAt` of trigger and probability attestations is read from the clock
//! at the moment of signing, backdated by a fixed buffer.

use std::sync::Arc;

use depeg_crypto::ed25519::{SigningKey, VerifyingKey};
use depeg_types::attestation::{Attestation, AttestationContext, SignedAttestation, ISSUED_AT_BACKDATE_SECS};
use depeg_types::time::Clock;
use depeg_types::{Address, FeedId};
use tracing::info;

use crate::trigger::TriggerOutcome;

pub struct AttestationSigner {
    key: SigningKey,
    chain_id: u64,
    clock: Arc<dyn Clock>,
    backdate_secs: u64,
}

impl AttestationSigner {
    pub fn new(key: SigningKey, chain_id: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            key,
            chain_id,
            clock,
            backdate_secs: ISSUED_AT_BACKDATE_SECS,
        }
    }

    /// Public key markets must be configured with.
    pub fn signer(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn context(&self, market_address: Address, feed_id: FeedId) -> AttestationContext {
        AttestationContext {
            market_address,
            chain_id: self.chain_id,
            feed_id,
        }
    }

    fn issued_at(&self) -> u64 {
        self.clock.now().saturating_sub(self.backdate_secs)
    }

    fn sign(&self, context: AttestationContext, attestation: Attestation) -> SignedAttestation {
        let signature = self.key.sign(&attestation.signing_message(&context));
        info!(
            tag = attestation.tag(),
            market = %context.market_address,
            issued_at = attestation.issued_at(),
            "attestation signed"
        );
        SignedAttestation {
            context,
            attestation,
            signature,
            signer: self.signer(),
        }
    }

    /// Sign an index value at the index's own timestamp.
    pub fn sign_index_update(
        &self,
        market_address: Address,
        feed_id: FeedId,
        price_ppm: u64,
        timestamp: u64,
    ) -> SignedAttestation {
        self.sign(
            self.context(market_address, feed_id),
            Attestation::IndexUpdate {
                price_ppm,
                timestamp,
            },
        )
    }

    pub fn sign_trigger(
        &self,
        market_address: Address,
        feed_id: FeedId,
        barrier_ppm: u64,
        window_sec: u64,
        outcome: &TriggerOutcome,
    ) -> SignedAttestation {
        self.sign(
            self.context(market_address, feed_id),
            Attestation::Trigger {
                barrier_ppm,
                window_sec,
                event_start: outcome.event_start,
                event_end: outcome.event_end,
                triggered: outcome.triggered,
                issued_at: self.issued_at(),
            },
        )
    }

    pub fn sign_probability(
        &self,
        market_address: Address,
        feed_id: FeedId,
        horizon_sec: u64,
        p_bps: u64,
    ) -> SignedAttestation {
        self.sign(
            self.context(market_address, feed_id),
            Attestation::ProbabilityQuote {
                horizon_sec,
                p_bps,
                issued_at: self.issued_at(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depeg_types::time::ManualClock;

    fn signer(clock: Arc<ManualClock>) -> AttestationSigner {
        AttestationSigner::new(SigningKey::from_bytes(&[3u8; 32]), 114, clock)
    }

    #[test]
    fn test_issued_at_is_backdated_at_sign_time() {
        let clock = Arc::new(ManualClock::new(10_000));
        let s = signer(clock.clone());
        let first = s.sign_probability(Address::ZERO, FeedId::for_symbol("USDC"), 604_800, 150);
        clock.advance(500);
        let second = s.sign_probability(Address::ZERO, FeedId::for_symbol("USDC"), 604_800, 150);
        assert_eq!(first.attestation.issued_at(), 9_990);
        assert_eq!(second.attestation.issued_at(), 10_490);
    }

    #[test]
    fn test_signed_attestations_verify_under_signer() {
        let s = signer(Arc::new(ManualClock::new(1_000)));
        let feed = FeedId::for_symbol("USDC");
        let outcome = TriggerOutcome {
            triggered: true,
            event_start: 100,
            event_end: 1_020,
            duration: 920,
        };
        let all = [
            s.sign_index_update(Address::ZERO, feed, 985_000, 990),
            s.sign_trigger(Address::ZERO, feed, 985_000, 900, &outcome),
            s.sign_probability(Address::ZERO, feed, 604_800, 150),
        ];
        for att in &all {
            assert!(att.verify(&s.signer()).is_ok(), "{}", att.attestation.tag());
            assert_eq!(att.context.chain_id, 114);
        }
        let other = SigningKey::from_bytes(&[4u8; 32]).verifying_key();
        assert!(all[0].verify(&other).is_err());
    }

    #[test]
    fn test_issued_at_saturates_near_epoch() {
        let s = signer(Arc::new(ManualClock::new(3)));
        let q = s.sign_probability(Address::ZERO, FeedId::for_symbol("USDC"), 1, 10);
        assert_eq!(q.attestation.issued_at(), 0);
    }
}
