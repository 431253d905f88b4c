//! Signed oracle attestations.
//!
//! Three message families exist, each with a literal tag and its own field
//! layout. The tag is the first length-prefixed field of the preimage, so a
//! signature over one family never verifies as another even when the numeric
//! fields collide.
//!
//! | Family | Tag | Fields after context |
//! |---|---|---|
//! | Index update | `FDC:INDEX_V1` | `pricePpm, timestamp` |
//! | Trigger | `FDC:TRIGGER_V1` | `barrierPpm, windowSec, eventStart, eventEnd, triggered, issuedAt` |
//! | Probability quote | `FDC:PROB_V1` | `horizonSec, pBps, issuedAt` |
//!
//! The context prefix is always `marketAddress, chainId, feedId`.

use depeg_crypto::blake3;
use depeg_crypto::ed25519::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::{Address, FeedId};

pub const INDEX_TAG: &str = "FDC:INDEX_V1";
pub const TRIGGER_TAG: &str = "FDC:TRIGGER_V1";
pub const PROB_TAG: &str = "FDC:PROB_V1";

/// Seconds subtracted from the signing clock to form `issuedAt`.
pub const ISSUED_AT_BACKDATE_SECS: u64 = 10;

/// Which market, chain, and feed an attestation is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationContext {
    pub market_address: Address,
    pub chain_id: u64,
    pub feed_id: FeedId,
}

/// The unsigned payload of an attestation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Attestation {
    IndexUpdate {
        price_ppm: u64,
        timestamp: u64,
    },
    Trigger {
        barrier_ppm: u64,
        window_sec: u64,
        event_start: u64,
        event_end: u64,
        triggered: bool,
        issued_at: u64,
    },
    ProbabilityQuote {
        horizon_sec: u64,
        p_bps: u64,
        issued_at: u64,
    },
}

impl Attestation {
    pub fn tag(&self) -> &'static str {
        match self {
            Attestation::IndexUpdate { .. } => INDEX_TAG,
            Attestation::Trigger { .. } => TRIGGER_TAG,
            Attestation::ProbabilityQuote { .. } => PROB_TAG,
        }
    }

    /// Time the freshness bound is measured from. For index updates this is
    /// the index timestamp.
    pub fn issued_at(&self) -> u64 {
        match self {
            Attestation::IndexUpdate { timestamp, .. } => *timestamp,
            Attestation::Trigger { issued_at, .. } | Attestation::ProbabilityQuote { issued_at, .. } => {
                *issued_at
            }
        }
    }

    /// Canonical field tuple, context first, each field fixed-width big-endian.
    fn fields(&self, ctx: &AttestationContext) -> Vec<Vec<u8>> {
        let mut out: Vec<Vec<u8>> = vec![
            ctx.market_address.as_bytes().to_vec(),
            ctx.chain_id.to_be_bytes().to_vec(),
            ctx.feed_id.as_bytes().to_vec(),
        ];
        let be = |v: u64| v.to_be_bytes().to_vec();
        match self {
            Attestation::IndexUpdate { price_ppm, timestamp } => {
                out.extend([be(*price_ppm), be(*timestamp)]);
            }
            Attestation::Trigger {
                barrier_ppm,
                window_sec,
                event_start,
                event_end,
                triggered,
                issued_at,
            } => {
                out.extend([
                    be(*barrier_ppm),
                    be(*window_sec),
                    be(*event_start),
                    be(*event_end),
                    vec![u8::from(*triggered)],
                    be(*issued_at),
                ]);
            }
            Attestation::ProbabilityQuote {
                horizon_sec,
                p_bps,
                issued_at,
            } => {
                out.extend([be(*horizon_sec), be(*p_bps), be(*issued_at)]);
            }
        }
        out
    }

    /// Length-prefixed encoding of `tag || fields`.
    pub fn preimage(&self, ctx: &AttestationContext) -> Vec<u8> {
        let fields = self.fields(ctx);
        let mut refs: Vec<&[u8]> = Vec::with_capacity(fields.len() + 1);
        refs.push(self.tag().as_bytes());
        refs.extend(fields.iter().map(Vec::as_slice));
        blake3::encode_multi_field(&refs)
    }

    /// Digest of the tagged preimage.
    pub fn digest(&self, ctx: &AttestationContext) -> [u8; 32] {
        let fields = self.fields(ctx);
        let refs: Vec<&[u8]> = fields.iter().map(Vec::as_slice).collect();
        blake3::tagged_digest(self.tag(), &refs)
    }

    /// The bytes the oracle key actually signs.
    pub fn signing_message(&self, ctx: &AttestationContext) -> [u8; 32] {
        blake3::signed_message(&self.digest(ctx))
    }
}

/// An attestation together with its binding context and signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedAttestation {
    pub context: AttestationContext,
    pub attestation: Attestation,
    pub signature: Signature,
    pub signer: VerifyingKey,
}

impl SignedAttestation {
    /// Verify the signature under `expected`, ignoring the embedded `signer`.
    ///
    /// # Errors
    ///
    /// Returns [`depeg_crypto::CryptoError::SignatureVerification`] on mismatch.
    pub fn verify(&self, expected: &VerifyingKey) -> depeg_crypto::Result<()> {
        expected.verify(
            &self.attestation.signing_message(&self.context),
            &self.signature,
        )
    }
}
