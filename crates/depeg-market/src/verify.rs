//! Attestation checks performed by a market before it mutates state.
//!
//! The market never trusts caller-supplied signer keys or display fields. It
//! rebuilds the attestation from its own config plus the caller's fields and
//! verifies against the configured oracle key.

use depeg_crypto::ed25519::Signature;
use depeg_types::attestation::{Attestation, AttestationContext};
use depeg_types::market::MarketConfig;
use depeg_types::Address;
use tracing::debug;

use crate::{MarketError, Result};

/// Context every attestation consumed by this market must be bound to.
pub fn market_context(market: Address, chain_id: u64, config: &MarketConfig) -> AttestationContext {
    AttestationContext {
        market_address: market,
        chain_id,
        feed_id: config.feed_id,
    }
}

/// Signature must verify under the configured oracle key.
pub fn check_signature(
    config: &MarketConfig,
    ctx: &AttestationContext,
    attestation: &Attestation,
    signature: &Signature,
) -> Result<()> {
    config
        .oracle_signer
        .verify(&attestation.signing_message(ctx), signature)
        .map_err(|_| {
            debug!(tag = attestation.tag(), "attestation signature rejected");
            MarketError::BadSignature
        })
}

/// `issued_at <= now` and `now - issued_at <= max_age`.
pub fn check_freshness(issued_at: u64, now: u64, max_age: u64) -> Result<()> {
    let fresh = issued_at <= now && now - issued_at <= max_age;
    if fresh {
        Ok(())
    } else {
        Err(MarketError::StaleAttestation {
            issued_at,
            now,
            max_age,
        })
    }
}

/// Signature first, then freshness.
pub fn verify_attestation(
    config: &MarketConfig,
    ctx: &AttestationContext,
    attestation: &Attestation,
    signature: &Signature,
    now: u64,
) -> Result<()> {
    check_signature(config, ctx, attestation, signature)?;
    check_freshness(attestation.issued_at(), now, config.max_price_age_sec)
}
