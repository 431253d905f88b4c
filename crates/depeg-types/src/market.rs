//! Market configuration and policy records.

use depeg_crypto::ed25519::VerifyingKey;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::{Address, FeedId, TypeError, BPS_SCALE, PPM_SCALE};

/// Default lower bound of the risk loading.
pub const DEFAULT_LAMBDA_MIN_BPS: u64 = 500;
/// Default upper bound of the risk loading.
pub const DEFAULT_LAMBDA_MAX_BPS: u64 = 2_000;
/// Default share of liquidity reservable against open exposure.
pub const DEFAULT_RESERVE_FACTOR_BPS: u64 = 7_000;
/// Default attestation freshness bound.
pub const DEFAULT_MAX_PRICE_AGE_SEC: u64 = 300;
/// Default barrier ($0.985).
pub const DEFAULT_BARRIER_PPM: u64 = 985_000;
/// Default sustained-breach window (15 minutes).
pub const DEFAULT_WINDOW_SEC: u64 = 900;
/// Default policy horizon (7 days).
pub const DEFAULT_HORIZON_SEC: u64 = 604_800;

/// Immutable parameters of one settlement market.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketConfig {
    pub feed_id: FeedId,
    pub barrier_ppm: u64,
    pub window_sec: u64,
    pub horizon_sec: u64,
    pub lambda_min_bps: u64,
    pub lambda_max_bps: u64,
    pub reserve_factor_bps: u64,
    pub max_price_age_sec: u64,
    /// Key every attestation consumed by this market must verify under.
    pub oracle_signer: VerifyingKey,
}

impl MarketConfig {
    /// A config with the default risk parameters for `feed_id`.
    pub fn with_defaults(feed_id: FeedId, oracle_signer: VerifyingKey) -> Self {
        Self {
            feed_id,
            barrier_ppm: DEFAULT_BARRIER_PPM,
            window_sec: DEFAULT_WINDOW_SEC,
            horizon_sec: DEFAULT_HORIZON_SEC,
            lambda_min_bps: DEFAULT_LAMBDA_MIN_BPS,
            lambda_max_bps: DEFAULT_LAMBDA_MAX_BPS,
            reserve_factor_bps: DEFAULT_RESERVE_FACTOR_BPS,
            max_price_age_sec: DEFAULT_MAX_PRICE_AGE_SEC,
            oracle_signer,
        }
    }

    /// Check parameter bounds.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::InvalidConfig`] naming the first violated bound.
    pub fn validate(&self) -> crate::Result<()> {
        let fail = |msg: &str| Err(TypeError::InvalidConfig(msg.to_string()));
        if self.barrier_ppm == 0 || self.barrier_ppm > PPM_SCALE {
            return fail("barrier_ppm must be in (0, 1000000]");
        }
        if self.horizon_sec == 0 {
            return fail("horizon_sec must be positive");
        }
        if self.window_sec > self.horizon_sec {
            return fail("window_sec must not exceed horizon_sec");
        }
        if self.lambda_min_bps > self.lambda_max_bps {
            return fail("lambda_min_bps must not exceed lambda_max_bps");
        }
        if self.reserve_factor_bps == 0 || self.reserve_factor_bps > BPS_SCALE {
            return fail("reserve_factor_bps must be in (0, 10000]");
        }
        Ok(())
    }
}

/// Lifecycle state of a policy, derived from its flags and the clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Active,
    Expired,
    Claimed,
}

/// A protection policy. Created by a purchase, mutated once at claim.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: u64,
    pub buyer: Address,
    #[serde_as(as = "DisplayFromStr")]
    pub notional: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub premium_paid: u128,
    pub start: u64,
    pub expiry: u64,
    pub claimed: bool,
}

impl Policy {
    /// Claimed wins; otherwise a policy is expired strictly after `expiry`.
    pub fn status(&self, now: u64) -> PolicyStatus {
        if self.claimed {
            PolicyStatus::Claimed
        } else if now > self.expiry {
            PolicyStatus::Expired
        } else {
            PolicyStatus::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depeg_crypto::ed25519::SigningKey;

    fn config() -> MarketConfig {
        MarketConfig::with_defaults(
            FeedId::for_symbol("USDC"),
            SigningKey::from_bytes(&[1u8; 32]).verifying_key(),
        )
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let mut c = config();
        c.barrier_ppm = 0;
        assert!(c.validate().is_err());

        let mut c = config();
        c.window_sec = c.horizon_sec + 1;
        assert!(c.validate().is_err());

        let mut c = config();
        c.lambda_min_bps = 3_000;
        assert!(c.validate().is_err());

        let mut c = config();
        c.reserve_factor_bps = 10_001;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_policy_status() {
        let mut p = Policy {
            id: 1,
            buyer: Address::ZERO,
            notional: 10,
            premium_paid: 1,
            start: 100,
            expiry: 200,
            claimed: false,
        };
        assert_eq!(p.status(200), PolicyStatus::Active);
        assert_eq!(p.status(201), PolicyStatus::Expired);
        p.claimed = true;
        assert_eq!(p.status(201), PolicyStatus::Claimed);
    }

    #[test]
    fn test_policy_amounts_serialize_as_strings() {
        let p = Policy {
            id: 7,
            buyer: Address::ZERO,
            notional: 10_000_000_000_000_000_000,
            premium_paid: 150_000_000_000_000_000,
            start: 0,
            expiry: 604_800,
            claimed: false,
        };
        let json = serde_json::to_value(&p).expect("serialize");
        assert_eq!(json["notional"], "10000000000000000000");
        assert_eq!(json["premiumPaid"], "150000000000000000");
    }
}
