//! # depeg-market
//!
//! Settlement side of the depeg protection protocol: a liquidity pool that
//! sells time-boxed protection against signed probability quotes and pays
//! out against signed trigger attestations.
//!
//! Every state-changing call validates everything before it mutates anything,
//! so a failed call leaves the market exactly as it was. The [`ledger`]
//! module plays the host chain: native balances, a market factory, and a
//! transaction boundary that only moves value when the market call succeeds.
//!
//! ## Modules
//!
//! - [`pool`]: Liquidity, exposure, and LP balance accounting
//! - [`pricing`]: Utilization-driven risk loading and premium quotes
//! - [`verify`]: Attestation signature and freshness checks
//! - [`market`]: The per-market policy state machine
//! - [`factory`]: Market creation and address derivation
//! - [`ledger`]: Host balances and atomic transactions

pub mod factory;
pub mod ledger;
pub mod market;
pub mod pool;
pub mod pricing;
pub mod verify;

use depeg_types::Address;

/// Reasons a market call reverts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    /// Liquidity deposit or withdrawal of zero.
    #[error("amount must be positive")]
    ZeroAmount,

    /// Protection purchase with zero notional.
    #[error("notional must be positive")]
    ZeroNotional,

    /// The pool holds no liquidity.
    #[error("pool has no liquidity")]
    NoLiquidity,

    /// Withdrawal larger than the caller's LP balance.
    #[error("insufficient LP balance: requested {requested}, balance {balance}")]
    InsufficientLpBalance { requested: u128, balance: u128 },

    /// Withdrawal would leave less liquidity than open exposure requires.
    #[error("withdraw limit exceeded: requested {requested}, max {max}")]
    WithdrawLimitExceeded { requested: u128, max: u128 },

    /// Signature does not verify under the market's oracle signer.
    #[error("bad attestation signature")]
    BadSignature,

    /// Attestation is older than the freshness bound, or from the future.
    #[error("stale attestation: issued at {issued_at}, now {now}, max age {max_age}")]
    StaleAttestation { issued_at: u64, now: u64, max_age: u64 },

    /// Value sent does not equal the quoted premium.
    #[error("premium mismatch: expected {expected}, got {got}")]
    PremiumMismatch { expected: u128, got: u128 },

    /// Purchase would push exposure past the reserve capacity.
    #[error("capacity exceeded: requested {requested}, available {available}")]
    CapacityExceeded { requested: u128, available: u128 },

    /// Claim by someone other than the policy buyer.
    #[error("caller is not the policy buyer")]
    NotBuyer,

    /// Policy was already paid out.
    #[error("policy already claimed")]
    AlreadyClaimed,

    /// Attested breach is shorter than the window once clamped to the policy.
    #[error("not triggered: breach {duration}s inside policy, window {window}s")]
    NotTriggered { duration: u64, window: u64 },

    /// Attested breach does not overlap the policy's lifetime.
    #[error("event outside policy window")]
    OutOfWindow,

    /// No policy with this id.
    #[error("no policy {0}")]
    NoPolicy(u64),

    /// No market at this address.
    #[error("no market at {0}")]
    UnknownMarket(Address),

    /// Market parameters are invalid.
    #[error("invalid config: {0}")]
    Config(String),

    /// Amount arithmetic overflowed.
    #[error("arithmetic overflow")]
    Overflow,

    /// Host account cannot cover the value sent.
    #[error("insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: u128, available: u128 },
}

impl MarketError {
    /// Short revert reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            MarketError::ZeroAmount => "AMOUNT",
            MarketError::ZeroNotional => "NOTIONAL",
            MarketError::NoLiquidity => "NO_LIQ",
            MarketError::InsufficientLpBalance { .. } => "BAL",
            MarketError::WithdrawLimitExceeded { .. } => "WITHDRAW_LIMIT",
            MarketError::BadSignature => "BAD_SIG",
            MarketError::StaleAttestation { .. } => "STALE_P",
            MarketError::PremiumMismatch { .. } => "PREMIUM",
            MarketError::CapacityExceeded { .. } => "CAPACITY",
            MarketError::NotBuyer => "NOT_BUYER",
            MarketError::AlreadyClaimed => "CLAIMED",
            MarketError::NotTriggered { .. } => "NOT_TRIGGERED",
            MarketError::OutOfWindow => "OUT_WINDOW",
            MarketError::NoPolicy(_) => "NO_POLICY",
            MarketError::UnknownMarket(_) => "NO_MARKET",
            MarketError::Config(_) => "CONFIG",
            MarketError::Overflow => "OVERFLOW",
            MarketError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
        }
    }
}

impl From<depeg_types::TypeError> for MarketError {
    fn from(e: depeg_types::TypeError) -> Self {
        MarketError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;
