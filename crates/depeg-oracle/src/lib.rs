//! # depeg-oracle
//!
//! Off-chain half of the depeg protection protocol: pulls stablecoin prices
//! from heterogeneous venues, keeps a per-symbol index history, detects
//! sustained barrier breaches, prices protection, and signs the three
//! attestation families a settlement market accepts.
//!
//! ## Modules
//!
//! - [`sources`]: Venue adapters (CEX REST, AMM TWAP over JSON-RPC, CoinGecko)
//! - [`aggregator`]: Concurrent fan-out, source quorum, weighted index
//! - [`history`]: Per-symbol price history with a retention window
//! - [`trigger`]: Longest strict-breach run detection
//! - [`quote`]: Distance/horizon probability ladder
//! - [`signer`]: Domain-separated attestation signing
//! - [`service`]: Request-level facade used by the HTTP layer

pub mod aggregator;
pub mod history;
pub mod quote;
pub mod service;
pub mod signer;
pub mod sources;
pub mod trigger;

/// Error types for oracle operations.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// Fewer sources answered than the symbol's quorum requires.
    #[error("insufficient sources: {got}/{required}")]
    InsufficientSources {
        /// Observations that were fulfilled.
        got: usize,
        /// Quorum for the symbol.
        required: usize,
    },

    /// A single venue did not answer within its timeout.
    #[error("source {venue} timed out after {timeout_ms}ms")]
    SourceTimeout {
        /// Venue label.
        venue: String,
        /// The venue's configured timeout.
        timeout_ms: u64,
    },

    /// A single venue answered with something unusable.
    #[error("source {venue} failed: {detail}")]
    SourceError {
        /// Venue label.
        venue: String,
        /// Human-readable cause.
        detail: String,
    },

    /// No adapter quotes the requested symbol.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// An AMM pool's tokens do not match the configured stable/base pair.
    #[error("pool tokens mismatch: {token0}/{token1} expected {stable}/{base}")]
    PoolTokenMismatch {
        token0: String,
        token1: String,
        stable: String,
        base: String,
    },

    /// A venue reported a zero, negative, or non-finite price.
    #[error("invalid price: {0}")]
    InvalidPrice(f64),

    /// Request parameters are inconsistent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// HTTP transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A response body or ABI word could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A JSON-RPC node returned an error object.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Writing to the history sink failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A symbol, address, or feed id could not be parsed.
    #[error(transparent)]
    Type(#[from] depeg_types::TypeError),
}

/// Convenience result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;

/// Reject zero, negative, and non-finite prices.
pub(crate) fn validate_price(price: f64) -> Result<f64> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(OracleError::InvalidPrice(price))
    }
}
