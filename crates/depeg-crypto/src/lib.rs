//! # depeg-crypto
//!
//! Cryptographic primitives for the depeg protection oracle.
//!
//! The suite is fixed: BLAKE3 for every digest and derivation, Ed25519 for the
//! single oracle signing key.
//!
//! ## Modules
//!
//! - [`blake3`]: Domain-separated BLAKE3 hashing and canonical field encoding
//! - [`ed25519`]: Ed25519 signing and verification (RFC 8032)

pub mod blake3;
pub mod ed25519;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Hex decoding failed.
    #[error("hex decoding error: {0}")]
    Hex(#[from] hex::FromHexError),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
