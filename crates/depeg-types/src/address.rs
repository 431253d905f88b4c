//! Account addresses and feed identifiers.

use std::fmt;
use std::str::FromStr;

use depeg_crypto::blake3;
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::TypeError;

/// A 20-byte account or market address, rendered as `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, SerializeDisplay, DeserializeFromStr)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The all-zero address.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Take the trailing 20 bytes of a 32-byte digest.
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[12..]);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s.trim().trim_start_matches("0x"))
            .map_err(|e| TypeError::InvalidAddress(format!("{s}: {e}")))?;
        let bytes: [u8; 20] = raw
            .try_into()
            .map_err(|_| TypeError::InvalidAddress(format!("{s}: expected 20 bytes")))?;
        Ok(Self(bytes))
    }
}

/// Identifier of a price feed: `H("<SYMBOL>-USD")` under the feed-id context.
#[derive(Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct FeedId(pub [u8; 32]);

impl FeedId {
    /// Derive the feed id of a feed string such as `"USDC-USD"`.
    pub fn from_feed_symbol(feed_symbol: &str) -> Self {
        Self(blake3::derive_key(
            blake3::contexts::FEED_ID,
            feed_symbol.as_bytes(),
        ))
    }

    /// Derive the feed id of a bare stablecoin symbol such as `"USDC"`.
    pub fn for_symbol(symbol: &str) -> Self {
        Self::from_feed_symbol(&crate::feed_symbol(symbol))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeedId({self})")
    }
}

impl FromStr for FeedId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s.trim().trim_start_matches("0x"))
            .map_err(|e| TypeError::InvalidFeedId(format!("{s}: {e}")))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| TypeError::InvalidFeedId(format!("{s}: expected 32 bytes")))?;
        Ok(Self(bytes))
    }
}
