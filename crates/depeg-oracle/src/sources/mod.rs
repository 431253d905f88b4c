//! Venue adapters.
//!
//! Each adapter is a leaf: it either returns a price for a symbol or fails,
//! and a failure never affects sibling adapters. Adapters only answer for
//! symbols they carry a positive weight for.

pub mod cex;
pub mod coingecko;
pub mod dex;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// A best-effort price source for one venue.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Venue label used in observations and logs.
    fn name(&self) -> &str;

    /// Upper bound on a single fetch.
    fn timeout(&self) -> Duration;

    /// Static weight for `symbol`, or `None` when the venue does not quote it.
    fn weight(&self, symbol: &str) -> Option<f64>;

    /// Fetch the venue's current USD price for `symbol`.
    async fn fetch_price(&self, symbol: &str) -> Result<f64>;
}

/// Per-asset weights for one venue.
#[derive(Clone, Debug, Default)]
pub struct SourceWeights(HashMap<String, f64>);

impl SourceWeights {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self(
            entries
                .into_iter()
                .map(|(s, w)| (s.into().to_ascii_uppercase(), w))
                .collect(),
        )
    }

    /// Weight for `symbol`; zero and negative weights count as unsupported.
    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.0
            .get(&symbol.to_ascii_uppercase())
            .copied()
            .filter(|w| w.is_finite() && *w > 0.0)
    }
}

impl From<HashMap<String, f64>> for SourceWeights {
    fn from(map: HashMap<String, f64>) -> Self {
        Self::new(map)
    }
}

/// Build the shared HTTP client adapters use.
///
/// # Errors
///
/// Returns [`crate::OracleError::Http`] if the TLS backend cannot initialise.
pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("depeg-oracle/", env!("CARGO_PKG_VERSION")))
        .build()?)
}
