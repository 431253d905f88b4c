//! Price observations, aggregated indices, and history points.

use serde::{Deserialize, Serialize};

/// A single venue's price for one symbol. Ephemeral; never persisted on its own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "camelCase")]
pub struct PriceObservation {
    /// Venue label, e.g. `"binance"` or `"uniswap-ethereum"`.
    pub source: String,
    /// Decimal USD price.
    pub price: f64,
    /// Static per-venue, per-asset weight.
    pub weight: f64,
    /// Unix seconds at which the observation was taken.
    pub timestamp: u64,
}

/// The weighted index for a symbol at a point in time.
///
/// Only constructed once the source quorum has been met.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedIndex {
    pub symbol: String,
    pub price: f64,
    /// `round(price * 1e6)`.
    pub price_ppm: u64,
    pub timestamp: u64,
    pub source_count: usize,
    pub min_price: f64,
    pub max_price: f64,
    /// Population standard deviation of observed prices. Display only.
    pub std_dev: f64,
    /// The observations that made up the index. Display only.
    pub details: Vec<PriceObservation>,
}

/// One stored sample of a symbol's index price.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub timestamp: u64,
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp: u64, price: f64) -> Self {
        Self { timestamp, price }
    }

    /// The sample's price in integer ppm.
    pub fn price_ppm(&self) -> u64 {
        crate::price_to_ppm(self.price)
    }
}

/// A single-source spot price used only for display conversions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotPrice {
    pub price: f64,
    pub price_ppm: u64,
    pub timestamp: u64,
    pub source: String,
}
