//! Centralised-exchange spot adapters (Coinbase, Kraken, Binance).
//!
//! All three speak plain REST and quote prices as decimal strings. Parsing is
//! kept in free functions so it can be tested without a network.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{PriceSource, SourceWeights};
use crate::{validate_price, OracleError, Result};

/// Supported exchanges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CexVenue {
    Coinbase,
    Kraken,
    Binance,
}

impl CexVenue {
    pub fn name(&self) -> &'static str {
        match self {
            CexVenue::Coinbase => "coinbase",
            CexVenue::Kraken => "kraken",
            CexVenue::Binance => "binance",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            CexVenue::Coinbase => "https://api.coinbase.com",
            CexVenue::Kraken => "https://api.kraken.com",
            CexVenue::Binance => "https://api.binance.com",
        }
    }

    /// Request URL for `symbol` against `base_url`.
    pub fn url(&self, base_url: &str, symbol: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            CexVenue::Coinbase => format!("{base}/v2/prices/{symbol}-USD/spot"),
            CexVenue::Kraken => format!("{base}/0/public/Ticker?pair={symbol}USD"),
            CexVenue::Binance => {
                format!("{base}/api/v3/ticker/price?symbol={}", binance_pair(symbol))
            }
        }
    }

    /// Decode a response body into a USD price.
    pub fn parse(&self, body: &str) -> Result<f64> {
        let price = match self {
            CexVenue::Coinbase => parse_coinbase(body)?,
            CexVenue::Kraken => parse_kraken(body)?,
            CexVenue::Binance => parse_binance(body)?,
        };
        validate_price(price)
    }
}

/// Binance market for `symbol`.
///
/// USDT trades against USD directly; other stablecoins are read against USDT,
/// which is treated as USD parity.
pub fn binance_pair(symbol: &str) -> String {
    if symbol == "USDT" {
        "USDTUSD".to_string()
    } else {
        format!("{symbol}USDT")
    }
}

#[derive(Deserialize)]
struct CoinbaseBody {
    data: CoinbaseAmount,
}

#[derive(Deserialize)]
struct CoinbaseAmount {
    amount: String,
}

#[derive(Deserialize)]
struct KrakenBody {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, KrakenTicker>,
}

#[derive(Deserialize)]
struct KrakenTicker {
    /// Last trade closed: `[price, lot volume]`.
    c: Vec<String>,
}

#[derive(Deserialize)]
struct BinanceBody {
    price: String,
}

fn parse_decimal(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|e| OracleError::Decode(format!("{raw:?}: {e}")))
}

fn decode<'a, T: Deserialize<'a>>(body: &'a str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| OracleError::Decode(e.to_string()))
}

/// `{"data":{"amount":"0.9998",...}}`
pub fn parse_coinbase(body: &str) -> Result<f64> {
    let parsed: CoinbaseBody = decode(body)?;
    parse_decimal(&parsed.data.amount)
}

/// `{"error":[],"result":{"USDCUSD":{"c":["0.9999","100"],...}}}`
///
/// Kraken renames pairs in the result map, so the first entry is used.
pub fn parse_kraken(body: &str) -> Result<f64> {
    let parsed: KrakenBody = decode(body)?;
    if !parsed.error.is_empty() {
        return Err(OracleError::Decode(parsed.error.join("; ")));
    }
    let last = parsed
        .result
        .values()
        .next()
        .and_then(|t| t.c.first())
        .ok_or_else(|| OracleError::Decode("empty kraken result".into()))?;
    parse_decimal(last)
}

/// `{"symbol":"USDTUSD","price":"1.00010000"}`
pub fn parse_binance(body: &str) -> Result<f64> {
    let parsed: BinanceBody = decode(body)?;
    parse_decimal(&parsed.price)
}

/// A REST spot adapter for one exchange.
pub struct CexSource {
    venue: CexVenue,
    client: reqwest::Client,
    base_url: String,
    weights: SourceWeights,
    timeout: Duration,
}

impl CexSource {
    pub fn new(venue: CexVenue, client: reqwest::Client, weights: SourceWeights, timeout: Duration) -> Self {
        Self {
            venue,
            client,
            base_url: venue.default_base_url().to_string(),
            weights,
            timeout,
        }
    }

    /// Point the adapter at a different host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl PriceSource for CexSource {
    fn name(&self) -> &str {
        self.venue.name()
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn weight(&self, symbol: &str) -> Option<f64> {
        self.weights.get(symbol)
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64> {
        let url = self.venue.url(&self.base_url, symbol);
        let body = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let price = self.venue.parse(&body)?;
        debug!(venue = self.venue.name(), symbol, price, "cex price");
        Ok(price)
    }
}
