//! CoinGecko simple-price adapter.
//!
//! Used for FLR, which has a single source and is only ever shown as a
//! display conversion.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::PriceSource;
use crate::{validate_price, OracleError, Result};

/// CoinGecko coin id for each supported symbol.
pub fn coin_id(symbol: &str) -> Option<&'static str> {
    match symbol {
        "FLR" => Some("flare-networks"),
        _ => None,
    }
}

/// `{"flare-networks":{"usd":0.0231}}`
pub fn parse_simple_price(body: &str, coin: &str) -> Result<f64> {
    let parsed: HashMap<String, HashMap<String, f64>> =
        serde_json::from_str(body).map_err(|e| OracleError::Decode(e.to_string()))?;
    let price = parsed
        .get(coin)
        .and_then(|m| m.get("usd"))
        .copied()
        .ok_or_else(|| OracleError::Decode(format!("no usd price for {coin}")))?;
    validate_price(price)
}

pub struct CoinGeckoSource {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl CoinGeckoSource {
    pub const NAME: &'static str = "coingecko";

    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            base_url: "https://api.coingecko.com".to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn weight(&self, symbol: &str) -> Option<f64> {
        coin_id(symbol).map(|_| 1.0)
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64> {
        let coin = coin_id(symbol).ok_or_else(|| OracleError::UnknownSymbol(symbol.to_string()))?;
        let url = format!("{}/api/v3/simple/price", self.base_url.trim_end_matches('/'));
        let body = self
            .client
            .get(&url)
            .query(&[("ids", coin), ("vs_currencies", "usd")])
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let price = parse_simple_price(&body, coin)?;
        debug!(symbol, price, "coingecko price");
        Ok(price)
    }
}
