//! Market creation.
//!
//! Market addresses are derived from the chain id and creation index, so the
//! same factory sequence on the same chain always yields the same addresses.

use std::collections::HashMap;

use depeg_crypto::blake3;
use depeg_crypto::ed25519::VerifyingKey;
use depeg_types::events::MarketEvent;
use depeg_types::market::{
    MarketConfig, DEFAULT_BARRIER_PPM, DEFAULT_HORIZON_SEC, DEFAULT_LAMBDA_MAX_BPS,
    DEFAULT_LAMBDA_MIN_BPS, DEFAULT_MAX_PRICE_AGE_SEC, DEFAULT_RESERVE_FACTOR_BPS,
    DEFAULT_WINDOW_SEC,
};
use depeg_types::{Address, FeedId};
use serde::Deserialize;
use tracing::info;

use crate::market::DepegMarket;
use crate::{MarketError, Result};

fn default_feed() -> String {
    "USDC-USD".to_string()
}
fn default_barrier() -> u64 {
    DEFAULT_BARRIER_PPM
}
fn default_window() -> u64 {
    DEFAULT_WINDOW_SEC
}
fn default_horizon() -> u64 {
    DEFAULT_HORIZON_SEC
}
fn default_lambda_min() -> u64 {
    DEFAULT_LAMBDA_MIN_BPS
}
fn default_lambda_max() -> u64 {
    DEFAULT_LAMBDA_MAX_BPS
}
fn default_reserve() -> u64 {
    DEFAULT_RESERVE_FACTOR_BPS
}
fn default_max_age() -> u64 {
    DEFAULT_MAX_PRICE_AGE_SEC
}

/// Creation parameters. `feed` is a feed symbol such as `USDC-USD`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketParams {
    #[serde(default = "default_feed")]
    pub feed: String,
    #[serde(default = "default_barrier")]
    pub barrier_ppm: u64,
    #[serde(default = "default_window")]
    pub window_sec: u64,
    #[serde(default = "default_horizon")]
    pub horizon_sec: u64,
    #[serde(default = "default_lambda_min")]
    pub lambda_min_bps: u64,
    #[serde(default = "default_lambda_max")]
    pub lambda_max_bps: u64,
    #[serde(default = "default_reserve")]
    pub reserve_factor_bps: u64,
    #[serde(default = "default_max_age")]
    pub max_price_age_sec: u64,
    pub oracle_signer: VerifyingKey,
}

impl MarketParams {
    /// Default parameters for `feed`.
    pub fn new(feed: impl Into<String>, oracle_signer: VerifyingKey) -> Self {
        Self {
            feed: feed.into(),
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

    /// Resolve the feed id and validate bounds.
    pub fn into_config(self) -> Result<MarketConfig> {
        if self.feed.trim().is_empty() {
            return Err(MarketError::Config("feed must not be empty".into()));
        }
        let config = MarketConfig {
            feed_id: FeedId::from_feed_symbol(self.feed.trim()),
            barrier_ppm: self.barrier_ppm,
            window_sec: self.window_sec,
            horizon_sec: self.horizon_sec,
            lambda_min_bps: self.lambda_min_bps,
            lambda_max_bps: self.lambda_max_bps,
            reserve_factor_bps: self.reserve_factor_bps,
            max_price_age_sec: self.max_price_age_sec,
            oracle_signer: self.oracle_signer,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Address of the `index`-th market created on `chain_id`.
pub fn market_address(chain_id: u64, index: u64) -> Address {
    let material = blake3::encode_multi_field(&[&chain_id.to_be_bytes()[..], &index.to_be_bytes()[..]]);
    Address::from_digest(&blake3::derive_key(blake3::contexts::MARKET_ADDRESS, &material))
}

/// Creates markets and owns them for the lifetime of the host.
#[derive(Debug)]
pub struct MarketFactory {
    chain_id: u64,
    markets: HashMap<Address, DepegMarket>,
    order: Vec<Address>,
    events: Vec<MarketEvent>,
}

impl MarketFactory {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            markets: HashMap::new(),
            order: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Create a market from `params`. Returns its address.
    pub fn create_market(&mut self, params: MarketParams) -> Result<Address> {
        let config = params.into_config()?;
        let index = self.order.len() as u64;
        let address = market_address(self.chain_id, index);
        let feed_id = config.feed_id;
        let market = DepegMarket::new(address, self.chain_id, config)?;

        self.markets.insert(address, market);
        self.order.push(address);
        info!(%address, index, "market created");
        self.events.push(MarketEvent::MarketCreated {
            index,
            market: address,
            feed_id,
        });
        Ok(address)
    }

    pub fn market(&self, address: &Address) -> Result<&DepegMarket> {
        self.markets
            .get(address)
            .ok_or(MarketError::UnknownMarket(*address))
    }

    pub fn market_mut(&mut self, address: &Address) -> Result<&mut DepegMarket> {
        self.markets
            .get_mut(address)
            .ok_or(MarketError::UnknownMarket(*address))
    }

    /// Market addresses in creation order.
    pub fn markets(&self) -> &[Address] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn take_events(&mut self) -> Vec<MarketEvent> {
        std::mem::take(&mut self.events)
    }
}
