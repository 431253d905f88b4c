//! Configuration file management.
//!
//! Loaded from `$DEPEG_DATA_DIR/config.toml`; every field has a default so a
//! missing file or a partial file both work.

use std::collections::HashMap;
use std::path::PathBuf;

use depeg_oracle::aggregator::QuorumPolicy;
use depeg_oracle::sources::dex::PoolConfig;
use depeg_oracle::sources::SourceWeights;
use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub dex: DexConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

/// Signing and aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// 32-byte Ed25519 seed, hex. `ORACLE_PRIVATE_KEY` takes precedence.
    #[serde(default)]
    pub signing_key_hex: String,
    #[serde(default = "default_min_sources")]
    pub min_sources: usize,
    /// Symbols with exactly one adapter; their quorum is 1.
    #[serde(default = "default_single_source_symbols")]
    pub single_source_symbols: Vec<String>,
    #[serde(default = "default_retention_days")]
    pub history_retention_days: u64,
}

/// One venue's switch, timeout, and per-asset weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub timeout_ms: u64,
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    /// Override of the venue's public endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_coinbase")]
    pub coinbase: VenueConfig,
    #[serde(default = "default_kraken")]
    pub kraken: VenueConfig,
    #[serde(default = "default_binance")]
    pub binance: VenueConfig,
    #[serde(default = "default_uniswap_v3")]
    pub uniswap_v3: VenueConfig,
    #[serde(default = "default_pancakeswap_v3")]
    pub pancakeswap_v3: VenueConfig,
    #[serde(default = "default_coingecko")]
    pub coingecko: VenueConfig,
}

/// Which chain a DEX venue reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DexVenue {
    UniswapV3,
    PancakeswapV3,
}

/// A pool read for one stablecoin on one DEX venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexPoolEntry {
    pub venue: DexVenue,
    pub stablecoin: String,
    pub pool: String,
    pub base: String,
    #[serde(default = "default_twap_window")]
    pub window_sec: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DexConfig {
    #[serde(default)]
    pub pools: Vec<DexPoolEntry>,
}

/// JSON-RPC endpoints. An empty URL disables the venue on that chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default)]
    pub ethereum: String,
    #[serde(default)]
    pub bsc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_poll_symbols")]
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_chain_id() -> u64 {
    114
}

fn default_min_sources() -> usize {
    3
}

fn default_single_source_symbols() -> Vec<String> {
    vec!["FLR".to_string()]
}

fn default_retention_days() -> u64 {
    90
}

fn default_true() -> bool {
    true
}

fn default_twap_window() -> u32 {
    900
}

fn default_poll_interval() -> u64 {
    60
}

fn default_poll_symbols() -> Vec<String> {
    vec!["USDC".to_string(), "USDT".to_string()]
}

fn default_log_level() -> String {
    "depeg=info".to_string()
}

fn venue(timeout_ms: u64, weights: &[(&str, f64)]) -> VenueConfig {
    VenueConfig {
        enabled: true,
        timeout_ms,
        weights: weights.iter().map(|(s, w)| (s.to_string(), *w)).collect(),
        base_url: None,
    }
}

fn default_coinbase() -> VenueConfig {
    venue(3_000, &[("USDC", 23.3), ("USDT", 0.0)])
}

fn default_kraken() -> VenueConfig {
    venue(3_000, &[("USDC", 13.9), ("USDT", 17.98)])
}

fn default_binance() -> VenueConfig {
    venue(3_000, &[("USDC", 34.1), ("USDT", 44.72)])
}

fn default_uniswap_v3() -> VenueConfig {
    venue(10_000, &[("USDC", 19.5), ("USDT", 25.59)])
}

fn default_pancakeswap_v3() -> VenueConfig {
    venue(10_000, &[("USDC", 5.4), ("USDT", 7.08)])
}

fn default_coingecko() -> VenueConfig {
    venue(5_000, &[])
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            signing_key_hex: String::new(),
            min_sources: default_min_sources(),
            single_source_symbols: default_single_source_symbols(),
            history_retention_days: default_retention_days(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            coinbase: default_coinbase(),
            kraken: default_kraken(),
            binance: default_binance(),
            uniswap_v3: default_uniswap_v3(),
            pancakeswap_v3: default_pancakeswap_v3(),
            coingecko: default_coingecko(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_poll_interval(),
            symbols: default_poll_symbols(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl VenueConfig {
    pub fn weights(&self) -> SourceWeights {
        SourceWeights::from(self.weights.clone())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

impl OracleConfig {
    pub fn quorum(&self) -> QuorumPolicy {
        QuorumPolicy {
            min_sources: self.min_sources,
            single_source_symbols: self
                .single_source_symbols
                .iter()
                .map(|s| s.to_ascii_uppercase())
                .collect(),
        }
    }

    /// Seed from `ORACLE_PRIVATE_KEY`, else from the config file, else none.
    pub fn signing_key_hex(&self) -> Option<String> {
        std::env::var("ORACLE_PRIVATE_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| Some(self.signing_key_hex.clone()).filter(|s| !s.trim().is_empty()))
    }
}

impl DexConfig {
    /// Pools configured for `venue`, keyed by stablecoin.
    pub fn pools_for(&self, venue: DexVenue) -> HashMap<String, PoolConfig> {
        self.pools
            .iter()
            .filter(|p| p.venue == venue)
            .map(|p| {
                (
                    p.stablecoin.to_ascii_uppercase(),
                    PoolConfig {
                        pool: p.pool.clone(),
                        base: p.base.clone(),
                        window_sec: p.window_sec,
                    },
                )
            })
            .collect()
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("DEPEG_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".depeg-oracle"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/depeg-oracle"))
    }
}
