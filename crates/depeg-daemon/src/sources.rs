//! Adapter construction from config.

use std::sync::Arc;

use depeg_oracle::sources::cex::{CexSource, CexVenue};
use depeg_oracle::sources::coingecko::CoinGeckoSource;
use depeg_oracle::sources::dex::{DexTwapSource, JsonRpcClient};
use depeg_oracle::sources::PriceSource;
use tracing::{info, warn};

use crate::config::{DaemonConfig, DexVenue, VenueConfig};

/// Index adapters: enabled CEX venues plus DEX venues with an RPC URL and pools.
pub fn build_sources(config: &DaemonConfig, client: &reqwest::Client) -> Vec<Arc<dyn PriceSource>> {
    let mut sources: Vec<Arc<dyn PriceSource>> = Vec::new();

    let cex: [(CexVenue, &VenueConfig); 3] = [
        (CexVenue::Coinbase, &config.sources.coinbase),
        (CexVenue::Kraken, &config.sources.kraken),
        (CexVenue::Binance, &config.sources.binance),
    ];
    for (venue, vc) in cex {
        if !vc.enabled {
            continue;
        }
        let mut source = CexSource::new(venue, client.clone(), vc.weights(), vc.timeout());
        if let Some(url) = &vc.base_url {
            source = source.with_base_url(url.clone());
        }
        sources.push(Arc::new(source));
    }

    let dex: [(DexVenue, &str, &VenueConfig, &str); 2] = [
        (DexVenue::UniswapV3, "uniswap-v3", &config.sources.uniswap_v3, &config.rpc.ethereum),
        (DexVenue::PancakeswapV3, "pancakeswap-v3", &config.sources.pancakeswap_v3, &config.rpc.bsc),
    ];
    for (venue, name, vc, rpc_url) in dex {
        if !vc.enabled {
            continue;
        }
        let pools = config.dex.pools_for(venue);
        if rpc_url.is_empty() || pools.is_empty() {
            warn!(venue = name, "DEX venue enabled but no RPC URL or pools configured, skipping");
            continue;
        }
        let rpc = JsonRpcClient::new(client.clone(), rpc_url);
        sources.push(Arc::new(DexTwapSource::new(name, rpc, pools, vc.weights(), vc.timeout())));
    }

    info!(count = sources.len(), "price sources configured");
    sources
}

/// The FLR spot adapter, if enabled.
pub fn build_spot(config: &DaemonConfig, client: &reqwest::Client) -> Option<Arc<dyn PriceSource>> {
    let vc = &config.sources.coingecko;
    if !vc.enabled {
        return None;
    }
    let mut source = CoinGeckoSource::new(client.clone(), vc.timeout());
    if let Some(url) = &vc.base_url {
        source = source.with_base_url(url.clone());
    }
    Some(Arc::new(source))
}
