//! Concentrated-liquidity AMM TWAP adapters (Uniswap v3, PancakeSwap v3).
//!
//! The pool is read over plain JSON-RPC `eth_call`s: `token0()`/`token1()`,
//! each token's `decimals()`/`symbol()`, and `observe([window, 0])` for the
//! two cumulative-tick snapshots. The average tick over the window is turned
//! into a price with
//!
//! ```text
//! price1Per0 = 1.0001^avgTick * 10^(decimals0 - decimals1)
//! ```
//!
//! and inverted when the configured stablecoin is `token1`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{PriceSource, SourceWeights};
use crate::{validate_price, OracleError, Result};

/// Four-byte function selectors.
pub mod selectors {
    pub const TOKEN0: [u8; 4] = [0x0d, 0xfe, 0x16, 0x81];
    pub const TOKEN1: [u8; 4] = [0xd2, 0x12, 0x20, 0xa7];
    pub const DECIMALS: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];
    pub const SYMBOL: [u8; 4] = [0x95, 0xd8, 0x9b, 0x41];
    /// `observe(uint32[])`
    pub const OBSERVE: [u8; 4] = [0x88, 0x3b, 0xdb, 0xfd];
}

const WORD: usize = 32;

/// Which pool to read for a stablecoin, and what it is paired against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool contract address.
    pub pool: String,
    /// Symbol of the USD-parity token on the other side.
    pub base: String,
    /// TWAP window in seconds.
    pub window_sec: u32,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<String>,
    error: Option<serde_json::Value>,
}

/// Minimal JSON-RPC client for read-only contract calls.
#[derive(Clone)]
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: String,
}

impl JsonRpcClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// `eth_call` against the latest block, returning the raw return data.
    pub async fn eth_call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_call",
            "params": [{ "to": to, "data": format!("0x{}", hex::encode(data)) }, "latest"],
            "id": 1
        });
        let response: JsonRpcResponse = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;
        if let Some(err) = response.error {
            return Err(OracleError::Rpc(err.to_string()));
        }
        let result = response
            .result
            .ok_or_else(|| OracleError::Rpc("no result in RPC response".into()))?;
        hex::decode(result.trim_start_matches("0x")).map_err(|e| OracleError::Decode(e.to_string()))
    }
}

fn word(bytes: &[u8], index: usize) -> Result<&[u8]> {
    index
        .checked_mul(WORD)
        .and_then(|start| bytes.get(start..start.checked_add(WORD)?))
        .ok_or_else(|| OracleError::Decode(format!("return data too short: {} bytes", bytes.len())))
}

/// Offsets come from untrusted return data; all arithmetic on them is checked.
fn word_at(bytes: &[u8], offset: usize) -> Result<&[u8]> {
    offset
        .checked_add(WORD)
        .and_then(|end| bytes.get(offset..end))
        .ok_or_else(|| OracleError::Decode(format!("offset {offset} out of range")))
}

fn past_word(offset: usize, words: usize) -> Result<usize> {
    WORD.checked_mul(words)
        .and_then(|skip| offset.checked_add(skip))
        .ok_or_else(|| OracleError::Decode(format!("offset {offset} out of range")))
}

fn word_to_usize(w: &[u8]) -> Result<usize> {
    if w[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(OracleError::Decode("uint does not fit in 64 bits".into()));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&w[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(tail)).map_err(|e| OracleError::Decode(e.to_string()))
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut out = [0u8; WORD];
    out[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    out
}

/// Calldata for `observe([window_sec, 0])`.
pub fn encode_observe(window_sec: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 4 * WORD);
    out.extend_from_slice(&selectors::OBSERVE);
    out.extend_from_slice(&uint_word(0x20));
    out.extend_from_slice(&uint_word(2));
    out.extend_from_slice(&uint_word(u64::from(window_sec)));
    out.extend_from_slice(&uint_word(0));
    out
}

/// An ABI `address` return value, as lowercase `0x` hex.
pub fn decode_address(bytes: &[u8]) -> Result<String> {
    let w = word(bytes, 0)?;
    Ok(format!("0x{}", hex::encode(&w[12..])))
}

/// An ABI `uint8` return value.
pub fn decode_uint8(bytes: &[u8]) -> Result<u8> {
    let v = word_to_usize(word(bytes, 0)?)?;
    u8::try_from(v).map_err(|e| OracleError::Decode(e.to_string()))
}

/// An ABI `string` return value. Tokens that return `bytes32` are accepted too.
pub fn decode_string(bytes: &[u8]) -> Result<String> {
    let raw = if bytes.len() == WORD {
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(WORD);
        &bytes[..end]
    } else {
        let offset = word_to_usize(word(bytes, 0)?)?;
        let len = word_to_usize(word_at(bytes, offset)?)?;
        let start = past_word(offset, 1)?;
        start
            .checked_add(len)
            .and_then(|end| bytes.get(start..end))
            .ok_or_else(|| OracleError::Decode("string data out of range".into()))?
    };
    String::from_utf8(raw.to_vec()).map_err(|e| OracleError::Decode(e.to_string()))
}

/// The `int56[] tickCumulatives` half of an `observe` return, as
/// `(past, now)`.
pub fn decode_observe(bytes: &[u8]) -> Result<(i64, i64)> {
    let offset = word_to_usize(word(bytes, 0)?)?;
    let len = word_to_usize(word_at(bytes, offset)?)?;
    if len < 2 {
        return Err(OracleError::Decode(format!("expected 2 tick cumulatives, got {len}")));
    }
    let read = |i: usize| -> Result<i64> {
        let w = word_at(bytes, past_word(offset, 1 + i)?)?;
        let mut tail = [0u8; 8];
        tail.copy_from_slice(&w[WORD - 8..]);
        Ok(i64::from_be_bytes(tail))
    };
    Ok((read(0)?, read(1)?))
}

/// Average tick over the window, truncating toward zero.
pub fn average_tick(tick_cum_past: i64, tick_cum_now: i64, window_sec: u32) -> Result<i64> {
    if window_sec == 0 {
        return Err(OracleError::InvalidRequest("TWAP window must be positive".into()));
    }
    Ok(tick_cum_now.saturating_sub(tick_cum_past) / i64::from(window_sec))
}

/// Both sides of a pool as read from chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolTokens {
    pub symbol0: String,
    pub decimals0: u8,
    pub symbol1: String,
    pub decimals1: u8,
}

/// USD price of `stable` from an average tick, resolving pool orientation.
///
/// # Errors
///
/// [`OracleError::PoolTokenMismatch`] when the pool does not hold exactly
/// `stable` and `base`.
pub fn twap_price(avg_tick: i64, tokens: &PoolTokens, stable: &str, base: &str) -> Result<f64> {
    let ratio = 1.0001f64.powf(avg_tick as f64);
    let scale = 10f64.powi(i32::from(tokens.decimals0) - i32::from(tokens.decimals1));
    let price1_per_0 = ratio * scale;

    let s0 = &tokens.symbol0;
    let s1 = &tokens.symbol1;
    let price = if s0.eq_ignore_ascii_case(stable) && s1.eq_ignore_ascii_case(base) {
        price1_per_0
    } else if s1.eq_ignore_ascii_case(stable) && s0.eq_ignore_ascii_case(base) {
        1.0 / price1_per_0
    } else {
        return Err(OracleError::PoolTokenMismatch {
            token0: s0.clone(),
            token1: s1.clone(),
            stable: stable.to_string(),
            base: base.to_string(),
        });
    };
    validate_price(price)
}

/// TWAP adapter for one AMM deployment on one chain.
pub struct DexTwapSource {
    name: String,
    rpc: JsonRpcClient,
    pools: HashMap<String, PoolConfig>,
    weights: SourceWeights,
    timeout: Duration,
}

impl DexTwapSource {
    pub fn new(
        name: impl Into<String>,
        rpc: JsonRpcClient,
        pools: HashMap<String, PoolConfig>,
        weights: SourceWeights,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            rpc,
            pools: pools
                .into_iter()
                .map(|(k, v)| (k.to_ascii_uppercase(), v))
                .collect(),
            weights,
            timeout,
        }
    }

    async fn token_meta(&self, token: &str) -> Result<(String, u8)> {
        let (symbol, decimals) = tokio::try_join!(
            self.rpc.eth_call(token, &selectors::SYMBOL),
            self.rpc.eth_call(token, &selectors::DECIMALS),
        )?;
        Ok((decode_string(&symbol)?, decode_uint8(&decimals)?))
    }
}

#[async_trait]
impl PriceSource for DexTwapSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn weight(&self, symbol: &str) -> Option<f64> {
        if self.pools.contains_key(&symbol.to_ascii_uppercase()) {
            self.weights.get(symbol)
        } else {
            None
        }
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64> {
        let cfg = self
            .pools
            .get(&symbol.to_ascii_uppercase())
            .ok_or_else(|| OracleError::UnknownSymbol(symbol.to_string()))?;

        let (t0, t1) = tokio::try_join!(
            self.rpc.eth_call(&cfg.pool, &selectors::TOKEN0),
            self.rpc.eth_call(&cfg.pool, &selectors::TOKEN1),
        )?;
        let (token0, token1) = (decode_address(&t0)?, decode_address(&t1)?);

        let observe_call = encode_observe(cfg.window_sec);
        let ((symbol0, decimals0), (symbol1, decimals1), observed) = tokio::try_join!(
            self.token_meta(&token0),
            self.token_meta(&token1),
            self.rpc.eth_call(&cfg.pool, &observe_call),
        )?;
        let (past, now) = decode_observe(&observed)?;
        let avg_tick = average_tick(past, now, cfg.window_sec)?;
        let tokens = PoolTokens {
            symbol0,
            decimals0,
            symbol1,
            decimals1,
        };
        let price = twap_price(avg_tick, &tokens, symbol, &cfg.base)?;
        debug!(venue = %self.name, symbol, avg_tick, price, "dex twap");
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s0: &str, d0: u8, s1: &str, d1: u8) -> PoolTokens {
        PoolTokens {
            symbol0: s0.into(),
            decimals0: d0,
            symbol1: s1.into(),
            decimals1: d1,
        }
    }

    #[test]
    fn test_twap_price_parity() {
        let p = twap_price(0, &tokens("USDT", 6, "USDC", 6), "USDT", "USDC").expect("price");
        assert!((p - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_twap_price_inverts_when_stable_is_token1() {
        let t = tokens("USDC", 6, "USDT", 6);
        let direct = twap_price(-10, &t, "USDC", "USDT").expect("direct");
        let inverted = twap_price(-10, &t, "USDT", "USDC").expect("inverted");
        assert!((direct * inverted - 1.0).abs() < 1e-12);
        assert!((inverted - 1.001_000_450_120_021).abs() < 1e-9);
    }

    #[test]
    fn test_twap_price_decimal_scaling() {
        // DAI (18) / USDC (6): a tick near -276324 is roughly parity.
        let p = twap_price(-276_324, &tokens("DAI", 18, "USDC", 6), "DAI", "USDC").expect("price");
        assert!((p - 1.0).abs() < 1e-4, "price {p}");
    }

    #[test]
    fn test_twap_price_token_mismatch() {
        let err = twap_price(0, &tokens("WETH", 18, "USDC", 6), "USDT", "USDC").expect_err("mismatch");
        assert!(matches!(err, OracleError::PoolTokenMismatch { .. }));
    }

    #[test]
    fn test_average_tick_truncates_toward_zero() {
        assert_eq!(average_tick(0, -1799, 900).expect("tick"), -1);
        assert_eq!(average_tick(100, 100 + 1799, 900).expect("tick"), 1);
        assert!(average_tick(0, 0, 0).is_err());
    }

    #[test]
    fn test_encode_observe_layout() {
        let data = encode_observe(900);
        assert_eq!(&data[..4], &selectors::OBSERVE);
        assert_eq!(data.len(), 4 + 4 * WORD);
        assert_eq!(data[4 + WORD - 1], 0x20);
        assert_eq!(data[4 + 2 * WORD - 1], 2);
        assert_eq!(&data[4 + 3 * WORD - 2..4 + 3 * WORD], &900u16.to_be_bytes());
    }

    fn int_word(v: i64) -> [u8; WORD] {
        let fill = if v < 0 { 0xff } else { 0x00 };
        let mut out = [fill; WORD];
        out[WORD - 8..].copy_from_slice(&v.to_be_bytes());
        out
    }

    #[test]
    fn test_decode_observe() {
        let mut data = Vec::new();
        data.extend_from_slice(&uint_word(0x40)); // tickCumulatives offset
        data.extend_from_slice(&uint_word(0xa0)); // secondsPerLiquidity offset
        data.extend_from_slice(&uint_word(2));
        data.extend_from_slice(&int_word(-5_000));
        data.extend_from_slice(&int_word(-14_000));
        data.extend_from_slice(&uint_word(2));
        data.extend_from_slice(&uint_word(1));
        data.extend_from_slice(&uint_word(2));
        assert_eq!(decode_observe(&data).expect("decode"), (-5_000, -14_000));
    }

    #[test]
    fn test_decode_string_and_bytes32() {
        let mut data = Vec::new();
        data.extend_from_slice(&uint_word(0x20));
        data.extend_from_slice(&uint_word(4));
        let mut tail = [0u8; WORD];
        tail[..4].copy_from_slice(b"USDC");
        data.extend_from_slice(&tail);
        assert_eq!(decode_string(&data).expect("string"), "USDC");
        assert_eq!(decode_string(&tail).expect("bytes32"), "USDC");
    }

    #[test]
    fn test_decode_address_and_uint8() {
        let mut w = [0u8; WORD];
        w[12..].copy_from_slice(&[0xab; 20]);
        assert_eq!(decode_address(&w).expect("address"), format!("0x{}", "ab".repeat(20)));
        assert_eq!(decode_uint8(&uint_word(18)).expect("decimals"), 18);
        assert!(decode_uint8(&uint_word(300)).is_err());
        assert!(decode_address(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_decode_rejects_overflowing_offsets() {
        let mut data = Vec::new();
        data.extend_from_slice(&uint_word(u64::MAX - 8));
        data.extend_from_slice(&uint_word(2));
        assert!(matches!(decode_observe(&data), Err(OracleError::Decode(_))));
        assert!(matches!(decode_string(&data), Err(OracleError::Decode(_))));

        // valid offset, length that runs past the end of memory
        let mut data = Vec::new();
        data.extend_from_slice(&uint_word(0x20));
        data.extend_from_slice(&uint_word(u64::MAX));
        assert!(matches!(decode_string(&data), Err(OracleError::Decode(_))));
    }

    mod rpc_stub {
        use super::*;
        use crate::aggregator::{Aggregator, QuorumPolicy};
        use crate::history::PriceHistoryStore;
        use axum::extract::State;
        use axum::routing::post;
        use axum::{Json, Router};
        use depeg_types::time::ManualClock;
        use serde_json::{json, Value};
        use std::sync::Arc;

        const USDT: &str = "0x0101010101010101010101010101010101010101";
        const USDC: &str = "0x0202020202020202020202020202020202020202";
        const WETH: &str = "0x0303030303030303030303030303030303030303";
        const USDC_POOL: &str = "0x1111111111111111111111111111111111111111";
        const DAI_POOL: &str = "0x2222222222222222222222222222222222222222";

        type Responses = Arc<HashMap<(String, String), Vec<u8>>>;

        fn call_key(to: &str, data: &[u8]) -> (String, String) {
            (to.to_string(), format!("0x{}", hex::encode(data)))
        }

        fn address_word(addr: &str) -> Vec<u8> {
            let mut w = vec![0u8; 12];
            w.extend(hex::decode(addr.trim_start_matches("0x")).expect("hex"));
            w
        }

        fn string_return(s: &str) -> Vec<u8> {
            let mut out = Vec::new();
            out.extend_from_slice(&uint_word(0x20));
            out.extend_from_slice(&uint_word(s.len() as u64));
            let mut tail = [0u8; WORD];
            tail[..s.len()].copy_from_slice(s.as_bytes());
            out.extend_from_slice(&tail);
            out
        }

        fn observe_return(past: i64, now: i64) -> Vec<u8> {
            let mut out = Vec::new();
            out.extend_from_slice(&uint_word(0x40));
            out.extend_from_slice(&uint_word(0xa0));
            out.extend_from_slice(&uint_word(2));
            out.extend_from_slice(&int_word(past));
            out.extend_from_slice(&int_word(now));
            out.extend_from_slice(&uint_word(2));
            out.extend_from_slice(&uint_word(1));
            out.extend_from_slice(&uint_word(2));
            out
        }

        fn responses() -> Responses {
            let mut m = HashMap::new();
            let mut token = |addr: &str, symbol: &str, decimals: u64| {
                m.insert(call_key(addr, &selectors::SYMBOL), string_return(symbol));
                m.insert(call_key(addr, &selectors::DECIMALS), uint_word(decimals).to_vec());
            };
            token(USDT, "USDT", 6);
            token(USDC, "USDC", 6);
            token(WETH, "WETH", 18);
            let observe = encode_observe(900);
            // USDC is token1 of a USDT/USDC pool
            m.insert(call_key(USDC_POOL, &selectors::TOKEN0), address_word(USDT));
            m.insert(call_key(USDC_POOL, &selectors::TOKEN1), address_word(USDC));
            m.insert(call_key(USDC_POOL, &observe), observe_return(0, -9_000));
            // configured as DAI/USDC but actually WETH/USDC
            m.insert(call_key(DAI_POOL, &selectors::TOKEN0), address_word(WETH));
            m.insert(call_key(DAI_POOL, &selectors::TOKEN1), address_word(USDC));
            m.insert(call_key(DAI_POOL, &observe), observe_return(0, 0));
            Arc::new(m)
        }

        async fn eth_call(State(responses): State<Responses>, Json(req): Json<Value>) -> Json<Value> {
            let params = &req["params"][0];
            let key = (
                params["to"].as_str().unwrap_or_default().to_string(),
                params["data"].as_str().unwrap_or_default().to_string(),
            );
            Json(match responses.get(&key) {
                Some(ret) => json!({ "jsonrpc": "2.0", "id": 1, "result": format!("0x{}", hex::encode(ret)) }),
                None => json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32000, "message": "execution reverted" } }),
            })
        }

        async fn spawn_node() -> String {
            let app = Router::new().route("/", post(eth_call)).with_state(responses());
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
            let addr = listener.local_addr().expect("addr");
            tokio::spawn(async move {
                let _ = axum::serve(listener, app).await;
            });
            format!("http://{addr}")
        }

        fn dex_source(url: String) -> DexTwapSource {
            let client = reqwest::Client::builder().no_proxy().build().expect("client");
            let pool = |addr: &str, base: &str| PoolConfig {
                pool: addr.to_string(),
                base: base.to_string(),
                window_sec: 900,
            };
            let pools = HashMap::from([
                ("usdc".to_string(), pool(USDC_POOL, "USDT")),
                ("DAI".to_string(), pool(DAI_POOL, "USDC")),
            ]);
            DexTwapSource::new(
                "uniswap-test",
                JsonRpcClient::new(client, url),
                pools,
                SourceWeights::new([("USDC", 1.0), ("DAI", 1.0)]),
                Duration::from_secs(2),
            )
        }

        /// Quotes DAI at parity.
        struct Parity;

        #[async_trait]
        impl PriceSource for Parity {
            fn name(&self) -> &str {
                "parity"
            }
            fn timeout(&self) -> Duration {
                Duration::from_secs(1)
            }
            fn weight(&self, symbol: &str) -> Option<f64> {
                (symbol == "DAI").then_some(1.0)
            }
            async fn fetch_price(&self, _symbol: &str) -> Result<f64> {
                Ok(1.0)
            }
        }

        #[tokio::test]
        async fn test_fetch_price_inverts_token1_stable() {
            let source = dex_source(spawn_node().await);
            assert_eq!(source.weight("usdc"), Some(1.0));
            assert_eq!(source.weight("USDT"), None);

            // avg tick -10 prices USDC per USDT; USDC is token1 so it inverts
            let price = source.fetch_price("USDC").await.expect("price");
            assert!((price - 1.001_000_450_120_021).abs() < 1e-9, "price {price}");
        }

        #[tokio::test]
        async fn test_fetch_price_rejects_mismatched_pool() {
            let source = dex_source(spawn_node().await);
            let err = source.fetch_price("DAI").await.expect_err("mismatch");
            assert!(matches!(err, OracleError::PoolTokenMismatch { .. }), "{err}");
        }

        #[tokio::test]
        async fn test_mismatched_pool_drops_only_its_observation() {
            let dex: Arc<dyn PriceSource> = Arc::new(dex_source(spawn_node().await));
            let quorum = QuorumPolicy {
                min_sources: 1,
                ..QuorumPolicy::default()
            };
            let aggregator = Aggregator::new(
                vec![dex, Arc::new(Parity)],
                Arc::new(PriceHistoryStore::default()),
                Arc::new(ManualClock::new(1_000)),
                quorum,
            );

            let dai = aggregator.aggregate("DAI").await.expect("dai");
            assert_eq!(dai.source_count, 1);
            assert_eq!(dai.details[0].source, "parity");

            let usdc = aggregator.aggregate("USDC").await.expect("usdc");
            assert_eq!(usdc.details[0].source, "uniswap-test");
            assert!(usdc.price > 1.0);
        }
    }
}
