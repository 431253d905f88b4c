//! # depeg-types
//!
//! Shared domain types for the depeg protection oracle and settlement market.
//!
//! Prices on the wire are decimal USD; everything that is signed or compared
//! against a barrier is an integer in ppm (`1_000_000 == $1.00`) or bps.
//! Token amounts are `u128` in the smallest unit (18 decimals).

pub mod address;
pub mod attestation;
pub mod events;
pub mod market;
pub mod price;
pub mod time;

pub use address::{Address, FeedId};

/// Parts per million in one USD.
pub const PPM_SCALE: u64 = 1_000_000;

/// Basis points in 100%.
pub const BPS_SCALE: u64 = 10_000;

/// Smallest units per whole native token (18 decimals).
pub const WEI_PER_TOKEN: u128 = 1_000_000_000_000_000_000;

/// Seconds per day.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Quote currency every feed is denominated in.
pub const QUOTE_CURRENCY: &str = "USD";

/// Separator for composite symbols such as `USDC+USDT`.
pub const COMPOSITE_SEPARATOR: char = '+';

/// Error types for parsing and validating shared domain values.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    /// An address string could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A feed id string could not be parsed.
    #[error("invalid feed id: {0}")]
    InvalidFeedId(String),

    /// A symbol was empty or malformed.
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// A market configuration violated a parameter bound.
    #[error("invalid market config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, TypeError>;

/// Normalize a stablecoin symbol: trim, upper-case, reject empty
/// constituents.
///
/// `" usdc+usdt "` becomes `"USDC+USDT"`.
pub fn normalize_symbol(raw: &str) -> Result<String> {
    let upper = raw.trim().to_ascii_uppercase();
    if upper.is_empty()
        || upper
            .split(COMPOSITE_SEPARATOR)
            .any(|part| part.is_empty() || !part.chars().all(|c| c.is_ascii_alphanumeric()))
    {
        return Err(TypeError::InvalidSymbol(raw.to_string()));
    }
    Ok(upper)
}

/// The feed string a symbol is registered under, e.g. `"USDC-USD"`.
pub fn feed_symbol(symbol: &str) -> String {
    format!("{symbol}-{QUOTE_CURRENCY}")
}

/// Convert a decimal USD price into integer ppm, rounding half away from zero.
///
/// Non-finite or negative inputs map to zero.
pub fn price_to_ppm(price: f64) -> u64 {
    if !price.is_finite() || price <= 0.0 {
        return 0;
    }
    (price * PPM_SCALE as f64).round() as u64
}

/// Convert integer ppm back to a decimal USD price.
pub fn ppm_to_price(ppm: u64) -> f64 {
    ppm as f64 / PPM_SCALE as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" usdc ").expect("valid"), "USDC");
        assert_eq!(normalize_symbol("usdc+usdt").expect("valid"), "USDC+USDT");
        assert!(normalize_symbol("").is_err());
        assert!(normalize_symbol("USDC+").is_err());
        assert!(normalize_symbol("US-DC").is_err());
    }

    #[test]
    fn test_price_ppm_conversion() {
        assert_eq!(price_to_ppm(1.0), 1_000_000);
        assert_eq!(price_to_ppm(0.985), 985_000);
        assert_eq!(price_to_ppm(0.9999995), 1_000_000);
        assert_eq!(price_to_ppm(f64::NAN), 0);
        assert_eq!(price_to_ppm(-1.0), 0);
        assert!((ppm_to_price(980_000) - 0.98).abs() < 1e-12);
    }

    #[test]
    fn test_feed_symbol() {
        assert_eq!(feed_symbol("USDC"), "USDC-USD");
        assert_eq!(feed_symbol("USDC+USDT"), "USDC+USDT-USD");
    }

    #[test]
    #[ignore] // Run manually to generate bindings
    fn export_ts_bindings() {
        use ts_rs::TS;
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../bindings");
        std::fs::create_dir_all(&dir).expect("create bindings dir");
        crate::price::AggregatedIndex::export_all_to(&dir).expect("export index");
        crate::market::PolicyStatus::export_all_to(&dir).expect("export policy status");
        crate::events::EventType::export_all_to(&dir).expect("export event type");
    }
}
