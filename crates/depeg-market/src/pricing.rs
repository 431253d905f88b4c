//! Premium pricing.
//!
//! `premium = base + base * lambda / 10000` where `base = notional * pBps / 10000`
//! and lambda slides linearly from `lambdaMin` to `lambdaMax` with utilization.

use depeg_types::BPS_SCALE;

use crate::pool::mul_div_floor;
use crate::Result;

const BPS: u128 = BPS_SCALE as u128;

/// Risk loading for a pool at `utilization_bps`, bounded to `[min, max]`.
pub fn current_lambda_bps(utilization_bps: u64, lambda_min_bps: u64, lambda_max_bps: u64) -> u64 {
    let util = utilization_bps.min(BPS_SCALE);
    let span = lambda_max_bps.saturating_sub(lambda_min_bps);
    let lambda = lambda_min_bps.saturating_add(span.saturating_mul(util) / BPS_SCALE);
    lambda.clamp(lambda_min_bps, lambda_max_bps.max(lambda_min_bps))
}

/// Raw premium before loading.
pub fn base_premium(notional: u128, p_bps: u64) -> Result<u128> {
    mul_div_floor(notional, u128::from(p_bps), BPS)
}

/// Premium for `notional` at probability `p_bps` under risk loading `lambda_bps`.
pub fn quote_premium(notional: u128, p_bps: u64, lambda_bps: u64) -> Result<u128> {
    let base = base_premium(notional, p_bps)?;
    let loading = mul_div_floor(base, u128::from(lambda_bps), BPS)?;
    base.checked_add(loading).ok_or(crate::MarketError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use depeg_types::WEI_PER_TOKEN;
    use proptest::prelude::*;

    #[test]
    fn test_lambda_tracks_utilization() {
        assert_eq!(current_lambda_bps(0, 500, 2_000), 500);
        assert_eq!(current_lambda_bps(5_000, 500, 2_000), 1_250);
        assert_eq!(current_lambda_bps(10_000, 500, 2_000), 2_000);
        assert_eq!(current_lambda_bps(50_000, 500, 2_000), 2_000);
        assert_eq!(current_lambda_bps(7_000, 800, 800), 800);
    }

    #[test]
    fn test_lambda_monotonic() {
        let mut last = 0;
        for util in (0..=10_000).step_by(250) {
            let l = current_lambda_bps(util, 500, 2_000);
            assert!(l >= last);
            last = l;
        }
    }

    #[test]
    fn test_base_premium_example() {
        // 10 tokens at 150 bps is 0.15 tokens
        let premium = base_premium(10 * WEI_PER_TOKEN, 150).expect("premium");
        assert_eq!(premium, 150_000_000_000_000_000);
        let loaded = quote_premium(10 * WEI_PER_TOKEN, 150, 500).expect("premium");
        assert_eq!(loaded, 157_500_000_000_000_000);
    }

    #[test]
    fn test_premium_linear_in_notional() {
        let one = quote_premium(WEI_PER_TOKEN, 150, 1_250).expect("premium");
        for k in [2u128, 3, 10, 1_000] {
            let many = quote_premium(k * WEI_PER_TOKEN, 150, 1_250).expect("premium");
            assert_eq!(many, k * one);
        }
    }

    #[test]
    fn test_premium_non_decreasing_in_p() {
        let mut last = 0;
        for p in [10u64, 50, 150, 250, 500, 1_000] {
            let premium = quote_premium(7 * WEI_PER_TOKEN + 3, p, 900).expect("premium");
            assert!(premium >= last);
            last = premium;
        }
    }

    #[test]
    fn test_dust_notional_rounds_down() {
        assert_eq!(quote_premium(1, 150, 500).expect("premium"), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, failure_persistence: None, .. ProptestConfig::default() })]

        #[test]
        fn prop_premium_linear_for_whole_units(m in 1u128..1_000_000_000, k in 1u128..1_000, p in 0u64..=10_000, lambda in 0u64..=10_000) {
            let unit = m * 100_000_000;
            let one = quote_premium(unit, p, lambda).expect("premium");
            let many = quote_premium(k * unit, p, lambda).expect("premium");
            prop_assert_eq!(many, k * one);
        }

        #[test]
        fn prop_premium_monotone_in_p(notional in 0u128..1_000_000 * WEI_PER_TOKEN, a in 0u64..=10_000, b in 0u64..=10_000, lambda in 0u64..=10_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let low = quote_premium(notional, lo, lambda).expect("premium");
            let high = quote_premium(notional, hi, lambda).expect("premium");
            prop_assert!(low <= high);
        }

        #[test]
        fn prop_lambda_within_bounds(util in any::<u64>(), min in 0u64..5_000, span in 0u64..5_000) {
            let l = current_lambda_bps(util, min, min + span);
            prop_assert!(l >= min && l <= min + span);
        }
    }
}
