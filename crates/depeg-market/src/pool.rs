//! Pool accounting.
//!
//! Amounts are `u128` in the smallest native unit. Reserve factors and
//! utilization are bps. Callers mutate a clone and commit it only when every
//! step succeeded.

use std::collections::BTreeMap;

use depeg_types::{Address, BPS_SCALE};
use num_bigint::BigUint;
use serde::Serialize;
use tracing::trace;

use crate::{MarketError, Result};

const BPS: u128 = BPS_SCALE as u128;

/// `floor(a * b / denom)`, exact for any inputs whose result fits in `u128`.
pub fn mul_div_floor(a: u128, b: u128, denom: u128) -> Result<u128> {
    if denom == 0 {
        return Err(MarketError::Overflow);
    }
    if let Some(num) = a.checked_mul(b) {
        return Ok(num / denom);
    }
    let wide = BigUint::from(a) * BigUint::from(b) / BigUint::from(denom);
    u128::try_from(wide).map_err(|_| MarketError::Overflow)
}

/// `ceil(a * b / denom)`.
pub fn mul_div_ceil(a: u128, b: u128, denom: u128) -> Result<u128> {
    let floor = mul_div_floor(a, b, denom)?;
    let exact = BigUint::from(floor) * BigUint::from(denom) == BigUint::from(a) * BigUint::from(b);
    if exact {
        Ok(floor)
    } else {
        floor.checked_add(1).ok_or(MarketError::Overflow)
    }
}

/// Liquidity, exposure, and per-provider balances of one market.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolState {
    total_liquidity: u128,
    outstanding_exposure: u128,
    lp_balances: BTreeMap<Address, u128>,
}

impl PoolState {
    pub fn total_liquidity(&self) -> u128 {
        self.total_liquidity
    }

    pub fn outstanding_exposure(&self) -> u128 {
        self.outstanding_exposure
    }

    pub fn lp_balance(&self, who: &Address) -> u128 {
        self.lp_balances.get(who).copied().unwrap_or(0)
    }

    pub fn lp_balances(&self) -> impl Iterator<Item = (&Address, &u128)> {
        self.lp_balances.iter()
    }

    /// Maximum exposure the pool may carry: `totalLiquidity * reserve / 10000`.
    pub fn capacity(&self, reserve_factor_bps: u64) -> Result<u128> {
        mul_div_floor(self.total_liquidity, u128::from(reserve_factor_bps), BPS)
    }

    /// Capacity not yet taken by open policies.
    pub fn available_capacity(&self, reserve_factor_bps: u64) -> Result<u128> {
        Ok(self
            .capacity(reserve_factor_bps)?
            .saturating_sub(self.outstanding_exposure))
    }

    /// Smallest pool that still backs current exposure, rounded up.
    pub fn min_pool(&self, reserve_factor_bps: u64) -> Result<u128> {
        if reserve_factor_bps == 0 {
            return Err(MarketError::Config("reserve factor is zero".into()));
        }
        mul_div_ceil(self.outstanding_exposure, BPS, u128::from(reserve_factor_bps))
    }

    /// `lpBalance * (totalLiquidity - minPool) / totalLiquidity`.
    pub fn max_withdrawable(&self, who: &Address, reserve_factor_bps: u64) -> Result<u128> {
        if self.total_liquidity == 0 {
            return Ok(0);
        }
        let free = self
            .total_liquidity
            .saturating_sub(self.min_pool(reserve_factor_bps)?);
        mul_div_floor(self.lp_balance(who), free, self.total_liquidity)
    }

    /// `outstandingExposure * 10000 / totalLiquidity`, capped at 10000; 0 when empty.
    pub fn utilization_bps(&self) -> u64 {
        if self.total_liquidity == 0 {
            return 0;
        }
        let util = mul_div_floor(self.outstanding_exposure, BPS, self.total_liquidity)
            .unwrap_or(BPS)
            .min(BPS);
        u64::try_from(util).unwrap_or(BPS_SCALE)
    }

    /// Exposure within capacity and LP balances summing to total liquidity.
    pub fn invariant_holds(&self, reserve_factor_bps: u64) -> bool {
        let within = self
            .capacity(reserve_factor_bps)
            .map(|cap| self.outstanding_exposure <= cap)
            .unwrap_or(false);
        let sum = self
            .lp_balances
            .values()
            .try_fold(0u128, |acc, b| acc.checked_add(*b));
        within && sum == Some(self.total_liquidity)
    }

    pub(crate) fn deposit(&mut self, who: Address, amount: u128) -> Result<()> {
        self.total_liquidity = self
            .total_liquidity
            .checked_add(amount)
            .ok_or(MarketError::Overflow)?;
        let bal = self.lp_balances.entry(who).or_insert(0);
        *bal = bal.checked_add(amount).ok_or(MarketError::Overflow)?;
        Ok(())
    }

    pub(crate) fn withdraw(&mut self, who: &Address, amount: u128) -> Result<()> {
        let balance = self.lp_balance(who);
        let remaining = balance
            .checked_sub(amount)
            .ok_or(MarketError::InsufficientLpBalance {
                requested: amount,
                balance,
            })?;
        self.total_liquidity = self
            .total_liquidity
            .checked_sub(amount)
            .ok_or(MarketError::Overflow)?;
        if remaining == 0 {
            self.lp_balances.remove(who);
        } else {
            self.lp_balances.insert(*who, remaining);
        }
        Ok(())
    }

    pub(crate) fn open_exposure(&mut self, notional: u128) -> Result<()> {
        self.outstanding_exposure = self
            .outstanding_exposure
            .checked_add(notional)
            .ok_or(MarketError::Overflow)?;
        Ok(())
    }

    pub(crate) fn close_exposure(&mut self, notional: u128) -> Result<()> {
        self.outstanding_exposure = self
            .outstanding_exposure
            .checked_sub(notional)
            .ok_or(MarketError::Overflow)?;
        Ok(())
    }

    /// Add `amount` to the pool, credited to providers pro rata.
    pub(crate) fn accrue(&mut self, amount: u128) -> Result<()> {
        let shares = self.pro_rata(amount)?;
        for (who, share) in shares {
            let bal = self.lp_balances.entry(who).or_insert(0);
            *bal = bal.checked_add(share).ok_or(MarketError::Overflow)?;
        }
        self.total_liquidity = self
            .total_liquidity
            .checked_add(amount)
            .ok_or(MarketError::Overflow)?;
        Ok(())
    }

    /// Remove `amount` from the pool, debited from providers pro rata.
    pub(crate) fn pay_out(&mut self, amount: u128) -> Result<()> {
        if amount > self.total_liquidity {
            return Err(MarketError::NoLiquidity);
        }
        let shares = self.pro_rata(amount)?;
        for (who, share) in shares {
            let bal = self.lp_balances.entry(who).or_insert(0);
            *bal = bal.checked_sub(share).ok_or(MarketError::Overflow)?;
        }
        self.lp_balances.retain(|_, b| *b > 0);
        self.total_liquidity -= amount;
        Ok(())
    }

    /// Split `amount` by balance. Floor shares first, then one unit each to
    /// the largest balances until the remainder is gone.
    fn pro_rata(&self, amount: u128) -> Result<Vec<(Address, u128)>> {
        if self.total_liquidity == 0 {
            return Err(MarketError::NoLiquidity);
        }
        let mut shares: Vec<(Address, u128)> = Vec::with_capacity(self.lp_balances.len());
        let mut assigned: u128 = 0;
        for (who, bal) in &self.lp_balances {
            let share = mul_div_floor(amount, *bal, self.total_liquidity)?;
            assigned = assigned.checked_add(share).ok_or(MarketError::Overflow)?;
            shares.push((*who, share));
        }
        let mut remainder = amount.checked_sub(assigned).ok_or(MarketError::Overflow)?;

        let mut order: Vec<usize> = (0..shares.len()).collect();
        order.sort_by(|a, b| {
            let ba = self.lp_balance(&shares[*a].0);
            let bb = self.lp_balance(&shares[*b].0);
            bb.cmp(&ba).then(shares[*a].0.cmp(&shares[*b].0))
        });
        for i in order {
            if remainder == 0 {
                break;
            }
            shares[i].1 += 1;
            remainder -= 1;
        }
        trace!(amount, providers = shares.len(), "pro rata split");
        Ok(shares)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: u128 = depeg_types::WEI_PER_TOKEN;

    fn addr(b: u8) -> Address {
        Address([b; 20])
    }

    #[test]
    fn test_mul_div_wide() {
        // 1e24 * 1e24 overflows u128 but the quotient fits
        let a = 1_000_000 * TOKEN;
        assert_eq!(mul_div_floor(a, a, a).expect("fits"), a);
        assert_eq!(mul_div_floor(7, 3, 2).expect("small"), 10);
        assert_eq!(mul_div_ceil(7, 3, 2).expect("small"), 11);
        assert_eq!(mul_div_ceil(8, 3, 2).expect("exact"), 12);
        assert!(mul_div_floor(u128::MAX, u128::MAX, 1).is_err());
        assert!(mul_div_floor(1, 1, 0).is_err());
    }

    #[test]
    fn test_capacity_and_utilization() {
        let mut pool = PoolState::default();
        pool.deposit(addr(1), 100 * TOKEN).expect("deposit");
        assert_eq!(pool.capacity(7_000).expect("cap"), 70 * TOKEN);
        pool.open_exposure(35 * TOKEN).expect("open");
        assert_eq!(pool.utilization_bps(), 3_500);
        assert_eq!(pool.available_capacity(7_000).expect("avail"), 35 * TOKEN);
        assert!(pool.invariant_holds(7_000));
    }

    #[test]
    fn test_max_withdrawable_respects_reserve() {
        let mut pool = PoolState::default();
        pool.deposit(addr(1), 60 * TOKEN).expect("deposit");
        pool.deposit(addr(2), 40 * TOKEN).expect("deposit");
        pool.open_exposure(35 * TOKEN).expect("open");
        // min pool = 35 / 0.7 = 50; free = 50
        assert_eq!(pool.min_pool(7_000).expect("min"), 50 * TOKEN);
        assert_eq!(pool.max_withdrawable(&addr(1), 7_000).expect("max"), 30 * TOKEN);
        assert_eq!(pool.max_withdrawable(&addr(2), 7_000).expect("max"), 20 * TOKEN);
    }

    #[test]
    fn test_min_pool_rounds_up() {
        let mut pool = PoolState::default();
        pool.deposit(addr(1), 2).expect("deposit");
        pool.open_exposure(1).expect("open");
        assert_eq!(pool.min_pool(7_000).expect("min"), 2);
        assert_eq!(pool.max_withdrawable(&addr(1), 7_000).expect("max"), 0);
    }

    #[test]
    fn test_accrue_keeps_sum_exact() {
        let mut pool = PoolState::default();
        pool.deposit(addr(1), 1).expect("deposit");
        pool.deposit(addr(2), 1).expect("deposit");
        pool.deposit(addr(3), 1).expect("deposit");
        pool.accrue(2).expect("accrue");
        assert_eq!(pool.total_liquidity(), 5);
        let sum: u128 = pool.lp_balances().map(|(_, b)| *b).sum();
        assert_eq!(sum, 5);
        assert!(pool.invariant_holds(10_000));
    }

    #[test]
    fn test_pay_out_debits_pro_rata() {
        let mut pool = PoolState::default();
        pool.deposit(addr(1), 75 * TOKEN).expect("deposit");
        pool.deposit(addr(2), 25 * TOKEN).expect("deposit");
        pool.pay_out(10 * TOKEN).expect("pay out");
        assert_eq!(pool.total_liquidity(), 90 * TOKEN);
        assert_eq!(pool.lp_balance(&addr(1)), 67_500_000_000_000_000_000);
        assert_eq!(pool.lp_balance(&addr(2)), 22_500_000_000_000_000_000);
    }

    #[test]
    fn test_withdraw_more_than_balance() {
        let mut pool = PoolState::default();
        pool.deposit(addr(1), 5).expect("deposit");
        assert_eq!(
            pool.withdraw(&addr(1), 6),
            Err(MarketError::InsufficientLpBalance {
                requested: 6,
                balance: 5
            })
        );
        pool.withdraw(&addr(1), 5).expect("withdraw all");
        assert_eq!(pool.lp_balances().count(), 0);
    }
}
