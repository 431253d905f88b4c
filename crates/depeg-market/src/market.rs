//! A single depeg protection market.
//!
//! Each call checks every precondition against the current state, then applies
//! its mutations to a cloned pool and commits the clone. A returned error
//! means nothing changed.

use std::collections::BTreeMap;

use depeg_crypto::ed25519::Signature;
use depeg_types::attestation::{Attestation, AttestationContext};
use depeg_types::events::MarketEvent;
use depeg_types::market::{MarketConfig, Policy};
use depeg_types::Address;
use tracing::{debug, info};

use crate::pool::PoolState;
use crate::pricing;
use crate::verify::{self, market_context};
use crate::{MarketError, Result};

/// Caller, attached value, and block time of one call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub sender: Address,
    pub value: u128,
    pub now: u64,
}

impl CallContext {
    pub fn new(sender: Address, value: u128, now: u64) -> Self {
        Self { sender, value, now }
    }
}

#[derive(Clone, Debug)]
pub struct DepegMarket {
    address: Address,
    chain_id: u64,
    config: MarketConfig,
    pool: PoolState,
    policies: BTreeMap<u64, Policy>,
    next_policy_id: u64,
    events: Vec<MarketEvent>,
}

impl DepegMarket {
    /// # Errors
    ///
    /// Returns [`MarketError::Config`] if `config` fails validation.
    pub fn new(address: Address, chain_id: u64, config: MarketConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            address,
            chain_id,
            config,
            pool: PoolState::default(),
            policies: BTreeMap::new(),
            next_policy_id: 1,
            events: Vec::new(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn pool(&self) -> &PoolState {
        &self.pool
    }

    pub fn total_liquidity(&self) -> u128 {
        self.pool.total_liquidity()
    }

    pub fn outstanding_exposure(&self) -> u128 {
        self.pool.outstanding_exposure()
    }

    pub fn utilization_bps(&self) -> u64 {
        self.pool.utilization_bps()
    }

    pub fn current_lambda_bps(&self) -> u64 {
        pricing::current_lambda_bps(
            self.utilization_bps(),
            self.config.lambda_min_bps,
            self.config.lambda_max_bps,
        )
    }

    pub fn next_policy_id(&self) -> u64 {
        self.next_policy_id
    }

    pub fn lp_balance(&self, who: &Address) -> u128 {
        self.pool.lp_balance(who)
    }

    pub fn max_withdrawable(&self, who: &Address) -> Result<u128> {
        self.pool.max_withdrawable(who, self.config.reserve_factor_bps)
    }

    pub fn policy(&self, id: u64) -> Option<&Policy> {
        self.policies.get(&id)
    }

    pub fn policies(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    /// Context attestations for this market are signed under.
    pub fn attestation_context(&self) -> AttestationContext {
        market_context(self.address, self.chain_id, &self.config)
    }

    /// Drain events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<MarketEvent> {
        std::mem::take(&mut self.events)
    }

    /// Premium for `notional` at `p_bps` under the current risk loading.
    pub fn quote_premium(&self, notional: u128, p_bps: u64) -> Result<u128> {
        pricing::quote_premium(notional, p_bps, self.current_lambda_bps())
    }

    /// Deposit `ctx.value` into the pool.
    pub fn add_liquidity(&mut self, ctx: &CallContext) -> Result<()> {
        if ctx.value == 0 {
            return Err(MarketError::ZeroAmount);
        }
        let mut pool = self.pool.clone();
        pool.deposit(ctx.sender, ctx.value)?;
        self.pool = pool;

        debug!(market = %self.address, provider = %ctx.sender, amount = ctx.value, "liquidity added");
        self.events.push(MarketEvent::LiquidityAdded {
            market: self.address,
            provider: ctx.sender,
            amount: ctx.value,
        });
        Ok(())
    }

    /// Withdraw `amount` of the caller's liquidity. Returns the amount to pay out.
    pub fn remove_liquidity(&mut self, ctx: &CallContext, amount: u128) -> Result<u128> {
        if amount == 0 {
            return Err(MarketError::ZeroAmount);
        }
        let balance = self.pool.lp_balance(&ctx.sender);
        if amount > balance {
            return Err(MarketError::InsufficientLpBalance {
                requested: amount,
                balance,
            });
        }
        let max = self.max_withdrawable(&ctx.sender)?;
        if amount > max {
            return Err(MarketError::WithdrawLimitExceeded {
                requested: amount,
                max,
            });
        }

        let mut pool = self.pool.clone();
        pool.withdraw(&ctx.sender, amount)?;
        self.pool = pool;

        debug!(market = %self.address, provider = %ctx.sender, amount, "liquidity removed");
        self.events.push(MarketEvent::LiquidityRemoved {
            market: self.address,
            provider: ctx.sender,
            amount,
        });
        Ok(amount)
    }

    /// Buy protection against a signed probability quote. `ctx.value` must
    /// equal the premium. Returns the new policy id.
    pub fn buy_protection(
        &mut self,
        ctx: &CallContext,
        notional: u128,
        p_bps: u64,
        issued_at: u64,
        signature: &Signature,
    ) -> Result<u64> {
        if notional == 0 {
            return Err(MarketError::ZeroNotional);
        }
        if self.pool.total_liquidity() == 0 {
            return Err(MarketError::NoLiquidity);
        }

        let quote = Attestation::ProbabilityQuote {
            horizon_sec: self.config.horizon_sec,
            p_bps,
            issued_at,
        };
        verify::verify_attestation(
            &self.config,
            &self.attestation_context(),
            &quote,
            signature,
            ctx.now,
        )?;

        let expected = self.quote_premium(notional, p_bps)?;
        if ctx.value != expected {
            return Err(MarketError::PremiumMismatch {
                expected,
                got: ctx.value,
            });
        }

        let available = self.pool.available_capacity(self.config.reserve_factor_bps)?;
        if notional > available {
            return Err(MarketError::CapacityExceeded {
                requested: notional,
                available,
            });
        }

        let id = self.next_policy_id;
        let next = id.checked_add(1).ok_or(MarketError::Overflow)?;
        let expiry = ctx
            .now
            .checked_add(self.config.horizon_sec)
            .ok_or(MarketError::Overflow)?;

        let mut pool = self.pool.clone();
        pool.open_exposure(notional)?;
        pool.accrue(ctx.value)?;

        self.pool = pool;
        self.next_policy_id = next;
        self.policies.insert(
            id,
            Policy {
                id,
                buyer: ctx.sender,
                notional,
                premium_paid: ctx.value,
                start: ctx.now,
                expiry,
                claimed: false,
            },
        );

        info!(market = %self.address, id, buyer = %ctx.sender, notional, premium = ctx.value, "policy bought");
        self.events.push(MarketEvent::PolicyBought {
            market: self.address,
            id,
            buyer: ctx.sender,
            notional,
            premium: ctx.value,
            expiry,
        });
        Ok(id)
    }

    /// Claim policy `id` against a signed trigger attestation. Returns the payout.
    ///
    /// The attested breach must overlap the policy's lifetime. It is clamped to
    /// `[start, expiry]` and the clamped span must still cover the window.
    pub fn claim(
        &mut self,
        ctx: &CallContext,
        id: u64,
        event_start: u64,
        event_end: u64,
        issued_at: u64,
        signature: &Signature,
    ) -> Result<u128> {
        let policy = self.policies.get(&id).ok_or(MarketError::NoPolicy(id))?;
        if policy.buyer != ctx.sender {
            return Err(MarketError::NotBuyer);
        }
        if policy.claimed {
            return Err(MarketError::AlreadyClaimed);
        }

        let trigger = Attestation::Trigger {
            barrier_ppm: self.config.barrier_ppm,
            window_sec: self.config.window_sec,
            event_start,
            event_end,
            triggered: true,
            issued_at,
        };
        verify::verify_attestation(
            &self.config,
            &self.attestation_context(),
            &trigger,
            signature,
            ctx.now,
        )?;

        if event_start > event_end || event_end < policy.start || event_start > policy.expiry {
            return Err(MarketError::OutOfWindow);
        }
        let duration = event_end.min(policy.expiry) - event_start.max(policy.start);
        if duration < self.config.window_sec {
            return Err(MarketError::NotTriggered {
                duration,
                window: self.config.window_sec,
            });
        }

        let payout = policy.notional;
        let buyer = policy.buyer;
        let mut pool = self.pool.clone();
        pool.close_exposure(payout)?;
        pool.pay_out(payout)?;

        self.pool = pool;
        if let Some(p) = self.policies.get_mut(&id) {
            p.claimed = true;
        }

        info!(market = %self.address, id, buyer = %buyer, payout, "policy claimed");
        self.events.push(MarketEvent::PolicyClaimed {
            market: self.address,
            id,
            buyer,
            payout,
        });
        Ok(payout)
    }
}
