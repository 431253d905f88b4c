//! Host ledger.
//!
//! Holds native balances and the market factory, and runs every market call
//! as a transaction: the call operates on a copy of the market, value moves
//! only if the call succeeds, and the copy replaces the original only then.

use std::collections::HashMap;
use std::sync::Arc;

use depeg_crypto::ed25519::Signature;
use depeg_types::events::MarketEvent;
use depeg_types::time::Clock;
use depeg_types::Address;
use tracing::{debug, warn};

use crate::factory::{MarketFactory, MarketParams};
use crate::market::{CallContext, DepegMarket};
use crate::{MarketError, Result};

/// Outcome of a successful transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Receipt {
    pub events: Vec<MarketEvent>,
    /// Value credited back to the sender.
    pub payout: u128,
    pub policy_id: Option<u64>,
}

pub struct Ledger {
    factory: MarketFactory,
    balances: HashMap<Address, u128>,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    pub fn new(chain_id: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            factory: MarketFactory::new(chain_id),
            balances: HashMap::new(),
            clock,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.factory.chain_id()
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Mint native balance to `who`.
    pub fn fund(&mut self, who: Address, amount: u128) -> Result<()> {
        let bal = self.balances.entry(who).or_insert(0);
        *bal = bal.checked_add(amount).ok_or(MarketError::Overflow)?;
        Ok(())
    }

    pub fn balance_of(&self, who: &Address) -> u128 {
        self.balances.get(who).copied().unwrap_or(0)
    }

    /// Native value held by accounts plus value held by market pools.
    pub fn total_value(&self) -> u128 {
        let accounts: u128 = self.balances.values().sum();
        let pools: u128 = self
            .factory
            .markets()
            .iter()
            .filter_map(|a| self.factory.market(a).ok())
            .map(DepegMarket::total_liquidity)
            .sum();
        accounts + pools
    }

    pub fn create_market(&mut self, params: MarketParams) -> Result<(Address, Receipt)> {
        let address = self.factory.create_market(params)?;
        let receipt = Receipt {
            events: self.factory.take_events(),
            ..Receipt::default()
        };
        Ok((address, receipt))
    }

    pub fn market(&self, address: &Address) -> Result<&DepegMarket> {
        self.factory.market(address)
    }

    pub fn markets(&self) -> &[Address] {
        self.factory.markets()
    }

    pub fn add_liquidity(&mut self, sender: Address, market: Address, value: u128) -> Result<Receipt> {
        self.transact(sender, market, value, |m, ctx| m.add_liquidity(ctx).map(|_| (0, None)))
    }

    pub fn remove_liquidity(&mut self, sender: Address, market: Address, amount: u128) -> Result<Receipt> {
        self.transact(sender, market, 0, |m, ctx| {
            m.remove_liquidity(ctx, amount).map(|paid| (paid, None))
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn buy_protection(
        &mut self,
        sender: Address,
        market: Address,
        value: u128,
        notional: u128,
        p_bps: u64,
        issued_at: u64,
        signature: &Signature,
    ) -> Result<Receipt> {
        self.transact(sender, market, value, |m, ctx| {
            m.buy_protection(ctx, notional, p_bps, issued_at, signature)
                .map(|id| (0, Some(id)))
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn claim(
        &mut self,
        sender: Address,
        market: Address,
        id: u64,
        event_start: u64,
        event_end: u64,
        issued_at: u64,
        signature: &Signature,
    ) -> Result<Receipt> {
        self.transact(sender, market, 0, |m, ctx| {
            m.claim(ctx, id, event_start, event_end, issued_at, signature)
                .map(|paid| (paid, Some(id)))
        })
    }

    fn transact<F>(&mut self, sender: Address, market: Address, value: u128, call: F) -> Result<Receipt>
    where
        F: FnOnce(&mut DepegMarket, &CallContext) -> Result<(u128, Option<u64>)>,
    {
        let available = self.balance_of(&sender);
        if value > available {
            return Err(MarketError::InsufficientFunds {
                needed: value,
                available,
            });
        }
        let ctx = CallContext::new(sender, value, self.clock.now());
        let mut working = self.factory.market(&market)?.clone();

        let (payout, policy_id) = match call(&mut working, &ctx) {
            Ok(out) => out,
            Err(e) => {
                warn!(%market, %sender, reason = e.reason(), "transaction reverted");
                return Err(e);
            }
        };

        let remaining = available - value;
        let credited = remaining.checked_add(payout).ok_or(MarketError::Overflow)?;
        let events = working.take_events();
        *self.factory.market_mut(&market)? = working;
        self.balances.insert(sender, credited);

        debug!(%market, %sender, value, payout, events = events.len(), "transaction committed");
        Ok(Receipt {
            events,
            payout,
            policy_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depeg_crypto::ed25519::SigningKey;
    use depeg_types::attestation::Attestation;
    use depeg_types::time::ManualClock;
    use depeg_types::WEI_PER_TOKEN;

    const TOKEN: u128 = WEI_PER_TOKEN;

    fn setup() -> (Ledger, Arc<ManualClock>, SigningKey, Address) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let key = SigningKey::from_bytes(&[8u8; 32]);
        let mut ledger = Ledger::new(114, clock.clone());
        let (market, receipt) = ledger
            .create_market(MarketParams::new("USDC-USD", key.verifying_key()))
            .expect("create");
        assert!(matches!(receipt.events[0], MarketEvent::MarketCreated { index: 0, .. }));
        (ledger, clock, key, market)
    }

    #[test]
    fn test_insufficient_funds_moves_nothing() {
        let (mut ledger, _, _, market) = setup();
        let lp = Address([1u8; 20]);
        ledger.fund(lp, 5).expect("fund");
        let err = ledger.add_liquidity(lp, market, 6).expect_err("broke");
        assert_eq!(err.reason(), "INSUFFICIENT_FUNDS");
        assert_eq!(ledger.balance_of(&lp), 5);
        assert_eq!(ledger.market(&market).expect("market").total_liquidity(), 0);
    }

    #[test]
    fn test_reverted_call_keeps_value() {
        let (mut ledger, clock, key, market) = setup();
        let lp = Address([1u8; 20]);
        let buyer = Address([2u8; 20]);
        ledger.fund(lp, 100 * TOKEN).expect("fund");
        ledger.fund(buyer, TOKEN).expect("fund");
        ledger.add_liquidity(lp, market, 100 * TOKEN).expect("add");

        let now = clock.now();
        let m = ledger.market(&market).expect("market");
        let quote = Attestation::ProbabilityQuote {
            horizon_sec: m.config().horizon_sec,
            p_bps: 150,
            issued_at: now - 10,
        };
        let sig = key.sign(&quote.signing_message(&m.attestation_context()));
        let premium = m.quote_premium(10 * TOKEN, 150).expect("premium");

        // one wei short
        let err = ledger
            .buy_protection(buyer, market, premium - 1, 10 * TOKEN, 150, now - 10, &sig)
            .expect_err("short");
        assert_eq!(err.reason(), "PREMIUM");
        assert_eq!(ledger.balance_of(&buyer), TOKEN);

        let receipt = ledger
            .buy_protection(buyer, market, premium, 10 * TOKEN, 150, now - 10, &sig)
            .expect("buy");
        assert_eq!(receipt.policy_id, Some(1));
        assert_eq!(ledger.balance_of(&buyer), TOKEN - premium);
        assert_eq!(ledger.total_value(), 101 * TOKEN);
    }

    #[test]
    fn test_remove_liquidity_credits_sender() {
        let (mut ledger, _, _, market) = setup();
        let lp = Address([1u8; 20]);
        ledger.fund(lp, 10 * TOKEN).expect("fund");
        ledger.add_liquidity(lp, market, 10 * TOKEN).expect("add");
        assert_eq!(ledger.balance_of(&lp), 0);
        let receipt = ledger.remove_liquidity(lp, market, 4 * TOKEN).expect("remove");
        assert_eq!(receipt.payout, 4 * TOKEN);
        assert_eq!(ledger.balance_of(&lp), 4 * TOKEN);
        assert!(matches!(receipt.events[0], MarketEvent::LiquidityRemoved { .. }));
    }

    #[test]
    fn test_unknown_market_reverts() {
        let (mut ledger, _, _, _) = setup();
        let lp = Address([1u8; 20]);
        ledger.fund(lp, 1).expect("fund");
        let err = ledger
            .add_liquidity(lp, Address([9u8; 20]), 1)
            .expect_err("missing");
        assert_eq!(err.reason(), "NO_MARKET");
        assert_eq!(ledger.balance_of(&lp), 1);
    }
}
