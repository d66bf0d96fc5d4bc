//! Balance conservation checking.
//!
//! Value enters a trader's book only through explicit funding and leaves
//! it only through READY consumption. Everything else — freeze, release,
//! deposit drawdown — moves value between buckets of the same book. The
//! checker records the in/out flows and verifies the invariant
//! `available + frozen + deposit == funded - consumed` for every trader.
//! Profit is excluded: it is credited from the merchant fee pool, not
//! from the trader's own funds.

use std::collections::HashMap;

use rust_decimal::Decimal;

use payrail_routing::FreezeLedger;
use payrail_types::{PayrailError, Result, TraderBalance, TraderId};

/// Records funding and consumption flows for later verification.
#[derive(Debug, Default)]
pub struct BalanceConservation {
    funded: HashMap<TraderId, Decimal>,
    consumed: HashMap<TraderId, Decimal>,
}

impl BalanceConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record external value entering a trader's book (available or
    /// deposit funding alike).
    pub fn record_funding(&mut self, trader_id: TraderId, amount: Decimal) {
        *self.funded.entry(trader_id).or_default() += amount;
    }

    /// Record escrow permanently leaving a trader's book on READY.
    pub fn record_consumption(&mut self, trader_id: TraderId, amount: Decimal) {
        *self.consumed.entry(trader_id).or_default() += amount;
    }

    /// Expected book total for one trader.
    #[must_use]
    pub fn expected(&self, trader_id: TraderId) -> Decimal {
        self.funded.get(&trader_id).copied().unwrap_or_default()
            - self.consumed.get(&trader_id).copied().unwrap_or_default()
    }

    /// Check one trader's balance sheet against the recorded flows.
    pub fn verify_trader(&self, trader_id: TraderId, balance: &TraderBalance) -> Result<()> {
        let actual = balance.available + balance.frozen + balance.deposit;
        let expected = self.expected(trader_id);
        if actual != expected {
            return Err(PayrailError::Internal(format!(
                "conservation violated for {trader_id}: expected {expected}, found {actual}"
            )));
        }
        Ok(())
    }

    /// Check every trader this checker has seen against the ledger.
    pub fn verify_all(&self, ledger: &FreezeLedger) -> Result<()> {
        for trader_id in self.funded.keys().chain(self.consumed.keys()) {
            self.verify_trader(*trader_id, &ledger.trader_balance(*trader_id))?;
        }
        Ok(())
    }
}
