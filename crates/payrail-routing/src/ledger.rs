//! The freeze ledger — atomic escrow accounting for trader balances.
//!
//! Every monetary mutation in the engine goes through this ledger. Freezes
//! round *up* (away from zero) at the minor-unit precision so the platform
//! never under-escrows; releases and profit credits round *down* (toward
//! zero) so the platform never over-credits. A freeze either fully succeeds
//! or leaves the ledger untouched.
//!
//! Settlement always passes the `frozen_amount` stored on the deal back
//! into [`FreezeLedger::release`] / [`FreezeLedger::consume_frozen`] —
//! amounts are never recomputed from a current rate.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::debug;

use payrail_types::{
    AggregatorId, MerchantId, PayrailError, Result, TraderBalance, TraderId,
    money::{round_escrow, round_release},
};

/// In-memory balance book for traders, merchants, aggregators, and the
/// platform's own profit account.
#[derive(Debug, Default)]
pub struct FreezeLedger {
    traders: HashMap<TraderId, TraderBalance>,
    merchants: HashMap<MerchantId, Decimal>,
    aggregators: HashMap<AggregatorId, Decimal>,
    platform_profit: Decimal,
}

impl FreezeLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a trader account with an explicit starting balance. Replaces
    /// any prior entry for the same trader.
    pub fn open_trader(&mut self, trader_id: TraderId, balance: TraderBalance) {
        self.traders.insert(trader_id, balance);
    }

    /// Credit a trader's available balance (external funding).
    pub fn fund_available(&mut self, trader_id: TraderId, amount: Decimal) {
        let entry = self.traders.entry(trader_id).or_default();
        entry.available += amount;
    }

    /// Credit a trader's deposit buffer.
    pub fn fund_deposit(&mut self, trader_id: TraderId, amount: Decimal) {
        let entry = self.traders.entry(trader_id).or_default();
        entry.deposit += amount;
    }

    /// Escrow funds for a new deal. The raw crypto amount is rounded away
    /// from zero at `dp` decimal places; the rounded figure is what gets
    /// frozen and returned, and must be stored on the deal verbatim.
    ///
    /// If `available` alone cannot cover the freeze, the deposit buffer is
    /// drawn down to top it up first. If even the combined funds fall
    /// short, nothing is mutated and `InsufficientBalance` is returned.
    pub fn reserve(&mut self, trader_id: TraderId, amount: Decimal, dp: u32) -> Result<Decimal> {
        let rounded = round_escrow(amount, dp);
        if rounded <= Decimal::ZERO {
            return Err(PayrailError::InvalidAmount { amount });
        }
        let entry = self
            .traders
            .get_mut(&trader_id)
            .ok_or(PayrailError::TraderNotFound(trader_id))?;

        if entry.available < rounded {
            let shortfall = rounded - entry.available;
            if entry.deposit < shortfall {
                return Err(PayrailError::InsufficientBalance {
                    needed: rounded,
                    available: entry.available + entry.deposit,
                });
            }
            entry.deposit -= shortfall;
            entry.available += shortfall;
            debug!(%trader_id, %shortfall, "deposit drawn down to cover freeze");
        }

        entry.available -= rounded;
        entry.frozen += rounded;
        debug!(%trader_id, frozen = %rounded, "funds reserved");
        Ok(rounded)
    }

    /// Return previously frozen funds to available. `frozen_amount` is the
    /// exact figure stamped on the deal at freeze time.
    pub fn release(&mut self, trader_id: TraderId, frozen_amount: Decimal) -> Result<()> {
        let entry = self
            .traders
            .get_mut(&trader_id)
            .ok_or(PayrailError::TraderNotFound(trader_id))?;
        if entry.frozen < frozen_amount {
            return Err(PayrailError::InsufficientFrozen);
        }
        entry.frozen -= frozen_amount;
        entry.available += frozen_amount;
        debug!(%trader_id, released = %frozen_amount, "freeze released");
        Ok(())
    }

    /// Permanently remove frozen funds — the trader has paid out the fiat
    /// side and the escrow leaves their book. Used on READY settlement.
    pub fn consume_frozen(&mut self, trader_id: TraderId, frozen_amount: Decimal) -> Result<()> {
        let entry = self
            .traders
            .get_mut(&trader_id)
            .ok_or(PayrailError::TraderNotFound(trader_id))?;
        if entry.frozen < frozen_amount {
            return Err(PayrailError::InsufficientFrozen);
        }
        entry.frozen -= frozen_amount;
        debug!(%trader_id, consumed = %frozen_amount, "frozen funds consumed");
        Ok(())
    }

    /// Credit a trader's profit accumulator, truncating at `dp`.
    pub fn credit_trader_profit(
        &mut self,
        trader_id: TraderId,
        amount: Decimal,
        dp: u32,
    ) -> Result<()> {
        let entry = self
            .traders
            .get_mut(&trader_id)
            .ok_or(PayrailError::TraderNotFound(trader_id))?;
        entry.profit += round_release(amount, dp);
        Ok(())
    }

    /// Credit a merchant's settlement balance, truncating at `dp`.
    pub fn credit_merchant(&mut self, merchant_id: MerchantId, amount: Decimal, dp: u32) {
        let entry = self.merchants.entry(merchant_id).or_default();
        *entry += round_release(amount, dp);
    }

    /// Credit an aggregator's payable balance, truncating at `dp`.
    pub fn credit_aggregator(&mut self, aggregator_id: AggregatorId, amount: Decimal, dp: u32) {
        let entry = self.aggregators.entry(aggregator_id).or_default();
        *entry += round_release(amount, dp);
    }

    /// Credit the platform's own profit account, truncating at `dp`.
    pub fn credit_platform(&mut self, amount: Decimal, dp: u32) {
        self.platform_profit += round_release(amount, dp);
    }

    /// Snapshot of a trader's balance; zero if the trader is unknown.
    #[must_use]
    pub fn trader_balance(&self, trader_id: TraderId) -> TraderBalance {
        self.traders.get(&trader_id).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn merchant_balance(&self, merchant_id: MerchantId) -> Decimal {
        self.merchants.get(&merchant_id).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn aggregator_balance(&self, aggregator_id: AggregatorId) -> Decimal {
        self.aggregators
            .get(&aggregator_id)
            .copied()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn platform_profit(&self) -> Decimal {
        self.platform_profit
    }

    /// Total value frozen across all traders.
    #[must_use]
    pub fn total_frozen(&self) -> Decimal {
        self.traders.values().map(|b| b.frozen).sum()
    }
}
