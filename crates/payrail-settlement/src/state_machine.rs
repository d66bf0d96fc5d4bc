//! The deal settlement state machine.
//!
//! One entry point, [`SettlementEngine::transition`], enforces the legal
//! transition table and performs each state's balance side effects exactly
//! once. Retrying a transition into the state already held, or out of a
//! terminal state, is an idempotent no-op — duplicate webhooks and
//! operator retries must not double-settle.
//!
//! Balance mutations always use the `frozen_amount` and profit figures
//! stamped on the deal at creation, never a recomputed rate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use payrail_routing::FreezeLedger;
use payrail_types::{
    Deal, DealId, DealStatus, EngineConfig, Fulfiller, MerchantId, PayrailError, Result,
};

/// What the dispatcher needs to notify a merchant of a status change.
/// Emitted by a successful transition; delivery happens after the
/// transition has committed and never blocks it.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackEvent {
    pub deal_id: DealId,
    pub merchant_id: MerchantId,
    pub status: DealStatus,
    pub amount: Decimal,
    pub merchant_order_id: Option<String>,
    /// Partner order id for aggregator-fulfilled deals.
    pub external_order_id: Option<String>,
}

impl CallbackEvent {
    fn from_deal(deal: &Deal) -> Self {
        let external_order_id = match &deal.fulfiller {
            Fulfiller::Aggregator {
                external_order_id, ..
            } => Some(external_order_id.clone()),
            Fulfiller::Internal { .. } => None,
        };
        Self {
            deal_id: deal.id,
            merchant_id: deal.merchant_id,
            status: deal.status,
            amount: deal.amount,
            merchant_order_id: deal.merchant_order_id.clone(),
            external_order_id,
        }
    }
}

/// Result of a transition attempt.
#[derive(Debug)]
pub enum TransitionOutcome {
    /// The transition happened; notify the merchant.
    Applied(CallbackEvent),
    /// Duplicate or post-terminal retry; nothing changed.
    NoOp,
}

/// Applies status transitions and their settlement side effects.
#[derive(Debug, Clone, Copy)]
pub struct SettlementEngine {
    dp: u32,
}

impl SettlementEngine {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            dp: config.minor_unit_dp,
        }
    }

    /// Drive `deal` to `target`, mutating the ledger as the target state
    /// demands. The fallible ledger step always runs before the status
    /// flip, so a failed transition leaves both deal and ledger untouched.
    pub fn transition(
        &self,
        deal: &mut Deal,
        ledger: &mut FreezeLedger,
        target: DealStatus,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        if deal.status == target || deal.status.is_terminal() {
            info!(deal = %deal.id, status = %deal.status, %target, "transition retry ignored");
            return Ok(TransitionOutcome::NoOp);
        }
        if !deal.status.can_transition_to(target) {
            return Err(PayrailError::InvalidTransition {
                from: deal.status,
                to: target,
            });
        }

        match target {
            DealStatus::Ready => self.settle_ready(deal, ledger, now)?,
            DealStatus::Canceled | DealStatus::Expired => {
                if deal.holds_freeze() {
                    if let Some(trader_id) = deal.trader_id() {
                        ledger.release(trader_id, deal.frozen_amount)?;
                    }
                }
            }
            // DISPUTE holds the freeze; IN_PROGRESS moves no money.
            DealStatus::InProgress | DealStatus::Dispute => {}
            // can_transition_to never admits CREATED as a target.
            DealStatus::Created => unreachable!("no state transitions into CREATED"),
        }

        let from = deal.status;
        deal.status = target;
        info!(deal = %deal.id, %from, to = %target, "deal transitioned");
        Ok(TransitionOutcome::Applied(CallbackEvent::from_deal(deal)))
    }

    /// READY settlement: the escrow permanently leaves the trader's book
    /// and the stamped profit figures are credited out.
    fn settle_ready(
        &self,
        deal: &mut Deal,
        ledger: &mut FreezeLedger,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match deal.fulfiller.clone() {
            Fulfiller::Internal { trader_id, .. } => {
                ledger.consume_frozen(trader_id, deal.frozen_amount)?;
                ledger.credit_trader_profit(trader_id, deal.calculated_commission, self.dp)?;
                ledger.credit_merchant(deal.merchant_id, deal.merchant_profit, self.dp);
                ledger.credit_platform(deal.platform_profit, self.dp);
                deal.trader_profit = deal.calculated_commission;
            }
            Fulfiller::Aggregator { aggregator_id, .. } => {
                ledger.credit_merchant(deal.merchant_id, deal.merchant_profit, self.dp);
                ledger.credit_aggregator(aggregator_id, deal.aggregator_profit, self.dp);
                ledger.credit_platform(deal.platform_profit, self.dp);
            }
        }
        deal.accepted_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use payrail_types::{AggregatorId, RequisiteId, TraderBalance, TraderId};

    use super::*;

    fn dec(value: i64, scale: u32) -> Decimal {
        Decimal::new(value, scale)
    }

    fn engine() -> SettlementEngine {
        SettlementEngine::new(&EngineConfig::default())
    }

    /// An internal deal in CREATED state with its freeze already held.
    fn frozen_deal() -> (Deal, FreezeLedger, TraderId) {
        let trader_id = TraderId::new();
        let mut ledger = FreezeLedger::new();
        ledger.open_trader(
            trader_id,
            TraderBalance {
                available: dec(1_000, 0),
                frozen: Decimal::ZERO,
                deposit: Decimal::ZERO,
                profit: Decimal::ZERO,
            },
        );
        let frozen = ledger
            .reserve(trader_id, dec(10_000, 0) / dec(9_552, 2), 2)
            .unwrap();
        let mut deal = Deal::dummy_internal(trader_id, RequisiteId::new(), dec(10_000, 0), frozen);
        deal.calculated_commission = dec(732, 2);
        deal.merchant_profit = dec(9_479, 2);
        deal.platform_profit = dec(215, 2);
        (deal, ledger, trader_id)
    }

    #[test]
    fn ready_consumes_freeze_and_credits() {
        let (mut deal, mut ledger, trader_id) = frozen_deal();
        let merchant_id = deal.merchant_id;
        let eng = engine();
        let now = Utc::now();

        eng.transition(&mut deal, &mut ledger, DealStatus::InProgress, now)
            .unwrap();
        let outcome = eng
            .transition(&mut deal, &mut ledger, DealStatus::Ready, now)
            .unwrap();

        assert!(matches!(outcome, TransitionOutcome::Applied(_)));
        assert_eq!(deal.status, DealStatus::Ready);
        assert_eq!(deal.trader_profit, dec(732, 2));
        assert!(deal.accepted_at.is_some());

        let bal = ledger.trader_balance(trader_id);
        // The escrow left the book: not released back to available.
        assert_eq!(bal.frozen, Decimal::ZERO);
        assert_eq!(bal.available, dec(1_000, 0) - dec(10_470, 2));
        assert_eq!(bal.profit, dec(732, 2));
        assert_eq!(ledger.merchant_balance(merchant_id), dec(9_479, 2));
        assert_eq!(ledger.platform_profit(), dec(215, 2));
    }

    #[test]
    fn cancel_releases_exact_frozen_amount() {
        let (mut deal, mut ledger, trader_id) = frozen_deal();
        let eng = engine();
        let now = Utc::now();

        eng.transition(&mut deal, &mut ledger, DealStatus::Canceled, now)
            .unwrap();

        let bal = ledger.trader_balance(trader_id);
        assert_eq!(bal.available, dec(1_000, 0));
        assert_eq!(bal.frozen, Decimal::ZERO);
        // No profit on a canceled deal.
        assert_eq!(bal.profit, Decimal::ZERO);
    }

    #[test]
    fn expiry_releases_like_cancel() {
        let (mut deal, mut ledger, trader_id) = frozen_deal();
        let eng = engine();
        eng.transition(&mut deal, &mut ledger, DealStatus::InProgress, Utc::now())
            .unwrap();
        eng.transition(&mut deal, &mut ledger, DealStatus::Expired, Utc::now())
            .unwrap();
        assert_eq!(ledger.trader_balance(trader_id).available, dec(1_000, 0));
    }

    #[test]
    fn created_cannot_go_straight_to_ready() {
        let (mut deal, mut ledger, _) = frozen_deal();
        let err = engine()
            .transition(&mut deal, &mut ledger, DealStatus::Ready, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            PayrailError::InvalidTransition {
                from: DealStatus::Created,
                to: DealStatus::Ready,
            }
        ));
        assert_eq!(deal.status, DealStatus::Created);
    }

    #[test]
    fn terminal_retry_is_noop_and_moves_no_money() {
        let (mut deal, mut ledger, trader_id) = frozen_deal();
        let eng = engine();
        let now = Utc::now();
        eng.transition(&mut deal, &mut ledger, DealStatus::InProgress, now)
            .unwrap();
        eng.transition(&mut deal, &mut ledger, DealStatus::Ready, now)
            .unwrap();
        let profit_after = ledger.trader_balance(trader_id).profit;

        // Duplicate webhook.
        let outcome = eng
            .transition(&mut deal, &mut ledger, DealStatus::Ready, now)
            .unwrap();
        assert!(matches!(outcome, TransitionOutcome::NoOp));
        // Contradictory retry after terminal is tolerated too.
        let outcome = eng
            .transition(&mut deal, &mut ledger, DealStatus::Canceled, now)
            .unwrap();
        assert!(matches!(outcome, TransitionOutcome::NoOp));
        assert_eq!(deal.status, DealStatus::Ready);
        assert_eq!(ledger.trader_balance(trader_id).profit, profit_after);
    }

    #[test]
    fn dispute_holds_freeze_until_resolved() {
        let (mut deal, mut ledger, trader_id) = frozen_deal();
        let eng = engine();
        let now = Utc::now();
        eng.transition(&mut deal, &mut ledger, DealStatus::InProgress, now)
            .unwrap();
        eng.transition(&mut deal, &mut ledger, DealStatus::Dispute, now)
            .unwrap();

        // Frozen while the dispute is open.
        assert_eq!(ledger.trader_balance(trader_id).frozen, dec(10_470, 2));

        // Dispute cannot expire.
        let err = eng
            .transition(&mut deal, &mut ledger, DealStatus::Expired, now)
            .unwrap_err();
        assert!(matches!(err, PayrailError::InvalidTransition { .. }));

        // Resolving to CANCELED releases.
        eng.transition(&mut deal, &mut ledger, DealStatus::Canceled, now)
            .unwrap();
        assert_eq!(ledger.trader_balance(trader_id).frozen, Decimal::ZERO);
        assert_eq!(ledger.trader_balance(trader_id).available, dec(1_000, 0));
    }

    #[test]
    fn dispute_resolving_ready_settles_normally() {
        let (mut deal, mut ledger, trader_id) = frozen_deal();
        let eng = engine();
        let now = Utc::now();
        eng.transition(&mut deal, &mut ledger, DealStatus::Dispute, now)
            .unwrap();
        eng.transition(&mut deal, &mut ledger, DealStatus::Ready, now)
            .unwrap();
        assert_eq!(ledger.trader_balance(trader_id).profit, dec(732, 2));
        assert_eq!(ledger.trader_balance(trader_id).frozen, Decimal::ZERO);
    }

    #[test]
    fn aggregator_ready_touches_no_trader() {
        let aggregator_id = AggregatorId::new();
        let mut deal = Deal::dummy_aggregator(aggregator_id, dec(10_000, 0));
        deal.merchant_profit = dec(9_479, 2);
        deal.aggregator_profit = dec(520, 2);
        deal.platform_profit = dec(416, 2);
        let merchant_id = deal.merchant_id;
        let mut ledger = FreezeLedger::new();
        let eng = engine();
        let now = Utc::now();

        eng.transition(&mut deal, &mut ledger, DealStatus::InProgress, now)
            .unwrap();
        eng.transition(&mut deal, &mut ledger, DealStatus::Ready, now)
            .unwrap();

        assert_eq!(ledger.merchant_balance(merchant_id), dec(9_479, 2));
        assert_eq!(ledger.aggregator_balance(aggregator_id), dec(520, 2));
        assert_eq!(ledger.platform_profit(), dec(416, 2));
        assert_eq!(ledger.total_frozen(), Decimal::ZERO);
    }

    #[test]
    fn aggregator_cancel_releases_nothing() {
        let mut deal = Deal::dummy_aggregator(AggregatorId::new(), dec(5_000, 0));
        let mut ledger = FreezeLedger::new();
        engine()
            .transition(&mut deal, &mut ledger, DealStatus::Canceled, Utc::now())
            .unwrap();
        assert_eq!(deal.status, DealStatus::Canceled);
        assert_eq!(ledger.total_frozen(), Decimal::ZERO);
    }

    #[test]
    fn callback_event_carries_partner_order_id() {
        let mut deal = Deal::dummy_aggregator(AggregatorId::new(), dec(5_000, 0));
        let mut ledger = FreezeLedger::new();
        let outcome = engine()
            .transition(&mut deal, &mut ledger, DealStatus::InProgress, Utc::now())
            .unwrap();
        match outcome {
            TransitionOutcome::Applied(event) => {
                assert_eq!(event.status, DealStatus::InProgress);
                assert_eq!(event.external_order_id.as_deref(), Some("ext-1"));
            }
            TransitionOutcome::NoOp => panic!("expected an applied transition"),
        }
    }

    #[test]
    fn failed_ledger_step_leaves_status_unchanged() {
        let (mut deal, mut ledger, trader_id) = frozen_deal();
        // Sabotage: drain the frozen funds behind the deal's back.
        ledger.consume_frozen(trader_id, deal.frozen_amount).unwrap();

        let eng = engine();
        let now = Utc::now();
        eng.transition(&mut deal, &mut ledger, DealStatus::InProgress, now)
            .unwrap();
        let err = eng
            .transition(&mut deal, &mut ledger, DealStatus::Ready, now)
            .unwrap_err();
        assert!(matches!(err, PayrailError::InsufficientFrozen));
        // The deal did not advance.
        assert_eq!(deal.status, DealStatus::InProgress);
        assert_eq!(deal.trader_profit, Decimal::ZERO);
    }
}
