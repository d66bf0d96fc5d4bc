//! Deal model — the single payment request moving through the engine.
//!
//! A deal is created exactly once (internal match or aggregator
//! acceptance), mutated only through the settlement state machine, and
//! never deleted. `frozen_amount` is fixed at freeze time and is the
//! authoritative figure for every later balance mutation — it is never
//! recomputed from a current rate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AggregatorId, DealId, KkkOperation, MerchantId, MethodKind, RequisiteId, TraderId};

/// Direction of the payment: money coming into the platform (pay-in)
/// or leaving it (pay-out).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealDirection {
    In,
    Out,
}

impl std::fmt::Display for DealDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::In => write!(f, "IN"),
            Self::Out => write!(f, "OUT"),
        }
    }
}

/// Lifecycle status of a deal.
///
/// Legal transitions:
/// `CREATED -> IN_PROGRESS -> {READY, CANCELED, EXPIRED}`; any non-terminal
/// state may enter `DISPUTE`, which resolves to `READY` or `CANCELED`.
/// `READY`, `CANCELED` and `EXPIRED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealStatus {
    Created,
    InProgress,
    Ready,
    Canceled,
    Expired,
    Dispute,
}

impl DealStatus {
    /// Terminal states are retained for audit and accept no transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Canceled | Self::Expired)
    }

    /// Whether a deal in this state still holds an internal freeze.
    #[must_use]
    pub fn holds_freeze(self) -> bool {
        matches!(self, Self::Created | Self::InProgress | Self::Dispute)
    }

    /// Whether the transition `self -> next` is legal. A transition into
    /// the state already held is *not* legal here — the state machine
    /// treats it as an idempotent no-op before consulting this table.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Created => matches!(
                next,
                Self::InProgress | Self::Canceled | Self::Expired | Self::Dispute
            ),
            Self::InProgress => matches!(
                next,
                Self::Ready | Self::Canceled | Self::Expired | Self::Dispute
            ),
            Self::Dispute => matches!(next, Self::Ready | Self::Canceled),
            Self::Ready | Self::Canceled | Self::Expired => false,
        }
    }
}

impl std::fmt::Display for DealStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Ready => write!(f, "READY"),
            Self::Canceled => write!(f, "CANCELED"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Dispute => write!(f, "DISPUTE"),
        }
    }
}

/// The resource fulfilling a deal — exactly one of an internal trader
/// instrument or an external aggregator order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fulfiller {
    /// Internal match: a trader's payment instrument with a freeze held
    /// against the trader's balance.
    Internal {
        requisite_id: RequisiteId,
        trader_id: TraderId,
    },
    /// External failover: an aggregator partner accepted the deal. No
    /// internal freeze exists for these deals.
    Aggregator {
        aggregator_id: AggregatorId,
        external_order_id: String,
    },
}

impl Fulfiller {
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Auction deadlines for deals initiated by an external auction system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionWindow {
    /// After this instant, offers are no longer accepted.
    pub stop_auction_time: DateTime<Utc>,
    /// After this instant, the deal auto-cancels.
    pub cancel_order_time: DateTime<Utc>,
}

/// Core deal struct. All monetary fields are `Decimal`; financial fields
/// are stamped at creation/freeze time and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub merchant_id: MerchantId,
    pub direction: DealDirection,
    /// Fiat amount requested by the merchant.
    pub amount: Decimal,
    pub currency: String,
    pub method: MethodKind,
    pub status: DealStatus,
    /// Base rate at creation time.
    pub rate: Decimal,
    /// Rate resolved for the merchant (merchant-side KKK applied).
    pub merchant_rate: Decimal,
    /// Rate resolved for the fulfiller (trader/aggregator KKK applied).
    pub adjusted_rate: Decimal,
    pub kkk_percent: Decimal,
    pub kkk_operation: KkkOperation,
    /// Escrowed amount, fixed at freeze time. Zero for aggregator deals.
    pub frozen_amount: Decimal,
    /// Trader fee percentage at creation time.
    pub fee_percent: Decimal,
    /// Trader commission computed at creation: frozen x fee / 100.
    pub calculated_commission: Decimal,
    pub trader_profit: Decimal,
    pub merchant_profit: Decimal,
    pub aggregator_profit: Decimal,
    pub platform_profit: Decimal,
    pub fulfiller: Fulfiller,
    /// Correlation id supplied by the merchant or external system.
    pub merchant_order_id: Option<String>,
    pub callback_url: Option<String>,
    /// Payment instructions shown to the payer: the internal requisite's
    /// display string, or the partner's instructions stored verbatim.
    pub display_requisite: Option<String>,
    pub auction: Option<AuctionWindow>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl Deal {
    /// Whether the wall-clock deadline for this deal has passed.
    #[must_use]
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether this deal currently holds an internal freeze.
    #[must_use]
    pub fn holds_freeze(&self) -> bool {
        self.fulfiller.is_internal() && self.status.holds_freeze()
    }

    /// The trader fulfilling this deal, if internally matched.
    #[must_use]
    pub fn trader_id(&self) -> Option<TraderId> {
        match &self.fulfiller {
            Fulfiller::Internal { trader_id, .. } => Some(*trader_id),
            Fulfiller::Aggregator { .. } => None,
        }
    }

    /// The requisite fulfilling this deal, if internally matched.
    #[must_use]
    pub fn requisite_id(&self) -> Option<RequisiteId> {
        match &self.fulfiller {
            Fulfiller::Internal { requisite_id, .. } => Some(*requisite_id),
            Fulfiller::Aggregator { .. } => None,
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Deal {
    /// An internally-matched deal in CREATED state with sensible defaults.
    pub fn dummy_internal(
        trader_id: TraderId,
        requisite_id: RequisiteId,
        amount: Decimal,
        frozen_amount: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DealId::new(),
            merchant_id: MerchantId::new(),
            direction: DealDirection::In,
            amount,
            currency: "RUB".to_string(),
            method: MethodKind::Card,
            status: DealStatus::Created,
            rate: Decimal::new(96, 0),
            merchant_rate: Decimal::new(96, 0),
            adjusted_rate: Decimal::new(96, 0),
            kkk_percent: Decimal::ZERO,
            kkk_operation: KkkOperation::Plus,
            frozen_amount,
            fee_percent: Decimal::new(7, 0),
            calculated_commission: Decimal::ZERO,
            trader_profit: Decimal::ZERO,
            merchant_profit: Decimal::ZERO,
            aggregator_profit: Decimal::ZERO,
            platform_profit: Decimal::ZERO,
            fulfiller: Fulfiller::Internal {
                requisite_id,
                trader_id,
            },
            merchant_order_id: None,
            callback_url: None,
            display_requisite: None,
            auction: None,
            created_at: now,
            accepted_at: None,
            expires_at: now + chrono::Duration::minutes(30),
        }
    }

    /// An aggregator-fulfilled deal in CREATED state.
    pub fn dummy_aggregator(aggregator_id: AggregatorId, amount: Decimal) -> Self {
        let mut deal = Self::dummy_internal(
            TraderId::new(),
            RequisiteId::new(),
            amount,
            Decimal::ZERO,
        );
        deal.fulfiller = Fulfiller::Aggregator {
            aggregator_id,
            external_order_id: "ext-1".to_string(),
        };
        deal
    }
}
