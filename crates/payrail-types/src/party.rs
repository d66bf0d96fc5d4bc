//! Party models: traders, merchants, and aggregator partners.
//!
//! Trader balances follow the available/frozen accounting of the freeze
//! ledger, with a `deposit` buffer that can absorb freeze shortfalls and a
//! `profit` accumulator credited on READY settlement.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AggregatorId, MerchantId, TraderId};

/// A single trader's balance sheet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraderBalance {
    /// Freely usable for new freezes.
    pub available: Decimal,
    /// Sum of active reservations.
    pub frozen: Decimal,
    /// Secondary buffer that can absorb freeze shortfalls.
    pub deposit: Decimal,
    /// Accumulated fee income, credited on READY.
    pub profit: Decimal,
}

impl TraderBalance {
    /// Create a zero balance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: Decimal::ZERO,
            frozen: Decimal::ZERO,
            deposit: Decimal::ZERO,
            profit: Decimal::ZERO,
        }
    }

    /// Working capital: available + frozen (excludes deposit and profit).
    #[must_use]
    pub fn working(&self) -> Decimal {
        self.available + self.frozen
    }

    /// Whether this balance sheet is entirely empty.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.available.is_zero()
            && self.frozen.is_zero()
            && self.deposit.is_zero()
            && self.profit.is_zero()
    }
}

impl Default for TraderBalance {
    fn default() -> Self {
        Self::new()
    }
}

/// A trader: owns requisites, holds balances, earns fees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trader {
    pub id: TraderId,
    pub balance: TraderBalance,
    /// Fee percentage this trader earns on fulfilled deals.
    pub fee_percent: Decimal,
    pub banned: bool,
    pub traffic_enabled: bool,
}

impl Trader {
    /// Whether this trader may receive new deals at all.
    #[must_use]
    pub fn accepts_traffic(&self) -> bool {
        !self.banned && self.traffic_enabled
    }
}

/// How a merchant is notified of deal changes. Resolved once per merchant
/// and passed to the dispatcher — payload shape is not decided at
/// dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackChannel {
    /// Simple `{id, amount, status}` POST.
    Plain,
    /// Bearer-token-authenticated envelope carrying the partner deal id.
    Relay { bearer_token: String },
    /// RSA-signed payload with numeric status codes, for merchants whose
    /// deals originate from an external auction system. Status changes are
    /// pushed to `notify_url` in addition to the merchant's own callback.
    Auction {
        /// Name of the external system, part of the canonical signing string.
        external_system: String,
        /// The external system's registered RSA public key (PEM).
        public_key_pem: String,
        /// Endpoint of the external system that receives signed updates.
        notify_url: String,
    },
}

/// A merchant: originates deals and receives settlement credits. The
/// credit balance itself lives in the freeze ledger, keyed by merchant id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    pub id: MerchantId,
    /// Fee percentage retained by the platform on this merchant's deals.
    pub fee_percent: Decimal,
    pub channel: CallbackChannel,
    pub callback_url: Option<String>,
}

/// An external aggregator partner, tried in priority order when no
/// internal requisite matches. Its fee-share balance lives in the freeze
/// ledger, keyed by aggregator id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregator {
    pub id: AggregatorId,
    pub name: String,
    /// Queue position; lower values are tried first.
    pub priority: u32,
    pub base_url: String,
    pub api_token: String,
    /// Fee percentage the aggregator charges the platform.
    pub fee_percent: Decimal,
    pub active: bool,
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Trader {
    pub fn dummy(available: Decimal, deposit: Decimal) -> Self {
        Self {
            id: TraderId::new(),
            balance: TraderBalance {
                available,
                frozen: Decimal::ZERO,
                deposit,
                profit: Decimal::ZERO,
            },
            fee_percent: Decimal::new(7, 0),
            banned: false,
            traffic_enabled: true,
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Merchant {
    pub fn dummy_plain() -> Self {
        Self {
            id: MerchantId::new(),
            fee_percent: Decimal::new(9, 0),
            channel: CallbackChannel::Plain,
            callback_url: None,
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Aggregator {
    pub fn dummy(name: &str, priority: u32) -> Self {
        Self {
            id: AggregatorId::new(),
            name: name.to_string(),
            priority,
            base_url: format!("https://{name}.example.com"),
            api_token: "test-token".to_string(),
            fee_percent: Decimal::new(5, 0),
            active: true,
        }
    }
}
