//! Requisite model — a trader-owned payment instrument.
//!
//! Requisites carry their own per-instrument limits; the selector applies
//! them together with the owning trader's gates (banned/traffic) and the
//! linked device state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{RequisiteId, TraderId};

/// Payment method type of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodKind {
    /// Card-to-card transfer.
    Card,
    /// Fast payment system transfer by phone number.
    Sbp,
    /// Bank account transfer.
    Account,
}

impl std::fmt::Display for MethodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Card => write!(f, "CARD"),
            Self::Sbp => write!(f, "SBP"),
            Self::Account => write!(f, "ACCOUNT"),
        }
    }
}

/// State of the device an instrument is linked to. An instrument with a
/// linked device is only eligible while the device is online and working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLink {
    pub online: bool,
    pub working: bool,
}

impl DeviceLink {
    #[must_use]
    pub fn is_operational(self) -> bool {
        self.online && self.working
    }
}

/// A trader-owned payment instrument with its limits and flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requisite {
    pub id: RequisiteId,
    pub trader_id: TraderId,
    pub method: MethodKind,
    /// Masked instrument string shown to the payer (card number, phone).
    pub display: String,
    /// Smallest deal amount this instrument accepts.
    pub min_amount: Decimal,
    /// Largest deal amount this instrument accepts.
    pub max_amount: Decimal,
    /// Maximum number of in-flight + settled-READY deals in the rolling
    /// window before the instrument stops taking traffic.
    pub operation_limit: u32,
    /// Maximum total amount across those same deals.
    pub sum_limit: Decimal,
    /// Cool-down between consecutive deals on this instrument.
    pub interval_minutes: i64,
    pub active: bool,
    pub archived: bool,
    pub device: Option<DeviceLink>,
    /// Last time the instrument was touched. The selector orders the
    /// candidate pool by this field ascending to spread load.
    pub updated_at: DateTime<Utc>,
}

impl Requisite {
    /// Whether `amount` is inside this instrument's bounds.
    #[must_use]
    pub fn fits_amount(&self, amount: Decimal) -> bool {
        amount >= self.min_amount && amount <= self.max_amount
    }

    /// Whether the linked device (if any) allows traffic.
    #[must_use]
    pub fn device_operational(&self) -> bool {
        self.device.is_none_or(DeviceLink::is_operational)
    }

    /// Whether the instrument itself is eligible at all (flags + device).
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.active && !self.archived && self.device_operational()
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Requisite {
    pub fn dummy(trader_id: TraderId, method: MethodKind) -> Self {
        Self {
            id: RequisiteId::new(),
            trader_id,
            method,
            display: "2200 70** **** 0001".to_string(),
            min_amount: Decimal::new(100, 0),
            max_amount: Decimal::new(100_000, 0),
            operation_limit: 10,
            sum_limit: Decimal::new(500_000, 0),
            interval_minutes: 0,
            active: true,
            archived: false,
            device: None,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_display() {
        assert_eq!(format!("{}", MethodKind::Card), "CARD");
        assert_eq!(format!("{}", MethodKind::Sbp), "SBP");
    }

    #[test]
    fn amount_bounds() {
        let req = Requisite::dummy(TraderId::new(), MethodKind::Card);
        assert!(req.fits_amount(Decimal::new(100, 0)));
        assert!(req.fits_amount(Decimal::new(100_000, 0)));
        assert!(!req.fits_amount(Decimal::new(99, 0)));
        assert!(!req.fits_amount(Decimal::new(100_001, 0)));
    }

    #[test]
    fn no_device_is_operational() {
        let req = Requisite::dummy(TraderId::new(), MethodKind::Card);
        assert!(req.device_operational());
        assert!(req.is_eligible());
    }

    #[test]
    fn offline_device_blocks_eligibility() {
        let mut req = Requisite::dummy(TraderId::new(), MethodKind::Card);
        req.device = Some(DeviceLink {
            online: false,
            working: true,
        });
        assert!(!req.device_operational());
        assert!(!req.is_eligible());
    }

    #[test]
    fn archived_blocks_eligibility() {
        let mut req = Requisite::dummy(TraderId::new(), MethodKind::Card);
        req.archived = true;
        assert!(!req.is_eligible());
    }

    #[test]
    fn serde_roundtrip() {
        let req = Requisite::dummy(TraderId::new(), MethodKind::Sbp);
        let json = serde_json::to_string(&req).unwrap();
        let back: Requisite = serde_json::from_str(&json).unwrap();
        assert_eq!(req.id, back.id);
        assert_eq!(req.method, back.method);
        assert_eq!(req.sum_limit, back.sum_limit);
    }
}
