//! Exchange-rate configuration and the KKK correction model.
//!
//! A base rate comes from a pluggable source; a configurable percentage
//! correction ("KKK") is applied on top. Overrides resolve most-specific
//! first: subject-specific override, then the source-level default.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AggregatorId, MerchantId, TraderId};

/// Direction of the KKK correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KkkOperation {
    Plus,
    Minus,
}

impl std::fmt::Display for KkkOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plus => write!(f, "PLUS"),
            Self::Minus => write!(f, "MINUS"),
        }
    }
}

/// A percentage correction applied to a base rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KkkCorrection {
    pub percent: Decimal,
    pub operation: KkkOperation,
}

impl KkkCorrection {
    #[must_use]
    pub fn new(percent: Decimal, operation: KkkOperation) -> Self {
        Self { percent, operation }
    }

    /// A zero correction: adjusted rate equals the base rate.
    #[must_use]
    pub fn none() -> Self {
        Self {
            percent: Decimal::ZERO,
            operation: KkkOperation::Plus,
        }
    }

    /// `base x (1 ± percent/100)`, sign per the operation.
    #[must_use]
    pub fn apply(&self, base: Decimal) -> Decimal {
        let factor = self.percent / Decimal::new(100, 0);
        match self.operation {
            KkkOperation::Plus => base * (Decimal::ONE + factor),
            KkkOperation::Minus => base * (Decimal::ONE - factor),
        }
    }
}

/// Configuration for one rate source: its default correction and the
/// per-subject overrides. Most specific wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateSourceConfig {
    pub source_id: String,
    pub default_kkk: KkkCorrection,
    pub trader_overrides: HashMap<TraderId, KkkCorrection>,
    pub merchant_overrides: HashMap<MerchantId, KkkCorrection>,
    pub aggregator_overrides: HashMap<AggregatorId, KkkCorrection>,
}

impl RateSourceConfig {
    #[must_use]
    pub fn new(source_id: impl Into<String>, default_kkk: KkkCorrection) -> Self {
        Self {
            source_id: source_id.into(),
            default_kkk,
            trader_overrides: HashMap::new(),
            merchant_overrides: HashMap::new(),
            aggregator_overrides: HashMap::new(),
        }
    }

    #[must_use]
    pub fn kkk_for_trader(&self, trader_id: TraderId) -> KkkCorrection {
        self.trader_overrides
            .get(&trader_id)
            .copied()
            .unwrap_or(self.default_kkk)
    }

    #[must_use]
    pub fn kkk_for_merchant(&self, merchant_id: MerchantId) -> KkkCorrection {
        self.merchant_overrides
            .get(&merchant_id)
            .copied()
            .unwrap_or(self.default_kkk)
    }

    #[must_use]
    pub fn kkk_for_aggregator(&self, aggregator_id: AggregatorId) -> KkkCorrection {
        self.aggregator_overrides
            .get(&aggregator_id)
            .copied()
            .unwrap_or(self.default_kkk)
    }
}

/// Where a resolved rate ultimately came from. Anything but `Live` is a
/// degradation and has been logged by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateOrigin {
    /// Fetched from the live source.
    Live,
    /// The live source failed; the last persisted good rate was used.
    LastGood,
    /// No good rate at all; the configured hard floor was used.
    Floor,
}

/// A fully resolved rate: base, correction, and adjusted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRate {
    pub base: Decimal,
    pub adjusted: Decimal,
    pub kkk: KkkCorrection,
    pub origin: RateOrigin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kkk_plus_increases() {
        let kkk = KkkCorrection::new(Decimal::new(5, 0), KkkOperation::Plus);
        let adjusted = kkk.apply(Decimal::new(100, 0));
        assert_eq!(adjusted, Decimal::new(105, 0));
    }

    #[test]
    fn kkk_minus_decreases() {
        let kkk = KkkCorrection::new(Decimal::new(5, 0), KkkOperation::Minus);
        let adjusted = kkk.apply(Decimal::new(100, 0));
        assert_eq!(adjusted, Decimal::new(95, 0));
    }

    #[test]
    fn kkk_none_is_identity() {
        let base = Decimal::new(9_655, 2);
        assert_eq!(KkkCorrection::none().apply(base), base);
    }

    #[test]
    fn kkk_monotonic_in_percent() {
        let base = Decimal::new(96, 0);
        let mut prev = Decimal::ZERO;
        for p in 1..=10 {
            let adjusted =
                KkkCorrection::new(Decimal::new(p, 0), KkkOperation::Plus).apply(base);
            assert!(adjusted > prev, "adjusted rate must grow with percent");
            prev = adjusted;
        }
    }

    #[test]
    fn override_chain_most_specific_wins() {
        let trader = TraderId::new();
        let other = TraderId::new();
        let mut config = RateSourceConfig::new(
            "garantex",
            KkkCorrection::new(Decimal::new(2, 0), KkkOperation::Plus),
        );
        config.trader_overrides.insert(
            trader,
            KkkCorrection::new(Decimal::new(8, 0), KkkOperation::Minus),
        );

        let specific = config.kkk_for_trader(trader);
        assert_eq!(specific.percent, Decimal::new(8, 0));
        assert_eq!(specific.operation, KkkOperation::Minus);

        let fallback = config.kkk_for_trader(other);
        assert_eq!(fallback.percent, Decimal::new(2, 0));
    }

    #[test]
    fn merchant_and_aggregator_overrides_independent() {
        let merchant = MerchantId::new();
        let mut config = RateSourceConfig::new("bybit", KkkCorrection::none());
        config.merchant_overrides.insert(
            merchant,
            KkkCorrection::new(Decimal::new(3, 0), KkkOperation::Plus),
        );

        assert_eq!(
            config.kkk_for_merchant(merchant).percent,
            Decimal::new(3, 0)
        );
        assert_eq!(
            config.kkk_for_aggregator(AggregatorId::new()).percent,
            Decimal::ZERO
        );
    }

    #[test]
    fn resolved_rate_serde_roundtrip() {
        let rate = ResolvedRate {
            base: Decimal::new(96, 0),
            adjusted: Decimal::new(9_648, 2),
            kkk: KkkCorrection::new(Decimal::new(5, 1), KkkOperation::Plus),
            origin: RateOrigin::Live,
        };
        let json = serde_json::to_string(&rate).unwrap();
        let back: ResolvedRate = serde_json::from_str(&json).unwrap();
        assert_eq!(rate, back);
    }
}
