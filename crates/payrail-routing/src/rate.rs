//! Rate resolution with graceful degradation.
//!
//! A base rate is fetched from a pluggable source, then the KKK correction
//! configured for the subject (trader, merchant, or aggregator) is applied.
//! When the live source fails, the resolver falls back to the last good
//! rate it has seen for that source, and finally to the configured hard
//! floor. Every degradation step is logged; the resolver never returns a
//! zero or negative rate.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::warn;

use payrail_types::{
    AggregatorId, KkkCorrection, MerchantId, RateOrigin, RateSourceConfig, ResolvedRate, Result,
    TraderId,
};

/// A pluggable source of base exchange rates.
pub trait RateSource {
    /// Stable identifier used for config lookup and last-good caching.
    fn source_id(&self) -> &str;

    /// Fetch the current base rate. May fail or return garbage; the
    /// resolver guards against both.
    fn fetch_base_rate(&self) -> Result<Decimal>;
}

/// Resolves adjusted rates for deal creation.
#[derive(Debug, Default)]
pub struct RateResolver {
    configs: HashMap<String, RateSourceConfig>,
    last_good: HashMap<String, Decimal>,
    floor: Decimal,
}

impl RateResolver {
    #[must_use]
    pub fn new(floor: Decimal) -> Self {
        Self {
            configs: HashMap::new(),
            last_good: HashMap::new(),
            floor,
        }
    }

    /// Register (or replace) the KKK configuration for one source.
    pub fn register(&mut self, config: RateSourceConfig) {
        self.configs.insert(config.source_id.clone(), config);
    }

    /// Resolve the rate a trader settles at.
    pub fn resolve_for_trader(
        &mut self,
        source: &dyn RateSource,
        trader_id: TraderId,
    ) -> ResolvedRate {
        let kkk = self
            .configs
            .get(source.source_id())
            .map_or_else(KkkCorrection::none, |c| c.kkk_for_trader(trader_id));
        self.resolve_with(source, kkk)
    }

    /// Resolve the rate a merchant settles at.
    pub fn resolve_for_merchant(
        &mut self,
        source: &dyn RateSource,
        merchant_id: MerchantId,
    ) -> ResolvedRate {
        let kkk = self
            .configs
            .get(source.source_id())
            .map_or_else(KkkCorrection::none, |c| c.kkk_for_merchant(merchant_id));
        self.resolve_with(source, kkk)
    }

    /// Resolve the rate an aggregator settles at.
    pub fn resolve_for_aggregator(
        &mut self,
        source: &dyn RateSource,
        aggregator_id: AggregatorId,
    ) -> ResolvedRate {
        let kkk = self
            .configs
            .get(source.source_id())
            .map_or_else(KkkCorrection::none, |c| c.kkk_for_aggregator(aggregator_id));
        self.resolve_with(source, kkk)
    }

    fn resolve_with(&mut self, source: &dyn RateSource, kkk: KkkCorrection) -> ResolvedRate {
        let (base, origin) = self.base_rate(source);
        let adjusted = kkk.apply(base);
        if adjusted <= Decimal::ZERO {
            // A correction of -100% or worse would zero the rate; deals
            // must never divide by it.
            warn!(
                source = source.source_id(),
                %base,
                kkk_percent = %kkk.percent,
                "adjusted rate non-positive, clamping to floor"
            );
            return ResolvedRate {
                base,
                adjusted: self.floor,
                kkk,
                origin: RateOrigin::Floor,
            };
        }
        ResolvedRate {
            base,
            adjusted,
            kkk,
            origin,
        }
    }

    /// Fetch the base rate with the live -> last-good -> floor chain.
    fn base_rate(&mut self, source: &dyn RateSource) -> (Decimal, RateOrigin) {
        match source.fetch_base_rate() {
            Ok(rate) if rate > Decimal::ZERO => {
                self.last_good.insert(source.source_id().to_string(), rate);
                (rate, RateOrigin::Live)
            }
            Ok(rate) => {
                warn!(
                    source = source.source_id(),
                    %rate,
                    "source returned non-positive rate, falling back"
                );
                self.fallback(source.source_id())
            }
            Err(err) => {
                warn!(
                    source = source.source_id(),
                    %err,
                    "rate source failed, falling back"
                );
                self.fallback(source.source_id())
            }
        }
    }

    fn fallback(&self, source_id: &str) -> (Decimal, RateOrigin) {
        if let Some(rate) = self.last_good.get(source_id) {
            (*rate, RateOrigin::LastGood)
        } else {
            warn!(source = source_id, floor = %self.floor, "no last good rate, using floor");
            (self.floor, RateOrigin::Floor)
        }
    }

    /// The last good rate cached for a source, if any.
    #[must_use]
    pub fn last_good(&self, source_id: &str) -> Option<Decimal> {
        self.last_good.get(source_id).copied()
    }
}
