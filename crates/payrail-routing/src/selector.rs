//! Requisite selection — the ordered eligibility scan.
//!
//! Selection is a read-only scan: candidates are filtered by instrument
//! flags, amount bounds, trader gates, and per-instrument limits, then
//! ordered by `updated_at` ascending (least recently used first) to spread
//! load. The winner is not locked — the caller must call
//! [`RequisitePool::validate_for_commit`] again at write time; a concurrent
//! request that won the race surfaces as `RequisiteTaken`.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use payrail_types::{
    Deal, DealStatus, MethodKind, PayrailError, Requisite, RequisiteId, Result, Trader, TraderId,
};

/// What a selection scan is looking for.
#[derive(Debug, Clone, Copy)]
pub struct SelectionQuery {
    pub method: MethodKind,
    /// Fiat amount of the deal being placed.
    pub amount: Decimal,
    /// Escrow the winning trader must be able to cover from their deposit.
    pub required_escrow: Decimal,
}

/// Per-requisite usage derived from the deal store for one scan.
#[derive(Debug, Default, Clone)]
struct RequisiteUsage {
    /// An in-flight deal with this exact amount already exists.
    amount_collision: bool,
    /// Deals counting against the operation limit (in-flight + READY).
    window_count: u32,
    /// Their total amount, counted against the sum limit.
    window_sum: Decimal,
    /// Creation time of the newest non-canceled, non-expired deal.
    last_active_at: Option<DateTime<Utc>>,
}

/// The pool of trader instruments available for matching.
#[derive(Debug, Default)]
pub struct RequisitePool {
    requisites: HashMap<RequisiteId, Requisite>,
}

impl RequisitePool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, requisite: Requisite) {
        self.requisites.insert(requisite.id, requisite);
    }

    #[must_use]
    pub fn get(&self, id: RequisiteId) -> Option<&Requisite> {
        self.requisites.get(&id)
    }

    /// Stamp an instrument as just used, pushing it to the back of the
    /// least-recently-used order.
    pub fn touch(&mut self, id: RequisiteId, now: DateTime<Utc>) -> Result<()> {
        let requisite = self
            .requisites
            .get_mut(&id)
            .ok_or(PayrailError::RequisiteNotFound(id))?;
        requisite.updated_at = now;
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requisites.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requisites.is_empty()
    }

    /// Read-only selection scan. Returns the least recently used eligible
    /// instrument, or `NoInternalRequisite` when none survives the filters.
    pub fn select<'a>(
        &self,
        query: &SelectionQuery,
        traders: &HashMap<TraderId, Trader>,
        deals: impl Iterator<Item = &'a Deal>,
        now: DateTime<Utc>,
    ) -> Result<RequisiteId> {
        let usage = Self::collect_usage(query.amount, deals);

        let mut candidates: Vec<&Requisite> = self
            .requisites
            .values()
            .filter(|r| r.method == query.method)
            .filter(|r| r.is_eligible())
            .filter(|r| r.fits_amount(query.amount))
            .filter(|r| Self::trader_admits(traders, r.trader_id, query.required_escrow))
            .collect();
        // LRU order; id breaks ties deterministically.
        candidates.sort_by_key(|r| (r.updated_at, r.id));

        for requisite in candidates {
            match Self::check_usage(requisite, query, &usage, now) {
                Ok(()) => {
                    debug!(requisite = %requisite.id, trader = %requisite.trader_id, "requisite selected");
                    return Ok(requisite.id);
                }
                Err(reason) => {
                    debug!(requisite = %requisite.id, reason, "candidate rejected");
                }
            }
        }
        Err(PayrailError::NoInternalRequisite)
    }

    /// Write-time re-validation of a previously selected instrument.
    /// Any condition that no longer holds fails the caller with
    /// `RequisiteTaken` — the losing side of a concurrent race.
    pub fn validate_for_commit<'a>(
        &self,
        id: RequisiteId,
        query: &SelectionQuery,
        traders: &HashMap<TraderId, Trader>,
        deals: impl Iterator<Item = &'a Deal>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let requisite = self
            .requisites
            .get(&id)
            .ok_or(PayrailError::RequisiteNotFound(id))?;

        if !requisite.is_eligible()
            || !requisite.fits_amount(query.amount)
            || !Self::trader_admits(traders, requisite.trader_id, query.required_escrow)
        {
            return Err(PayrailError::RequisiteTaken(id));
        }
        let usage = Self::collect_usage(query.amount, deals);
        Self::check_usage(requisite, query, &usage, now)
            .map_err(|_| PayrailError::RequisiteTaken(id))
    }

    fn trader_admits(
        traders: &HashMap<TraderId, Trader>,
        trader_id: TraderId,
        required_escrow: Decimal,
    ) -> bool {
        traders.get(&trader_id).is_some_and(|t| {
            t.accepts_traffic() && t.balance.available + t.balance.deposit >= required_escrow
        })
    }

    /// One pass over the deal store building per-requisite usage stats.
    fn collect_usage<'a>(
        amount: Decimal,
        deals: impl Iterator<Item = &'a Deal>,
    ) -> HashMap<RequisiteId, RequisiteUsage> {
        let mut usage: HashMap<RequisiteId, RequisiteUsage> = HashMap::new();
        for deal in deals {
            let Some(requisite_id) = deal.requisite_id() else {
                continue;
            };
            let entry = usage.entry(requisite_id).or_default();
            let in_flight = deal.status.holds_freeze();

            if in_flight && deal.amount == amount {
                entry.amount_collision = true;
            }
            if in_flight || deal.status == DealStatus::Ready {
                entry.window_count += 1;
                entry.window_sum += deal.amount;
            }
            if !matches!(deal.status, DealStatus::Canceled | DealStatus::Expired) {
                entry.last_active_at = Some(
                    entry
                        .last_active_at
                        .map_or(deal.created_at, |t| t.max(deal.created_at)),
                );
            }
        }
        usage
    }

    fn check_usage(
        requisite: &Requisite,
        query: &SelectionQuery,
        usage: &HashMap<RequisiteId, RequisiteUsage>,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), &'static str> {
        let Some(stats) = usage.get(&requisite.id) else {
            return Ok(());
        };
        if stats.amount_collision {
            // Two pending payments of the same amount on one instrument
            // cannot be told apart when the money lands.
            return Err("amount collision");
        }
        if stats.window_count + 1 > requisite.operation_limit {
            return Err("operation limit");
        }
        if stats.window_sum + query.amount > requisite.sum_limit {
            return Err("sum limit");
        }
        if requisite.interval_minutes > 0 {
            if let Some(last) = stats.last_active_at {
                if now - last < Duration::minutes(requisite.interval_minutes) {
                    return Err("cool-down interval");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use payrail_types::{Fulfiller, TraderBalance};

    use super::*;

    fn dec(value: i64, scale: u32) -> Decimal {
        Decimal::new(value, scale)
    }

    fn query(amount: Decimal) -> SelectionQuery {
        SelectionQuery {
            method: MethodKind::Card,
            amount,
            required_escrow: Decimal::ZERO,
        }
    }

    struct Fixture {
        pool: RequisitePool,
        traders: HashMap<TraderId, Trader>,
        deals: Vec<Deal>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                pool: RequisitePool::new(),
                traders: HashMap::new(),
                deals: Vec::new(),
            }
        }

        fn add_trader(&mut self, available: Decimal) -> TraderId {
            let trader = Trader::dummy(available, Decimal::ZERO);
            let id = trader.id;
            self.traders.insert(id, trader);
            id
        }

        fn add_requisite(&mut self, trader_id: TraderId) -> RequisiteId {
            let requisite = Requisite::dummy(trader_id, MethodKind::Card);
            let id = requisite.id;
            self.pool.insert(requisite);
            id
        }

        fn add_deal(&mut self, requisite_id: RequisiteId, trader_id: TraderId, amount: Decimal, status: DealStatus) {
            let mut deal = Deal::dummy_internal(trader_id, requisite_id, amount, amount);
            deal.status = status;
            self.deals.push(deal);
        }

        fn select(&self, q: &SelectionQuery) -> Result<RequisiteId> {
            self.pool
                .select(q, &self.traders, self.deals.iter(), Utc::now())
        }
    }

    #[test]
    fn selects_sole_eligible_requisite() {
        let mut fx = Fixture::new();
        let trader = fx.add_trader(dec(10_000, 0));
        let req = fx.add_requisite(trader);
        assert_eq!(fx.select(&query(dec(5_000, 0))).unwrap(), req);
    }

    #[test]
    fn empty_pool_yields_no_internal_requisite() {
        let fx = Fixture::new();
        let err = fx.select(&query(dec(100, 0))).unwrap_err();
        assert!(matches!(err, PayrailError::NoInternalRequisite));
    }

    #[test]
    fn method_mismatch_filtered() {
        let mut fx = Fixture::new();
        let trader = fx.add_trader(dec(10_000, 0));
        fx.pool.insert(Requisite::dummy(trader, MethodKind::Sbp));
        let err = fx.select(&query(dec(100, 0))).unwrap_err();
        assert!(matches!(err, PayrailError::NoInternalRequisite));
    }

    #[test]
    fn banned_trader_filtered() {
        let mut fx = Fixture::new();
        let trader = fx.add_trader(dec(10_000, 0));
        fx.add_requisite(trader);
        fx.traders.get_mut(&trader).unwrap().banned = true;
        assert!(fx.select(&query(dec(100, 0))).is_err());
    }

    #[test]
    fn insufficient_escrow_capacity_filtered() {
        let mut fx = Fixture::new();
        let trader = fx.add_trader(dec(50, 0));
        fx.add_requisite(trader);
        let q = SelectionQuery {
            method: MethodKind::Card,
            amount: dec(5_000, 0),
            required_escrow: dec(60, 0),
        };
        assert!(fx.select(&q).is_err());
    }

    #[test]
    fn lru_ordering_prefers_stale_requisite() {
        let mut fx = Fixture::new();
        let trader = fx.add_trader(dec(100_000, 0));
        let fresh = fx.add_requisite(trader);
        let stale = fx.add_requisite(trader);
        let now = Utc::now();
        fx.pool.touch(fresh, now).unwrap();
        fx.pool.touch(stale, now - Duration::hours(2)).unwrap();

        assert_eq!(fx.select(&query(dec(1_000, 0))).unwrap(), stale);
    }

    #[test]
    fn amount_collision_skips_requisite() {
        let mut fx = Fixture::new();
        let trader = fx.add_trader(dec(100_000, 0));
        let busy = fx.add_requisite(trader);
        let free = fx.add_requisite(trader);
        // Make `busy` the LRU favourite, then collide on amount.
        let now = Utc::now();
        fx.pool.touch(busy, now - Duration::hours(1)).unwrap();
        fx.pool.touch(free, now).unwrap();
        fx.add_deal(busy, trader, dec(5_000, 0), DealStatus::InProgress);

        assert_eq!(fx.select(&query(dec(5_000, 0))).unwrap(), free);
        // A different amount is fine on the busy one.
        assert_eq!(fx.select(&query(dec(5_001, 0))).unwrap(), busy);
    }

    #[test]
    fn canceled_deal_frees_the_amount() {
        let mut fx = Fixture::new();
        let trader = fx.add_trader(dec(100_000, 0));
        let req = fx.add_requisite(trader);
        fx.add_deal(req, trader, dec(5_000, 0), DealStatus::Canceled);
        assert_eq!(fx.select(&query(dec(5_000, 0))).unwrap(), req);
    }

    #[test]
    fn operation_limit_enforced() {
        let mut fx = Fixture::new();
        let trader = fx.add_trader(dec(1_000_000, 0));
        let req = fx.add_requisite(trader);
        // dummy() sets operation_limit = 10; fill the window.
        for i in 0..10 {
            fx.add_deal(req, trader, dec(1_000 + i, 0), DealStatus::Ready);
        }
        let err = fx.select(&query(dec(7_777, 0))).unwrap_err();
        assert!(matches!(err, PayrailError::NoInternalRequisite));
    }

    #[test]
    fn sum_limit_enforced() {
        let mut fx = Fixture::new();
        let trader = fx.add_trader(dec(1_000_000, 0));
        let req = fx.add_requisite(trader);
        // dummy() sets sum_limit = 500_000.
        fx.add_deal(req, trader, dec(499_000, 0), DealStatus::Ready);
        assert!(fx.select(&query(dec(2_000, 0))).is_err());
        assert!(fx.select(&query(dec(1_000, 0))).is_ok());
    }

    #[test]
    fn cool_down_interval_enforced() {
        let mut fx = Fixture::new();
        let trader = fx.add_trader(dec(1_000_000, 0));
        let req = fx.add_requisite(trader);
        let mut requisite = fx.pool.get(req).unwrap().clone();
        requisite.interval_minutes = 15;
        fx.pool.insert(requisite);
        fx.add_deal(req, trader, dec(1_000, 0), DealStatus::Ready);

        assert!(fx.select(&query(dec(2_000, 0))).is_err());
        // After the interval has elapsed the instrument is usable again.
        let later = Utc::now() + Duration::minutes(16);
        assert!(
            fx.pool
                .select(&query(dec(2_000, 0)), &fx.traders, fx.deals.iter(), later)
                .is_ok()
        );
    }

    #[test]
    fn canceled_deal_does_not_arm_cool_down() {
        let mut fx = Fixture::new();
        let trader = fx.add_trader(dec(1_000_000, 0));
        let req = fx.add_requisite(trader);
        let mut requisite = fx.pool.get(req).unwrap().clone();
        requisite.interval_minutes = 15;
        fx.pool.insert(requisite);
        fx.add_deal(req, trader, dec(1_000, 0), DealStatus::Canceled);

        assert!(fx.select(&query(dec(2_000, 0))).is_ok());
    }

    #[test]
    fn commit_validation_catches_concurrent_winner() {
        let mut fx = Fixture::new();
        let trader = fx.add_trader(dec(100_000, 0));
        let req = fx.add_requisite(trader);
        let q = query(dec(5_000, 0));
        let now = Utc::now();

        // Both requests select the same instrument.
        let a = fx.select(&q).unwrap();
        let b = fx.select(&q).unwrap();
        assert_eq!(a, b);

        // First commit wins and its deal lands in the store.
        fx.pool
            .validate_for_commit(a, &q, &fx.traders, fx.deals.iter(), now)
            .unwrap();
        fx.add_deal(a, trader, dec(5_000, 0), DealStatus::Created);

        // Second commit now sees the collision.
        let err = fx
            .pool
            .validate_for_commit(b, &q, &fx.traders, fx.deals.iter(), now)
            .unwrap_err();
        assert!(matches!(err, PayrailError::RequisiteTaken(id) if id == b));
    }

    #[test]
    fn unknown_trader_never_selected() {
        let mut fx = Fixture::new();
        // A requisite whose trader was never registered.
        fx.pool
            .insert(Requisite::dummy(TraderId::new(), MethodKind::Card));
        assert!(fx.select(&query(dec(1_000, 0))).is_err());
    }

    #[test]
    fn aggregator_deals_ignored_in_usage() {
        let mut fx = Fixture::new();
        let trader = fx.add_trader(dec(100_000, 0));
        let req = fx.add_requisite(trader);
        let mut deal = Deal::dummy_internal(trader, req, dec(5_000, 0), dec(5_000, 0));
        deal.fulfiller = Fulfiller::Aggregator {
            aggregator_id: payrail_types::AggregatorId::new(),
            external_order_id: "ext-9".to_string(),
        };
        fx.deals.push(deal);
        // Same amount, but the in-flight deal is external.
        assert_eq!(fx.select(&query(dec(5_000, 0))).unwrap(), req);
    }

    #[test]
    fn trader_deposit_counts_toward_escrow_capacity() {
        let mut fx = Fixture::new();
        let trader_id = {
            let trader = Trader {
                balance: TraderBalance {
                    available: dec(30, 0),
                    frozen: Decimal::ZERO,
                    deposit: dec(40, 0),
                    profit: Decimal::ZERO,
                },
                ..Trader::dummy(Decimal::ZERO, Decimal::ZERO)
            };
            let id = trader.id;
            fx.traders.insert(id, trader);
            id
        };
        fx.add_requisite(trader_id);
        let q = SelectionQuery {
            method: MethodKind::Card,
            amount: dec(5_000, 0),
            required_escrow: dec(60, 0),
        };
        assert!(fx.select(&q).is_ok());
    }
}
