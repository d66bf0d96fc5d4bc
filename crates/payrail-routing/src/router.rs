//! Deal intake — validation, rate resolution, matching, and escrow.
//!
//! The router owns the deal store and the freeze ledger. A deal is created
//! exactly once: internal match first, aggregator failover second. All
//! financial figures (rates, frozen amount, commissions, profit splits)
//! are stamped on the deal at creation and never recomputed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::info;

use payrail_types::{
    Aggregator, AggregatorId, AuctionWindow, Deal, DealDirection, DealId, DealStatus, EngineConfig,
    Fulfiller, IntegrationLog, Merchant, MerchantId, MethodKind, PayrailError, RateSourceConfig,
    Requisite, Result, Trader, TraderId,
    money::{round_escrow, round_release},
};

use crate::failover::{
    AggregatorApi, FailoverQueue, PartnerDealRequest, aggregator_profit_split,
};
use crate::ledger::FreezeLedger;
use crate::rate::{RateResolver, RateSource};
use crate::selector::{RequisitePool, SelectionQuery};

/// A merchant's request to place a deal.
#[derive(Debug, Clone)]
pub struct DealRequest {
    pub merchant_id: MerchantId,
    pub direction: DealDirection,
    pub amount: Decimal,
    pub currency: String,
    pub method: MethodKind,
    pub merchant_order_id: Option<String>,
    pub callback_url: Option<String>,
    /// Overrides the configured deal TTL when set.
    pub ttl_minutes: Option<i64>,
    /// Present for deals initiated through the auction adapter.
    pub auction: Option<AuctionWindow>,
}

/// The routing core: deal store, requisite pool, rate resolver, and
/// freeze ledger under one roof.
pub struct DealRouter {
    config: EngineConfig,
    deals: HashMap<DealId, Deal>,
    pool: RequisitePool,
    traders: HashMap<TraderId, Trader>,
    merchants: HashMap<MerchantId, Merchant>,
    resolver: RateResolver,
    ledger: FreezeLedger,
}

impl DealRouter {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let resolver = RateResolver::new(config.rate_floor);
        Self {
            config,
            deals: HashMap::new(),
            pool: RequisitePool::new(),
            traders: HashMap::new(),
            merchants: HashMap::new(),
            resolver,
            ledger: FreezeLedger::new(),
        }
    }

    /// Register a trader; their balance sheet opens the ledger account.
    pub fn register_trader(&mut self, trader: Trader) {
        self.ledger.open_trader(trader.id, trader.balance.clone());
        self.traders.insert(trader.id, trader);
    }

    pub fn register_merchant(&mut self, merchant: Merchant) {
        self.merchants.insert(merchant.id, merchant);
    }

    pub fn register_rate_config(&mut self, config: RateSourceConfig) {
        self.resolver.register(config);
    }

    pub fn add_requisite(&mut self, requisite: Requisite) {
        self.pool.insert(requisite);
    }

    /// Create a deal through the internal matching path only.
    /// `NoInternalRequisite` means the caller should fail over.
    pub fn create_deal(&mut self, request: &DealRequest, source: &dyn RateSource) -> Result<DealId> {
        self.validate(request)?;
        self.sync_trader_balances();
        let now = Utc::now();

        let merchant = self
            .merchants
            .get(&request.merchant_id)
            .ok_or(PayrailError::MerchantNotFound(request.merchant_id))?
            .clone();
        let merchant_rate = self
            .resolver
            .resolve_for_merchant(source, merchant.id);

        // Escrow estimate for the capacity filter; the real figure is
        // computed from the winning trader's own rate below.
        let escrow_estimate = round_escrow(
            request.amount / merchant_rate.adjusted,
            self.config.minor_unit_dp,
        );
        let query = SelectionQuery {
            method: request.method,
            amount: request.amount,
            required_escrow: escrow_estimate,
        };

        let requisite_id = self
            .pool
            .select(&query, &self.traders, self.deals.values(), now)?;
        let requisite = self
            .pool
            .get(requisite_id)
            .ok_or(PayrailError::RequisiteNotFound(requisite_id))?
            .clone();
        let trader_id = requisite.trader_id;
        let trader_fee = self
            .traders
            .get(&trader_id)
            .ok_or(PayrailError::TraderNotFound(trader_id))?
            .fee_percent;

        let trader_rate = self.resolver.resolve_for_trader(source, trader_id);

        // Optimistic write-time re-check, then the freeze. Either both
        // happen or the deal does not exist.
        self.pool
            .validate_for_commit(requisite_id, &query, &self.traders, self.deals.values(), now)?;
        let frozen = self.ledger.reserve(
            trader_id,
            request.amount / trader_rate.adjusted,
            self.config.minor_unit_dp,
        )?;

        let dp = self.config.minor_unit_dp;
        let hundred = Decimal::new(100, 0);
        let commission = round_release(frozen * trader_fee / hundred, dp);
        let merchant_fee_crypto = round_release(
            request.amount * merchant.fee_percent / hundred / merchant_rate.adjusted,
            dp,
        );
        let merchant_profit = round_release(
            (request.amount - request.amount * merchant.fee_percent / hundred)
                / merchant_rate.adjusted,
            dp,
        );

        let deal_id = DealId::new();
        let deal = Deal {
            id: deal_id,
            merchant_id: merchant.id,
            direction: request.direction,
            amount: request.amount,
            currency: request.currency.clone(),
            method: request.method,
            status: DealStatus::Created,
            rate: trader_rate.base,
            merchant_rate: merchant_rate.adjusted,
            adjusted_rate: trader_rate.adjusted,
            kkk_percent: trader_rate.kkk.percent,
            kkk_operation: trader_rate.kkk.operation,
            frozen_amount: frozen,
            fee_percent: trader_fee,
            calculated_commission: commission,
            trader_profit: Decimal::ZERO,
            merchant_profit,
            aggregator_profit: Decimal::ZERO,
            platform_profit: merchant_fee_crypto - commission,
            fulfiller: Fulfiller::Internal {
                requisite_id,
                trader_id,
            },
            merchant_order_id: request.merchant_order_id.clone(),
            callback_url: request.callback_url.clone(),
            display_requisite: Some(requisite.display.clone()),
            auction: request.auction,
            created_at: now,
            accepted_at: None,
            expires_at: self.expiry_for(request, now),
        };

        self.pool.touch(requisite_id, now)?;
        self.sync_trader_balances();
        info!(deal = %deal_id, requisite = %requisite_id, trader = %trader_id, %frozen, "deal created internally");
        self.deals.insert(deal_id, deal);
        Ok(deal_id)
    }

    /// Create a deal, falling over to the aggregator queue when no
    /// internal requisite matches. Exhausting both paths is `NoRequisite`.
    pub async fn create_deal_with_failover(
        &mut self,
        request: &DealRequest,
        source: &dyn RateSource,
        partners: &[(Aggregator, Arc<dyn AggregatorApi>)],
        queue: &FailoverQueue,
        log: &mut IntegrationLog,
    ) -> Result<DealId> {
        match self.create_deal(request, source) {
            Ok(deal_id) => Ok(deal_id),
            Err(PayrailError::NoInternalRequisite) => {
                self.create_via_aggregator(request, source, partners, queue, log)
                    .await
            }
            Err(err) => Err(err),
        }
    }

    async fn create_via_aggregator(
        &mut self,
        request: &DealRequest,
        source: &dyn RateSource,
        partners: &[(Aggregator, Arc<dyn AggregatorApi>)],
        queue: &FailoverQueue,
        log: &mut IntegrationLog,
    ) -> Result<DealId> {
        let merchant = self
            .merchants
            .get(&request.merchant_id)
            .ok_or(PayrailError::MerchantNotFound(request.merchant_id))?
            .clone();

        let deal_id = DealId::new();
        let partner_request = PartnerDealRequest {
            deal_id,
            amount: request.amount,
            currency: request.currency.clone(),
            method: request.method,
            merchant_order_id: request.merchant_order_id.clone(),
            callback_url: request.callback_url.clone(),
        };
        let win = queue.try_create(partners, &partner_request, log).await?;

        let aggregator_fee = partners
            .iter()
            .find(|(a, _)| a.id == win.aggregator_id)
            .map(|(a, _)| a.fee_percent)
            .unwrap_or_default();
        let rate = self
            .resolver
            .resolve_for_aggregator(source, win.aggregator_id);
        let split = aggregator_profit_split(
            request.amount,
            merchant.fee_percent,
            aggregator_fee,
            rate.adjusted,
            self.config.minor_unit_dp,
        );

        let now = Utc::now();
        let deal = Deal {
            id: deal_id,
            merchant_id: merchant.id,
            direction: request.direction,
            amount: request.amount,
            currency: request.currency.clone(),
            method: request.method,
            status: DealStatus::Created,
            rate: rate.base,
            merchant_rate: rate.adjusted,
            adjusted_rate: rate.adjusted,
            kkk_percent: rate.kkk.percent,
            kkk_operation: rate.kkk.operation,
            frozen_amount: Decimal::ZERO,
            fee_percent: aggregator_fee,
            calculated_commission: Decimal::ZERO,
            trader_profit: Decimal::ZERO,
            merchant_profit: split.merchant_profit,
            aggregator_profit: split.aggregator_profit,
            platform_profit: split.platform_profit,
            fulfiller: Fulfiller::Aggregator {
                aggregator_id: win.aggregator_id,
                external_order_id: win.external_order_id,
            },
            merchant_order_id: request.merchant_order_id.clone(),
            callback_url: request.callback_url.clone(),
            display_requisite: win.payment_instructions,
            auction: request.auction,
            created_at: now,
            accepted_at: None,
            expires_at: self.expiry_for(request, now),
        };
        info!(deal = %deal_id, aggregator = %win.aggregator_id, "deal created via aggregator");
        self.deals.insert(deal_id, deal);
        Ok(deal_id)
    }

    fn validate(&self, request: &DealRequest) -> Result<()> {
        if request.amount <= Decimal::ZERO {
            return Err(PayrailError::InvalidAmount {
                amount: request.amount,
            });
        }
        if request.currency.is_empty() {
            return Err(PayrailError::InvalidDeal {
                reason: "currency must not be empty".to_string(),
            });
        }
        Ok(())
    }

    fn expiry_for(&self, request: &DealRequest, now: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(window) = request.auction {
            return window.cancel_order_time;
        }
        let ttl = request.ttl_minutes.unwrap_or(self.config.deal_ttl_minutes);
        now + Duration::minutes(ttl)
    }

    /// Mirror ledger balances into the trader records the selector reads.
    fn sync_trader_balances(&mut self) {
        for (id, trader) in &mut self.traders {
            trader.balance = self.ledger.trader_balance(*id);
        }
    }

    #[must_use]
    pub fn deal(&self, id: DealId) -> Option<&Deal> {
        self.deals.get(&id)
    }

    #[must_use]
    pub fn deals(&self) -> &HashMap<DealId, Deal> {
        &self.deals
    }

    #[must_use]
    pub fn merchant(&self, id: MerchantId) -> Option<&Merchant> {
        self.merchants.get(&id)
    }

    #[must_use]
    pub fn ledger(&self) -> &FreezeLedger {
        &self.ledger
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Split borrow for the settlement path: one deal plus the ledger.
    pub fn deal_and_ledger_mut(&mut self, id: DealId) -> Result<(&mut Deal, &mut FreezeLedger)> {
        let deal = self
            .deals
            .get_mut(&id)
            .ok_or(PayrailError::DealNotFound(id))?;
        Ok((deal, &mut self.ledger))
    }

    /// The aggregator fulfilling a deal, if externally matched.
    #[must_use]
    pub fn deal_aggregator(&self, id: DealId) -> Option<AggregatorId> {
        match self.deals.get(&id).map(|d| &d.fulfiller) {
            Some(Fulfiller::Aggregator { aggregator_id, .. }) => Some(*aggregator_id),
            _ => None,
        }
    }
}
