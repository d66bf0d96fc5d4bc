//! Aggregator failover — the external fulfillment path.
//!
//! When no internal requisite matches, active aggregator partners are
//! tried strictly one at a time in ascending priority order. Every attempt
//! is appended to the integration log with raw payloads, whatever its
//! outcome. A failed or timed-out partner never aborts the queue; only
//! exhausting it does.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use payrail_types::{
    Aggregator, AggregatorId, DealId, IntegrationLog, IntegrationLogEntry, MethodKind,
    PayrailError, Result,
    money::round_release,
};

/// Outbound deal offer sent to an aggregator partner.
#[derive(Debug, Clone, Serialize)]
pub struct PartnerDealRequest {
    pub deal_id: DealId,
    pub amount: Decimal,
    pub currency: String,
    pub method: MethodKind,
    pub merchant_order_id: Option<String>,
    pub callback_url: Option<String>,
}

/// Parsed body of a partner's create-deal response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartnerDealResponse {
    pub accepted: bool,
    pub external_order_id: Option<String>,
    /// Payment instructions for the payer, stored on the deal verbatim.
    pub payment_instructions: Option<String>,
}

/// A partner's answer: HTTP status plus parsed body. Transport failures
/// surface as errors instead.
#[derive(Debug, Clone)]
pub struct PartnerReply {
    pub status: u16,
    pub body: PartnerDealResponse,
    /// Raw response body for the integration log.
    pub raw_body: String,
}

/// Client-side view of one aggregator's API.
#[async_trait]
pub trait AggregatorApi: Send + Sync {
    /// Offer a deal to the partner.
    async fn create_deal(&self, request: &PartnerDealRequest) -> Result<PartnerReply>;

    /// Ask the partner to cancel a previously accepted deal.
    async fn cancel_deal(&self, deal_id: DealId, external_order_id: &str) -> Result<PartnerReply>;

    /// Escalate a previously accepted deal into dispute on the partner side.
    async fn dispute_deal(&self, deal_id: DealId, external_order_id: &str) -> Result<PartnerReply>;
}

/// A partner that accepted a deal.
#[derive(Debug, Clone)]
pub struct FailoverWin {
    pub aggregator_id: AggregatorId,
    pub external_order_id: String,
    pub payment_instructions: Option<String>,
}

/// Sequential failover over the configured partners.
#[derive(Debug, Clone)]
pub struct FailoverQueue {
    timeout: Duration,
}

impl FailoverQueue {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Try each active partner in priority order until one accepts.
    /// Returns `NoRequisite` once the queue is exhausted.
    pub async fn try_create(
        &self,
        partners: &[(Aggregator, Arc<dyn AggregatorApi>)],
        request: &PartnerDealRequest,
        log: &mut IntegrationLog,
    ) -> Result<FailoverWin> {
        let mut order: Vec<usize> = (0..partners.len())
            .filter(|&i| partners[i].0.active)
            .collect();
        order.sort_by_key(|&i| partners[i].0.priority);

        let request_body = serde_json::to_string(request)?;

        for index in order {
            let (aggregator, api) = &partners[index];
            let started = std::time::Instant::now();
            let outcome = tokio::time::timeout(self.timeout, api.create_deal(request)).await;
            let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let mut entry = IntegrationLogEntry {
                id: Uuid::now_v7(),
                aggregator_id: aggregator.id,
                deal_id: Some(request.deal_id),
                endpoint: "/api/deals".to_string(),
                request_body: request_body.clone(),
                response_body: None,
                status_code: None,
                error: None,
                latency_ms,
                created_at: Utc::now(),
            };

            match outcome {
                Ok(Ok(reply)) => {
                    entry.status_code = Some(reply.status);
                    entry.response_body = Some(reply.raw_body.clone());
                    let accepted = (200..300).contains(&reply.status) && reply.body.accepted;
                    match reply.body.external_order_id {
                        Some(external_order_id) if accepted => {
                            log.append(entry);
                            info!(
                                aggregator = %aggregator.id,
                                deal = %request.deal_id,
                                %external_order_id,
                                "aggregator accepted deal"
                            );
                            return Ok(FailoverWin {
                                aggregator_id: aggregator.id,
                                external_order_id,
                                payment_instructions: reply.body.payment_instructions,
                            });
                        }
                        Some(_) | None => {
                            if accepted {
                                entry.error = Some("accepted without external_order_id".to_string());
                            }
                            warn!(
                                aggregator = %aggregator.id,
                                deal = %request.deal_id,
                                status = reply.status,
                                "aggregator declined deal"
                            );
                            log.append(entry);
                        }
                    }
                }
                Ok(Err(err)) => {
                    entry.error = Some(err.to_string());
                    warn!(
                        aggregator = %aggregator.id,
                        deal = %request.deal_id,
                        %err,
                        "aggregator transport failure"
                    );
                    log.append(entry);
                }
                Err(_) => {
                    entry.error = Some(format!("timeout after {:?}", self.timeout));
                    warn!(
                        aggregator = %aggregator.id,
                        deal = %request.deal_id,
                        timeout = ?self.timeout,
                        "aggregator timed out"
                    );
                    log.append(entry);
                }
            }
        }
        Err(PayrailError::NoRequisite)
    }

    /// Tell the fulfilling partner to cancel an accepted deal. Audited
    /// like a creation attempt; failures surface to the caller.
    pub async fn notify_cancel(
        &self,
        aggregator: &Aggregator,
        api: &dyn AggregatorApi,
        deal_id: DealId,
        external_order_id: &str,
        log: &mut IntegrationLog,
    ) -> Result<()> {
        let started = std::time::Instant::now();
        let outcome =
            tokio::time::timeout(self.timeout, api.cancel_deal(deal_id, external_order_id)).await;
        self.record_notify(
            aggregator,
            deal_id,
            "/api/deals/cancel",
            external_order_id,
            outcome,
            started,
            log,
        )
    }

    /// Escalate an accepted deal into dispute on the partner side.
    pub async fn notify_dispute(
        &self,
        aggregator: &Aggregator,
        api: &dyn AggregatorApi,
        deal_id: DealId,
        external_order_id: &str,
        log: &mut IntegrationLog,
    ) -> Result<()> {
        let started = std::time::Instant::now();
        let outcome =
            tokio::time::timeout(self.timeout, api.dispute_deal(deal_id, external_order_id)).await;
        self.record_notify(
            aggregator,
            deal_id,
            "/api/deals/dispute",
            external_order_id,
            outcome,
            started,
            log,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn record_notify(
        &self,
        aggregator: &Aggregator,
        deal_id: DealId,
        endpoint: &str,
        external_order_id: &str,
        outcome: std::result::Result<Result<PartnerReply>, tokio::time::error::Elapsed>,
        started: std::time::Instant,
        log: &mut IntegrationLog,
    ) -> Result<()> {
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut entry = IntegrationLogEntry {
            id: Uuid::now_v7(),
            aggregator_id: aggregator.id,
            deal_id: Some(deal_id),
            endpoint: endpoint.to_string(),
            request_body: format!(r#"{{"external_order_id":"{external_order_id}"}}"#),
            response_body: None,
            status_code: None,
            error: None,
            latency_ms,
            created_at: Utc::now(),
        };
        let result = match outcome {
            Ok(Ok(reply)) => {
                entry.status_code = Some(reply.status);
                entry.response_body = Some(reply.raw_body);
                if (200..300).contains(&reply.status) {
                    Ok(())
                } else {
                    Err(PayrailError::PartnerRejected {
                        aggregator: aggregator.id,
                        status: reply.status,
                    })
                }
            }
            Ok(Err(err)) => {
                entry.error = Some(err.to_string());
                Err(err)
            }
            Err(_) => {
                entry.error = Some(format!("timeout after {:?}", self.timeout));
                Err(PayrailError::PartnerTimeout {
                    aggregator: aggregator.id,
                })
            }
        };
        if let Err(err) = &result {
            warn!(aggregator = %aggregator.id, deal = %deal_id, endpoint, %err, "partner notification failed");
        }
        log.append(entry);
        result
    }
}

/// Profit split for an aggregator-fulfilled deal, all figures in crypto
/// at the relevant adjusted rates and truncated at `dp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfitSplit {
    /// Net credit to the merchant: amount minus the merchant fee.
    pub merchant_profit: Decimal,
    /// The aggregator's fee, payable to the partner.
    pub aggregator_profit: Decimal,
    /// The platform's margin: merchant fee minus aggregator fee.
    pub platform_profit: Decimal,
}

/// Split an aggregator deal's value between merchant, partner, and
/// platform. The platform margin is what remains of the merchant fee
/// after the aggregator takes its cut.
#[must_use]
pub fn aggregator_profit_split(
    amount: Decimal,
    merchant_fee_percent: Decimal,
    aggregator_fee_percent: Decimal,
    rate: Decimal,
    dp: u32,
) -> ProfitSplit {
    let hundred = Decimal::new(100, 0);
    let merchant_fee = amount * merchant_fee_percent / hundred;
    let aggregator_fee = amount * aggregator_fee_percent / hundred;
    ProfitSplit {
        merchant_profit: round_release((amount - merchant_fee) / rate, dp),
        aggregator_profit: round_release(aggregator_fee / rate, dp),
        platform_profit: round_release((merchant_fee - aggregator_fee) / rate, dp),
    }
}
