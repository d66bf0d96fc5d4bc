//! HTTP client for aggregator partner APIs.
//!
//! Implements the routing plane's [`AggregatorApi`] over reqwest with
//! bearer authentication. Transport failures map to `PartnerTransport`;
//! non-2xx answers are returned as replies, not errors — the failover
//! queue decides what a rejection means.

use async_trait::async_trait;
use tracing::debug;

use payrail_routing::{AggregatorApi, PartnerDealRequest, PartnerDealResponse, PartnerReply};
use payrail_types::{Aggregator, AggregatorId, DealId, PayrailError, Result};

/// One partner's HTTP endpoint, configured from its registration record.
#[derive(Debug, Clone)]
pub struct HttpAggregatorClient {
    client: reqwest::Client,
    aggregator_id: AggregatorId,
    base_url: String,
    api_token: String,
}

impl HttpAggregatorClient {
    pub fn new(aggregator: &Aggregator, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| PayrailError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            aggregator_id: aggregator.id,
            base_url: aggregator.base_url.trim_end_matches('/').to_string(),
            api_token: aggregator.api_token.clone(),
        })
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<PartnerReply> {
        let url = format!("{}{path}", self.base_url);
        debug!(aggregator = %self.aggregator_id, %url, "partner request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(body)
            .send()
            .await
            .map_err(|e| PayrailError::PartnerTransport {
                aggregator: self.aggregator_id,
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let raw_body = response
            .text()
            .await
            .map_err(|e| PayrailError::PartnerTransport {
                aggregator: self.aggregator_id,
                reason: e.to_string(),
            })?;
        // An unparseable body counts as a decline, not a transport error;
        // the raw text still lands in the integration log.
        let parsed: PartnerDealResponse = serde_json::from_str(&raw_body).unwrap_or_default();
        Ok(PartnerReply {
            status,
            body: parsed,
            raw_body,
        })
    }
}

#[async_trait]
impl AggregatorApi for HttpAggregatorClient {
    async fn create_deal(&self, request: &PartnerDealRequest) -> Result<PartnerReply> {
        let body = serde_json::to_value(request)?;
        self.post("/api/deals", &body).await
    }

    async fn cancel_deal(&self, deal_id: DealId, external_order_id: &str) -> Result<PartnerReply> {
        let body = serde_json::json!({ "external_order_id": external_order_id });
        self.post(&format!("/api/deals/{deal_id}/cancel"), &body).await
    }

    async fn dispute_deal(&self, deal_id: DealId, external_order_id: &str) -> Result<PartnerReply> {
        let body = serde_json::json!({ "external_order_id": external_order_id });
        self.post(&format!("/api/deals/{deal_id}/dispute"), &body).await
    }
}
