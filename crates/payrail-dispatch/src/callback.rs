//! Merchant callback delivery.
//!
//! Payload shape follows the merchant's configured channel, decided at
//! registration time, not at dispatch time. Delivery is fire-and-record:
//! every attempt lands in the callback history with its raw payload, and
//! a failed delivery never propagates an error back into settlement.

use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use payrail_settlement::CallbackEvent;
use payrail_types::{
    CallbackChannel, CallbackHistory, CallbackHistoryEntry, EngineConfig, Merchant, PayrailError,
    Result,
};

use crate::auction::{AuctionSigner, external_status_code};

/// Simple `{id, amount, status}` body for plain-channel merchants.
#[must_use]
pub fn plain_payload(event: &CallbackEvent) -> serde_json::Value {
    json!({
        "id": event.deal_id,
        "amount": event.amount,
        "status": event.status.to_string(),
    })
}

/// Relay envelope: adds the correlation ids a relay needs to route the
/// notification onward.
#[must_use]
pub fn relay_payload(event: &CallbackEvent) -> serde_json::Value {
    json!({
        "id": event.deal_id,
        "amount": event.amount,
        "status": event.status.to_string(),
        "merchant_order_id": event.merchant_order_id,
        "external_order_id": event.external_order_id,
    })
}

/// Signed numeric-status body for external auction systems. The signature
/// covers the canonical string with action `"update"` and also travels in
/// the `X-Timestamp` / `X-Signature` headers.
pub fn auction_payload(
    event: &CallbackEvent,
    signer: &AuctionSigner,
    timestamp: i64,
) -> Result<(serde_json::Value, String)> {
    let order_id = event
        .merchant_order_id
        .clone()
        .unwrap_or_else(|| event.deal_id.to_string());
    let signature = signer.sign(timestamp, &order_id, "update")?;
    let payload = json!({
        "timestamp": timestamp,
        "external_system": signer.external_system(),
        "order_id": order_id,
        "status_code": external_status_code(event.status),
        "signature": signature.clone(),
    });
    Ok((payload, signature))
}

/// Delivers callbacks over HTTP with a bounded timeout.
#[derive(Debug, Clone)]
pub struct CallbackDispatcher {
    client: reqwest::Client,
}

impl CallbackDispatcher {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.callback_timeout_ms))
            .build()
            .map_err(|e| PayrailError::Configuration(e.to_string()))?;
        Ok(Self { client })
    }

    /// Notify a merchant of a status change. An unset or empty callback
    /// URL is a silent no-op. Auction merchants additionally get a signed
    /// push to their external system's notify endpoint.
    pub async fn dispatch(
        &self,
        merchant: &Merchant,
        event: &CallbackEvent,
        signer: Option<&AuctionSigner>,
        history: &mut CallbackHistory,
    ) {
        match &merchant.channel {
            CallbackChannel::Plain => {
                self.post(
                    merchant.callback_url.as_deref(),
                    plain_payload(event),
                    None,
                    event,
                    history,
                )
                .await;
            }
            CallbackChannel::Relay { bearer_token } => {
                self.post(
                    merchant.callback_url.as_deref(),
                    relay_payload(event),
                    Some(bearer_token),
                    event,
                    history,
                )
                .await;
            }
            CallbackChannel::Auction { notify_url, .. } => {
                self.post(
                    merchant.callback_url.as_deref(),
                    plain_payload(event),
                    None,
                    event,
                    history,
                )
                .await;
                if let Some(signer) = signer {
                    let timestamp = Utc::now().timestamp();
                    match auction_payload(event, signer, timestamp) {
                        Ok((payload, signature)) => {
                            self.post_signed(notify_url, payload, timestamp, &signature, event, history)
                                .await;
                        }
                        Err(err) => {
                            warn!(deal = %event.deal_id, %err, "auction payload signing failed");
                        }
                    }
                } else {
                    warn!(deal = %event.deal_id, "auction merchant but no signer configured");
                }
            }
        }
    }

    async fn post(
        &self,
        url: Option<&str>,
        payload: serde_json::Value,
        bearer: Option<&str>,
        event: &CallbackEvent,
        history: &mut CallbackHistory,
    ) {
        let Some(url) = url.filter(|u| !u.is_empty()) else {
            debug!(deal = %event.deal_id, "no callback url, skipping");
            return;
        };
        let mut request = self.client.post(url).json(&payload);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        self.send_and_record(request, url, payload.to_string(), event, history)
            .await;
    }

    /// Auction push: the signature rides in the headers as well as the body.
    async fn post_signed(
        &self,
        url: &str,
        payload: serde_json::Value,
        timestamp: i64,
        signature: &str,
        event: &CallbackEvent,
        history: &mut CallbackHistory,
    ) {
        if url.is_empty() {
            debug!(deal = %event.deal_id, "no auction notify url, skipping");
            return;
        }
        let request = self
            .client
            .post(url)
            .header("X-Timestamp", timestamp.to_string())
            .header("X-Signature", signature)
            .json(&payload);
        self.send_and_record(request, url, payload.to_string(), event, history)
            .await;
    }

    async fn send_and_record(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        body: String,
        event: &CallbackEvent,
        history: &mut CallbackHistory,
    ) {
        let mut entry = CallbackHistoryEntry {
            id: Uuid::now_v7(),
            deal_id: event.deal_id,
            url: url.to_string(),
            payload: body,
            status_code: None,
            response_body: None,
            error: None,
            created_at: Utc::now(),
        };
        match request.send().await {
            Ok(response) => {
                entry.status_code = Some(response.status().as_u16());
                entry.response_body = response.text().await.ok();
            }
            Err(err) => {
                warn!(deal = %event.deal_id, url, %err, "callback delivery failed");
                entry.error = Some(err.to_string());
            }
        }
        history.append(entry);
    }
}
