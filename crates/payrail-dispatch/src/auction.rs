//! Auction adapter — signed integration with external auction systems.
//!
//! Inbound requests carry an RSA PKCS#1 v1.5 signature over SHA-256 of
//! the canonical string `timestamp + external_system + order_id + action`
//! (plain concatenation, timestamp in whole seconds). Signatures travel
//! base64-encoded. Timestamps outside the configured tolerance window are
//! rejected before any signature math.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use payrail_routing::{DealRequest, DealRouter, RateSource};
use payrail_settlement::{SettlementEngine, TransitionOutcome};
use payrail_types::{
    AuctionWindow, CallbackChannel, DealDirection, DealId, DealStatus, EngineConfig, MerchantId,
    MethodKind, PayrailError, Result,
};

/// Canonical string the auction signature covers.
#[must_use]
pub fn canonical_string(
    timestamp: i64,
    external_system: &str,
    order_id: &str,
    action: &str,
) -> String {
    format!("{timestamp}{external_system}{order_id}{action}")
}

/// Numeric status codes spoken by external auction systems.
#[must_use]
pub fn external_status_code(status: DealStatus) -> u8 {
    match status {
        DealStatus::Created => 1,
        DealStatus::InProgress => 2,
        DealStatus::Ready => 3,
        DealStatus::Canceled => 4,
        DealStatus::Expired => 5,
        DealStatus::Dispute => 6,
    }
}

/// Signs outbound auction messages with the platform's private key.
pub struct AuctionSigner {
    key: RsaPrivateKey,
    external_system: String,
}

impl AuctionSigner {
    #[must_use]
    pub fn new(key: RsaPrivateKey, external_system: impl Into<String>) -> Self {
        Self {
            key,
            external_system: external_system.into(),
        }
    }

    #[must_use]
    pub fn external_system(&self) -> &str {
        &self.external_system
    }

    /// Base64 signature over the canonical string.
    pub fn sign(&self, timestamp: i64, order_id: &str, action: &str) -> Result<String> {
        let canonical = canonical_string(timestamp, &self.external_system, order_id, action);
        let digest = Sha256::digest(canonical.as_bytes());
        let signature = self
            .key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| PayrailError::Internal(format!("signing failed: {e}")))?;
        Ok(BASE64.encode(signature))
    }
}

/// Verifies inbound auction signatures against a registered public key.
#[derive(Debug)]
pub struct AuctionVerifier {
    key: RsaPublicKey,
    tolerance_secs: i64,
}

impl AuctionVerifier {
    /// Parse a registered PEM public key. A malformed key is rejected
    /// loudly rather than treated as a failed signature.
    pub fn from_pem(pem: &str, tolerance_secs: i64) -> Result<Self> {
        let key = RsaPublicKey::from_public_key_pem(pem).map_err(|e| {
            PayrailError::KeyRejected {
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            key,
            tolerance_secs,
        })
    }

    /// Check timestamp freshness, then the signature itself.
    pub fn verify(
        &self,
        timestamp: i64,
        external_system: &str,
        order_id: &str,
        action: &str,
        signature_b64: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let skew = (now.timestamp() - timestamp).abs();
        if skew > self.tolerance_secs {
            return Err(PayrailError::ExpiredTimestamp { skew_secs: skew });
        }
        let signature = BASE64
            .decode(signature_b64)
            .map_err(|_| PayrailError::InvalidSignature)?;
        let canonical = canonical_string(timestamp, external_system, order_id, action);
        let digest = Sha256::digest(canonical.as_bytes());
        self.key
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
            .map_err(|_| PayrailError::InvalidSignature)
    }
}

/// An inbound auction order request, already deserialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionOrderRequest {
    /// Whole seconds since the epoch, as signed by the sender.
    pub timestamp: i64,
    pub external_system: String,
    /// The external system's own order id; becomes `merchant_order_id`.
    pub order_id: String,
    /// Signed action verb: `"create"` or `"cancel"`.
    pub action: String,
    pub amount: Decimal,
    pub currency: String,
    pub method: MethodKind,
    pub stop_auction_time: DateTime<Utc>,
    pub cancel_order_time: DateTime<Utc>,
    pub callback_url: Option<String>,
    /// Base64 RSA signature over the canonical string.
    pub signature: String,
}

/// Entry point for deals originating from external auction systems.
#[derive(Debug, Clone, Copy)]
pub struct AuctionAdapter {
    tolerance_secs: i64,
}

impl AuctionAdapter {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            tolerance_secs: config.auction_tolerance_secs,
        }
    }

    /// Verify and place an auction order as a regular deal. Offers past
    /// `stop_auction_time` are refused with `AuctionClosed`; the deal's
    /// expiry is pinned to `cancel_order_time`.
    pub fn create_order(
        &self,
        router: &mut DealRouter,
        merchant_id: MerchantId,
        request: &AuctionOrderRequest,
        source: &dyn RateSource,
        now: DateTime<Utc>,
    ) -> Result<DealId> {
        self.verify_request(router, merchant_id, request, "create", now)?;

        // Replayed create requests inside the tolerance window must not
        // freeze twice; hand back the deal already placed for this order.
        if let Some(existing) = Self::find_order(router, merchant_id, &request.order_id) {
            warn!(order = %request.order_id, deal = %existing, "duplicate auction create, returning existing deal");
            return Ok(existing);
        }

        if now > request.stop_auction_time {
            warn!(order = %request.order_id, "auction offer window already closed");
            return Err(PayrailError::AuctionClosed);
        }

        router.create_deal(
            &DealRequest {
                merchant_id,
                direction: DealDirection::In,
                amount: request.amount,
                currency: request.currency.clone(),
                method: request.method,
                merchant_order_id: Some(request.order_id.clone()),
                callback_url: request.callback_url.clone(),
                ttl_minutes: None,
                auction: Some(AuctionWindow {
                    stop_auction_time: request.stop_auction_time,
                    cancel_order_time: request.cancel_order_time,
                }),
            },
            source,
        )
    }

    /// Verify and apply an external cancellation of an auction order.
    pub fn cancel_order(
        &self,
        router: &mut DealRouter,
        engine: &SettlementEngine,
        merchant_id: MerchantId,
        request: &AuctionOrderRequest,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        self.verify_request(router, merchant_id, request, "cancel", now)?;

        let deal_id = Self::find_order(router, merchant_id, &request.order_id).ok_or_else(|| {
            PayrailError::InvalidDeal {
                reason: format!("no deal for auction order {}", request.order_id),
            }
        })?;

        let (deal, ledger) = router.deal_and_ledger_mut(deal_id)?;
        engine.transition(deal, ledger, DealStatus::Canceled, now)
    }

    fn find_order(
        router: &DealRouter,
        merchant_id: MerchantId,
        order_id: &str,
    ) -> Option<DealId> {
        router
            .deals()
            .values()
            .find(|d| {
                d.merchant_id == merchant_id && d.merchant_order_id.as_deref() == Some(order_id)
            })
            .map(|d| d.id)
    }

    /// Common gate: the merchant must be on the auction channel for this
    /// external system, the signed action must be the one this endpoint
    /// performs, and the signature must check out. Binding the action to
    /// the endpoint stops a validly signed request for one operation from
    /// being replayed against another.
    fn verify_request(
        &self,
        router: &DealRouter,
        merchant_id: MerchantId,
        request: &AuctionOrderRequest,
        expected_action: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if request.action != expected_action {
            warn!(
                order = %request.order_id,
                action = %request.action,
                expected = expected_action,
                "signed action does not match the requested operation"
            );
            return Err(PayrailError::InvalidSignature);
        }
        let merchant = router
            .merchant(merchant_id)
            .ok_or(PayrailError::MerchantNotFound(merchant_id))?;
        let CallbackChannel::Auction {
            external_system,
            public_key_pem,
            ..
        } = &merchant.channel
        else {
            return Err(PayrailError::Configuration(format!(
                "merchant {merchant_id} is not on the auction channel"
            )));
        };
        if external_system != &request.external_system {
            return Err(PayrailError::InvalidSignature);
        }
        let verifier = AuctionVerifier::from_pem(public_key_pem, self.tolerance_secs)?;
        verifier.verify(
            request.timestamp,
            &request.external_system,
            &request.order_id,
            &request.action,
            &request.signature,
            now,
        )
    }
}
