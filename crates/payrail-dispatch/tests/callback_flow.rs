//! Settlement-to-callback flow: a deal transition emits an event, the
//! dispatcher delivers it per the merchant's channel and records the
//! attempt, and delivery failures never disturb the settled deal.

use chrono::Utc;
use rust_decimal::Decimal;

use payrail_dispatch::CallbackDispatcher;
use payrail_routing::{DealRequest, DealRouter, RateSource};
use payrail_settlement::{SettlementEngine, TransitionOutcome};
use payrail_types::{
    CallbackChannel, CallbackHistory, DealDirection, DealStatus, EngineConfig, Merchant,
    MethodKind, Requisite, Result, Trader,
};

struct FixedSource;

impl RateSource for FixedSource {
    fn source_id(&self) -> &str {
        "fixed"
    }

    fn fetch_base_rate(&self) -> Result<Decimal> {
        Ok(Decimal::new(96, 0))
    }
}

fn dec(value: i64, scale: u32) -> Decimal {
    Decimal::new(value, scale)
}

#[tokio::test]
async fn settled_deal_notifies_relay_merchant() {
    let config = EngineConfig::default();
    let mut router = DealRouter::new(config.clone());
    let engine = SettlementEngine::new(&config);

    let trader = Trader::dummy(dec(100_000, 0), Decimal::ZERO);
    let trader_id = trader.id;
    router.register_trader(trader);
    router.add_requisite(Requisite::dummy(trader_id, MethodKind::Card));

    let mut merchant = Merchant::dummy_plain();
    merchant.channel = CallbackChannel::Relay {
        bearer_token: "relay-secret".to_string(),
    };
    // Reserved discard port: delivery fails fast, which is the point.
    merchant.callback_url = Some("http://127.0.0.1:9/hook".to_string());
    let merchant_id = merchant.id;
    router.register_merchant(merchant.clone());

    let deal_id = router
        .create_deal(
            &DealRequest {
                merchant_id,
                direction: DealDirection::In,
                amount: dec(10_000, 0),
                currency: "RUB".to_string(),
                method: MethodKind::Card,
                merchant_order_id: Some("order-relay-1".to_string()),
                callback_url: merchant.callback_url.clone(),
                ttl_minutes: None,
                auction: None,
            },
            &FixedSource,
        )
        .unwrap();

    let mut events = Vec::new();
    for target in [DealStatus::InProgress, DealStatus::Ready] {
        let (deal, ledger) = router.deal_and_ledger_mut(deal_id).unwrap();
        match engine.transition(deal, ledger, target, Utc::now()).unwrap() {
            TransitionOutcome::Applied(event) => events.push(event),
            TransitionOutcome::NoOp => panic!("expected applied transition"),
        }
    }

    let dispatcher = CallbackDispatcher::new(&config).unwrap();
    let mut history = CallbackHistory::new();
    for event in &events {
        dispatcher.dispatch(&merchant, event, None, &mut history).await;
    }

    // One recorded attempt per transition, each with the relay envelope.
    assert_eq!(history.len(), 2);
    assert!(history.entries()[0].payload.contains("IN_PROGRESS"));
    assert!(history.entries()[1].payload.contains("READY"));
    assert!(history.entries().iter().all(|e| !e.is_success()));

    // Failed delivery did not disturb settlement.
    assert_eq!(router.deal(deal_id).unwrap().status, DealStatus::Ready);
    assert_eq!(
        router.ledger().trader_balance(trader_id).frozen,
        Decimal::ZERO
    );
}
