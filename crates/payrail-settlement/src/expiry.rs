//! Expiry sweeper — the timer that expires overdue deals.
//!
//! Only CREATED and IN_PROGRESS deals are swept; DISPUTE deals stay put
//! until resolved, and terminal deals are already done. Each expiry goes
//! through the settlement state machine, so released freezes follow the
//! exact same path as an explicit cancellation. Auction deals past their
//! cancel-order deadline are auto-canceled rather than expired, since the
//! external system distinguishes the two status codes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info};

use payrail_routing::DealRouter;
use payrail_types::{DealId, DealStatus};

use crate::state_machine::{CallbackEvent, SettlementEngine, TransitionOutcome};

/// Periodically drives overdue deals to EXPIRED.
#[derive(Debug, Clone, Copy)]
pub struct ExpirySweeper {
    engine: SettlementEngine,
}

impl ExpirySweeper {
    #[must_use]
    pub fn new(engine: SettlementEngine) -> Self {
        Self { engine }
    }

    /// One sweep pass over the deal store. Returns the callback events
    /// for every deal that was expired or auto-canceled.
    pub fn sweep_once(&self, router: &mut DealRouter, now: DateTime<Utc>) -> Vec<CallbackEvent> {
        let due: Vec<DealId> = router
            .deals()
            .values()
            .filter(|d| {
                matches!(d.status, DealStatus::Created | DealStatus::InProgress)
                    && d.is_past_expiry(now)
            })
            .map(|d| d.id)
            .collect();

        let mut events = Vec::new();
        for deal_id in due {
            let Ok((deal, ledger)) = router.deal_and_ledger_mut(deal_id) else {
                continue;
            };
            // An overdue auction deal hit its cancel-order deadline.
            let target = if deal.auction.is_some() {
                DealStatus::Canceled
            } else {
                DealStatus::Expired
            };
            match self.engine.transition(deal, ledger, target, now) {
                Ok(TransitionOutcome::Applied(event)) => events.push(event),
                Ok(TransitionOutcome::NoOp) => {}
                Err(err) => {
                    // Skip and retry on the next tick rather than abort
                    // the sweep.
                    error!(deal = %deal_id, %err, "expiry transition failed");
                }
            }
        }
        if !events.is_empty() {
            info!(swept = events.len(), "expiry sweep completed");
        }
        events
    }

    /// Run the sweep on a fixed interval, forwarding callback events to
    /// the dispatcher channel. Runs until the channel closes.
    pub async fn run(
        self,
        router: Arc<Mutex<DealRouter>>,
        period: Duration,
        events: mpsc::Sender<CallbackEvent>,
    ) {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let swept = {
                let mut router = router.lock().await;
                self.sweep_once(&mut router, Utc::now())
            };
            for event in swept {
                if events.send(event).await.is_err() {
                    info!("callback channel closed, stopping expiry sweeper");
                    return;
                }
            }
        }
    }
}
