//! Routing plane of the PayRail engine.
//!
//! Owns deal intake: rate resolution with KKK correction, requisite
//! selection under trader and instrument limits, the freeze ledger that
//! escrows trader funds, and the aggregator failover queue tried when no
//! internal requisite matches.

pub mod failover;
pub mod ledger;
pub mod rate;
pub mod router;
pub mod selector;

pub use failover::{
    AggregatorApi, FailoverQueue, FailoverWin, PartnerDealRequest, PartnerDealResponse,
    PartnerReply, ProfitSplit, aggregator_profit_split,
};
pub use ledger::FreezeLedger;
pub use rate::{RateResolver, RateSource};
pub use router::{DealRequest, DealRouter};
pub use selector::{RequisitePool, SelectionQuery};
