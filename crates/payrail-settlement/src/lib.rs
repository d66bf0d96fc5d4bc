//! Settlement plane of the PayRail engine.
//!
//! The state machine is the only writer of deal status and the only
//! trigger of balance mutations after creation. The expiry sweeper drives
//! overdue deals to EXPIRED; the conservation checker proves no value is
//! created or destroyed outside explicit funding and consumption.

pub mod conservation;
pub mod expiry;
pub mod state_machine;

pub use conservation::BalanceConservation;
pub use expiry::ExpirySweeper;
pub use state_machine::{CallbackEvent, SettlementEngine, TransitionOutcome};
