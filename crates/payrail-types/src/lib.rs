//! # payrail-types
//!
//! Shared types, errors, and configuration for the **PayRail** deal routing
//! and settlement engine.
//!
//! This crate is the leaf dependency of the workspace — every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`DealId`], [`TraderId`], [`MerchantId`], [`RequisiteId`], [`AggregatorId`]
//! - **Deal model**: [`Deal`], [`DealDirection`], [`DealStatus`], [`Fulfiller`], [`AuctionWindow`]
//! - **Requisite model**: [`Requisite`], [`MethodKind`], [`DeviceLink`]
//! - **Party model**: [`Trader`], [`TraderBalance`], [`Merchant`], [`CallbackChannel`], [`Aggregator`]
//! - **Rate model**: [`KkkOperation`], [`KkkCorrection`], [`RateSourceConfig`], [`ResolvedRate`]
//! - **Rounding rules**: [`money::round_escrow`], [`money::round_release`]
//! - **Audit records**: [`IntegrationLog`], [`CallbackHistory`]
//! - **Configuration**: [`EngineConfig`]
//! - **Errors**: [`PayrailError`] with `PR_ERR_` prefix codes

pub mod audit;
pub mod config;
pub mod constants;
pub mod deal;
pub mod error;
pub mod ids;
pub mod money;
pub mod party;
pub mod rate;
pub mod requisite;

// Re-export all primary types at crate root for ergonomic imports:
//   use payrail_types::{Deal, DealStatus, Trader, Requisite, ...};

pub use audit::*;
pub use config::*;
pub use deal::*;
pub use error::*;
pub use ids::*;
pub use party::*;
pub use rate::*;
pub use requisite::*;

// Constants are accessed via `payrail_types::constants::FOO`
// (not re-exported to avoid name collisions).
