//! Dispatch plane of the PayRail engine.
//!
//! Everything that crosses the platform boundary after a deal changes
//! state lives here: merchant callbacks in their per-merchant payload
//! shapes, the RSA-signed auction adapter for external auction systems,
//! and the HTTP client that talks to aggregator partners.

pub mod auction;
pub mod callback;
pub mod partner_http;

pub use auction::{
    AuctionAdapter, AuctionOrderRequest, AuctionSigner, AuctionVerifier, canonical_string,
    external_status_code,
};
pub use callback::CallbackDispatcher;
pub use partner_http::HttpAggregatorClient;
