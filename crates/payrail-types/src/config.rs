//! Engine configuration snapshot.
//!
//! Admin-editable settings are loaded into an explicit [`EngineConfig`]
//! snapshot that is passed into the resolver, selector, and settlement
//! paths at call time. The core never reads live global state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants;

/// Immutable snapshot of engine-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minor-unit precision (decimal places) for escrow/release rounding.
    pub minor_unit_dp: u32,
    /// Hard floor used when every rate fallback is exhausted.
    pub rate_floor: Decimal,
    /// Bounded timeout for one aggregator partner call.
    pub partner_timeout_ms: u64,
    /// Tolerance window for inbound auction timestamps.
    pub auction_tolerance_secs: i64,
    /// Period of the expiry sweep timer.
    pub sweep_interval_secs: u64,
    /// Time-to-live stamped on freshly created deals.
    pub deal_ttl_minutes: i64,
    /// Bounded timeout for one callback delivery.
    pub callback_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            minor_unit_dp: constants::DEFAULT_MINOR_UNIT_DP,
            rate_floor: constants::RATE_FLOOR,
            partner_timeout_ms: constants::DEFAULT_PARTNER_TIMEOUT_MS,
            auction_tolerance_secs: constants::DEFAULT_AUCTION_TOLERANCE_SECS,
            sweep_interval_secs: constants::DEFAULT_SWEEP_INTERVAL_SECS,
            deal_ttl_minutes: constants::DEFAULT_DEAL_TTL_MINUTES,
            callback_timeout_ms: constants::DEFAULT_CALLBACK_TIMEOUT_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.minor_unit_dp, constants::DEFAULT_MINOR_UNIT_DP);
        assert_eq!(cfg.rate_floor, constants::RATE_FLOOR);
        assert_eq!(cfg.partner_timeout_ms, constants::DEFAULT_PARTNER_TIMEOUT_MS);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.minor_unit_dp, back.minor_unit_dp);
        assert_eq!(cfg.rate_floor, back.rate_floor);
    }
}
