//! System-wide constants and defaults.

use rust_decimal::Decimal;

/// Minor-unit precision for escrow/release rounding (decimal places).
pub const DEFAULT_MINOR_UNIT_DP: u32 = 2;

/// Hard floor for a resolved base rate. The resolver never returns a rate
/// at or below zero; this is its last fallback.
pub const RATE_FLOOR: Decimal = Decimal::ONE;

/// Bounded timeout for a single aggregator partner call.
pub const DEFAULT_PARTNER_TIMEOUT_MS: u64 = 5_000;

/// Tolerance window for inbound auction timestamps.
pub const DEFAULT_AUCTION_TOLERANCE_SECS: i64 = 60;

/// Period of the expiry sweep timer.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

/// Default time-to-live for a freshly created deal.
pub const DEFAULT_DEAL_TTL_MINUTES: i64 = 30;

/// Bounded timeout for a single callback delivery.
pub const DEFAULT_CALLBACK_TIMEOUT_MS: u64 = 10_000;
