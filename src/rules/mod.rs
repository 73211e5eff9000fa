use chrono::{DateTime, Utc};

pub mod engine;
pub mod evaluator;
pub mod params;
pub mod rule;

pub use engine::RuleEngine;
pub use evaluator::{BidDecision, BidSignal, FixedSignal, SeededSignal};
pub use params::EngineParams;
pub use rule::{Rule, RuleError, RuleId, RuleKind, RuleState, RuleUpdate};

use crate::utils::time::seconds_remaining;

/// Latest known state of a single auction, replaced wholesale whenever the
/// price feed pushes an update. Read-only during evaluation.
#[derive(Clone, Debug)]
pub struct AuctionSnapshot {
    pub ts: DateTime<Utc>,
    pub auction_slug: String,
    /// Current highest bid (quote currency, e.g. ETH).
    pub current_price: f64,
    pub end_time: DateTime<Utc>,
}

impl AuctionSnapshot {
    /// Seconds left at the evaluation instant; negative once expired.
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        seconds_remaining(self.end_time, now)
    }
}
