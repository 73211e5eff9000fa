use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::rules::params::EngineParams;
use crate::rules::rule::{Rule, RuleId, RuleKind};
use crate::rules::AuctionSnapshot;
use crate::utils::math::{adaptive_score, proposed_bid};

/// A firing rule's output for one tick: which rule, where, and how much.
/// Ephemeral; consumed by the executor and never persisted as-is.
#[derive(Clone, Debug)]
pub struct BidDecision {
    pub rule_id: RuleId,
    pub auction_slug: String,
    pub kind: RuleKind,
    pub amount: f64,
}

/// Source of the stochastic branches in the adaptive strategy.
///
/// Production uses a seeded PRNG so a run is reproducible given its seed;
/// tests and replays can pin the outcome with [`FixedSignal`].
pub trait BidSignal {
    /// Secondary gate applied after the adaptive score passes its threshold.
    fn adaptive_gate(&mut self) -> bool;

    /// Whether the venue currently looks contested; a contested fire bids
    /// two increments instead of one.
    fn high_contention(&mut self) -> bool;
}

/// PRNG-backed signal. Same seed and call sequence, same answers.
pub struct SeededSignal {
    rng: StdRng,
    gate_probability: f64,
    contention_probability: f64,
}

impl SeededSignal {
    pub fn new(seed: Option<u64>, gate_probability: f64, contention_probability: f64) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            gate_probability: gate_probability.clamp(0.0, 1.0),
            contention_probability: contention_probability.clamp(0.0, 1.0),
        }
    }

    pub fn from_params(params: &EngineParams) -> Self {
        Self::new(
            params.seed,
            params.gate_probability,
            params.contention_probability,
        )
    }
}

impl BidSignal for SeededSignal {
    fn adaptive_gate(&mut self) -> bool {
        self.rng.random_bool(self.gate_probability)
    }

    fn high_contention(&mut self) -> bool {
        self.rng.random_bool(self.contention_probability)
    }
}

/// Fully deterministic signal with pinned answers.
#[derive(Clone, Copy, Debug)]
pub struct FixedSignal {
    pub gate: bool,
    pub contention: bool,
}

impl BidSignal for FixedSignal {
    fn adaptive_gate(&mut self) -> bool {
        self.gate
    }

    fn high_contention(&mut self) -> bool {
        self.contention
    }
}

/// Evaluate one rule against the latest snapshot.
///
/// Pure apart from the injected signal. Never errors: disabled rules,
/// expired auctions and degenerate arithmetic all come back as `None`,
/// and any proposed amount above the rule ceiling is swallowed here
/// rather than surfacing as an over-limit bid.
pub fn evaluate<S: BidSignal>(
    rule: &Rule,
    snapshot: &AuctionSnapshot,
    now: DateTime<Utc>,
    params: &EngineParams,
    signal: &mut S,
) -> Option<BidDecision> {
    if !rule.enabled {
        return None;
    }

    let price = snapshot.current_price;
    if !price.is_finite() || price < 0.0 {
        return None;
    }
    if !rule.max_amount.is_finite() || rule.max_amount <= 0.0 {
        return None;
    }

    let remaining = snapshot.seconds_remaining(now);

    let mut contested = false;
    let fires = match rule.kind {
        RuleKind::LimitPrice => price < rule.max_amount - rule.increment,
        RuleKind::TimeTrigger { threshold_secs } => remaining > 0 && remaining <= threshold_secs,
        RuleKind::Adaptive {
            total_duration_secs,
        } => {
            let score = adaptive_score(
                price,
                rule.max_amount,
                remaining,
                total_duration_secs,
                params.price_weight,
                params.time_weight,
            )?;
            if score > params.score_threshold && signal.adaptive_gate() {
                contested = signal.high_contention();
                true
            } else {
                false
            }
        }
    };

    if !fires {
        return None;
    }

    let amount = proposed_bid(price, rule.increment, contested);
    if !amount.is_finite() || amount > rule.max_amount {
        return None;
    }

    Some(BidDecision {
        rule_id: rule.id,
        auction_slug: rule.auction_slug.clone(),
        kind: rule.kind,
        amount,
    })
}
