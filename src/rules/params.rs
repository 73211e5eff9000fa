use chrono::Duration;

use crate::types::EngineConfig;

/// Parameters for the rule engine, derived from the `[engine]` config table.
#[derive(Clone, Debug)]
pub struct EngineParams {
    /// Minimum time between consecutive fires of the same rule.
    pub cooldown: Duration,
    /// Weight of the price component in the adaptive score.
    pub price_weight: f64,
    /// Weight of the time component in the adaptive score.
    pub time_weight: f64,
    /// Adaptive rules fire only above this score.
    pub score_threshold: f64,
    /// Probability the adaptive gate passes on a satisfied score.
    pub gate_probability: f64,
    /// Probability a fire is treated as contested (doubled increment).
    pub contention_probability: f64,
    /// Seed for the bid signal; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl From<&EngineConfig> for EngineParams {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            cooldown: Duration::milliseconds(cfg.cooldown_ms as i64),
            price_weight: cfg.price_weight,
            time_weight: cfg.time_weight,
            score_threshold: cfg.score_threshold,
            gate_probability: cfg.gate_probability,
            contention_probability: cfg.contention_probability,
            seed: cfg.seed,
        }
    }
}
