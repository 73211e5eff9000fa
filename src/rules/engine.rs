use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::rules::evaluator::{evaluate, BidDecision, BidSignal, SeededSignal};
use crate::rules::params::EngineParams;
use crate::rules::rule::{Rule, RuleError, RuleId, RuleRuntimeState, RuleState, RuleUpdate};
use crate::rules::AuctionSnapshot;

/// Rule engine: owns the rule book and turns snapshots into bid decisions.
///
/// The book is a keyed mapping with update-by-id semantics; mutations happen
/// only through the explicit operations below, never during a tick.
pub struct RuleEngine<S: BidSignal = SeededSignal> {
    params: EngineParams,
    rules: HashMap<RuleId, Rule>,
    signal: S,
}

impl RuleEngine<SeededSignal> {
    pub fn new(params: EngineParams) -> Self {
        let signal = SeededSignal::from_params(&params);
        Self::with_signal(params, signal)
    }
}

impl<S: BidSignal> RuleEngine<S> {
    pub fn with_signal(params: EngineParams, signal: S) -> Self {
        Self {
            params,
            rules: HashMap::new(),
            signal,
        }
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    /// Insert a rule into the book, replacing any rule with the same id.
    pub fn insert_rule(&mut self, rule: Rule) -> RuleId {
        let id = rule.id;
        self.rules.insert(id, rule);
        id
    }

    /// Remove a rule permanently. Returns false if the id was unknown.
    pub fn remove_rule(&mut self, id: RuleId) -> bool {
        self.rules.remove(&id).is_some()
    }

    pub fn set_enabled(&mut self, id: RuleId, enabled: bool) -> Result<(), RuleError> {
        let rule = self.rules.get_mut(&id).ok_or(RuleError::UnknownRule(id))?;
        rule.enabled = enabled;
        Ok(())
    }

    /// Validated partial update; rejected updates leave the rule untouched.
    pub fn update_rule(&mut self, id: RuleId, update: RuleUpdate) -> Result<(), RuleError> {
        let rule = self.rules.get_mut(&id).ok_or(RuleError::UnknownRule(id))?;
        rule.apply(update)
    }

    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(&id)
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    pub fn enabled_count(&self) -> usize {
        self.rules.values().filter(|r| r.enabled).count()
    }

    pub fn rule_state(&self, id: RuleId, now: DateTime<Utc>) -> Option<RuleState> {
        self.rules.get(&id).map(|r| r.state(now, self.params.cooldown))
    }

    /// Restore persisted runtime state (enable flag, cooldown stamp) for a
    /// rule that survived a restart via a pinned id.
    pub fn restore_runtime(&mut self, id: RuleId, state: RuleRuntimeState) -> bool {
        match self.rules.get_mut(&id) {
            Some(rule) => {
                rule.enabled = state.enabled;
                rule.last_fired_at = state.last_fired_at;
                true
            }
            None => false,
        }
    }

    /// Evaluate every enabled, non-cooling rule watching this auction
    /// against the latest snapshot.
    ///
    /// Rules are visited in id order so a replay of the same snapshots and
    /// seed produces the same decisions. The caller dispatches each decision
    /// and stamps the fire via [`RuleEngine::mark_fired`].
    pub fn on_tick(&mut self, snapshot: &AuctionSnapshot, now: DateTime<Utc>) -> Vec<BidDecision> {
        let mut ids: Vec<RuleId> = self
            .rules
            .values()
            .filter(|r| r.enabled && r.auction_slug == snapshot.auction_slug)
            .map(|r| r.id)
            .collect();
        ids.sort();

        let mut decisions = Vec::new();
        let signal = &mut self.signal;
        for id in ids {
            let rule = match self.rules.get(&id) {
                Some(r) => r,
                None => continue,
            };
            if rule.is_cooling(now, self.params.cooldown) {
                debug!(
                    target: "engine",
                    rule_id = %id,
                    auction = %rule.auction_slug,
                    "rule cooling; skipping evaluation"
                );
                continue;
            }
            if let Some(decision) = evaluate(rule, snapshot, now, &self.params, signal) {
                decisions.push(decision);
            }
        }
        decisions
    }

    /// Stamp a fire on the rule, opening its cooldown window. Called at the
    /// moment dispatch is invoked, regardless of the dispatch outcome.
    pub fn mark_fired(&mut self, id: RuleId, now: DateTime<Utc>) {
        if let Some(rule) = self.rules.get_mut(&id) {
            rule.last_fired_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::evaluator::FixedSignal;
    use crate::rules::rule::RuleKind;
    use chrono::Duration;

    fn params() -> EngineParams {
        EngineParams {
            cooldown: Duration::milliseconds(3_000),
            price_weight: 0.6,
            time_weight: 0.4,
            score_threshold: 0.7,
            gate_probability: 0.2,
            contention_probability: 0.3,
            seed: Some(1),
        }
    }

    fn engine() -> RuleEngine<FixedSignal> {
        RuleEngine::with_signal(
            params(),
            FixedSignal {
                gate: true,
                contention: false,
            },
        )
    }

    fn snapshot(price: f64, remaining_secs: i64, now: DateTime<Utc>) -> AuctionSnapshot {
        AuctionSnapshot {
            ts: now,
            auction_slug: "punk-7804".to_string(),
            current_price: price,
            end_time: now + Duration::seconds(remaining_secs),
        }
    }

    fn add_limit_rule(engine: &mut RuleEngine<FixedSignal>, enabled: bool) -> RuleId {
        let mut rule =
            Rule::new("punk-7804".to_string(), RuleKind::LimitPrice, 0.10, 0.01).unwrap();
        rule.enabled = enabled;
        engine.insert_rule(rule)
    }

    #[test]
    fn disabled_rules_are_not_evaluated() {
        let mut engine = engine();
        add_limit_rule(&mut engine, false);
        let now = Utc::now();
        assert!(engine.on_tick(&snapshot(0.01, 600, now), now).is_empty());
        assert_eq!(engine.enabled_count(), 0);
    }

    #[test]
    fn fire_opens_cooldown_window() {
        let mut engine = engine();
        let id = add_limit_rule(&mut engine, true);
        let now = Utc::now();
        let snap = snapshot(0.05, 600, now);

        let decisions = engine.on_tick(&snap, now);
        assert_eq!(decisions.len(), 1);
        engine.mark_fired(id, now);

        // Conditions still satisfied, but the rule is cooling.
        assert!(engine
            .on_tick(&snap, now + Duration::milliseconds(1_000))
            .is_empty());
        assert!(engine
            .on_tick(&snap, now + Duration::milliseconds(2_999))
            .is_empty());

        // Cooldown elapsed; fires again.
        let later = now + Duration::milliseconds(3_000);
        let decisions = engine.on_tick(&snapshot(0.05, 600, later), later);
        assert_eq!(decisions.len(), 1);
    }

    #[test]
    fn rules_only_see_their_auction() {
        let mut engine = engine();
        add_limit_rule(&mut engine, true);
        let now = Utc::now();
        let other = AuctionSnapshot {
            ts: now,
            auction_slug: "ape-1234".to_string(),
            current_price: 0.01,
            end_time: now + Duration::seconds(600),
        };
        assert!(engine.on_tick(&other, now).is_empty());
    }

    #[test]
    fn remove_and_toggle_take_effect_next_tick() {
        let mut engine = engine();
        let id = add_limit_rule(&mut engine, true);
        let now = Utc::now();
        let snap = snapshot(0.05, 600, now);
        assert_eq!(engine.on_tick(&snap, now).len(), 1);

        engine.set_enabled(id, false).unwrap();
        assert!(engine.on_tick(&snap, now).is_empty());

        engine.set_enabled(id, true).unwrap();
        assert!(engine.remove_rule(id));
        assert!(engine.on_tick(&snap, now).is_empty());
        assert!(!engine.remove_rule(id));
    }

    #[test]
    fn update_by_id_validates_before_mutating() {
        let mut engine = engine();
        let id = add_limit_rule(&mut engine, true);

        let err = engine.update_rule(
            id,
            RuleUpdate {
                increment: Some(0.0),
                ..Default::default()
            },
        );
        assert!(err.is_err());
        assert!((engine.rule(id).unwrap().increment - 0.01).abs() < f64::EPSILON);

        engine
            .update_rule(
                id,
                RuleUpdate {
                    max_amount: Some(0.2),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!((engine.rule(id).unwrap().max_amount - 0.2).abs() < f64::EPSILON);

        let unknown = engine.update_rule(RuleId::new_v4(), RuleUpdate::default());
        assert!(matches!(unknown, Err(RuleError::UnknownRule(_))));
    }

    #[test]
    fn restore_runtime_reinstates_cooldown() {
        let mut engine = engine();
        let id = add_limit_rule(&mut engine, false);
        let now = Utc::now();

        assert!(engine.restore_runtime(
            id,
            RuleRuntimeState {
                enabled: true,
                last_fired_at: Some(now),
            },
        ));
        assert_eq!(engine.rule_state(id, now), Some(RuleState::Cooling));
        assert!(engine.on_tick(&snapshot(0.05, 600, now), now).is_empty());
    }
}
