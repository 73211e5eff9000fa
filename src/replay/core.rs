use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::rules::{AuctionSnapshot, EngineParams, RuleEngine, SeededSignal};
use crate::rules::rule::Rule;

/// A single fire produced during replay, with no execution side effects.
#[derive(Clone, Debug)]
pub struct ReplayFire {
    pub ts: DateTime<Utc>,
    pub auction_slug: String,
    pub rule_id: Uuid,
    pub strategy: String,
    pub amount: f64,
}

#[derive(Clone, Debug)]
pub struct ReplayResult {
    pub snapshots_processed: usize,
    pub fires: Vec<ReplayFire>,
    /// Sum of all bid amounts the rules would have placed.
    pub total_spend: f64,
}

/// Deterministically replay recorded snapshots through the rule engine.
///
/// Each snapshot's own timestamp is used as the evaluation clock, so
/// cooldown windows behave as they would have live. The caller provides
/// snapshots in time-ascending order; given the same snapshots, rules and
/// seed the result is fully reproducible.
pub fn run_replay_on_snapshots(
    snapshots: &[AuctionSnapshot],
    rules: Vec<Rule>,
    params: EngineParams,
    max_steps: Option<usize>,
) -> ReplayResult {
    // An unseeded engine would make replay runs diverge; pin a default.
    let seeded = EngineParams {
        seed: Some(params.seed.unwrap_or(0)),
        ..params
    };
    let signal = SeededSignal::from_params(&seeded);
    let mut engine = RuleEngine::with_signal(seeded, signal);
    for rule in rules {
        engine.insert_rule(rule);
    }

    let mut fires = Vec::new();
    let mut total_spend = 0.0;
    let mut processed = 0usize;

    for snapshot in snapshots {
        if let Some(limit) = max_steps {
            if processed >= limit {
                break;
            }
        }
        processed += 1;

        let now = snapshot.ts;
        let decisions = engine.on_tick(snapshot, now);
        for decision in decisions {
            engine.mark_fired(decision.rule_id, now);
            total_spend += decision.amount;
            fires.push(ReplayFire {
                ts: now,
                auction_slug: decision.auction_slug,
                rule_id: decision.rule_id,
                strategy: decision.kind.label().to_string(),
                amount: decision.amount,
            });
        }
    }

    ReplayResult {
        snapshots_processed: processed,
        fires,
        total_spend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::rule::RuleKind;
    use chrono::{Duration, NaiveDateTime, Utc};

    fn ts(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .unwrap()
            .and_utc()
    }

    fn snapshot(price: f64, ts_str: &str) -> AuctionSnapshot {
        let t = ts(ts_str);
        AuctionSnapshot {
            ts: t,
            auction_slug: "punk-7804".to_string(),
            current_price: price,
            end_time: t + Duration::hours(1),
        }
    }

    fn params() -> EngineParams {
        EngineParams {
            cooldown: Duration::milliseconds(3_000),
            price_weight: 0.6,
            time_weight: 0.4,
            score_threshold: 0.7,
            gate_probability: 0.2,
            contention_probability: 0.3,
            seed: Some(42),
        }
    }

    fn limit_rule() -> Rule {
        let mut rule =
            Rule::new("punk-7804".to_string(), RuleKind::LimitPrice, 0.10, 0.01).unwrap();
        rule.enabled = true;
        rule
    }

    #[test]
    fn deterministic_results_for_same_input() {
        let snaps = vec![
            snapshot(0.05, "2024-01-01T12:00:00"),
            snapshot(0.06, "2024-01-01T12:00:10"),
            snapshot(0.07, "2024-01-01T12:00:20"),
        ];

        let r1 = run_replay_on_snapshots(&snaps, vec![limit_rule()], params(), None);
        let r2 = run_replay_on_snapshots(&snaps, vec![limit_rule()], params(), None);

        assert_eq!(r1.fires.len(), r2.fires.len());
        assert!((r1.total_spend - r2.total_spend).abs() < 1e-12);
    }

    #[test]
    fn cooldown_suppresses_rapid_refires() {
        // Second snapshot lands inside the 3s cooldown of the first fire.
        let snaps = vec![
            snapshot(0.05, "2024-01-01T12:00:00"),
            snapshot(0.05, "2024-01-01T12:00:02"),
            snapshot(0.05, "2024-01-01T12:00:10"),
        ];

        let result = run_replay_on_snapshots(&snaps, vec![limit_rule()], params(), None);
        assert_eq!(result.fires.len(), 2);
        assert!((result.total_spend - 0.12).abs() < 1e-12);
    }

    #[test]
    fn max_steps_limits_processing() {
        let snaps = vec![
            snapshot(0.05, "2024-01-01T12:00:00"),
            snapshot(0.05, "2024-01-01T12:00:10"),
        ];

        let result = run_replay_on_snapshots(&snaps, vec![limit_rule()], params(), Some(1));
        assert_eq!(result.snapshots_processed, 1);
        assert_eq!(result.fires.len(), 1);
    }
}
