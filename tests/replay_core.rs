use auction_autobid_bot::replay::core::run_replay_on_snapshots;
use auction_autobid_bot::rules::rule::{Rule, RuleKind};
use auction_autobid_bot::rules::{AuctionSnapshot, EngineParams};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

fn ts(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .unwrap()
        .and_utc()
}

fn snapshot(price: f64, ts_str: &str, slug: &str) -> AuctionSnapshot {
    let t = ts(ts_str);
    AuctionSnapshot {
        ts: t,
        auction_slug: slug.to_string(),
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

fn limit_rule(slug: &str, max_amount: f64) -> Rule {
    let mut rule = Rule::new(slug.to_string(), RuleKind::LimitPrice, max_amount, 0.01).unwrap();
    rule.enabled = true;
    rule
}

#[test]
fn replay_handles_multiple_auctions() {
    let snaps = vec![
        snapshot(0.05, "2024-01-01T12:00:00", "punk-7804"),
        snapshot(0.03, "2024-01-01T12:00:05", "ape-1234"),
        snapshot(0.06, "2024-01-01T12:00:10", "punk-7804"),
        snapshot(0.04, "2024-01-01T12:00:15", "ape-1234"),
    ];

    let rules = vec![limit_rule("punk-7804", 0.10), limit_rule("ape-1234", 0.10)];
    let result = run_replay_on_snapshots(&snaps, rules, params(), None);

    assert_eq!(result.snapshots_processed, 4);
    assert_eq!(result.fires.len(), 4);
    assert!(result
        .fires
        .iter()
        .any(|f| f.auction_slug == "punk-7804"));
    assert!(result.fires.iter().any(|f| f.auction_slug == "ape-1234"));
}

#[test]
fn rules_never_bid_past_their_ceiling() {
    // Price walks up; once current + increment would clear max_amount the
    // rule stops bidding entirely.
    let snaps = vec![
        snapshot(0.05, "2024-01-01T12:00:00", "punk-7804"),
        snapshot(0.085, "2024-01-01T12:00:10", "punk-7804"),
        snapshot(0.095, "2024-01-01T12:00:20", "punk-7804"),
        snapshot(0.12, "2024-01-01T12:00:30", "punk-7804"),
    ];

    let result = run_replay_on_snapshots(&snaps, vec![limit_rule("punk-7804", 0.10)], params(), None);

    assert_eq!(result.fires.len(), 2);
    for fire in &result.fires {
        assert!(fire.amount <= 0.10);
    }
}

#[test]
fn disabled_rules_produce_no_fires() {
    let snaps = vec![
        snapshot(0.05, "2024-01-01T12:00:00", "punk-7804"),
        snapshot(0.06, "2024-01-01T12:00:10", "punk-7804"),
    ];

    let mut rule = limit_rule("punk-7804", 0.10);
    rule.enabled = false;

    let result = run_replay_on_snapshots(&snaps, vec![rule], params(), None);
    assert_eq!(result.snapshots_processed, 2);
    assert!(result.fires.is_empty());
}
