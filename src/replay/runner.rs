use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::replay::config::ReplayConfig;
use crate::replay::core::{run_replay_on_snapshots, ReplayResult};
use crate::rules::{AuctionSnapshot, EngineParams};
use crate::storage::{create_pg_pool, models::AuctionSnapshotRow};

/// Execute a replay by loading recorded snapshots from TimescaleDB and
/// running them through the rule engine.
pub async fn run_replay(cfg: ReplayConfig) -> anyhow::Result<()> {
    let pool = create_pg_pool(&cfg.postgres).await?;

    let mut rows_all: Vec<AuctionSnapshotRow> = Vec::new();

    for a in &cfg.auctions {
        let mut rows: Vec<AuctionSnapshotRow> = sqlx::query_as(
            "SELECT ts, auction_slug, price, end_time \
             FROM auction_snapshots \
             WHERE auction_slug = $1 AND ts >= $2 AND ts <= $3 \
             ORDER BY ts ASC",
        )
        .bind(&a.slug)
        .bind(a.start)
        .bind(a.end)
        .fetch_all(&pool)
        .await?;

        rows_all.append(&mut rows);
    }

    // Sort globally by timestamp (slug as tiebreaker) for deterministic ordering.
    rows_all.sort_by(|a, b| {
        let ord_ts = a.ts.cmp(&b.ts);
        if ord_ts != std::cmp::Ordering::Equal {
            return ord_ts;
        }
        a.auction_slug.cmp(&b.auction_slug)
    });

    let snapshots: Vec<AuctionSnapshot> = rows_all.into_iter().map(AuctionSnapshot::from).collect();

    let mut rules = Vec::with_capacity(cfg.rules.len());
    for rule_cfg in &cfg.rules {
        let rule = rule_cfg
            .build()
            .map_err(|err| anyhow::anyhow!("invalid rule for {}: {err}", rule_cfg.auction))?;
        rules.push(rule);
    }

    let params = EngineParams::from(&cfg.engine);
    let result = run_replay_on_snapshots(&snapshots, rules, params, None);

    log_summary(&result);

    Ok(())
}

#[derive(Serialize)]
struct ReplaySummary<'a> {
    event: &'a str,
    finished_at: String,
    snapshots_processed: usize,
    fires: usize,
    total_spend: f64,
}

fn log_summary(result: &ReplayResult) {
    let summary = ReplaySummary {
        event: "replay_summary",
        finished_at: Utc::now().to_rfc3339(),
        snapshots_processed: result.snapshots_processed,
        fires: result.fires.len(),
        total_spend: result.total_spend,
    };

    let payload = serde_json::to_string(&summary)
        .unwrap_or_else(|_| "{\"event\":\"replay_summary_error\"}".to_string());
    info!(target: "replay", "{payload}");
}
