use chrono::{DateTime, Utc};
use sqlx::{query, Pool, Postgres};
use uuid::Uuid;

use crate::rules::AuctionSnapshot;
use crate::storage::models::{AuctionSnapshotRow, FireEventRow};

/// Records normalized auction snapshots into TimescaleDB.
///
/// The expected schema (created via migrations) is:
/// ```sql
/// CREATE TABLE IF NOT EXISTS auction_snapshots (
///   ts            TIMESTAMPTZ NOT NULL,
///   auction_slug  TEXT        NOT NULL,
///   price         DOUBLE PRECISION NOT NULL,
///   end_time      TIMESTAMPTZ NOT NULL
/// );
/// ```
pub struct SnapshotRecorder {
    pool: Pool<Postgres>,
}

impl SnapshotRecorder {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn record_snapshot(&self, snapshot: &AuctionSnapshot) -> anyhow::Result<()> {
        let row: AuctionSnapshotRow = snapshot.into();

        query(
            "INSERT INTO auction_snapshots \
             (ts, auction_slug, price, end_time) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(row.ts)
        .bind(row.auction_slug)
        .bind(row.price)
        .bind(row.end_time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Records each dispatched fire into TimescaleDB.
///
/// The expected schema (created via migrations) is:
/// ```sql
/// CREATE TABLE IF NOT EXISTS fire_events (
///   ts            TIMESTAMPTZ NOT NULL,
///   auction_slug  TEXT        NOT NULL,
///   rule_id       UUID        NOT NULL,
///   strategy      TEXT        NOT NULL,
///   amount        DOUBLE PRECISION NOT NULL,
///   client_bid_id TEXT        NOT NULL,
///   status        TEXT        NOT NULL
/// );
/// ```
pub struct FireRecorder {
    pool: Pool<Postgres>,
}

impl FireRecorder {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record_fire(
        &self,
        ts: DateTime<Utc>,
        auction_slug: &str,
        rule_id: Uuid,
        strategy: &str,
        amount: f64,
        client_bid_id: &str,
        status: &str,
    ) -> anyhow::Result<()> {
        let row = FireEventRow {
            ts,
            auction_slug: auction_slug.to_string(),
            rule_id,
            strategy: strategy.to_string(),
            amount,
            client_bid_id: client_bid_id.to_string(),
            status: status.to_string(),
        };

        query(
            "INSERT INTO fire_events \
             (ts, auction_slug, rule_id, strategy, amount, client_bid_id, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(row.ts)
        .bind(row.auction_slug)
        .bind(row.rule_id)
        .bind(row.strategy)
        .bind(row.amount)
        .bind(row.client_bid_id)
        .bind(row.status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
