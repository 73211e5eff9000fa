use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::rules::AuctionSnapshot;

/// Row model for time-series auction snapshots stored in TimescaleDB.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuctionSnapshotRow {
    pub ts: DateTime<Utc>,
    pub auction_slug: String,
    pub price: f64,
    pub end_time: DateTime<Utc>,
}

impl From<&AuctionSnapshot> for AuctionSnapshotRow {
    fn from(s: &AuctionSnapshot) -> Self {
        Self {
            ts: s.ts,
            auction_slug: s.auction_slug.clone(),
            price: s.current_price,
            end_time: s.end_time,
        }
    }
}

impl From<AuctionSnapshotRow> for AuctionSnapshot {
    fn from(row: AuctionSnapshotRow) -> Self {
        Self {
            ts: row.ts,
            auction_slug: row.auction_slug,
            current_price: row.price,
            end_time: row.end_time,
        }
    }
}

/// Row model capturing each dispatched fire and its execution outcome.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FireEventRow {
    pub ts: DateTime<Utc>,
    pub auction_slug: String,
    pub rule_id: Uuid,
    pub strategy: String,
    pub amount: f64,
    pub client_bid_id: String,
    pub status: String,
}
