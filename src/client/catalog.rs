//! Auction catalog lookups against the venue's public HTTP API.
//!
//! At startup each configured auction is resolved to a venue identifier and
//! an end time; anything pinned in config is used as-is so the bot can run
//! against venues without a catalog endpoint.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::AuctionConfig;

use super::{ClientError, ClientResult};

/// Resolved auction with everything the engine and executor need.
#[derive(Clone, Debug)]
pub struct ResolvedAuction {
    /// Logical name used in rules, logs and storage.
    pub slug: String,
    /// Venue-side auction identifier for bid submission.
    pub venue_id: String,
    pub end_time: DateTime<Utc>,
    /// Highest bid known at resolution time, if the catalog reports one.
    pub current_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    id: String,
    #[serde(default)]
    slug: Option<String>,
    end_time: DateTime<Utc>,
    #[serde(default)]
    current_price: Option<f64>,
}

/// Fetch a single auction by slug from the catalog API.
/// Returns `None` when the venue does not know the slug.
pub async fn fetch_auction_by_slug(
    http: &reqwest::Client,
    base_url: &str,
    slug: &str,
) -> ClientResult<Option<ResolvedAuction>> {
    let url = format!("{}/auctions", base_url.trim_end_matches('/'));
    let resp = http.get(&url).query(&[("slug", slug)]).send().await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::HttpStatus { status, body });
    }

    let rows: Vec<CatalogRow> = resp.json().await?;
    let row = match rows.into_iter().next() {
        Some(r) => r,
        None => return Ok(None),
    };

    Ok(Some(ResolvedAuction {
        slug: row.slug.unwrap_or_else(|| slug.to_string()),
        venue_id: row.id,
        end_time: row.end_time,
        current_price: row.current_price,
    }))
}

/// Resolve one configured auction: prefer pinned config values, fall back to
/// the catalog for whatever is missing.
pub async fn resolve_auction(
    http: &reqwest::Client,
    base_url: &str,
    cfg: &AuctionConfig,
) -> ClientResult<Option<ResolvedAuction>> {
    if let (Some(venue_id), Some(end_time)) = (&cfg.venue_id, cfg.end_time) {
        return Ok(Some(ResolvedAuction {
            slug: cfg.slug.clone(),
            venue_id: venue_id.clone(),
            end_time,
            current_price: None,
        }));
    }

    let mut resolved = fetch_auction_by_slug(http, base_url, &cfg.slug).await?;
    if let Some(ref mut auction) = resolved {
        auction.slug = cfg.slug.clone();
        if let Some(venue_id) = &cfg.venue_id {
            auction.venue_id = venue_id.clone();
        }
        if let Some(end_time) = cfg.end_time {
            auction.end_time = end_time;
        }
    }
    Ok(resolved)
}
