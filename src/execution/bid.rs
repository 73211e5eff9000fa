use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// High-level lifecycle state for a submitted bid.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum BidStatus {
    New,
    Pending,
    Accepted,
    Outbid,
    Rejected,
    Failed,
}

/// Identifier used for tracking bids locally and, where supported, with the venue.
pub type BidId = Uuid;

/// Request to place a bid on the venue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BidRequest {
    /// Logical auction slug (e.g. "punk-7804").
    pub auction_slug: String,
    /// Venue-side auction identifier.
    pub venue_auction_id: String,
    /// Bid amount in quote currency.
    pub amount: f64,
    /// Strategy label of the rule that fired ("limit_price", ...).
    pub strategy: String,
    /// Client-generated identifier for reconciliation.
    pub client_bid_id: String,
}

/// Local view of a bid, including lifecycle and acceptance information.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub request: BidRequest,
    pub status: BidStatus,
    /// Amount the venue actually booked, once known.
    pub accepted_amount: f64,
}

impl Bid {
    pub fn new(id: BidId, request: BidRequest) -> Self {
        Self {
            id,
            request,
            status: BidStatus::New,
            accepted_amount: 0.0,
        }
    }
}
