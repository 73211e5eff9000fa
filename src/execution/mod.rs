pub mod bid;
mod executor;

pub use bid::{Bid, BidId, BidRequest, BidStatus};
pub use executor::{BidExecutor, ExecutionError, ExecutionResult};
