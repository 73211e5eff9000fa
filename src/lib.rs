pub mod client;
pub mod rules;
pub mod scheduler;
pub mod execution;
pub mod storage;
pub mod monitoring;
pub mod utils;
pub mod replay;
pub mod types;

pub use crate::types::*;
