use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::api::AuctionApiClient;
use crate::client::catalog::ResolvedAuction;
use crate::client::ClientError;
use crate::monitoring::metrics::METRICS;
use crate::rules::BidDecision;
use crate::types::{AppConfig, ExecutionMode};

use super::bid::{Bid, BidId, BidRequest, BidStatus};

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("circuit breaker open")]
    CircuitOpen,

    #[error("bid not found: {0}")]
    BidNotFound(String),

    #[error("other execution error: {0}")]
    Other(String),
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Simple on-process circuit breaker for dispatch failures.
#[derive(Debug)]
struct CircuitBreaker {
    failures: u32,
    threshold: u32,
    cooldown: Duration,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            failures: 0,
            threshold,
            cooldown,
            opened_at: None,
        }
    }

    fn is_open(&self) -> bool {
        match self.opened_at {
            None => false,
            Some(opened) => opened.elapsed() < self.cooldown,
        }
    }

    fn allow(&mut self) -> bool {
        !self.is_open()
    }

    fn on_success(&mut self) {
        self.failures = 0;
        self.opened_at = None;
    }

    fn on_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.threshold {
            self.opened_at = Some(Instant::now());
            warn!(
                failures = self.failures,
                "bid circuit breaker opened after consecutive failures"
            );
        }
    }
}

/// Backend for bid submission – simulated (paper) or the live venue API.
enum BidBackend {
    Paper(PaperBidder),
    Live(LiveBidder),
}

/// Action dispatcher: turns firing decisions into venue bids.
///
/// Owns the backend adapter, a circuit breaker and the local bid book.
/// Failures are reported to the caller and never retried here; cooldown
/// bookkeeping lives with the scheduler, not the dispatcher.
pub struct BidExecutor {
    backend: BidBackend,
    breaker: CircuitBreaker,
    auctions_by_slug: HashMap<String, ResolvedAuction>,
    bids: HashMap<BidId, Bid>,
}

impl BidExecutor {
    pub fn from_config_and_resolved(
        cfg: &AppConfig,
        resolved: Vec<ResolvedAuction>,
    ) -> ExecutionResult<Self> {
        let auctions_by_slug = resolved
            .into_iter()
            .map(|a| (a.slug.clone(), a))
            .collect::<HashMap<_, _>>();

        if auctions_by_slug.is_empty() {
            return Err(ExecutionError::Config(
                "no auctions resolved for execution".to_string(),
            ));
        }

        let backend = match cfg.execution.mode {
            ExecutionMode::Paper => BidBackend::Paper(PaperBidder::new()),
            ExecutionMode::Live => {
                let api = AuctionApiClient::new(&cfg.api)?;
                BidBackend::Live(LiveBidder::new(api))
            }
        };

        Ok(Self {
            backend,
            breaker: CircuitBreaker::new(5, Duration::from_secs(30)),
            auctions_by_slug,
            bids: HashMap::new(),
        })
    }

    /// Convert a firing decision into a bid request and send it to the backend.
    pub async fn execute_decision(&mut self, decision: BidDecision) -> ExecutionResult<BidId> {
        if !self.breaker.allow() {
            return Err(ExecutionError::CircuitOpen);
        }

        let req = self.decision_to_bid_request(&decision)?;

        let result = match &self.backend {
            BidBackend::Paper(paper) => paper.place_bid(&req).await,
            BidBackend::Live(live) => live.place_bid(&req).await,
        };

        match result {
            Ok(mut bid) => {
                // A freshly submitted bid is at least pending.
                if matches!(bid.status, BidStatus::New) {
                    bid.status = BidStatus::Pending;
                }
                let id = bid.id;
                self.bids.insert(id, bid);
                self.breaker.on_success();
                Ok(id)
            }
            Err(err) => {
                self.breaker.on_failure();
                METRICS.record_bid_failed(&decision.auction_slug, &err.to_string());
                Err(err)
            }
        }
    }

    /// Refresh the local view of a bid from the backend, if supported.
    pub async fn reconcile_bid(&mut self, id: BidId) -> ExecutionResult<Bid> {
        if !self.breaker.allow() {
            return Err(ExecutionError::CircuitOpen);
        }
        if !self.bids.contains_key(&id) {
            return Err(ExecutionError::BidNotFound(id.to_string()));
        }

        let result = match &self.backend {
            BidBackend::Paper(paper) => paper.refresh_bid(id).await,
            BidBackend::Live(live) => live.refresh_bid(id).await,
        };

        match result {
            Ok(bid) => {
                self.bids.insert(id, bid.clone());
                self.breaker.on_success();
                Ok(bid)
            }
            Err(err) => {
                self.breaker.on_failure();
                Err(err)
            }
        }
    }

    /// Read-only access to a bid in the local book.
    pub fn bid(&self, id: &BidId) -> Option<&Bid> {
        self.bids.get(id)
    }

    fn decision_to_bid_request(&self, decision: &BidDecision) -> ExecutionResult<BidRequest> {
        let auction = self
            .auctions_by_slug
            .get(&decision.auction_slug)
            .ok_or_else(|| {
                ExecutionError::Config(format!("unknown auction slug: {}", decision.auction_slug))
            })?;

        let strategy = decision.kind.label();
        let client_bid_id = format!(
            "{}-{}-{}",
            decision.auction_slug,
            decision.rule_id,
            Utc::now().timestamp_millis()
        );

        info!(
            auction = %decision.auction_slug,
            venue_auction_id = %auction.venue_id,
            rule_id = %decision.rule_id,
            strategy,
            amount = decision.amount,
            "submitting auto-bid"
        );

        METRICS.record_bid_submitted(&decision.auction_slug, strategy);

        Ok(BidRequest {
            auction_slug: decision.auction_slug.clone(),
            venue_auction_id: auction.venue_id.clone(),
            amount: decision.amount,
            strategy: strategy.to_string(),
            client_bid_id,
        })
    }
}

/// Paper-trading adapter: every bid is accepted immediately at its amount.
struct PaperBidder;

impl PaperBidder {
    fn new() -> Self {
        Self
    }

    async fn place_bid(&self, req: &BidRequest) -> ExecutionResult<Bid> {
        // Simulate small network/venue latency.
        tokio::time::sleep(Duration::from_millis(5)).await;

        let id = BidId::new_v4();
        let mut bid = Bid::new(id, req.clone());
        bid.status = BidStatus::Accepted;
        bid.accepted_amount = req.amount;
        Ok(bid)
    }

    async fn refresh_bid(&self, id: BidId) -> ExecutionResult<Bid> {
        // Paper bids are always accepted; synthesize an accepted view.
        let dummy_req = BidRequest {
            auction_slug: "paper".to_string(),
            venue_auction_id: "paper".to_string(),
            amount: 0.0,
            strategy: "paper".to_string(),
            client_bid_id: id.to_string(),
        };
        let mut bid = Bid::new(id, dummy_req);
        bid.status = BidStatus::Accepted;
        Ok(bid)
    }
}

/// Live venue adapter speaking the signed REST API.
struct LiveBidder {
    api: AuctionApiClient,
}

impl LiveBidder {
    fn new(api: AuctionApiClient) -> Self {
        Self { api }
    }

    async fn place_bid(&self, req: &BidRequest) -> ExecutionResult<Bid> {
        #[derive(Serialize)]
        struct PlaceBidRequest<'a> {
            amount: f64,
            client_bid_id: &'a str,
        }

        #[derive(Deserialize)]
        struct PlaceBidResponse {
            id: String,
            status: String,
            accepted_amount: Option<f64>,
        }

        let payload = PlaceBidRequest {
            amount: req.amount,
            client_bid_id: &req.client_bid_id,
        };

        let path = format!("/auctions/{}/bids", req.venue_auction_id);
        let resp: PlaceBidResponse = self.api.post_private(&path, &payload).await?;

        let id = resp.id.parse::<BidId>().unwrap_or_else(|_| BidId::new_v4());

        let mut bid = Bid::new(id, req.clone());
        bid.status = map_status(&resp.status);
        bid.accepted_amount = resp.accepted_amount.unwrap_or(0.0);
        Ok(bid)
    }

    async fn refresh_bid(&self, id: BidId) -> ExecutionResult<Bid> {
        #[derive(Deserialize)]
        struct BidResponse {
            id: String,
            status: String,
            auction_id: String,
            amount: f64,
            accepted_amount: Option<f64>,
        }

        let path = format!("/bids/{id}");
        let resp: BidResponse = self.api.get_private(&path).await?;

        let parsed_id = resp.id.parse::<BidId>().unwrap_or(id);

        let req = BidRequest {
            auction_slug: "unknown".to_string(),
            venue_auction_id: resp.auction_id,
            amount: resp.amount,
            strategy: "unknown".to_string(),
            client_bid_id: parsed_id.to_string(),
        };

        let mut bid = Bid::new(parsed_id, req);
        bid.status = map_status(&resp.status);
        bid.accepted_amount = resp.accepted_amount.unwrap_or(0.0);
        Ok(bid)
    }
}

fn map_status(s: &str) -> BidStatus {
    match s.to_lowercase().as_str() {
        "new" => BidStatus::New,
        "pending" => BidStatus::Pending,
        "accepted" | "leading" => BidStatus::Accepted,
        "outbid" => BidStatus::Outbid,
        "rejected" => BidStatus::Rejected,
        _ => BidStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::rule::RuleKind;
    use crate::types::{
        ApiConfig, AuctionsConfig, EngineConfig, ExecutionConfig, MonitoringConfig, PostgresConfig,
        RedisConfig,
    };
    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    fn dummy_app_config(mode: ExecutionMode) -> AppConfig {
        AppConfig {
            redis: RedisConfig {
                url: "redis://localhost".to_string(),
            },
            postgres: PostgresConfig {
                url: "postgres://localhost".to_string(),
            },
            api: ApiConfig {
                base_url: "https://api.auctionhouse.example".to_string(),
                ws_url: "wss://feed.auctionhouse.example/ws".to_string(),
                api_key: "key".to_string(),
                api_secret: "c2VjcmV0".to_string(),
                api_passphrase: "pass".to_string(),
                account_address: "0x0000000000000000000000000000000000000001".to_string(),
            },
            engine: EngineConfig {
                tick_ms: 1_000,
                cooldown_ms: 3_000,
                price_weight: 0.6,
                time_weight: 0.4,
                score_threshold: 0.7,
                gate_probability: 0.2,
                contention_probability: 0.3,
                seed: Some(1),
            },
            auctions: AuctionsConfig {
                auctions: vec![],
            },
            execution: ExecutionConfig {
                mode,
                max_parallel_bids: 8,
            },
            monitoring: MonitoringConfig::default(),
            rules: vec![],
        }
    }

    fn resolved() -> Vec<ResolvedAuction> {
        vec![ResolvedAuction {
            slug: "punk-7804".to_string(),
            venue_id: "auc_123".to_string(),
            end_time: Utc::now() + ChronoDuration::hours(1),
            current_price: Some(0.05),
        }]
    }

    fn decision() -> BidDecision {
        BidDecision {
            rule_id: Uuid::new_v4(),
            auction_slug: "punk-7804".to_string(),
            kind: RuleKind::LimitPrice,
            amount: 0.095,
        }
    }

    #[test]
    fn circuit_breaker_opens_after_failures() {
        let mut cb = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(cb.allow());
        cb.on_failure();
        cb.on_failure();
        assert!(cb.allow());
        cb.on_failure();
        assert!(cb.is_open());
        assert!(!cb.allow());
    }

    #[test]
    fn map_status_basic() {
        assert_eq!(map_status("new"), BidStatus::New);
        assert_eq!(map_status("pending"), BidStatus::Pending);
        assert_eq!(map_status("accepted"), BidStatus::Accepted);
        assert_eq!(map_status("outbid"), BidStatus::Outbid);
        assert_eq!(map_status("rejected"), BidStatus::Rejected);
        assert_eq!(map_status("somethingelse"), BidStatus::Failed);
    }

    #[test]
    fn build_executor_requires_auctions() {
        let cfg = dummy_app_config(ExecutionMode::Paper);
        assert!(BidExecutor::from_config_and_resolved(&cfg, vec![]).is_err());
        assert!(BidExecutor::from_config_and_resolved(&cfg, resolved()).is_ok());
    }

    #[tokio::test]
    async fn paper_backend_accepts_and_books_bids() {
        let cfg = dummy_app_config(ExecutionMode::Paper);
        let mut exec = BidExecutor::from_config_and_resolved(&cfg, resolved()).unwrap();

        let id = exec.execute_decision(decision()).await.unwrap();
        let bid = exec.bid(&id).expect("bid should be in the local book");
        assert_eq!(bid.status, BidStatus::Accepted);
        assert!((bid.accepted_amount - 0.095).abs() < 1e-12);
    }

    #[tokio::test]
    async fn unknown_auction_is_a_config_error() {
        let cfg = dummy_app_config(ExecutionMode::Paper);
        let mut exec = BidExecutor::from_config_and_resolved(&cfg, resolved()).unwrap();

        let mut d = decision();
        d.auction_slug = "nonexistent".to_string();
        assert!(matches!(
            exec.execute_decision(d).await,
            Err(ExecutionError::Config(_))
        ));
    }
}
