//! Tick scheduler: owns the rule engine and drives periodic evaluation.
//!
//! Snapshots arrive continuously from the price feed and only replace the
//! per-auction latest view; rules are evaluated on the tick boundary, never
//! on snapshot arrival. The interval timer exists only while at least one
//! rule is enabled and is dropped as soon as the last one goes away.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::client::catalog::{resolve_auction, ResolvedAuction};
use crate::client::websocket::connect_feed;
use crate::execution::BidExecutor;
use crate::monitoring::{dashboard, metrics::METRICS};
use crate::rules::rule::{Rule, RuleId, RuleUpdate};
use crate::rules::{AuctionSnapshot, BidDecision, BidSignal, EngineParams, RuleEngine, SeededSignal};
use crate::storage::{
    create_pg_pool,
    recorder::{FireRecorder, SnapshotRecorder},
    state::RedisStateManager,
};
use crate::types::{AppConfig, AuctionConfig};

/// Control-plane commands. Applied between ticks, so a command sent during
/// an evaluation pass takes effect on the next one.
#[derive(Debug)]
pub enum SchedulerCommand {
    AddRule(Rule),
    RemoveRule(RuleId),
    SetEnabled(RuleId, bool),
    UpdateRule(RuleId, RuleUpdate),
    Shutdown,
}

/// Cheap cloneable handle for sending commands into a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub fn add_rule(&self, rule: Rule) {
        let _ = self.tx.send(SchedulerCommand::AddRule(rule));
    }

    pub fn remove_rule(&self, id: RuleId) {
        let _ = self.tx.send(SchedulerCommand::RemoveRule(id));
    }

    pub fn set_enabled(&self, id: RuleId, enabled: bool) {
        let _ = self.tx.send(SchedulerCommand::SetEnabled(id, enabled));
    }

    pub fn update_rule(&self, id: RuleId, update: RuleUpdate) {
        let _ = self.tx.send(SchedulerCommand::UpdateRule(id, update));
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(SchedulerCommand::Shutdown);
    }
}

/// Event-loop owner of the engine and executor.
///
/// Inputs: a snapshot channel (fed by the websocket parse task or a test),
/// a command channel, and an interval timer it manages itself.
pub struct Scheduler<S: BidSignal = SeededSignal> {
    engine: RuleEngine<S>,
    executor: BidExecutor,
    tick: Duration,
    latest: HashMap<String, AuctionSnapshot>,
    command_rx: mpsc::UnboundedReceiver<SchedulerCommand>,
    snapshot_rx: mpsc::UnboundedReceiver<AuctionSnapshot>,
    snapshot_recorder: Option<SnapshotRecorder>,
    fire_recorder: Option<FireRecorder>,
    state: Option<RedisStateManager>,
    fire_tx: Option<mpsc::UnboundedSender<BidDecision>>,
}

impl<S: BidSignal> Scheduler<S> {
    pub fn new(
        engine: RuleEngine<S>,
        executor: BidExecutor,
        tick: Duration,
    ) -> (
        Self,
        SchedulerHandle,
        mpsc::UnboundedSender<AuctionSnapshot>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            engine,
            executor,
            tick,
            latest: HashMap::new(),
            command_rx,
            snapshot_rx,
            snapshot_recorder: None,
            fire_recorder: None,
            state: None,
            fire_tx: None,
        };
        (scheduler, SchedulerHandle { tx: command_tx }, snapshot_tx)
    }

    pub fn with_recorders(
        mut self,
        snapshots: SnapshotRecorder,
        fires: FireRecorder,
    ) -> Self {
        self.snapshot_recorder = Some(snapshots);
        self.fire_recorder = Some(fires);
        self
    }

    pub fn with_state_manager(mut self, state: RedisStateManager) -> Self {
        self.state = Some(state);
        self
    }

    /// Mirror every dispatched decision onto a channel. Used by tests and by
    /// anything that wants to observe fires without owning the executor.
    pub fn with_fire_channel(mut self, tx: mpsc::UnboundedSender<BidDecision>) -> Self {
        self.fire_tx = Some(tx);
        self
    }

    pub fn engine(&self) -> &RuleEngine<S> {
        &self.engine
    }

    /// Run until shutdown or until both input channels close.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut ticker = self.arm_ticker(None);

        loop {
            tokio::select! {
                maybe_cmd = self.command_rx.recv() => {
                    match maybe_cmd {
                        None | Some(SchedulerCommand::Shutdown) => {
                            info!(target: "scheduler", "shutdown requested; stopping");
                            break;
                        }
                        Some(cmd) => self.apply_command(cmd),
                    }
                }
                maybe_snap = self.snapshot_rx.recv() => {
                    match maybe_snap {
                        None => {
                            warn!(target: "scheduler", "snapshot channel closed; stopping");
                            break;
                        }
                        Some(snapshot) => self.ingest_snapshot(snapshot).await,
                    }
                }
                _ = tick_or_never(&mut ticker) => {
                    self.evaluate_tick().await;
                }
            }

            ticker = self.arm_ticker(ticker);
        }

        Ok(())
    }

    /// Keep the timer in sync with the rule book: armed while anything is
    /// enabled, released otherwise. Re-arming starts a fresh period so the
    /// first tick after re-enable comes one full interval later.
    fn arm_ticker(&self, current: Option<Interval>) -> Option<Interval> {
        let want = self.engine.enabled_count() > 0;
        match (current, want) {
            (None, true) => {
                debug!(target: "scheduler", tick_ms = self.tick.as_millis() as u64, "timer armed");
                Some(interval_at(Instant::now() + self.tick, self.tick))
            }
            (Some(_), false) => {
                debug!(target: "scheduler", "no enabled rules; timer released");
                None
            }
            (current, _) => current,
        }
    }

    fn apply_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::AddRule(rule) => {
                let id = self.engine.insert_rule(rule);
                info!(target: "scheduler", rule_id = %id, "rule added");
            }
            SchedulerCommand::RemoveRule(id) => {
                if self.engine.remove_rule(id) {
                    info!(target: "scheduler", rule_id = %id, "rule removed");
                } else {
                    warn!(target: "scheduler", rule_id = %id, "remove for unknown rule");
                }
            }
            SchedulerCommand::SetEnabled(id, enabled) => {
                if let Err(err) = self.engine.set_enabled(id, enabled) {
                    warn!(target: "scheduler", rule_id = %id, error = %err, "toggle failed");
                } else {
                    info!(target: "scheduler", rule_id = %id, enabled, "rule toggled");
                }
            }
            SchedulerCommand::UpdateRule(id, update) => {
                if let Err(err) = self.engine.update_rule(id, update) {
                    warn!(target: "scheduler", rule_id = %id, error = %err, "update rejected");
                }
            }
            SchedulerCommand::Shutdown => {}
        }
    }

    async fn ingest_snapshot(&mut self, snapshot: AuctionSnapshot) {
        METRICS.record_snapshot(&snapshot.auction_slug);

        if let Some(recorder) = &self.snapshot_recorder {
            if let Err(err) = recorder.record_snapshot(&snapshot).await {
                warn!(
                    target: "storage",
                    error = %err,
                    auction = %snapshot.auction_slug,
                    "failed to record snapshot"
                );
            }
        }

        self.latest
            .insert(snapshot.auction_slug.clone(), snapshot);
    }

    /// One evaluation pass over every auction with a known snapshot.
    async fn evaluate_tick(&mut self) {
        METRICS.record_tick();
        let now = Utc::now();

        let mut slugs: Vec<String> = self.latest.keys().cloned().collect();
        slugs.sort();

        for slug in slugs {
            let snapshot = match self.latest.get(&slug) {
                Some(s) => s.clone(),
                None => continue,
            };

            let decisions = self.engine.on_tick(&snapshot, now);
            for decision in decisions {
                // The cooldown stamp opens at dispatch invocation, not on
                // dispatch success, so a slow or failing backend cannot
                // cause a burst of re-fires.
                self.engine.mark_fired(decision.rule_id, now);
                self.persist_rule_state(decision.rule_id).await;

                if let Some(tx) = &self.fire_tx {
                    let _ = tx.send(decision.clone());
                }

                let strategy = decision.kind.label();
                let (client_bid_id, status) =
                    match self.executor.execute_decision(decision.clone()).await {
                        Ok(bid_id) => match self.executor.bid(&bid_id) {
                            Some(bid) => (
                                bid.request.client_bid_id.clone(),
                                format!("{:?}", bid.status).to_lowercase(),
                            ),
                            None => (bid_id.to_string(), "pending".to_string()),
                        },
                        Err(err) => {
                            warn!(
                                target: "execution",
                                error = %err,
                                auction = %decision.auction_slug,
                                rule_id = %decision.rule_id,
                                "failed to dispatch bid"
                            );
                            (String::new(), "failed".to_string())
                        }
                    };

                if let Some(recorder) = &self.fire_recorder {
                    if let Err(err) = recorder
                        .record_fire(
                            now,
                            &decision.auction_slug,
                            decision.rule_id,
                            strategy,
                            decision.amount,
                            &client_bid_id,
                            &status,
                        )
                        .await
                    {
                        warn!(
                            target: "storage",
                            error = %err,
                            auction = %decision.auction_slug,
                            "failed to record fire event"
                        );
                    }
                }
            }
        }
    }

    async fn persist_rule_state(&mut self, id: RuleId) {
        let runtime = match self.engine.rule(id) {
            Some(rule) => rule.runtime_state(),
            None => return,
        };
        if let Some(state) = &mut self.state {
            if let Err(err) = state.save_rule_state(id, &runtime).await {
                warn!(
                    target: "storage",
                    error = %err,
                    rule_id = %id,
                    "failed to persist rule state"
                );
            }
        }
    }
}

async fn tick_or_never(ticker: &mut Option<Interval>) {
    match ticker.as_mut() {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[derive(Debug, Deserialize)]
struct PriceUpdateEvent {
    auction_id: String,
    price: String,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct AuctionStateEvent {
    auction_id: String,
    #[serde(default)]
    current_price: Option<String>,
    #[serde(default)]
    end_time: Option<chrono::DateTime<chrono::Utc>>,
    timestamp: String,
}

fn parse_millis_timestamp(ts: &str) -> chrono::DateTime<chrono::Utc> {
    use chrono::TimeZone;
    ts.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now)
}

/// Per-auction feed bookkeeping owned by the parse task.
struct FeedBook {
    slug: String,
    end_time: chrono::DateTime<chrono::Utc>,
    price: Option<f64>,
}

fn build_snapshot(
    book: &FeedBook,
    ts: chrono::DateTime<chrono::Utc>,
) -> Option<AuctionSnapshot> {
    book.price.map(|price| AuctionSnapshot {
        ts,
        auction_slug: book.slug.clone(),
        current_price: price,
        end_time: book.end_time,
    })
}

/// Translate a raw feed frame into normalized snapshots.
fn handle_feed_text(
    text: &str,
    books: &mut HashMap<String, FeedBook>,
    snapshot_tx: &mpsc::UnboundedSender<AuctionSnapshot>,
) -> anyhow::Result<()> {
    let v: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => {
            // Ignore non-JSON frames such as raw PING/PONG echoes.
            return Ok(());
        }
    };

    let event_type = v
        .get("event_type")
        .and_then(|e| e.as_str())
        .unwrap_or_default();

    match event_type {
        "price_update" => {
            let ev: PriceUpdateEvent = serde_json::from_value(v)?;
            let ts = parse_millis_timestamp(&ev.timestamp);
            if let Some(book) = books.get_mut(&ev.auction_id) {
                if let Ok(price) = ev.price.parse::<f64>() {
                    book.price = Some(price);
                }
                if let Some(snapshot) = build_snapshot(book, ts) {
                    let _ = snapshot_tx.send(snapshot);
                }
            }
        }
        "auction_state" => {
            let ev: AuctionStateEvent = serde_json::from_value(v)?;
            let ts = parse_millis_timestamp(&ev.timestamp);
            if let Some(book) = books.get_mut(&ev.auction_id) {
                // Anti-sniping extensions move end_time; pick up the new one.
                if let Some(end_time) = ev.end_time {
                    book.end_time = end_time;
                }
                if let Some(price) = ev.current_price.as_deref().and_then(|s| s.parse().ok()) {
                    book.price = Some(price);
                }
                if let Some(snapshot) = build_snapshot(book, ts) {
                    let _ = snapshot_tx.send(snapshot);
                }
            }
        }
        _ => {
            // Other event types (bid_accepted, auction_settled, ...) are not
            // needed for evaluation.
        }
    }

    Ok(())
}

async fn resolve_auctions(
    http: &reqwest::Client,
    base_url: &str,
    auctions: &[AuctionConfig],
) -> anyhow::Result<Vec<ResolvedAuction>> {
    let mut resolved = Vec::with_capacity(auctions.len());
    for a in auctions {
        match resolve_auction(http, base_url, a).await {
            Ok(Some(r)) => {
                info!(
                    target: "bot",
                    slug = %r.slug,
                    venue_auction_id = %r.venue_id,
                    end_time = %r.end_time,
                    "auction resolved"
                );
                resolved.push(r);
            }
            Ok(None) => {
                warn!(target: "bot", slug = %a.slug, "catalog knows no such auction; skipping");
            }
            Err(err) => {
                warn!(
                    target: "bot",
                    slug = %a.slug,
                    error = %err,
                    "failed to resolve auction; skipping"
                );
            }
        }
    }
    Ok(resolved)
}

/// Entrypoint used by `main.rs`: wires feed ingestion, the rule engine, bid
/// execution, storage and monitoring into the scheduler loop.
pub async fn run_bot(cfg: AppConfig) -> anyhow::Result<()> {
    info!(target: "bot", "run_bot starting");

    dashboard::spawn_dashboard_task(Duration::from_secs(10));

    let health_addr = cfg.monitoring.health_addr.clone();
    let max_staleness = Duration::from_secs(cfg.monitoring.max_staleness_secs);
    tokio::spawn(async move {
        if let Err(err) = dashboard::serve_health(&health_addr, max_staleness).await {
            warn!(target: "monitoring", error = %err, "health listener exited");
        }
    });

    let http = reqwest::Client::builder()
        .user_agent("auction-autobid-bot/0.1")
        .timeout(Duration::from_secs(15))
        .build()?;

    let resolved = resolve_auctions(&http, &cfg.api.base_url, &cfg.auctions.auctions).await?;
    if resolved.is_empty() {
        anyhow::bail!("no auctions resolved; check [auctions.auctions] and the catalog API");
    }
    info!(target: "bot", count = resolved.len(), "auctions resolved");

    info!(target: "bot", "connecting to Postgres");
    let pool = create_pg_pool(&cfg.postgres).await?;
    info!(target: "bot", "Postgres connected");
    let snapshot_recorder = SnapshotRecorder::new(pool.clone());
    let fire_recorder = FireRecorder::new(pool.clone());

    let mut state = RedisStateManager::new(&cfg.redis).await?;

    let params = EngineParams::from(&cfg.engine);
    let mut engine = RuleEngine::new(params);

    for rule_cfg in &cfg.rules {
        let rule = rule_cfg
            .build()
            .map_err(|err| anyhow::anyhow!("invalid rule for {}: {err}", rule_cfg.auction))?;
        let id = engine.insert_rule(rule);

        // Pinned ids pick their runtime state back up across restarts.
        if rule_cfg.id.is_some() {
            match state.load_rule_state(id).await {
                Ok(Some(runtime)) => {
                    engine.restore_runtime(id, runtime);
                    info!(target: "bot", rule_id = %id, "rule runtime state restored");
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        target: "bot",
                        rule_id = %id,
                        error = %err,
                        "failed to load rule state; starting clean"
                    );
                }
            }
        }
    }
    info!(
        target: "bot",
        rules = cfg.rules.len(),
        enabled = engine.enabled_count(),
        "rule book initialized"
    );

    let executor = BidExecutor::from_config_and_resolved(&cfg, resolved.clone())?;

    let ws_url = cfg.api.ws_url.clone();
    info!(target: "bot", ws_url = %ws_url, "connecting to auction price feed");
    let mut conn = connect_feed(ws_url);
    let sender = conn.sender();

    let venue_ids: Vec<&str> = resolved.iter().map(|a| a.venue_id.as_str()).collect();
    let sub = serde_json::json!({
        "type": "subscribe",
        "channel": "auctions",
        "auction_ids": venue_ids,
    });
    if let Err(err) = sender.send(Message::Text(sub.to_string())) {
        return Err(anyhow::anyhow!(format!(
            "failed to send feed subscription: {err}"
        )));
    }

    let (scheduler, handle, snapshot_tx) =
        Scheduler::new(engine, executor, cfg.engine.tick_interval());
    let scheduler = scheduler
        .with_recorders(snapshot_recorder, fire_recorder)
        .with_state_manager(state);

    // Feed parse task: raw frames in, normalized snapshots out.
    let mut books: HashMap<String, FeedBook> = resolved
        .iter()
        .map(|a| {
            (
                a.venue_id.clone(),
                FeedBook {
                    slug: a.slug.clone(),
                    end_time: a.end_time,
                    price: a.current_price,
                },
            )
        })
        .collect();

    tokio::spawn(async move {
        loop {
            METRICS.heartbeat();
            let msg = match conn.receiver().recv().await {
                Some(m) => m,
                None => {
                    warn!(target: "bot", "feed channel closed; stopping parse task");
                    break;
                }
            };
            match msg {
                Message::Text(text) => {
                    if let Err(err) = handle_feed_text(&text, &mut books, &snapshot_tx) {
                        warn!(target: "bot", error = %err, "failed to process feed frame");
                    }
                }
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(frame) => {
                    warn!(target: "bot", ?frame, "feed closed by server");
                }
                _ => {}
            }
        }
    });

    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_handle.shutdown();
        }
    });

    scheduler.run().await
}
