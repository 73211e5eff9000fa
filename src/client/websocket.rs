use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use super::{ClientError, ClientResult};

const HEARTBEAT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

impl From<u8> for FeedState {
    fn from(value: u8) -> Self {
        match value {
            0 => FeedState::Connecting,
            1 => FeedState::Connected,
            2 => FeedState::Reconnecting,
            _ => FeedState::Disconnected,
        }
    }
}

impl From<FeedState> for u8 {
    fn from(value: FeedState) -> Self {
        match value {
            FeedState::Connecting => 0,
            FeedState::Connected => 1,
            FeedState::Reconnecting => 2,
            FeedState::Disconnected => 3,
        }
    }
}

/// Handle to the background feed task: outbound sender (subscriptions),
/// inbound receiver (price events) and a connection state probe.
pub struct FeedConnection {
    outbound_tx: mpsc::UnboundedSender<Message>,
    inbound_rx: mpsc::UnboundedReceiver<Message>,
    state: Arc<AtomicU8>,
}

impl FeedConnection {
    pub fn sender(&self) -> mpsc::UnboundedSender<Message> {
        self.outbound_tx.clone()
    }

    pub fn receiver(&mut self) -> &mut mpsc::UnboundedReceiver<Message> {
        &mut self.inbound_rx
    }

    pub fn state(&self) -> FeedState {
        self.state.load(Ordering::SeqCst).into()
    }
}

async fn drive_connection(
    url: &str,
    outbound_rx: &mut mpsc::UnboundedReceiver<Message>,
    inbound_tx: &mpsc::UnboundedSender<Message>,
    state: &Arc<AtomicU8>,
) -> ClientResult<()> {
    let (ws_stream, _) = connect_async(url).await?;
    state.store(FeedState::Connected.into(), Ordering::SeqCst);

    let (mut write, mut read) = ws_stream.split();
    let mut heartbeat = interval(Duration::from_secs(HEARTBEAT_SECS));

    loop {
        tokio::select! {
            Some(msg) = outbound_rx.recv() => {
                if let Err(err) = write.send(msg).await {
                    state.store(FeedState::Reconnecting.into(), Ordering::SeqCst);
                    return Err(ClientError::WebSocket(err));
                }
            }
            maybe_msg = read.next() => {
                match maybe_msg {
                    Some(Ok(msg)) => {
                        if inbound_tx.send(msg).is_err() {
                            // Receiver dropped; treat as graceful shutdown.
                            state.store(FeedState::Disconnected.into(), Ordering::SeqCst);
                            return Ok(());
                        }
                    }
                    Some(Err(err)) => {
                        state.store(FeedState::Reconnecting.into(), Ordering::SeqCst);
                        return Err(ClientError::WebSocket(err));
                    }
                    None => {
                        state.store(FeedState::Reconnecting.into(), Ordering::SeqCst);
                        return Ok(());
                    }
                }
            }
            _ = heartbeat.tick() => {
                if let Err(err) = write.send(Message::Ping(Vec::new())).await {
                    state.store(FeedState::Reconnecting.into(), Ordering::SeqCst);
                    return Err(ClientError::WebSocket(err));
                }
            }
        }
    }
}

/// Connect to the venue's price feed with heartbeats and reconnection.
///
/// Spawns a background task that keeps the connection alive, pings every
/// 10 seconds and reconnects with capped exponential backoff when the
/// stream drops. Dropping the returned handle's receiver shuts the task
/// down gracefully.
pub fn connect_feed(url: impl Into<String>) -> FeedConnection {
    let url = url.into();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let state = Arc::new(AtomicU8::new(FeedState::Connecting.into()));

    let state_for_task = Arc::clone(&state);
    tokio::spawn(async move {
        let mut attempt: u32 = 0;
        loop {
            state_for_task.store(FeedState::Connecting.into(), Ordering::SeqCst);

            match drive_connection(&url, &mut outbound_rx, &inbound_tx, &state_for_task).await {
                Ok(()) => {
                    state_for_task.store(FeedState::Disconnected.into(), Ordering::SeqCst);
                    break;
                }
                Err(_err) => {
                    attempt += 1;
                    let backoff_ms = 500u64.saturating_mul(1u64 << attempt.min(5));
                    tokio::time::sleep(Duration::from_millis(backoff_ms.min(8_000))).await;
                    state_for_task.store(FeedState::Reconnecting.into(), Ordering::SeqCst);
                }
            }
        }
    });

    FeedConnection {
        outbound_tx,
        inbound_rx,
        state,
    }
}
