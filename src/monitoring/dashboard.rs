use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::select;
use tokio::time::interval;
use tracing::warn;

use crate::monitoring::metrics::{log_metrics_snapshot, METRICS};

/// Spawn a background task that periodically logs a compact metrics snapshot.
///
/// Combined with the JSON log output this doubles as a poor-man's dashboard:
/// `jq 'select(.event == "metrics_snapshot")'` over the log stream.
pub fn spawn_dashboard_task(period: Duration) {
    let mut ticker = interval(period);
    tokio::spawn(async move {
        loop {
            ticker.tick().await;
            let snapshot = METRICS.snapshot();
            log_metrics_snapshot(&snapshot);
        }
    });
}

/// Minimal HTTP-ish health listener.
///
/// Any request gets the current metrics snapshot as a JSON body; the status
/// line is `200 OK` while the process has seen an event recently and
/// `503 Service Unavailable` once it goes stale, so a liveness probe can key
/// off the status code alone.
pub async fn serve_health(addr: &str, max_staleness: Duration) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (mut socket, _) = listener.accept().await?;
        let mut buf = [0u8; 1024];

        // Drain the request without inspecting the path.
        let _ = socket.readable().await;
        let _ = socket.try_read(&mut buf);

        let status_line = if METRICS.is_healthy(max_staleness) {
            "200 OK"
        } else {
            "503 Service Unavailable"
        };
        let body = serde_json::to_string(&METRICS.snapshot()).unwrap_or_else(|_| "{}".to_string());
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: application/json\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );

        socket.write_all(response.as_bytes()).await?;
        socket.shutdown().await?;
    }
}

/// Run both the dashboard logger and the health listener until shutdown.
pub async fn run_monitoring(
    health_addr: &str,
    dashboard_period: Duration,
    max_staleness: Duration,
    mut shutdown: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    spawn_dashboard_task(dashboard_period);

    select! {
        res = serve_health(health_addr, max_staleness) => {
            if let Err(ref err) = res {
                warn!(target: "monitoring", error = %err, "health listener stopped");
            }
            res
        }
        _ = &mut shutdown => {
            Ok(())
        }
    }
}
