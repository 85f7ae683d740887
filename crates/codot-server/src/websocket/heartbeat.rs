//! Heartbeat ping/pong liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Consecutive silent ticks tolerated before the client counts as dead.
fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    u32::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u32::MAX)
        .max(1)
}

/// Watch a connection's alive flag.
///
/// At each `interval` tick the flag is checked and reset. Once the client
/// has been silent for `timeout / interval` consecutive ticks (at least 1)
/// the loop returns [`HeartbeatResult::TimedOut`]. The session's writer
/// sends the actual Ping frames on the same interval.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check_interval = time::interval(interval);
    // The first tick fires immediately.
    let _ = check_interval.tick().await;
    let max_missed = max_missed(interval, timeout);
    let mut missed_pongs: u32 = 0;

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if connection.check_alive() {
                    missed_pongs = 0;
                } else {
                    missed_pongs += 1;
                    if missed_pongs >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codot_core::ids::ConnectionId;
    use tokio::sync::mpsc;

    fn make_connection() -> Arc<ClientConnection> {
        let (tx, _rx) = mpsc::channel(32);
        Arc::new(ClientConnection::new(ConnectionId::new(1), tx))
    }

    #[test]
    fn max_missed_from_timeout_and_interval() {
        assert_eq!(max_missed(Duration::from_secs(30), Duration::from_secs(90)), 3);
        assert_eq!(max_missed(Duration::from_millis(100), Duration::from_millis(50)), 1);
        assert_eq!(max_missed(Duration::from_millis(250), Duration::from_secs(1)), 4);
    }

    #[tokio::test]
    async fn heartbeat_cancelled() {
        let conn = make_connection();
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();
        let handle = tokio::spawn(async move {
            run_heartbeat(conn, Duration::from_secs(100), Duration::from_secs(300), cancel2).await
        });
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_times_out() {
        let conn = make_connection();
        let _ = conn.check_alive();
        let result = run_heartbeat(
            conn,
            Duration::from_millis(100),
            Duration::from_millis(300),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result, HeartbeatResult::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn active_client_stays_alive() {
        let conn = make_connection();
        let conn2 = conn.clone();
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();
        let handle = tokio::spawn(async move {
            run_heartbeat(conn2, Duration::from_millis(100), Duration::from_millis(200), cancel2).await
        });

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            conn.mark_alive();
        }
        assert!(!handle.is_finished());
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }
}
