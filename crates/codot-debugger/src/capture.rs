//! Play a scene, collect what it prints, and summarize.
//!
//! The run is a small state machine:
//!
//! ```text
//! Idle -> Playing -> PollingLoop -> StoppedEarly | DurationElapsed -> Draining -> Done
//! ```
//!
//! The polling loop wakes every [`POLL_INTERVAL`] and leaves early when an
//! error is captured (with `stop_on_error`) or the cancellation token fires.

use std::time::Duration;

use codot_core::host::{EditorHost, HostError};
use codot_events::EventType;
use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::bridge::DebuggerBridge;
use crate::errors::DebuggerError;
use crate::log::{EntryFilter, LogEntry};

/// Polling period while the scene runs.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Parameters of one run.
#[derive(Clone, Debug)]
pub struct CaptureRequest {
    /// Scene to play; the editor's main scene when `None`.
    pub scene: Option<String>,
    /// How long to let it run.
    pub duration: Duration,
    /// Which entries to include in the summary.
    pub filter: EntryFilter,
    /// Stop as soon as an error is captured.
    pub stop_on_error: bool,
}

/// States of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    /// Nothing started yet.
    Idle,
    /// Asking the host to play.
    Playing,
    /// Waiting for the duration to pass.
    PollingLoop,
    /// Left the loop before the duration passed.
    StoppedEarly,
    /// The full duration passed.
    DurationElapsed,
    /// Stopping the game and collecting entries.
    Draining,
    /// Finished.
    Done,
}

/// Result of a run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CaptureSummary {
    /// Scene that was played.
    pub scene: Option<String>,
    /// Requested duration in seconds.
    pub duration: f64,
    /// Seconds actually spent running.
    pub elapsed: f64,
    /// Whether the run ended before `duration`.
    pub stopped_early: bool,
    /// Watermark taken before playing.
    pub since_id: u64,
    /// Highest entry id when the run finished.
    pub last_id: u64,
    /// Entries captured during the run that pass the filter.
    pub entries: Vec<LogEntry>,
    /// Errors captured during the run, regardless of filter.
    pub error_count: usize,
    /// Warnings captured during the run, regardless of filter.
    pub warning_count: usize,
    /// No errors were captured.
    pub success: bool,
}

/// Execute a run against `host`, reading output from `bridge`.
#[instrument(skip_all, fields(scene = request.scene.as_deref().unwrap_or("<main>"), duration = request.duration.as_secs_f64()))]
pub async fn run_and_capture(
    bridge: &DebuggerBridge,
    host: &dyn EditorHost,
    request: CaptureRequest,
    cancel: &CancellationToken,
) -> Result<CaptureSummary, DebuggerError> {
    let mut phase = RunPhase::Idle;
    let mut since_id = 0;
    let mut started = Instant::now();
    let mut elapsed = Duration::ZERO;
    let mut stopped_early = false;
    let mut summary = None;

    while phase != RunPhase::Done {
        debug!(?phase, "run_and_capture phase");
        phase = match phase {
            RunPhase::Idle => {
                if !host.is_available() {
                    return Err(HostError::Unavailable.into());
                }
                since_id = bridge.mark_position();
                RunPhase::Playing
            }
            RunPhase::Playing => {
                host.play(request.scene.clone())?;
                started = Instant::now();
                bridge.publish(EventType::GameStarted, json!({"scene": request.scene}));
                RunPhase::PollingLoop
            }
            RunPhase::PollingLoop => {
                let next = poll_until_done(bridge, &request, since_id, started, cancel).await;
                elapsed = started.elapsed();
                next
            }
            RunPhase::StoppedEarly => {
                stopped_early = true;
                RunPhase::Draining
            }
            RunPhase::DurationElapsed => RunPhase::Draining,
            RunPhase::Draining => {
                if host.is_playing() {
                    match host.stop() {
                        Ok(()) => bridge.publish(EventType::GameStopped, json!({"scene": request.scene})),
                        Err(err) => warn!(error = %err, "failed to stop game after capture"),
                    }
                }
                let page = bridge.get_entries(request.filter, since_id, usize::MAX);
                let (error_count, warning_count) = bridge.counts_since(since_id);
                summary = Some(CaptureSummary {
                    scene: request.scene.clone(),
                    duration: request.duration.as_secs_f64(),
                    elapsed: elapsed.as_secs_f64(),
                    stopped_early,
                    since_id,
                    last_id: page.latest_id,
                    entries: page.entries,
                    error_count,
                    warning_count,
                    success: error_count == 0,
                });
                RunPhase::Done
            }
            RunPhase::Done => RunPhase::Done,
        };
    }

    summary.ok_or_else(|| DebuggerError::InvalidArgument("capture finished without a summary".into()))
}

async fn poll_until_done(
    bridge: &DebuggerBridge,
    request: &CaptureRequest,
    since_id: u64,
    started: Instant,
    cancel: &CancellationToken,
) -> RunPhase {
    loop {
        if cancel.is_cancelled() {
            debug!("capture cancelled");
            return RunPhase::StoppedEarly;
        }
        if request.stop_on_error && bridge.counts_since(since_id).0 > 0 {
            debug!("error captured, stopping early");
            return RunPhase::StoppedEarly;
        }
        let spent = started.elapsed();
        if spent >= request.duration {
            return RunPhase::DurationElapsed;
        }
        let nap = POLL_INTERVAL.min(request.duration - spent);
        tokio::select! {
            () = tokio::time::sleep(nap) => {}
            () = cancel.cancelled() => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
