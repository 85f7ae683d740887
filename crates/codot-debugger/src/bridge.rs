//! The debugger bridge: session table, output log and game-facing probes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use codot_core::host::{EditorHost, HostError};
use codot_core::ids::{IdGenerator, SessionId};
use codot_core::input::InputEvent;
use codot_core::time::unix_timestamp;
use codot_events::{EventBus, EventType};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::errors::DebuggerError;
use crate::log::{DebugLog, EntryFilter, LogEntry, LogEntryType};
use crate::messages::{self, GameMessage};
use crate::session::{DebuggerSession, SessionChannel, SessionInfo};

/// Poll interval for ping and screenshot acknowledgements.
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Ended sessions kept for `get_sessions`.
const ENDED_SESSION_HISTORY: usize = 16;

struct BridgeState {
    sessions: BTreeMap<SessionId, DebuggerSession>,
    log: DebugLog,
    seen: HashMap<String, u64>,
    capture_active: bool,
    last_test_result: Option<Value>,
    last_screenshot: Option<Value>,
}

impl BridgeState {
    fn current(&self) -> Option<&DebuggerSession> {
        self.sessions.values().rev().find(|s| s.active)
    }

    fn seen(&self, tag: &str) -> u64 {
        self.seen.get(tag).copied().unwrap_or(0)
    }
}

/// A page of log entries.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EntriesPage {
    /// Matching entries, oldest first.
    pub entries: Vec<LogEntry>,
    /// Highest id returned, or the watermark passed in when nothing matched.
    pub last_id: u64,
    /// Highest id in the log.
    pub latest_id: u64,
}

/// Outcome of a ping.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PingResult {
    /// Whether a pong arrived in time.
    pub pong: bool,
    /// Round-trip time when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    /// Timeout used, in seconds.
    pub timeout: f64,
    /// Session that was pinged.
    pub session_id: SessionId,
}

/// Where a synthesized input event went.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InputRouting {
    /// `true` when forwarded to the game process, `false` when applied to
    /// the editor's own input queue.
    pub routed_to_game: bool,
    /// Event kind.
    pub input_type: &'static str,
}

/// What `wait_for_output` waits for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitTarget {
    /// Any new entry.
    Any,
    /// An `error` or `script_error` entry.
    Error,
    /// A `warning` entry.
    Warning,
    /// An entry whose message contains this text.
    Substring(String),
}

impl WaitTarget {
    /// Parse the `wait_for` parameter. Anything other than a keyword is a
    /// substring.
    pub fn parse(s: &str) -> Self {
        match s {
            "any" => Self::Any,
            "error" => Self::Error,
            "warning" => Self::Warning,
            other => Self::Substring(other.to_owned()),
        }
    }

    fn matches(&self, entry: &LogEntry) -> bool {
        match self {
            Self::Any => true,
            Self::Error => entry.entry_type.is_error(),
            Self::Warning => entry.entry_type == LogEntryType::Warning,
            Self::Substring(s) => entry.message.contains(s.as_str()),
        }
    }
}

/// Outcome of `wait_for_output`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WaitResult {
    /// Whether a matching entry appeared.
    pub found: bool,
    /// The first matching entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<LogEntry>,
    /// Seconds spent waiting.
    pub waited: f64,
    /// Watermark taken when the wait started.
    pub since_id: u64,
}

/// Outcome of a screenshot request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScreenshotResult {
    /// The request was sent.
    pub requested: bool,
    /// The game acknowledged with `codot:screenshot_taken`.
    pub received: bool,
    /// Path reported by the game, or the requested path.
    pub path: String,
}

/// Bridge diagnostics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DebuggerStatus {
    /// Sessions known, ended ones included.
    pub session_count: usize,
    /// Sessions still connected.
    pub active_sessions: usize,
    /// The game reported `codot:ready` on the current session.
    pub game_capture_active: bool,
    /// Inbound message counts by tag.
    pub message_types_seen: BTreeMap<String, u64>,
    /// Entries currently retained.
    pub total_entries: usize,
    /// Highest entry id.
    pub last_id: u64,
    /// Payload of the last `codot:test_complete`.
    pub last_test_result: Option<Value>,
}

/// Session bridge to the instrumented game process.
pub struct DebuggerBridge {
    state: Mutex<BridgeState>,
    ids: IdGenerator,
    events: Option<Arc<EventBus>>,
}

impl DebuggerBridge {
    /// Create a bridge retaining at most `log_capacity` entries.
    pub fn new(log_capacity: usize) -> Self {
        Self {
            state: Mutex::new(BridgeState {
                sessions: BTreeMap::new(),
                log: DebugLog::new(log_capacity),
                seen: HashMap::new(),
                capture_active: false,
                last_test_result: None,
                last_screenshot: None,
            }),
            ids: IdGenerator::new(),
            events: None,
        }
    }

    /// Publish session lifecycle and captured output on `bus`.
    #[must_use]
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Publish on the attached bus, if any. Never called with the state
    /// lock held.
    pub fn publish(&self, event_type: EventType, data: Value) {
        if let Some(bus) = &self.events {
            let event = bus.publish(event_type, data);
            trace!(seq = event.seq, %event_type, "bridge published event");
        }
    }

    // ── Session lifecycle ───────────────────────────────────────────

    /// Register a newly connected game process. It becomes the current
    /// session.
    pub fn register_session(&self, channel: Arc<dyn SessionChannel>) -> SessionId {
        let id: SessionId = self.ids.next();
        let now = unix_timestamp();
        let mut state = self.state.lock();
        let _ = state.sessions.insert(
            id,
            DebuggerSession {
                id,
                active: true,
                started_at: now,
                last_seen: now,
                channel: Some(channel),
            },
        );
        state.capture_active = false;
        drop(state);
        info!(session_id = %id, "debugger session started");
        self.publish(EventType::GameStarted, json!({"session_id": id}));
        id
    }

    /// Mark a session ended and release its channel. Returns `false` if the
    /// session was unknown or already ended.
    pub fn end_session(&self, id: SessionId) -> bool {
        let mut state = self.state.lock();
        let ended = match state.sessions.get_mut(&id) {
            Some(session) if session.active => {
                session.active = false;
                session.channel = None;
                true
            }
            _ => false,
        };
        if ended {
            if state.current().is_none() {
                state.capture_active = false;
            }
            let ended_ids: Vec<SessionId> = state
                .sessions
                .values()
                .filter(|s| !s.active)
                .map(|s| s.id)
                .collect();
            if ended_ids.len() > ENDED_SESSION_HISTORY {
                for old in &ended_ids[..ended_ids.len() - ENDED_SESSION_HISTORY] {
                    let _ = state.sessions.remove(old);
                }
            }
        }
        drop(state);
        if ended {
            info!(session_id = %id, "debugger session ended");
            self.publish(EventType::GameStopped, json!({"session_id": id}));
        }
        ended
    }

    /// All known sessions, oldest first.
    pub fn get_sessions(&self) -> Vec<SessionInfo> {
        self.state.lock().sessions.values().map(DebuggerSession::info).collect()
    }

    /// The most recently registered active session.
    pub fn current_session(&self) -> Option<SessionInfo> {
        self.state.lock().current().map(DebuggerSession::info)
    }

    /// Whether a game process is connected.
    pub fn has_active_session(&self) -> bool {
        self.state.lock().current().is_some()
    }

    // ── Inbound ─────────────────────────────────────────────────────

    /// Consume one message from a session.
    pub fn ingest(&self, session: SessionId, message: &str, data: Value) {
        let now = unix_timestamp();
        let mut state = self.state.lock();
        if let Some(s) = state.sessions.get_mut(&session) {
            s.last_seen = now;
        }
        *state.seen.entry(message.to_owned()).or_insert(0) += 1;

        let mut captured = None;
        match message {
            messages::READY => {
                state.capture_active = true;
                debug!(session_id = %session, "game capture ready");
            }
            messages::ENTRY | messages::OUTPUT => {
                let (entry_type, text, source) = parse_entry(&data);
                let event = output_event(entry_type, &text, source.as_ref());
                let id = state.log.append(entry_type, text, now, source);
                trace!(session_id = %session, id, %entry_type, "captured entry");
                captured = Some(event);
            }
            messages::TEST_COMPLETE => {
                state.last_test_result = Some(data);
            }
            messages::SCREENSHOT_TAKEN => {
                state.last_screenshot = Some(data);
            }
            messages::PONG => {}
            other => {
                trace!(session_id = %session, tag = other, "unhandled session message");
            }
        }
        drop(state);

        if let Some((event_type, payload)) = captured {
            self.publish(event_type, payload);
        }
    }

    /// Record output produced outside any session (editor-side prints).
    pub fn append_local(&self, entry_type: LogEntryType, message: impl Into<String>) -> u64 {
        self.state.lock().log.append(entry_type, message.into(), unix_timestamp(), None)
    }

    // ── Log retrieval ───────────────────────────────────────────────

    /// Current highest entry id.
    pub fn mark_position(&self) -> u64 {
        self.state.lock().log.last_id()
    }

    /// The oldest `max` entries after `since_id` passing `filter`.
    pub fn get_entries(&self, filter: EntryFilter, since_id: u64, max: usize) -> EntriesPage {
        let state = self.state.lock();
        let entries = state.log.entries_after(filter, since_id, max);
        let last_id = entries.last().map_or(since_id, |e| e.id);
        EntriesPage {
            entries,
            last_id,
            latest_id: state.log.last_id(),
        }
    }

    /// `(errors, warnings)` captured after `since_id`.
    pub fn counts_since(&self, since_id: u64) -> (usize, usize) {
        self.state.lock().log.counts_after(since_id)
    }

    /// How many times `tag` has been received.
    pub fn seen_count(&self, tag: &str) -> u64 {
        self.state.lock().seen(tag)
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Send a tagged message to the current session.
    pub fn send_message(&self, tag: &str, data: Value) -> Result<SessionId, DebuggerError> {
        let (id, channel) = {
            let state = self.state.lock();
            let session = state.current().ok_or(DebuggerError::NoSession)?;
            let channel = session
                .channel
                .clone()
                .ok_or_else(|| DebuggerError::SessionInactive(session.id.to_string()))?;
            (session.id, channel)
        };
        if channel.send(GameMessage::new(tag, data)) {
            trace!(session_id = %id, tag, "sent session message");
            Ok(id)
        } else {
            warn!(session_id = %id, tag, "session channel rejected message");
            Err(DebuggerError::SessionInactive(id.to_string()))
        }
    }

    /// Send `codot:ping` and wait up to `timeout` for a `codot:pong`.
    ///
    /// A missing pong is reported as `pong: false`, not an error.
    pub async fn ping(&self, timeout: Duration) -> Result<PingResult, DebuggerError> {
        let baseline = self.seen_count(messages::PONG);
        let start = Instant::now();
        let session_id = self.send_message(messages::PING, json!({"sent_at": unix_timestamp()}))?;

        let pong = self.await_tag(messages::PONG, baseline, timeout).await;
        let latency_ms = pong.then(|| start.elapsed().as_secs_f64() * 1000.0);
        debug!(%session_id, pong, ?latency_ms, "ping finished");
        Ok(PingResult {
            pong,
            latency_ms,
            timeout: timeout.as_secs_f64(),
            session_id,
        })
    }

    /// Deliver an input event to the game when a session is active,
    /// otherwise to the editor host.
    pub fn route_input(&self, event: &InputEvent, host: &dyn EditorHost) -> Result<InputRouting, DebuggerError> {
        let input_type = event.kind();
        if self.has_active_session() {
            let data = serde_json::to_value(event).map_err(|e| DebuggerError::InvalidArgument(e.to_string()))?;
            match self.send_message(messages::INPUT, data) {
                Ok(_) => {
                    return Ok(InputRouting {
                        routed_to_game: true,
                        input_type,
                    });
                }
                Err(err) => {
                    debug!(error = %err, input_type, "forward to game failed, applying locally");
                }
            }
        }

        if !host.is_available() {
            return Err(HostError::Unavailable.into());
        }
        host.inject_input(event)?;
        Ok(InputRouting {
            routed_to_game: false,
            input_type,
        })
    }

    /// Wait for a log entry captured after the call matching `target`.
    pub async fn wait_for_output(
        &self,
        target: &WaitTarget,
        timeout: Duration,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> WaitResult {
        let since_id = self.mark_position();
        let start = Instant::now();
        let poll_interval = poll_interval.max(Duration::from_millis(10));
        loop {
            let entry = self.state.lock().log.find_after(since_id, |e| target.matches(e));
            if entry.is_some() || start.elapsed() >= timeout || cancel.is_cancelled() {
                return WaitResult {
                    found: entry.is_some(),
                    entry,
                    waited: start.elapsed().as_secs_f64(),
                    since_id,
                };
            }
            tokio::select! {
                () = tokio::time::sleep(poll_interval) => {}
                () = cancel.cancelled() => {}
            }
        }
    }

    /// Ask the game for a screenshot and wait for the acknowledgement.
    pub async fn take_screenshot(&self, path: &str, delay: Duration, timeout: Duration) -> Result<ScreenshotResult, DebuggerError> {
        if !self.has_active_session() {
            return Err(DebuggerError::NoSession);
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let baseline = self.seen_count(messages::SCREENSHOT_TAKEN);
        let _ = self.send_message(messages::SCREENSHOT, json!({"path": path}))?;
        let received = self.await_tag(messages::SCREENSHOT_TAKEN, baseline, timeout).await;

        let reported = received
            .then(|| {
                self.state
                    .lock()
                    .last_screenshot
                    .as_ref()
                    .and_then(|d| d.get("path"))
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
            .flatten();
        Ok(ScreenshotResult {
            requested: true,
            received,
            path: reported.unwrap_or_else(|| path.to_owned()),
        })
    }

    async fn await_tag(&self, tag: &str, baseline: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.seen_count(tag) > baseline {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(ACK_POLL_INTERVAL).await;
        }
    }

    // ── Status ──────────────────────────────────────────────────────

    /// Diagnostics snapshot.
    pub fn status(&self) -> DebuggerStatus {
        let state = self.state.lock();
        DebuggerStatus {
            session_count: state.sessions.len(),
            active_sessions: state.sessions.values().filter(|s| s.active).count(),
            game_capture_active: state.capture_active,
            message_types_seen: state.seen.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            total_entries: state.log.len(),
            last_id: state.log.last_id(),
            last_test_result: state.last_test_result.clone(),
        }
    }
}

impl Default for DebuggerBridge {
    fn default() -> Self {
        Self::new(crate::DEFAULT_LOG_CAPACITY)
    }
}

/// Bus event for a captured entry: script errors as `script_error`,
/// everything else as `debug_output`.
fn output_event(entry_type: LogEntryType, message: &str, source: Option<&Value>) -> (EventType, Value) {
    let severity = match entry_type {
        LogEntryType::Info => "info",
        LogEntryType::Warning => "warning",
        LogEntryType::Error | LogEntryType::ScriptError => "error",
    };
    let mut payload = json!({"message": message, "severity": severity});
    if let Some(source) = source {
        if let Some(path) = source.get("file").or_else(|| source.get("path")).filter(|v| v.is_string()) {
            payload["path"] = path.clone();
        }
        if let Some(line) = source.get("line").filter(|v| v.is_u64()) {
            payload["line"] = line.clone();
        }
    }
    let event_type = if entry_type == LogEntryType::ScriptError {
        EventType::ScriptError
    } else {
        EventType::DebugOutput
    };
    (event_type, payload)
}

fn parse_entry(data: &Value) -> (LogEntryType, String, Option<Value>) {
    match data {
        Value::String(s) => (LogEntryType::Info, s.clone(), None),
        Value::Object(map) => {
            let entry_type = map
                .get("type")
                .and_then(Value::as_str)
                .map_or(LogEntryType::Info, LogEntryType::from_reported);
            let message = map
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            let source = map.get("source").filter(|v| !v.is_null()).cloned();
            (entry_type, message, source)
        }
        other => (LogEntryType::Info, other.to_string(), None),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
