// ABOUTME: Typed publish/subscribe hub decoupling event producers and consumers.
// ABOUTME: One independent broadcast channel per event kind; no buffering or replay.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::actions::Action;
use crate::context::ContextSnapshot;
use crate::protocol::{Inbound, Outbound};

/// Severity of a log entry. Matches the wire-level `level` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

/// A single entry in the user-visible log feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Strictly increasing per-bus id, never reused.
    pub id: u64,
    /// RFC 3339 timestamp assigned at publish time.
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

/// Aggregate activity state, recomputed by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    Idle,
    Processing { active: usize },
    Error { message: String },
}

/// Connection lifecycle states. Transitions happen only inside the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Error,
}

/// A bridge state transition with an optional human-readable reason.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeStateEvent {
    pub state: ConnectionState,
    pub message: Option<String>,
}

/// A frame crossing the bridge, republished for any interested subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeTraffic {
    Inbound(Inbound),
    Outbound(Outbound),
}

/// Publish/subscribe hub for the six event kinds the system exchanges.
///
/// Each kind gets its own broadcast channel; publishing to one never touches
/// the others. The bus performs no buffering or replay; a subscriber only
/// sees events published after it subscribed. Any "keep last N" behavior
/// belongs to a downstream subscriber.
pub struct EventBus {
    status_tx: broadcast::Sender<StatusEvent>,
    log_tx: broadcast::Sender<LogEntry>,
    context_tx: broadcast::Sender<ContextSnapshot>,
    actions_tx: broadcast::Sender<Vec<Action>>,
    bridge_state_tx: broadcast::Sender<BridgeStateEvent>,
    traffic_tx: broadcast::Sender<BridgeTraffic>,
    log_seq: AtomicU64,
    disposed: AtomicBool,
}

const CHANNEL_CAPACITY: usize = 256;

impl EventBus {
    pub fn new() -> Self {
        Self {
            status_tx: broadcast::channel(CHANNEL_CAPACITY).0,
            log_tx: broadcast::channel(CHANNEL_CAPACITY).0,
            context_tx: broadcast::channel(CHANNEL_CAPACITY).0,
            actions_tx: broadcast::channel(CHANNEL_CAPACITY).0,
            bridge_state_tx: broadcast::channel(CHANNEL_CAPACITY).0,
            traffic_tx: broadcast::channel(CHANNEL_CAPACITY).0,
            log_seq: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    /// Publish a log entry with a fresh sequence id and timestamp.
    ///
    /// Returns the entry as published. The entry is also mirrored to
    /// `tracing` at the matching level so operators see the feed without a
    /// bus subscription.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let message = message.into();
        let entry = LogEntry {
            id: self.log_seq.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now().to_rfc3339(),
            level,
            message,
        };
        match level {
            LogLevel::Debug => tracing::debug!("{}", entry.message),
            LogLevel::Info => tracing::info!("{}", entry.message),
            LogLevel::Warning => tracing::warn!("{}", entry.message),
            LogLevel::Error => tracing::error!("{}", entry.message),
        }
        if !self.is_disposed() {
            // Ignore send errors (no subscribers connected)
            let _ = self.log_tx.send(entry.clone());
        }
        entry
    }

    pub fn info(&self, message: impl Into<String>) -> LogEntry {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: impl Into<String>) -> LogEntry {
        self.log(LogLevel::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> LogEntry {
        self.log(LogLevel::Error, message)
    }

    pub fn publish_status(&self, status: StatusEvent) {
        if !self.is_disposed() {
            let _ = self.status_tx.send(status);
        }
    }

    pub fn publish_context(&self, snapshot: ContextSnapshot) {
        if !self.is_disposed() {
            let _ = self.context_tx.send(snapshot);
        }
    }

    pub fn publish_actions(&self, actions: Vec<Action>) {
        if !self.is_disposed() {
            let _ = self.actions_tx.send(actions);
        }
    }

    pub fn publish_bridge_state(&self, event: BridgeStateEvent) {
        if !self.is_disposed() {
            let _ = self.bridge_state_tx.send(event);
        }
    }

    pub fn publish_traffic(&self, traffic: BridgeTraffic) {
        if !self.is_disposed() {
            let _ = self.traffic_tx.send(traffic);
        }
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEntry> {
        self.log_tx.subscribe()
    }

    pub fn subscribe_context(&self) -> broadcast::Receiver<ContextSnapshot> {
        self.context_tx.subscribe()
    }

    pub fn subscribe_actions(&self) -> broadcast::Receiver<Vec<Action>> {
        self.actions_tx.subscribe()
    }

    pub fn subscribe_bridge_state(&self) -> broadcast::Receiver<BridgeStateEvent> {
        self.bridge_state_tx.subscribe()
    }

    pub fn subscribe_traffic(&self) -> broadcast::Receiver<BridgeTraffic> {
        self.traffic_tx.subscribe()
    }

    /// Permanently stop publishes from reaching subscribers.
    ///
    /// Repeated disposal is a no-op. Subscribers keep their receivers; they
    /// simply never see another event.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
