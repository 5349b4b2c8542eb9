//! Sync observer interface
//!
//! The bridge reports every state change and failure through
//! [`SyncObserver`]. [`SyncEventBus`] fans events out over a tokio broadcast
//! channel for front ends; [`LogObserver`] only traces them.

use chrono::{DateTime, Local, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::ChannelId;

/// Default event bus capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Something the sync bridge wants the UI to know
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Subscribed to a channel; the initial push is under way
    Connected { channel: ChannelId },
    /// A snapshot reached the remote
    Pushed { channel: ChannelId, at: DateTime<Utc> },
    /// A snapshot could not be delivered; local state is kept
    PushFailed { channel: ChannelId, error: String },
    /// A remote snapshot replaced local state
    RemoteApplied {
        channel: ChannelId,
        at: DateTime<Utc>,
        members: usize,
        entries: usize,
    },
    /// A remote notification was not applied
    RemoteIgnored { channel: ChannelId, reason: String },
    /// The listener could not be registered or was dropped by the remote
    SubscribeFailed { channel: ChannelId, error: String },
    /// No channel is active any more
    Disconnected,
}

impl SyncEvent {
    /// Event type name (for logging)
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Pushed { .. } => "pushed",
            Self::PushFailed { .. } => "push_failed",
            Self::RemoteApplied { .. } => "remote_applied",
            Self::RemoteIgnored { .. } => "remote_ignored",
            Self::SubscribeFailed { .. } => "subscribe_failed",
            Self::Disconnected => "disconnected",
        }
    }

    /// Whether this event reports a failure
    pub fn is_error(&self) -> bool {
        matches!(self, Self::PushFailed { .. } | Self::SubscribeFailed { .. })
    }

    /// One-line status text for display
    pub fn status_line(&self) -> String {
        match self {
            Self::Connected { channel } => format!("Sync: connected to '{}'", channel),
            Self::Pushed { at, .. } => format!("Sync: saved ({})", at.with_timezone(&Local).format("%H:%M:%S")),
            Self::PushFailed { error, .. } => format!("Sync: upload failed ({}), changes kept locally", error),
            Self::RemoteApplied { at, .. } => {
                format!("Sync: up to date ({})", at.with_timezone(&Local).format("%H:%M:%S"))
            }
            Self::RemoteIgnored { reason, .. } => format!("Sync: remote update ignored ({})", reason),
            Self::SubscribeFailed { error, .. } => format!("Sync: listening failed ({})", error),
            Self::Disconnected => "Sync: not configured".to_string(),
        }
    }
}

/// Receives sync events from the bridge
///
/// Called on the session task; implementations must not block.
pub trait SyncObserver: Send + Sync {
    fn on_sync_event(&self, event: &SyncEvent);
}

/// Observer that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl SyncObserver for LogObserver {
    fn on_sync_event(&self, event: &SyncEvent) {
        if event.is_error() {
            warn!(event_type = event.event_type(), status = %event.status_line(), "sync event");
        } else {
            info!(event_type = event.event_type(), status = %event.status_line(), "sync event");
        }
    }
}

/// Broadcast fan-out of sync events
///
/// Events emitted while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct SyncEventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl SyncEventBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "SyncEventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}

impl Default for SyncEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl SyncObserver for SyncEventBus {
    fn on_sync_event(&self, event: &SyncEvent) {
        debug!(event_type = event.event_type(), "SyncEventBus::emit");
        LogObserver.on_sync_event(event);
        let _ = self.tx.send(event.clone());
    }
}
