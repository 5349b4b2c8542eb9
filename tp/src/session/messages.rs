//! Planner session messages
//!
//! Commands and responses for the actor pattern.

use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::codec::Status;
use crate::domain::{Member, Snapshot};
use crate::error::ValidationError;
use crate::planner::{Removal, WeekView};
use crate::sync::{ChannelId, SyncState};
use crate::week::WeekDirection;

/// Errors from session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Session closed")]
    Closed,
}

/// Response from session operations
pub type SessionResponse<T> = Result<T, SessionError>;

/// Sync status as seen by the UI
#[derive(Debug, Clone, PartialEq)]
pub struct SyncInfo {
    pub secret: Option<String>,
    pub channel: Option<ChannelId>,
    pub state: SyncState,
    pub backend: &'static str,
    /// Pushes queued but not yet reported back
    pub pending_pushes: usize,
}

/// Change notification for re-rendering
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerEvent {
    MembersChanged,
    GridChanged,
    WeekChanged { start: NaiveDate },
    /// A remote snapshot replaced members and grid
    RemoteApplied { members: usize, entries: usize },
}

/// Commands sent to the session actor
#[derive(Debug)]
pub enum SessionCommand {
    // Mutations
    AddMember {
        name: String,
        reply: oneshot::Sender<SessionResponse<Member>>,
    },
    RemoveMember {
        id: String,
        reply: oneshot::Sender<SessionResponse<Option<Removal>>>,
    },
    SetStatus {
        member_id: String,
        date: NaiveDate,
        reply: oneshot::Sender<SessionResponse<Option<Status>>>,
    },
    SetWeek {
        direction: WeekDirection,
        reply: oneshot::Sender<SessionResponse<NaiveDate>>,
    },
    ShowWeekOf {
        date: NaiveDate,
        reply: oneshot::Sender<SessionResponse<NaiveDate>>,
    },

    // Sync
    SetChannelSecret {
        secret: String,
        reply: oneshot::Sender<SessionResponse<ChannelId>>,
    },
    Disconnect {
        reply: oneshot::Sender<SessionResponse<()>>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },

    // Queries
    Members {
        reply: oneshot::Sender<SessionResponse<Vec<Member>>>,
    },
    FindMember {
        id_or_name: String,
        reply: oneshot::Sender<SessionResponse<Option<Member>>>,
    },
    WeekView {
        today: NaiveDate,
        reply: oneshot::Sender<SessionResponse<WeekView>>,
    },
    SyncInfo {
        reply: oneshot::Sender<SessionResponse<SyncInfo>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionResponse<Snapshot>>,
    },

    Shutdown {
        reply: oneshot::Sender<()>,
    },
}
