//! Tapdinner - shared household dinner planner
//!
//! Household members mark, per day of the week, whether they will eat dinner
//! at home. The planner is cached locally and, once a passphrase is set,
//! mirrored to a shared remote channel that every device with the same
//! passphrase listens on. The last writer wins.
//!
//! # Modules
//!
//! - [`codec`] - Status marks, date formats and grid keys
//! - [`week`] - Sunday-anchored week window
//! - [`planner`] - In-memory planner state and its mutations
//! - [`store`] - Local slot persistence
//! - [`sync`] - Remote sync bridge and backends
//! - [`session`] - Actor that sequences mutations, persistence and sync
//! - [`render`] - Terminal rendering
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod planner;
pub mod render;
pub mod session;
pub mod store;
pub mod sync;
pub mod week;

// Re-export commonly used types
pub use codec::Status;
pub use config::{Config, StorageConfig, SyncBackend, SyncConfig};
pub use domain::{Member, Snapshot, StatusGrid};
pub use error::ValidationError;
pub use planner::{Planner, Removal, WeekRow, WeekView};
pub use session::{PlannerEvent, PlannerHandle, PlannerSession, SessionError, SessionResponse, SyncInfo};
pub use store::{FileSlots, LocalState, LocalStore, MemorySlots, Slot, SlotStore, StorageError};
pub use sync::{
    ChannelId, DisabledRemote, FirebaseRemote, LogObserver, MemoryRemote, RemoteStore, SyncBridge, SyncError,
    SyncEvent, SyncEventBus, SyncObserver, SyncState, create_remote,
};
pub use week::{DayColumn, WeekDirection, WeekWindow};
