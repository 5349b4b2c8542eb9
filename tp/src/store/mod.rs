//! Local durability
//!
//! [`SlotStore`] is the raw collaborator: three independently addressable
//! string slots. [`LocalStore`] layers the planner's load/save contract on top
//! and never lets a storage failure reach the caller.

mod local;
mod slots;

use thiserror::Error;

pub use local::{LocalState, LocalStore};
pub use slots::{FileSlots, MemorySlots, Slot, SlotStore};

/// Errors from the slot layer
///
/// These never escape [`LocalStore`]; they are logged and replaced by
/// defaults.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on slot {slot}: {source}")]
    Io {
        slot: Slot,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt slot {slot}: {source}")]
    Corrupt {
        slot: Slot,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode slot {slot}: {source}")]
    Encode {
        slot: Slot,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}
