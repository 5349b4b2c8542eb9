//! Remote sync for Tapdinner
//!
//! Mirrors the planner onto a passphrase-derived channel of a remote
//! document store and applies remote overwrites.

use std::sync::Arc;

use tracing::debug;

mod bridge;
mod channel;
pub mod document;
mod error;
mod firebase;
mod memory;
mod observer;
mod remote;

pub use bridge::{LinkEvent, LinkEventKind, SyncBridge, SyncState};
pub use channel::{CHANNEL_MAX_LEN, ChannelId};
pub use error::SyncError;
pub use firebase::{FirebaseRemote, apply_patch, apply_put};
pub use memory::MemoryRemote;
pub use observer::{DEFAULT_EVENT_CAPACITY, LogObserver, SyncEvent, SyncEventBus, SyncObserver};
pub use remote::{DisabledRemote, RemoteStore, RemoteStream};

use crate::config::{SyncBackend, SyncConfig};

/// Create a remote store based on the backend specified in config
pub fn create_remote(config: &SyncConfig) -> Result<Arc<dyn RemoteStore>, SyncError> {
    debug!(backend = ?config.backend, "create_remote: called");
    match config.backend {
        SyncBackend::Firebase => {
            debug!(database_url = %config.database_url, "create_remote: creating Firebase remote");
            Ok(Arc::new(FirebaseRemote::new(
                &config.database_url,
                &config.root,
                config.timeout(),
            )?))
        }
        SyncBackend::None => {
            debug!("create_remote: sync disabled");
            Ok(Arc::new(DisabledRemote))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_remote_per_backend() {
        let mut config = SyncConfig::default();
        assert_eq!(create_remote(&config).unwrap().name(), "firebase");
        config.backend = SyncBackend::None;
        assert_eq!(create_remote(&config).unwrap().name(), "disabled");
    }
}
