//! LocalStore - load/save contract over the slot collaborator

use std::sync::Arc;
use tracing::{debug, warn};

use super::{Slot, SlotStore, StorageError};
use crate::domain::{Member, StatusGrid};

/// Everything the local store persists
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalState {
    pub members: Vec<Member>,
    pub status_grid: StatusGrid,
    pub sync_secret: Option<String>,
}

/// Durable client-side cache of the planner
///
/// Every slot is read and written independently. Failures are logged and
/// degrade to defaults; nothing here returns an error.
#[derive(Clone)]
pub struct LocalStore {
    slots: Arc<dyn SlotStore>,
}

impl LocalStore {
    pub fn new(slots: impl SlotStore + 'static) -> Self {
        Self { slots: Arc::new(slots) }
    }

    pub fn from_shared(slots: Arc<dyn SlotStore>) -> Self {
        Self { slots }
    }

    /// Read all three slots, substituting defaults for anything missing or corrupt
    pub fn load(&self) -> LocalState {
        debug!("LocalStore::load: called");
        let members = self.read_json::<Vec<Member>>(Slot::Members).unwrap_or_default();
        let status_grid = self.read_json::<StatusGrid>(Slot::StatusGrid).unwrap_or_default();
        let sync_secret = match self.slots.get(Slot::SyncSecret) {
            Ok(Some(secret)) if !secret.trim().is_empty() => Some(secret.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "LocalStore::load: sync secret unreadable, treating as unset");
                None
            }
        };
        debug!(
            members = members.len(),
            entries = status_grid.len(),
            has_secret = sync_secret.is_some(),
            "LocalStore::load: done"
        );
        LocalState {
            members,
            status_grid,
            sync_secret,
        }
    }

    /// Write members and grid; write the secret only when one is given
    ///
    /// A `None` secret leaves the stored passphrase as it is.
    pub fn save(&self, members: &[Member], status_grid: &StatusGrid, sync_secret: Option<&str>) {
        debug!(
            members = members.len(),
            entries = status_grid.len(),
            has_secret = sync_secret.is_some(),
            "LocalStore::save: called"
        );
        if let Err(e) = self.write_json(Slot::Members, members) {
            warn!(error = %e, "LocalStore::save: failed to write members");
        }
        if let Err(e) = self.write_json(Slot::StatusGrid, status_grid) {
            warn!(error = %e, "LocalStore::save: failed to write status grid");
        }
        if let Some(secret) = sync_secret
            && let Err(e) = self.slots.set(Slot::SyncSecret, secret)
        {
            warn!(error = %e, "LocalStore::save: failed to write sync secret");
        }
    }

    /// Convenience for saving a whole [`LocalState`]
    pub fn save_state(&self, state: &LocalState) {
        self.save(&state.members, &state.status_grid, state.sync_secret.as_deref());
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, slot: Slot) -> Option<T> {
        match self.slots.get(slot) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(source) => {
                    let e = StorageError::Corrupt { slot, source };
                    warn!(error = %e, "LocalStore::read_json: using default");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "LocalStore::read_json: using default");
                None
            }
        }
    }

    fn write_json<T: serde::Serialize + ?Sized>(&self, slot: Slot, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value).map_err(|source| StorageError::Encode { slot, source })?;
        self.slots.set(slot, &raw)
    }
}
