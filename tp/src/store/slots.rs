//! Slot storage backends

use fs2::FileExt;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::StorageError;

/// The three persisted slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// JSON list of members
    Members,
    /// JSON map of grid key to status
    StatusGrid,
    /// Raw sync passphrase
    SyncSecret,
}

impl Slot {
    /// All slots, in load order
    pub const ALL: [Slot; 3] = [Slot::Members, Slot::StatusGrid, Slot::SyncSecret];

    /// Storage key for the slot
    pub fn key(&self) -> &'static str {
        match self {
            Self::Members => "tapDinnerMembers",
            Self::StatusGrid => "tapDinnerData",
            Self::SyncSecret => "tapDinnerSyncKey",
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Get/set access to named string slots
pub trait SlotStore: Send + Sync {
    /// Read a slot; `Ok(None)` when it was never written
    fn get(&self, slot: Slot) -> Result<Option<String>, StorageError>;

    /// Overwrite a slot
    fn set(&self, slot: Slot, value: &str) -> Result<(), StorageError>;
}

/// One file per slot inside a directory
///
/// Writes go to a temp file that is renamed into place while holding an
/// exclusive lock on `.lock`, so concurrent `tp` processes never see a torn
/// slot.
#[derive(Debug, Clone)]
pub struct FileSlots {
    dir: PathBuf,
}

impl FileSlots {
    /// Open (creating if needed) a slot directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StorageError::Unavailable(format!("{}: {}", dir.display(), e)))?;
        debug!(dir = %dir.display(), "FileSlots::open: opened slot directory");
        Ok(Self { dir })
    }

    /// Directory holding the slot files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot: Slot) -> PathBuf {
        self.dir.join(slot.key())
    }

    fn lock_file(&self, slot: Slot) -> Result<fs::File, StorageError> {
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join(".lock"))
            .map_err(|source| StorageError::Io { slot, source })?;
        file.lock_exclusive().map_err(|source| StorageError::Io { slot, source })?;
        Ok(file)
    }
}

impl SlotStore for FileSlots {
    fn get(&self, slot: Slot) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.slot_path(slot)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { slot, source }),
        }
    }

    fn set(&self, slot: Slot, value: &str) -> Result<(), StorageError> {
        debug!(%slot, bytes = value.len(), "FileSlots::set: called");
        let lock = self.lock_file(slot)?;
        let tmp = self.dir.join(format!("{}.tmp", slot.key()));
        let result = fs::write(&tmp, value).and_then(|_| fs::rename(&tmp, self.slot_path(slot)));
        // Unlock errors are irrelevant once the rename has happened
        let _ = lock.unlock();
        result.map_err(|source| StorageError::Io { slot, source })
    }
}

/// In-process slots, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemorySlots {
    inner: Arc<Mutex<HashMap<Slot, String>>>,
}

impl MemorySlots {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlotStore for MemorySlots {
    fn get(&self, slot: Slot) -> Result<Option<String>, StorageError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| StorageError::Unavailable("memory slots poisoned".to_string()))?;
        Ok(inner.get(&slot).cloned())
    }

    fn set(&self, slot: Slot, value: &str) -> Result<(), StorageError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StorageError::Unavailable("memory slots poisoned".to_string()))?;
        inner.insert(slot, value.to_string());
        Ok(())
    }
}
