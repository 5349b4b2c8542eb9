//! In-process remote backend
//!
//! Shared between clones, so several sessions in one process behave like
//! devices on the same backend.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

use super::{ChannelId, RemoteStore, RemoteStream, SyncError};

/// Per-channel fan-out capacity
const CHANNEL_CAPACITY: usize = 64;

struct Slot {
    value: Option<Value>,
    tx: broadcast::Sender<Option<Value>>,
}

impl Slot {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { value: None, tx }
    }
}

#[derive(Default)]
struct Inner {
    channels: Mutex<HashMap<ChannelId, Slot>>,
    fail_writes: AtomicBool,
}

/// Document store held in memory
#[derive(Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Inner>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current document at `channel`
    pub fn document(&self, channel: &ChannelId) -> Option<Value> {
        let channels = self.inner.channels.lock().ok()?;
        channels.get(channel).and_then(|slot| slot.value.clone())
    }

    /// Make every subsequent write fail (simulates losing the network)
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of live subscribers on `channel`
    pub fn subscriber_count(&self, channel: &ChannelId) -> usize {
        self.inner
            .channels
            .lock()
            .ok()
            .and_then(|channels| channels.get(channel).map(|slot| slot.tx.receiver_count()))
            .unwrap_or(0)
    }

    fn poisoned() -> SyncError {
        SyncError::Subscribe("memory remote poisoned".to_string())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn write(&self, channel: &ChannelId, document: Value) -> Result<(), SyncError> {
        debug!(%channel, "MemoryRemote::write: called");
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::Rejected {
                status: 503,
                message: "memory remote offline".to_string(),
            });
        }
        let mut channels = self.inner.channels.lock().map_err(|_| Self::poisoned())?;
        let slot = channels.entry(channel.clone()).or_insert_with(Slot::new);
        let value = if document.is_null() { None } else { Some(document) };
        slot.value = value.clone();
        // No subscribers is fine
        let _ = slot.tx.send(value);
        Ok(())
    }

    async fn subscribe(&self, channel: &ChannelId) -> Result<RemoteStream, SyncError> {
        debug!(%channel, "MemoryRemote::subscribe: called");
        let (current, rx) = {
            let mut channels = self.inner.channels.lock().map_err(|_| Self::poisoned())?;
            let slot = channels.entry(channel.clone()).or_insert_with(Slot::new);
            (slot.value.clone(), slot.tx.subscribe())
        };

        let changes = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(value) => return Some((Ok::<_, SyncError>(value), rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "MemoryRemote::subscribe: subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(futures::stream::once(async move { Ok::<_, SyncError>(current) }).chain(changes).boxed())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
