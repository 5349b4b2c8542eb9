//! RemoteStore trait definition

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use super::{ChannelId, SyncError};

/// Stream of remote document values for one channel
///
/// `Ok(None)` means the channel currently holds no document.
pub type RemoteStream = BoxStream<'static, Result<Option<Value>, SyncError>>;

/// Keyed, subscribable document store
///
/// Each channel holds one JSON document that is replaced wholesale on every
/// write.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Replace the document stored at `channel`
    async fn write(&self, channel: &ChannelId, document: Value) -> Result<(), SyncError>;

    /// Listen for changes at `channel`
    ///
    /// The stream yields the current value first, then every later change.
    async fn subscribe(&self, channel: &ChannelId) -> Result<RemoteStream, SyncError>;

    /// Backend name for logs and status output
    fn name(&self) -> &'static str;
}

/// Backend used when sync is switched off in configuration
///
/// Every operation fails with [`SyncError::Disabled`], which the observer
/// reports like any other sync failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledRemote;

#[async_trait]
impl RemoteStore for DisabledRemote {
    async fn write(&self, _channel: &ChannelId, _document: Value) -> Result<(), SyncError> {
        Err(SyncError::Disabled)
    }

    async fn subscribe(&self, _channel: &ChannelId) -> Result<RemoteStream, SyncError> {
        Err(SyncError::Disabled)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}
