//! Channel id derivation
//!
//! The passphrase is a routing key, not a credential: every device that
//! types the same passphrase lands on the same channel.

use serde::{Deserialize, Serialize};

/// Maximum channel id length in characters
pub const CHANNEL_MAX_LEN: usize = 20;

/// Sanitized remote location derived from a passphrase
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(String);

impl ChannelId {
    /// Derive the channel for a passphrase
    ///
    /// Characters outside `[a-zA-Z0-9_-]` become `_`, the result is
    /// lower-cased and cut to [`CHANNEL_MAX_LEN`] characters.
    pub fn derive(secret: &str) -> Self {
        let id = secret
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .take(CHANNEL_MAX_LEN)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
