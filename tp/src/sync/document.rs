//! Remote document encoding
//!
//! Wire shape: `{ members: Member[], dinnerData: {key: status}, lastUpdate:
//! ISO-8601 }`. Decoding is all-or-nothing: a document that fails any check
//! is rejected whole and never partially applied.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashSet;
use tracing::debug;

use super::SyncError;
use crate::domain::{Member, Snapshot, StatusGrid};

/// Typed view of the remote document
///
/// Collections may be missing because the backend drops empty ones.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteDocument {
    #[serde(default)]
    members: Vec<Member>,
    #[serde(default)]
    dinner_data: StatusGrid,
    #[serde(default)]
    last_update: Option<DateTime<Utc>>,
}

/// Encode a snapshot for the wire
pub fn encode(snapshot: &Snapshot) -> Value {
    json!({
        "members": snapshot.members,
        "dinnerData": snapshot.status_grid,
        "lastUpdate": snapshot.last_update.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

/// Decode and validate a remote document
///
/// A missing `lastUpdate` is stamped with the receive time.
pub fn decode(value: Value) -> Result<Snapshot, SyncError> {
    let document: RemoteDocument =
        serde_json::from_value(value).map_err(|e| SyncError::Malformed(e.to_string()))?;

    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for member in &document.members {
        if member.id.trim().is_empty() {
            return Err(SyncError::Malformed("member with empty id".to_string()));
        }
        if member.name.trim().is_empty() {
            return Err(SyncError::Malformed(format!("member {} has an empty name", member.id)));
        }
        if member.name.trim() != member.name {
            return Err(SyncError::Malformed(format!(
                "member {} name has surrounding whitespace",
                member.id
            )));
        }
        if !ids.insert(member.id.as_str()) {
            return Err(SyncError::Malformed(format!("duplicate member id {}", member.id)));
        }
        if !names.insert(member.name.as_str()) {
            return Err(SyncError::Malformed(format!("duplicate member name {}", member.name)));
        }
    }

    debug!(
        members = document.members.len(),
        entries = document.dinner_data.len(),
        "decode: document accepted"
    );
    Ok(Snapshot {
        members: document.members,
        status_grid: document.dinner_data,
        last_update: document.last_update.unwrap_or_else(Utc::now),
    })
}
