//! Domain types shared by the planner, the local store and the sync bridge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::codec::Status;

/// Status marks keyed by `"<memberId>_<YYYY-MM-DD>"`, kept in key order
pub type StatusGrid = BTreeMap<String, Status>;

/// A household member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Opaque creation-time-derived id
    pub id: String,
    /// Display name, unique among members
    pub name: String,
}

impl Member {
    /// Create a member with a freshly generated id
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        debug!(%name, "Member::new: called");
        Self {
            id: generate_member_id(),
            name,
        }
    }

    /// Create with a specific id (for testing or decoding)
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Generate a member id
///
/// UUIDv7 is time-ordered and monotonic within a process, so ids are never
/// reused.
pub fn generate_member_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// The full shared state, exchanged wholesale with the remote
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub members: Vec<Member>,
    pub status_grid: StatusGrid,
    pub last_update: DateTime<Utc>,
}

impl Snapshot {
    /// Whether there is nothing worth applying
    pub fn is_blank(&self) -> bool {
        self.members.is_empty() && self.status_grid.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: std::collections::HashSet<String> = (0..1000).map(|_| generate_member_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_generated_id_has_no_key_separator() {
        assert!(!generate_member_id().contains(crate::codec::KEY_SEPARATOR));
    }

    #[test]
    fn test_member_json_shape() {
        let member = Member::with_id("1700000000000", "Mom");
        let json = serde_json::to_value(&member).unwrap();
        assert_eq!(json, serde_json::json!({"id": "1700000000000", "name": "Mom"}));
    }

    #[test]
    fn test_blank_snapshot() {
        let mut snapshot = Snapshot {
            members: Vec::new(),
            status_grid: StatusGrid::new(),
            last_update: Utc::now(),
        };
        assert!(snapshot.is_blank());
        snapshot.status_grid.insert("m1_2024-01-07".to_string(), Status::Eating);
        assert!(!snapshot.is_blank());
    }
}
