//! Planner session
//!
//! Actor that sequences planner mutations, local persistence and sync.

mod manager;
mod messages;

pub use manager::{PlannerHandle, PlannerSession};
pub use messages::{PlannerEvent, SessionCommand, SessionError, SessionResponse, SyncInfo};
