//! Validation errors for planner input

use thiserror::Error;

/// Rejected user input; the state is left unchanged
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Member name must not be empty")]
    EmptyName,

    #[error("A member named '{0}' already exists")]
    DuplicateName(String),

    #[error("Sync passphrase must not be empty")]
    EmptySecret,
}
