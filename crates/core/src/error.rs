//! Errors raised by pure domain logic.

use thiserror::Error;

/// Rejection of a command or input by domain rules.
///
/// Stock shortages, reservation deadlines and session expiry are not here:
/// they are raised by the component that owns the resource.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or out-of-range input (empty name, zero price, no lines).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The command targets something that does not exist yet.
    #[error("not found")]
    NotFound,

    /// The command would create something that already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal consistency broken (a command routed to the wrong aggregate).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The lifecycle does not allow moving from `from` to `to`.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_message_names_both_states() {
        let err = DomainError::invalid_transition("pending", "delivered");
        assert_eq!(err.to_string(), "invalid transition from pending to delivered");
    }
}
