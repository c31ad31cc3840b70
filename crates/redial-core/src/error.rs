//! Error types for the redial core
//!
//! Nothing in this crate is fatal to the process. The worst outcome of any
//! failure is a session that stops and reports a terminal status.
//!
//! # Error Categories
//!
//! - **Argument Errors** - `start` called with an empty phone number; rejected with no state change
//! - **Duplicate Start** - `start` while a session is already running; the running session is untouched
//! - **Dial Errors** - the platform refused to place the call; treated as an unanswered attempt
//! - **Event Source Errors** - call-state events are unavailable; the session runs on fallback deadlines
//!
//! ```rust
//! use autodial_redial_core::{DialError, RedialError};
//!
//! let err = RedialError::from(DialError::permission_denied("CALL_PHONE"));
//! assert!(err.is_recoverable());
//! assert_eq!(err.category(), "dial");
//! ```

use thiserror::Error;

/// Result type alias for redial operations
pub type RedialResult<T> = Result<T, RedialError>;

/// Errors surfaced by the redial controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RedialError {
    #[error("Invalid argument: {field} - {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("Dialing session already active for {phone_number}")]
    DuplicateStart { phone_number: String },

    #[error("Dial failed: {0}")]
    Dial(#[from] DialError),

    #[error("Call event source error: {reason}")]
    EventSource { reason: String },

    #[error("Redial controller has shut down")]
    ControllerClosed,
}

/// Failure reported by a [`Dialer`](crate::Dialer) when placing a call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialError {
    #[error("Permission denied: {permission}")]
    PermissionDenied { permission: String },

    #[error("Platform rejected call: {reason}")]
    PlatformRejected { reason: String },
}

impl DialError {
    pub fn permission_denied(permission: impl Into<String>) -> Self {
        Self::PermissionDenied { permission: permission.into() }
    }

    pub fn platform_rejected(reason: impl Into<String>) -> Self {
        Self::PlatformRejected { reason: reason.into() }
    }
}

impl RedialError {
    /// Create an invalid argument error
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an event source error
    pub fn event_source(reason: impl Into<String>) -> Self {
        Self::EventSource { reason: reason.into() }
    }

    /// Check if the failure leaves the session able to carry on
    ///
    /// Dial and event source failures are absorbed by the redial policy.
    /// Argument and duplicate-start errors need the caller to change
    /// what it is asking for.
    pub fn is_recoverable(&self) -> bool {
        match self {
            RedialError::Dial(_) | RedialError::EventSource { .. } => true,

            RedialError::InvalidArgument { .. }
            | RedialError::DuplicateStart { .. }
            | RedialError::ControllerClosed => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            RedialError::InvalidArgument { .. } => "argument",
            RedialError::DuplicateStart { .. } => "session",
            RedialError::Dial(_) => "dial",
            RedialError::EventSource { .. } => "event_source",
            RedialError::ControllerClosed => "system",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_error_converts_and_displays() {
        let err: RedialError = DialError::platform_rejected("no signal").into();
        assert_eq!(err.to_string(), "Dial failed: Platform rejected call: no signal");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_argument_errors_are_not_recoverable() {
        let err = RedialError::invalid_argument("phone_number", "cannot be empty");
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), "argument");
        assert!(err.to_string().contains("phone_number"));

        let dup = RedialError::DuplicateStart { phone_number: "555-1000".to_string() };
        assert!(!dup.is_recoverable());
        assert_eq!(dup.category(), "session");
    }
}
