//! Dialer capability
//!
//! The controller never touches the telephony platform itself. It asks a
//! [`Dialer`] to place each attempt and treats any failure as an attempt that
//! ended unanswered, so the redial policy still applies.

use async_trait::async_trait;

use crate::error::DialError;

/// Places outgoing call attempts on behalf of the controller
///
/// ```rust
/// use async_trait::async_trait;
/// use autodial_redial_core::{DialError, Dialer};
///
/// struct NoPermission;
///
/// #[async_trait]
/// impl Dialer for NoPermission {
///     async fn place(&self, _phone_number: &str) -> Result<(), DialError> {
///         Err(DialError::permission_denied("CALL_PHONE"))
///     }
/// }
/// ```
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Initiate a call to `phone_number`
    ///
    /// Returning `Ok` only means the platform accepted the request; whether
    /// the call is answered arrives later through the call event source or
    /// the fallback deadline.
    ///
    /// Runs on a task of its own. The attempt's fallback deadline is already
    /// running, and the future is dropped if the session stops first.
    async fn place(&self, phone_number: &str) -> Result<(), DialError>;
}
