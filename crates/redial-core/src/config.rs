//! Session configuration and fixed timing constants

use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{RedialError, RedialResult};

/// Hard ceiling on call attempts per session
pub const MAX_ATTEMPTS: u32 = 3;

/// How long an attempt may stay unresolved before it is treated as ended
pub const FALLBACK_DEADLINE: Duration = Duration::from_secs(15);

/// Delay between the end of one attempt and the next dial
pub const REDIAL_DELAY: Duration = Duration::from_secs(3);

/// Configuration consumed when a dialing session starts
///
/// ```rust
/// use autodial_redial_core::SessionConfig;
///
/// let config = SessionConfig::new("555-1000").with_redial_after_answer(false);
/// assert!(config.validate().is_ok());
/// assert!(!config.redial_after_answer);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Number to dial; required and non-empty
    pub phone_number: String,
    /// Keep redialing after a call that was answered and then disconnected
    #[serde(default = "default_redial_after_answer")]
    pub redial_after_answer: bool,
}

fn default_redial_after_answer() -> bool {
    true
}

impl SessionConfig {
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            redial_after_answer: default_redial_after_answer(),
        }
    }

    pub fn with_redial_after_answer(mut self, redial_after_answer: bool) -> Self {
        self.redial_after_answer = redial_after_answer;
        self
    }

    /// Reject configurations that cannot start a session
    pub fn validate(&self) -> RedialResult<()> {
        if self.phone_number.trim().is_empty() {
            return Err(RedialError::invalid_argument(
                "phone_number",
                "cannot be empty",
            ));
        }
        Ok(())
    }

    /// The number as it will be handed to the dialer
    pub fn normalized_number(&self) -> &str {
        self.phone_number.trim()
    }
}
