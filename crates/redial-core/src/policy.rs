//! Redial policy
//!
//! Decides what happens once an attempt has been resolved. The decision only
//! depends on whether the attempt was effectively answered, the session's
//! `redial_after_answer` flag and how many attempts have been placed.
//!
//! | answered | redial_after_answer | decision                 |
//! |----------|---------------------|--------------------------|
//! | no       | any                 | redial (not answered)    |
//! | yes      | true                | redial (disconnected)    |
//! | yes      | false               | stop (completed)         |
//!
//! Whatever the table says, reaching [`MAX_ATTEMPTS`] stops the session.

use std::fmt;

use crate::config::{MAX_ATTEMPTS, REDIAL_DELAY};

/// Status shown while the redial delay runs
pub const WAITING_TO_REDIAL: &str = "Waiting to redial...";

/// Why the next attempt is being scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedialReason {
    /// The attempt ended without ever being answered
    NotAnswered,
    /// The attempt was answered, then disconnected, and redial-after-answer is on
    Disconnected,
}

/// Why the session is ending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The call was answered and redial-after-answer is off
    Completed,
    /// The attempt cap was reached
    MaxAttemptsReached,
    /// `stop` was called
    Requested,
}

/// Outcome of applying the policy to a resolved attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedialDecision {
    Redial(RedialReason),
    Stop(StopReason),
}

impl RedialDecision {
    pub fn is_redial(&self) -> bool {
        matches!(self, RedialDecision::Redial(_))
    }

    /// Human readable status for the UI collaborator
    ///
    /// `attempt_count` is the number of attempts placed so far.
    pub fn status_message(&self, attempt_count: u32) -> String {
        let delay_secs = REDIAL_DELAY.as_secs();
        let next = attempt_count + 1;
        match self {
            RedialDecision::Redial(RedialReason::NotAnswered) => format!(
                "Call not answered, redialing in {} seconds... ({}/{})",
                delay_secs, next, MAX_ATTEMPTS
            ),
            RedialDecision::Redial(RedialReason::Disconnected) => format!(
                "Call disconnected, redialing in {} seconds... ({}/{})",
                delay_secs, next, MAX_ATTEMPTS
            ),
            RedialDecision::Stop(StopReason::Completed) => {
                "Call completed, auto-dialer stopped".to_string()
            }
            RedialDecision::Stop(StopReason::MaxAttemptsReached) => format!(
                "Maximum attempts ({}) reached - Auto-calling stopped",
                MAX_ATTEMPTS
            ),
            RedialDecision::Stop(StopReason::Requested) => format!(
                "Auto-calling stopped. Total attempts: {}",
                attempt_count
            ),
        }
    }
}

impl fmt::Display for RedialDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedialDecision::Redial(RedialReason::NotAnswered) => write!(f, "redial (not answered)"),
            RedialDecision::Redial(RedialReason::Disconnected) => write!(f, "redial (disconnected)"),
            RedialDecision::Stop(StopReason::Completed) => write!(f, "stop (completed)"),
            RedialDecision::Stop(StopReason::MaxAttemptsReached) => write!(f, "stop (max attempts)"),
            RedialDecision::Stop(StopReason::Requested) => write!(f, "stop (requested)"),
        }
    }
}

/// Apply the redial policy, then the attempt cap
pub fn evaluate(answered: bool, redial_after_answer: bool, attempt_count: u32) -> RedialDecision {
    let decision = match (answered, redial_after_answer) {
        (false, _) => RedialDecision::Redial(RedialReason::NotAnswered),
        (true, true) => RedialDecision::Redial(RedialReason::Disconnected),
        (true, false) => RedialDecision::Stop(StopReason::Completed),
    };

    if attempt_count >= MAX_ATTEMPTS {
        return RedialDecision::Stop(StopReason::MaxAttemptsReached);
    }
    decision
}
