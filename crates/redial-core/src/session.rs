//! Dialing session state
//!
//! A [`DialSession`] is the mutable state of one run of the auto-redial
//! feature, from `start` to terminal stop. It is owned exclusively by the
//! controller task. The transition methods here only do bookkeeping; placing
//! calls, sleeping and emitting notifications is the controller's job.
//!
//! ```text
//!   Idle ──start──▶ Dialing ──resolve(redial)──▶ WaitingToRedial
//!                     ▲  │                              │
//!                     │  └──resolve(stop)──┐            │
//!                     └────redial timer────┼────────────┘
//!                                          ▼
//!   (any) ──────────stop──────────────▶ Stopped
//! ```

use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{SessionConfig, FALLBACK_DEADLINE, MAX_ATTEMPTS, REDIAL_DELAY};
use crate::error::RedialResult;
use crate::policy::{self, RedialDecision, StopReason, WAITING_TO_REDIAL};

/// Identifier of one dialing session
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Lifecycle state of a dialing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, no attempt placed yet
    Idle,
    /// An attempt has been placed and is unresolved
    Dialing,
    /// The last attempt is resolved and the redial delay is armed
    WaitingToRedial,
    /// Terminal
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Dialing => write!(f, "Dialing"),
            SessionState::WaitingToRedial => write!(f, "WaitingToRedial"),
            SessionState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Which of the two session timers is armed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Bounds how long an attempt may stay unresolved
    FallbackDeadline,
    /// Delay before the next attempt is placed
    RedialDelay,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerKind::FallbackDeadline => write!(f, "FallbackDeadline"),
            TimerKind::RedialDelay => write!(f, "RedialDelay"),
        }
    }
}

/// The single armed timer of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub kind: TimerKind,
    /// Attempt number the timer was armed for
    pub attempt: u32,
    pub deadline: Instant,
}

/// Outcome of resolving an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub attempt: u32,
    /// Effective answered: the ending signal or any earlier answered signal
    pub answered: bool,
    pub decision: RedialDecision,
    /// What the policy reported; on a redial the session then moves on to
    /// [`WAITING_TO_REDIAL`]
    pub message: String,
}

/// Point-in-time view of the controller, returned by `current_status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub session_id: Option<SessionId>,
    pub phone_number: Option<String>,
    pub active: bool,
    pub state: SessionState,
    pub attempt_count: u32,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Snapshot before any session has run
    pub fn idle() -> Self {
        Self {
            session_id: None,
            phone_number: None,
            active: false,
            state: SessionState::Idle,
            attempt_count: 0,
            status: "Idle".to_string(),
            updated_at: Utc::now(),
        }
    }
}

/// Mutable state of one auto-redial run
#[derive(Debug, Clone)]
pub struct DialSession {
    id: SessionId,
    phone_number: String,
    redial_after_answer: bool,
    attempt_count: u32,
    active: bool,
    attempt_in_progress: bool,
    ever_answered_this_attempt: bool,
    pending_timer: Option<PendingTimer>,
    state: SessionState,
    status: String,
    updated_at: DateTime<Utc>,
}

impl DialSession {
    /// Create an active session in `Idle`; rejects an empty phone number
    pub fn new(config: &SessionConfig) -> RedialResult<Self> {
        config.validate()?;
        let phone_number = config.normalized_number().to_string();
        Ok(Self {
            id: SessionId::new(),
            status: format!("Preparing to call {}...", phone_number),
            phone_number,
            redial_after_answer: config.redial_after_answer,
            attempt_count: 0,
            active: true,
            attempt_in_progress: false,
            ever_answered_this_attempt: false,
            pending_timer: None,
            state: SessionState::Idle,
            updated_at: Utc::now(),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    pub fn redial_after_answer(&self) -> bool {
        self.redial_after_answer
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn attempt_in_progress(&self) -> bool {
        self.attempt_in_progress
    }

    pub fn ever_answered_this_attempt(&self) -> bool {
        self.ever_answered_this_attempt
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn pending_timer(&self) -> Option<PendingTimer> {
        self.pending_timer
    }

    pub fn pending_fallback_deadline(&self) -> Option<Instant> {
        self.pending_timer
            .filter(|t| t.kind == TimerKind::FallbackDeadline)
            .map(|t| t.deadline)
    }

    pub fn pending_redial_timer(&self) -> Option<Instant> {
        self.pending_timer
            .filter(|t| t.kind == TimerKind::RedialDelay)
            .map(|t| t.deadline)
    }

    fn set_status(&mut self, status: String) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Place the next attempt: bumps the count and arms the fallback deadline
    ///
    /// Returns the attempt number, or `None` if the session cannot dial
    /// (stopped, an attempt still open, or the cap reached).
    pub fn begin_attempt(&mut self, now: Instant) -> Option<u32> {
        if !self.active || self.attempt_in_progress || self.attempt_count >= MAX_ATTEMPTS {
            return None;
        }
        self.attempt_count += 1;
        self.attempt_in_progress = true;
        self.ever_answered_this_attempt = false;
        self.pending_timer = Some(PendingTimer {
            kind: TimerKind::FallbackDeadline,
            attempt: self.attempt_count,
            deadline: now + FALLBACK_DEADLINE,
        });
        self.state = SessionState::Dialing;
        self.set_status(format!("Calling {}...", self.phone_number));
        Some(self.attempt_count)
    }

    /// Informational only; the fallback deadline is left as is
    pub fn note_ringing(&mut self) -> bool {
        if !self.active || !self.attempt_in_progress {
            return false;
        }
        self.set_status(format!("Calling {}...", self.phone_number));
        true
    }

    /// Record an answered signal for the open attempt
    ///
    /// The attempt stays open until an end signal or the fallback deadline.
    pub fn mark_answered(&mut self) -> bool {
        if !self.active || !self.attempt_in_progress {
            return false;
        }
        self.ever_answered_this_attempt = true;
        self.set_status(format!("Call in progress with {}...", self.phone_number));
        true
    }

    /// Resolve the open attempt and apply the redial policy
    ///
    /// Returns `None` when there is nothing to resolve: the attempt was
    /// already resolved, or the session was stopped in the meantime.
    pub fn resolve(&mut self, ended_answered: bool, now: Instant) -> Option<Resolution> {
        if !self.attempt_in_progress {
            return None;
        }
        self.attempt_in_progress = false;
        self.pending_timer = None;
        if !self.active {
            return None;
        }

        let answered = ended_answered || self.ever_answered_this_attempt;
        let decision = policy::evaluate(answered, self.redial_after_answer, self.attempt_count);
        let message = decision.status_message(self.attempt_count);
        match decision {
            RedialDecision::Redial(_) => {
                self.pending_timer = Some(PendingTimer {
                    kind: TimerKind::RedialDelay,
                    attempt: self.attempt_count,
                    deadline: now + REDIAL_DELAY,
                });
                self.state = SessionState::WaitingToRedial;
                self.set_status(WAITING_TO_REDIAL.to_string());
            }
            RedialDecision::Stop(reason) => {
                self.terminate(reason);
            }
        }

        Some(Resolution {
            attempt: self.attempt_count,
            answered,
            decision,
            message,
        })
    }

    /// Take the armed timer if its deadline has passed
    pub fn take_expired_timer(&mut self, now: Instant) -> Option<PendingTimer> {
        match self.pending_timer {
            Some(timer) if timer.deadline <= now => self.pending_timer.take(),
            _ => None,
        }
    }

    /// Cancel timers and make the session inactive
    ///
    /// Returns `false` if it was already stopped.
    pub fn terminate(&mut self, reason: StopReason) -> bool {
        if self.state == SessionState::Stopped {
            return false;
        }
        self.active = false;
        self.attempt_in_progress = false;
        self.pending_timer = None;
        self.state = SessionState::Stopped;
        let status = RedialDecision::Stop(reason).status_message(self.attempt_count);
        self.set_status(status);
        true
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            session_id: Some(self.id),
            phone_number: Some(self.phone_number.clone()),
            active: self.active,
            state: self.state,
            attempt_count: self.attempt_count,
            status: self.status.clone(),
            updated_at: self.updated_at,
        }
    }
}
