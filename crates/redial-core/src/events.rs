//! Call events in, notifications out
//!
//! Two directions of traffic cross this module:
//!
//! - **Inbound**: a [`CallEventSource`] reports call-state transitions
//!   (ringing, answered, ended) through the [`CallEventSink`] it was handed at
//!   subscription. Delivery is best effort; events may be dropped, delayed or
//!   never arrive.
//! - **Outbound**: the controller emits [`RedialEvent`] notifications on every
//!   transition, through a broadcast channel and an optional
//!   [`RedialEventHandler`]. They are advisory and may be ignored.
//!
//! ## Handling notifications
//!
//! ```rust
//! use autodial_redial_core::events::RedialEventHandler;
//! use async_trait::async_trait;
//!
//! struct StatusPrinter;
//!
//! #[async_trait]
//! impl RedialEventHandler for StatusPrinter {
//!     async fn on_status_changed(&self, status: &str) {
//!         println!("status: {}", status);
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::controller::Command;
use crate::error::RedialResult;
use crate::policy::StopReason;
use crate::session::SessionId;

/// Call-state transition reported by the platform for the current attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallEventKind {
    /// The remote side is ringing; informational only
    Ringing,
    /// The call went off hook; counts as answered for the whole attempt
    Answered,
    /// The call is back to idle
    Ended,
}

impl fmt::Display for CallEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallEventKind::Ringing => write!(f, "Ringing"),
            CallEventKind::Answered => write!(f, "Answered"),
            CallEventKind::Ended => write!(f, "Ended"),
        }
    }
}

/// Handle through which a call event source reports into the controller
///
/// A sink is bound to the session it was issued for. Events reported through
/// a sink from an earlier session are discarded by the controller. The sink
/// only holds a weak reference to the controller queue, so a source that
/// keeps it around does not keep the controller alive.
#[derive(Clone)]
pub struct CallEventSink {
    session_id: SessionId,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl CallEventSink {
    pub(crate) fn new(session_id: SessionId, commands: mpsc::WeakUnboundedSender<Command>) -> Self {
        Self { session_id, commands }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Report a call event; returns `false` once the controller is gone
    pub fn report(&self, kind: CallEventKind) -> bool {
        match self.commands.upgrade() {
            Some(commands) => commands
                .send(Command::CallEvent {
                    session_id: Some(self.session_id),
                    kind,
                })
                .is_ok(),
            None => false,
        }
    }
}

impl fmt::Debug for CallEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallEventSink")
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Subscription-based source of call-state transitions
///
/// The controller subscribes when a session starts and unsubscribes when it
/// stops. Implementations should drop the sink on `unsubscribe`.
pub trait CallEventSource: Send + Sync {
    /// Start delivering events for the new session to `sink`
    fn subscribe(&self, sink: CallEventSink) -> RedialResult<()>;

    /// Stop delivering events
    fn unsubscribe(&self);
}

/// Notification emitted by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedialEvent {
    SessionStarted {
        session_id: SessionId,
        phone_number: String,
        timestamp: DateTime<Utc>,
    },
    AttemptCountChanged {
        session_id: SessionId,
        count: u32,
        timestamp: DateTime<Utc>,
    },
    StatusChanged {
        session_id: SessionId,
        status: String,
        timestamp: DateTime<Utc>,
    },
    SessionStopped {
        session_id: SessionId,
        attempt_count: u32,
        reason: StopReason,
        timestamp: DateTime<Utc>,
    },
}

impl RedialEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            RedialEvent::SessionStarted { session_id, .. }
            | RedialEvent::AttemptCountChanged { session_id, .. }
            | RedialEvent::StatusChanged { session_id, .. }
            | RedialEvent::SessionStopped { session_id, .. } => *session_id,
        }
    }
}

/// Callback interface for the UI collaborator
///
/// Every method defaults to doing nothing.
#[async_trait]
pub trait RedialEventHandler: Send + Sync {
    async fn on_session_started(&self, _session_id: SessionId, _phone_number: &str) {}

    async fn on_attempt_count_changed(&self, _count: u32) {}

    async fn on_status_changed(&self, _status: &str) {}

    async fn on_session_stopped(&self, _attempt_count: u32, _reason: StopReason) {}

    /// Dispatch a notification to the specific callback
    async fn on_redial_event(&self, event: RedialEvent) {
        match event {
            RedialEvent::SessionStarted { session_id, phone_number, .. } => {
                self.on_session_started(session_id, &phone_number).await;
            }
            RedialEvent::AttemptCountChanged { count, .. } => {
                self.on_attempt_count_changed(count).await;
            }
            RedialEvent::StatusChanged { status, .. } => {
                self.on_status_changed(&status).await;
            }
            RedialEvent::SessionStopped { attempt_count, reason, .. } => {
                self.on_session_stopped(attempt_count, reason).await;
            }
        }
    }
}

/// Fans notifications out to broadcast subscribers and the optional handler
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<RedialEvent>,
    handler: Option<Arc<dyn RedialEventHandler>>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, handler: None }
    }

    pub fn with_handler(mut self, handler: Arc<dyn RedialEventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub async fn emit(&self, event: RedialEvent) {
        if let Some(handler) = &self.handler {
            handler.on_redial_event(event.clone()).await;
        }
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RedialEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
