//! The redial controller
//!
//! [`RedialController`] is a cheap, cloneable handle onto a single controller
//! task. The task is the one logical event queue every state transition runs
//! on: commands from handles, call events from the subscribed source and the
//! session's one armed deadline are multiplexed with `tokio::select!`, so no
//! two transitions ever interleave.
//!
//! ```text
//!  RedialController ──┐
//!  CallEventSink ─────┼──▶ command queue ──▶ ControllerTask ──▶ Dialer
//!  pending deadline ──┘                         │
//!                                               ├──▶ watch (StatusSnapshot)
//!                                               └──▶ EventEmitter (RedialEvent)
//! ```
//!
//! Both racing signal sources of an attempt, an `Ended` event and the
//! fallback deadline, end up in [`DialSession::resolve`], which only resolves
//! an attempt once.
//!
//! The dialer runs on its own task and posts its result back onto the queue,
//! so a slow platform never holds up `stop`, call events or deadlines.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use autodial_redial_core::{DialError, Dialer, RedialController, SessionConfig};
//!
//! struct PlatformDialer;
//!
//! #[async_trait]
//! impl Dialer for PlatformDialer {
//!     async fn place(&self, phone_number: &str) -> Result<(), DialError> {
//!         println!("dialing {}", phone_number);
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = RedialController::builder(Arc::new(PlatformDialer)).build();
//! controller.start(SessionConfig::new("555-1000")).await?;
//!
//! let status = controller.current_status();
//! println!("attempt {}: {}", status.attempt_count, status.status);
//!
//! controller.stop().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{SessionConfig, MAX_ATTEMPTS};
use crate::dialer::Dialer;
use crate::error::{DialError, RedialError, RedialResult};
use crate::events::{
    CallEventKind, CallEventSink, CallEventSource, EventEmitter, RedialEvent, RedialEventHandler,
};
use crate::policy::{RedialDecision, StopReason};
use crate::session::{DialSession, SessionId, StatusSnapshot, TimerKind};

/// Message on the controller's event queue
#[derive(Debug)]
pub(crate) enum Command {
    Start {
        config: SessionConfig,
        reply: oneshot::Sender<RedialResult<()>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    /// `session_id` is `None` when reported through the controller handle,
    /// which always targets the current session
    CallEvent {
        session_id: Option<SessionId>,
        kind: CallEventKind,
    },
    /// Posted by the dial task once `Dialer::place` returns
    DialResult {
        session_id: SessionId,
        attempt: u32,
        result: Result<(), DialError>,
    },
}

/// Builder for a [`RedialController`]
pub struct RedialControllerBuilder {
    dialer: Arc<dyn Dialer>,
    event_source: Option<Arc<dyn CallEventSource>>,
    event_handler: Option<Arc<dyn RedialEventHandler>>,
    event_capacity: usize,
}

impl RedialControllerBuilder {
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self {
            dialer,
            event_source: None,
            event_handler: None,
            event_capacity: 256,
        }
    }

    /// Source of call-state events; without one every attempt ends on its fallback deadline
    pub fn event_source(mut self, source: Arc<dyn CallEventSource>) -> Self {
        self.event_source = Some(source);
        self
    }

    pub fn event_handler(mut self, handler: Arc<dyn RedialEventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Capacity of the notification broadcast channel
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Spawn the controller task on the current tokio runtime
    pub fn build(self) -> RedialController {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::idle());

        let mut emitter = EventEmitter::new(self.event_capacity);
        if let Some(handler) = self.event_handler {
            emitter = emitter.with_handler(handler);
        }

        let task = ControllerTask {
            commands: commands_rx,
            sink_commands: commands_tx.downgrade(),
            dialer: self.dialer,
            event_source: self.event_source,
            subscribed: false,
            dial_task: None,
            emitter: emitter.clone(),
            status: status_tx,
            session: None,
        };
        tokio::spawn(task.run());

        RedialController {
            commands: commands_tx,
            status: status_rx,
            emitter,
        }
    }
}

/// Handle onto the auto-redial controller
///
/// Dropping the last handle shuts the controller down, stopping any running
/// session.
#[derive(Clone)]
pub struct RedialController {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<StatusSnapshot>,
    emitter: EventEmitter,
}

impl RedialController {
    pub fn builder(dialer: Arc<dyn Dialer>) -> RedialControllerBuilder {
        RedialControllerBuilder::new(dialer)
    }

    /// Start a dialing session and place the first attempt
    ///
    /// Fails with [`RedialError::InvalidArgument`] for an empty number and
    /// [`RedialError::DuplicateStart`] if a session is already active; in both
    /// cases nothing changes.
    pub async fn start(&self, config: SessionConfig) -> RedialResult<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Start { config, reply })
            .map_err(|_| RedialError::ControllerClosed)?;
        response.await.map_err(|_| RedialError::ControllerClosed)?
    }

    pub async fn start_dialing(
        &self,
        phone_number: impl Into<String>,
        redial_after_answer: bool,
    ) -> RedialResult<()> {
        self.start(SessionConfig::new(phone_number).with_redial_after_answer(redial_after_answer))
            .await
    }

    /// Stop the running session, if any. Idempotent.
    pub async fn stop(&self) {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Stop { reply }).is_err() {
            return;
        }
        let _ = response.await;
    }

    /// Report a call event for the current attempt
    ///
    /// Events that arrive with no attempt in progress are ignored.
    pub fn report_call_event(&self, kind: CallEventKind) {
        let _ = self.commands.send(Command::CallEvent { session_id: None, kind });
    }

    /// Snapshot of the current session; no side effects
    pub fn current_status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.status.borrow().active
    }

    /// Wait until no session is running
    pub async fn wait_until_inactive(&self) -> RedialResult<StatusSnapshot> {
        let mut status = self.status.clone();
        let snapshot = status
            .wait_for(|snapshot| !snapshot.active)
            .await
            .map_err(|_| RedialError::ControllerClosed)?;
        Ok(snapshot.clone())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RedialEvent> {
        self.emitter.subscribe()
    }
}

struct ControllerTask {
    commands: mpsc::UnboundedReceiver<Command>,
    sink_commands: mpsc::WeakUnboundedSender<Command>,
    dialer: Arc<dyn Dialer>,
    event_source: Option<Arc<dyn CallEventSource>>,
    subscribed: bool,
    dial_task: Option<JoinHandle<()>>,
    emitter: EventEmitter,
    status: watch::Sender<StatusSnapshot>,
    session: Option<DialSession>,
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl ControllerTask {
    async fn run(mut self) {
        debug!("Redial controller started");
        loop {
            let deadline = self
                .session
                .as_ref()
                .and_then(|session| session.pending_timer())
                .map(|timer| timer.deadline);

            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => {
                        self.handle_command(command).await;
                        // A busy queue must not hold back an elapsed deadline
                        self.on_deadline().await;
                    }
                    None => break,
                },

                _ = sleep_until_deadline(deadline) => self.on_deadline().await,
            }
        }

        debug!("All controller handles dropped, shutting down");
        self.stop_session(StopReason::Requested).await;
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { config, reply } => {
                let result = self.start_session(config).await;
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                self.stop_session(StopReason::Requested).await;
                let _ = reply.send(());
            }
            Command::CallEvent { session_id, kind } => {
                self.on_call_event(session_id, kind).await;
            }
            Command::DialResult { session_id, attempt, result } => {
                self.on_dial_result(session_id, attempt, result).await;
            }
        }
    }

    async fn start_session(&mut self, config: SessionConfig) -> RedialResult<()> {
        if let Some(session) = self.session.as_ref().filter(|s| s.is_active()) {
            warn!(
                session_id = %session.id(),
                "Start requested while a session is active, ignoring"
            );
            return Err(RedialError::DuplicateStart {
                phone_number: session.phone_number().to_string(),
            });
        }

        let session = match DialSession::new(&config) {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Refusing to start dialing session");
                return Err(e);
            }
        };
        let session_id = session.id();
        let phone_number = session.phone_number().to_string();
        info!(
            session_id = %session_id,
            phone_number = %phone_number,
            redial_after_answer = session.redial_after_answer(),
            "Starting auto-redial session"
        );

        if let Some(source) = &self.event_source {
            let sink = CallEventSink::new(session_id, self.sink_commands.clone());
            match source.subscribe(sink) {
                Ok(()) => {
                    debug!(session_id = %session_id, "Subscribed to call events");
                    self.subscribed = true;
                }
                Err(e) => warn!(
                    session_id = %session_id,
                    error = %e,
                    "Call events unavailable, relying on fallback deadlines"
                ),
            }
        }

        self.session = Some(session);
        self.publish_status();
        self.emitter
            .emit(RedialEvent::SessionStarted {
                session_id,
                phone_number,
                timestamp: Utc::now(),
            })
            .await;

        self.place_attempt().await;
        Ok(())
    }

    async fn place_attempt(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(attempt) = session.begin_attempt(Instant::now()) else {
            debug!(
                session_id = %session.id(),
                active = session.is_active(),
                in_progress = session.attempt_in_progress(),
                "Skipping call attempt"
            );
            return;
        };
        let session_id = session.id();
        let phone_number = session.phone_number().to_string();
        let status = session.status().to_string();

        info!(
            session_id = %session_id,
            attempt = attempt,
            max_attempts = MAX_ATTEMPTS,
            "Placing call attempt"
        );
        self.publish_status();
        self.emitter
            .emit(RedialEvent::AttemptCountChanged {
                session_id,
                count: attempt,
                timestamp: Utc::now(),
            })
            .await;
        self.emit_status(session_id, status).await;

        let dialer = self.dialer.clone();
        let results = self.sink_commands.clone();
        let span = info_span!("dial", session_id = %session_id, attempt = attempt);
        self.dial_task = Some(tokio::spawn(
            async move {
                let result = dialer.place(&phone_number).await;
                if let Some(commands) = results.upgrade() {
                    let _ = commands.send(Command::DialResult { session_id, attempt, result });
                }
            }
            .instrument(span),
        ));
    }

    async fn on_dial_result(
        &mut self,
        origin: SessionId,
        attempt: u32,
        result: Result<(), DialError>,
    ) {
        let Err(e) = result else {
            debug!(session_id = %origin, attempt = attempt, "Dial request accepted");
            return;
        };
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.id() != origin
            || session.attempt_count() != attempt
            || !session.attempt_in_progress()
        {
            debug!(
                session_id = %origin,
                attempt = attempt,
                error = %e,
                "Dial failure for an attempt already resolved, ignoring"
            );
            return;
        }

        let error = RedialError::from(e);
        warn!(
            session_id = %origin,
            attempt = attempt,
            category = error.category(),
            recoverable = error.is_recoverable(),
            error = %error,
            "Dial failed, treating attempt as unanswered"
        );
        self.resolve_attempt(false).await;
    }

    async fn resolve_attempt(&mut self, ended_answered: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(resolution) = session.resolve(ended_answered, Instant::now()) else {
            debug!(session_id = %session.id(), "Attempt already resolved, ignoring");
            return;
        };
        let session_id = session.id();
        let status = session.status().to_string();

        info!(
            session_id = %session_id,
            attempt = resolution.attempt,
            answered = resolution.answered,
            decision = %resolution.decision,
            "Call attempt resolved"
        );
        self.publish_status();
        self.emit_status(session_id, resolution.message).await;

        match resolution.decision {
            RedialDecision::Redial(_) => self.emit_status(session_id, status).await,
            RedialDecision::Stop(reason) => self.finish_session(reason).await,
        }
    }

    async fn on_call_event(&mut self, origin: Option<SessionId>, kind: CallEventKind) {
        let Some(session) = self.session.as_mut() else {
            debug!(kind = %kind, "Call event with no session, ignoring");
            return;
        };
        if origin.is_some_and(|id| id != session.id()) {
            debug!(kind = %kind, "Call event from a previous session, discarding");
            return;
        }
        if !session.is_active() || !session.attempt_in_progress() {
            debug!(kind = %kind, "Call event with no attempt in progress, ignoring");
            return;
        }
        let session_id = session.id();

        match kind {
            CallEventKind::Ringing => {
                session.note_ringing();
                let status = session.status().to_string();
                self.publish_status();
                self.emit_status(session_id, status).await;
            }
            CallEventKind::Answered => {
                let first = !session.ever_answered_this_attempt();
                session.mark_answered();
                if first {
                    info!(
                        session_id = %session_id,
                        attempt = session.attempt_count(),
                        redial_after_answer = session.redial_after_answer(),
                        "Call answered"
                    );
                }
                let status = session.status().to_string();
                self.publish_status();
                self.emit_status(session_id, status).await;
            }
            CallEventKind::Ended => {
                let answered = session.ever_answered_this_attempt();
                debug!(session_id = %session_id, answered = answered, "Call ended");
                self.resolve_attempt(answered).await;
            }
        }
    }

    async fn on_deadline(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(timer) = session.take_expired_timer(Instant::now()) else {
            return;
        };

        match timer.kind {
            TimerKind::FallbackDeadline => {
                if timer.attempt != session.attempt_count() {
                    debug!(attempt = timer.attempt, "Stale fallback deadline, ignoring");
                    return;
                }
                let answered = session.ever_answered_this_attempt();
                debug!(
                    session_id = %session.id(),
                    attempt = timer.attempt,
                    answered = answered,
                    "Fallback deadline elapsed, call may have ended without detection"
                );
                self.resolve_attempt(answered).await;
            }
            TimerKind::RedialDelay => {
                debug!(session_id = %session.id(), "Redial delay elapsed");
                self.place_attempt().await;
            }
        }
    }

    async fn stop_session(&mut self, reason: StopReason) {
        let Some(session) = self.session.as_mut() else {
            debug!("Stop requested with no session");
            return;
        };
        if !session.terminate(reason) {
            debug!(session_id = %session.id(), "Session already stopped");
            return;
        }
        let session_id = session.id();
        let status = session.status().to_string();

        info!(
            session_id = %session_id,
            attempts = session.attempt_count(),
            "Stopping auto-redial session"
        );
        self.publish_status();
        self.emit_status(session_id, status).await;
        self.finish_session(reason).await;
    }

    /// Tear down the subscription and announce the stop; the session is already terminated
    async fn finish_session(&mut self, reason: StopReason) {
        if let Some(dial) = self.dial_task.take() {
            dial.abort();
        }
        if self.subscribed {
            if let Some(source) = &self.event_source {
                source.unsubscribe();
            }
            self.subscribed = false;
        }

        let Some(session) = self.session.as_ref() else {
            return;
        };
        info!(
            session_id = %session.id(),
            attempts = session.attempt_count(),
            reason = ?reason,
            "Auto-redial session stopped"
        );
        self.emitter
            .emit(RedialEvent::SessionStopped {
                session_id: session.id(),
                attempt_count: session.attempt_count(),
                reason,
                timestamp: Utc::now(),
            })
            .await;
    }

    async fn emit_status(&self, session_id: SessionId, status: String) {
        self.emitter
            .emit(RedialEvent::StatusChanged {
                session_id,
                status,
                timestamp: Utc::now(),
            })
            .await;
    }

    fn publish_status(&self) {
        if let Some(session) = &self.session {
            self.status.send_replace(session.snapshot());
        }
    }
}
