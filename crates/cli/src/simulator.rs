//! A simulated phone for running the controller without a telephony platform
//!
//! [`SimulatedPhone`] is both the [`Dialer`] and the [`CallEventSource`].
//! Every placed call plays a short script on a background task: the remote
//! side rings, then either answers and hangs up after the talk time, or keeps
//! ringing until the caller gives up.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info};

use autodial_redial_core::{
    CallEventKind, CallEventSink, CallEventSource, DialError, Dialer, RedialError, RedialResult,
};

/// How the simulated phone behaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Attempt number the remote side picks up on; `None` never answers
    pub answer_on_attempt: Option<u32>,
    /// Time from dialing until the remote side rings
    pub ring_delay: Duration,
    /// How long an unanswered call rings before it is dropped
    pub ring_timeout: Duration,
    /// How long an answered call lasts before the remote side hangs up
    pub talk_duration: Duration,
    /// Whether call-state events are reported at all
    pub call_events: bool,
    /// Refuse every dial as if the call permission were missing
    pub deny_permission: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            answer_on_attempt: None,
            ring_delay: Duration::from_secs(1),
            ring_timeout: Duration::from_secs(10),
            talk_duration: Duration::from_secs(5),
            call_events: true,
            deny_permission: false,
        }
    }
}

/// `[simulation]` table of the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationFile {
    pub answer_on_attempt: Option<u32>,
    pub ring_delay_secs: Option<u64>,
    pub ring_timeout_secs: Option<u64>,
    pub talk_secs: Option<u64>,
    pub call_events: Option<bool>,
    pub deny_permission: Option<bool>,
}

pub struct SimulatedPhone {
    config: SimulationConfig,
    dialed: AtomicU32,
    sink: Mutex<Option<CallEventSink>>,
}

impl SimulatedPhone {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            dialed: AtomicU32::new(0),
            sink: Mutex::new(None),
        }
    }

    pub fn calls_placed(&self) -> u32 {
        self.dialed.load(Ordering::SeqCst)
    }

    fn play_call(&self, attempt: u32, sink: CallEventSink) {
        let config = self.config.clone();
        let answers = config.answer_on_attempt == Some(attempt);

        tokio::spawn(async move {
            tokio::time::sleep(config.ring_delay).await;
            if !sink.report(CallEventKind::Ringing) {
                return;
            }

            if answers {
                tokio::time::sleep(Duration::from_secs(1)).await;
                info!(attempt = attempt, "Remote side picked up");
                if !sink.report(CallEventKind::Answered) {
                    return;
                }
                tokio::time::sleep(config.talk_duration).await;
                info!(attempt = attempt, "Remote side hung up");
            } else {
                tokio::time::sleep(config.ring_timeout).await;
                debug!(attempt = attempt, "Nobody picked up");
            }
            sink.report(CallEventKind::Ended);
        });
    }
}

#[async_trait]
impl Dialer for SimulatedPhone {
    async fn place(&self, phone_number: &str) -> Result<(), DialError> {
        if self.config.deny_permission {
            return Err(DialError::permission_denied("CALL_PHONE"));
        }
        let attempt = self.dialed.fetch_add(1, Ordering::SeqCst) + 1;
        info!(phone_number = %phone_number, attempt = attempt, "Simulated dial");

        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            self.play_call(attempt, sink);
        }
        Ok(())
    }
}

impl CallEventSource for SimulatedPhone {
    fn subscribe(&self, sink: CallEventSink) -> RedialResult<()> {
        if !self.config.call_events {
            return Err(RedialError::event_source("phone state events are disabled"));
        }
        debug!(session_id = %sink.session_id(), "Simulated phone subscribed");
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn unsubscribe(&self) {
        self.sink.lock().take();
    }
}
