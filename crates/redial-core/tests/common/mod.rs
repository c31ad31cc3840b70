//! Test doubles for the redial controller integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;

use autodial_redial_core::{
    CallEventKind, CallEventSink, CallEventSource, DialError, Dialer, RedialError, RedialEvent,
    RedialEventHandler, RedialResult, SessionId, StopReason,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("autodial_redial_core=debug")
        .with_test_writer()
        .try_init();
}

/// Let the controller task drain its queue without reaching any deadline
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Dialer that records every attempt and optionally fails them all
///
/// A delay makes `place` take that long to return, like a platform that is
/// slow to accept the call request.
#[derive(Default)]
pub struct RecordingDialer {
    calls: Mutex<Vec<(String, Instant)>>,
    failure: Mutex<Option<DialError>>,
    delay: Option<Duration>,
}

impl RecordingDialer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(error: DialError) -> Arc<Self> {
        let dialer = Self::default();
        *dialer.failure.lock() = Some(error);
        Arc::new(dialer)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay: Some(delay), ..Self::default() })
    }

    pub fn slow_failing(delay: Duration, error: DialError) -> Arc<Self> {
        let dialer = Self { delay: Some(delay), ..Self::default() };
        *dialer.failure.lock() = Some(error);
        Arc::new(dialer)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn numbers(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(number, _)| number.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl Dialer for RecordingDialer {
    async fn place(&self, phone_number: &str) -> Result<(), DialError> {
        self.calls.lock().push((phone_number.to_string(), Instant::now()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.failure.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Call event source driven by the test
#[derive(Default)]
pub struct ManualEventSource {
    current: Mutex<Option<CallEventSink>>,
    issued: Mutex<Vec<CallEventSink>>,
    subscriptions: AtomicUsize,
    unsubscriptions: AtomicUsize,
    refuse: bool,
}

impl ManualEventSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A source that fails every subscription, like a missing phone-state permission
    pub fn refusing() -> Arc<Self> {
        Arc::new(Self { refuse: true, ..Self::default() })
    }

    /// Deliver an event to the current subscriber; `false` if nobody is subscribed
    pub fn emit(&self, kind: CallEventKind) -> bool {
        match self.current.lock().as_ref() {
            Some(sink) => sink.report(kind),
            None => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Every sink ever handed out, including torn down ones
    pub fn issued_sinks(&self) -> Vec<CallEventSink> {
        self.issued.lock().clone()
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn unsubscriptions(&self) -> usize {
        self.unsubscriptions.load(Ordering::SeqCst)
    }
}

impl CallEventSource for ManualEventSource {
    fn subscribe(&self, sink: CallEventSink) -> RedialResult<()> {
        if self.refuse {
            return Err(RedialError::event_source("READ_PHONE_STATE permission not granted"));
        }
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        self.issued.lock().push(sink.clone());
        *self.current.lock() = Some(sink);
        Ok(())
    }

    fn unsubscribe(&self) {
        self.unsubscriptions.fetch_add(1, Ordering::SeqCst);
        self.current.lock().take();
    }
}

/// Handler that flattens every callback into a readable log line
#[derive(Default)]
pub struct RecordingHandler {
    log: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl RedialEventHandler for RecordingHandler {
    async fn on_session_started(&self, _session_id: SessionId, phone_number: &str) {
        self.log.lock().push(format!("started {}", phone_number));
    }

    async fn on_attempt_count_changed(&self, count: u32) {
        self.log.lock().push(format!("count {}", count));
    }

    async fn on_status_changed(&self, status: &str) {
        self.log.lock().push(format!("status {}", status));
    }

    async fn on_session_stopped(&self, attempt_count: u32, reason: StopReason) {
        self.log.lock().push(format!("stopped {} {:?}", attempt_count, reason));
    }
}

/// Everything currently buffered on a notification receiver
pub fn drain(events: &mut broadcast::Receiver<RedialEvent>) -> Vec<RedialEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

pub fn statuses(events: &[RedialEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            RedialEvent::StatusChanged { status, .. } => Some(status.clone()),
            _ => None,
        })
        .collect()
}
