//! Redial-core: dial a number until it is answered
//!
//! This crate implements the auto-redial state machine: it places a call
//! attempt, waits for the call to end, and decides whether to dial again.
//!
//! ## Layer Separation
//! ```text
//! UI / CLI -> redial-core -> {Dialer, CallEventSource}
//! ```
//!
//! Redial-core focuses on:
//! - Session lifecycle (start, stop, attempt counting)
//! - Reconciling the two unreliable "call ended" signals: platform call events
//!   and a fixed fallback deadline
//! - The redial policy and attempt cap
//! - Status notifications for UI integration
//!
//! Placing real calls and listening to real call-state changes belong to the
//! platform and are injected through the [`Dialer`] and [`CallEventSource`]
//! traits.

pub mod config;
pub mod controller;
pub mod dialer;
pub mod error;
pub mod events;
pub mod policy;
pub mod session;

pub use config::{SessionConfig, FALLBACK_DEADLINE, MAX_ATTEMPTS, REDIAL_DELAY};
pub use controller::{RedialController, RedialControllerBuilder};
pub use dialer::Dialer;
pub use error::{DialError, RedialError, RedialResult};
pub use events::{
    CallEventKind, CallEventSink, CallEventSource, EventEmitter, RedialEvent, RedialEventHandler,
};
pub use policy::{RedialDecision, RedialReason, StopReason, WAITING_TO_REDIAL};
pub use session::{DialSession, SessionId, SessionState, StatusSnapshot};

/// Redial-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
