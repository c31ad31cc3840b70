//! `autodial`: run the auto-redial controller from the command line
//!
//! The controller drives a simulated phone, so every behaviour of the redial
//! policy can be tried without telephony hardware:
//!
//! ```text
//! autodial --number 555-1000 --answer-on-attempt 2 --redial-after-answer false
//! autodial --number 555-1000 --no-call-events
//! ```

mod config;
mod logging;
mod simulator;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tracing::info;

use autodial_redial_core::{
    RedialController, RedialEventHandler, SessionId, StopReason, MAX_ATTEMPTS, VERSION,
};

use crate::config::{AppConfig, Args};
use crate::simulator::SimulatedPhone;

/// Prints controller notifications for the user
struct ConsoleReporter;

#[async_trait]
impl RedialEventHandler for ConsoleReporter {
    async fn on_session_started(&self, _session_id: SessionId, phone_number: &str) {
        println!("📞 Auto-dialing {}", phone_number);
    }

    async fn on_attempt_count_changed(&self, count: u32) {
        println!("   Attempt {}/{}", count, MAX_ATTEMPTS);
    }

    async fn on_status_changed(&self, status: &str) {
        println!("   {}", status);
    }

    async fn on_session_stopped(&self, attempt_count: u32, reason: StopReason) {
        let mark = match reason {
            StopReason::Completed => "✅",
            StopReason::MaxAttemptsReached => "❌",
            StopReason::Requested => "⏹",
        };
        println!("{} Stopped after {} attempt(s)", mark, attempt_count);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let file = config::load_file(args.config.as_deref())?;
    let app = AppConfig::resolve(&args, file)?;

    logging::setup_logging(&app.logging)?;
    logging::log_welcome("autodial", VERSION);

    let phone = Arc::new(SimulatedPhone::new(app.simulation.clone()));
    let controller = RedialController::builder(phone.clone())
        .event_source(phone.clone())
        .event_handler(Arc::new(ConsoleReporter))
        .build();

    controller
        .start(app.session.clone())
        .await
        .context("failed to start auto-dialing")?;

    tokio::select! {
        finished = controller.wait_until_inactive() => {
            let status = finished?;
            info!(
                attempts = status.attempt_count,
                calls_placed = phone.calls_placed(),
                status = %status.status,
                "Session finished"
            );
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            info!("Interrupted, stopping auto-dialer");
            controller.stop().await;
        }
    }

    Ok(())
}
