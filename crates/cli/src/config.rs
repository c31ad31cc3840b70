//! Command-line and config-file settings
//!
//! Values are layered: built-in defaults, then the TOML config file, then
//! environment variables and flags. A flag always wins over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Deserialize;

use autodial_redial_core::SessionConfig;

use crate::logging::{parse_log_level, LoggingConfig};
use crate::simulator::{SimulationConfig, SimulationFile};

/// Dial a number until someone picks up
#[derive(Parser, Debug)]
#[command(name = "autodial", author, version, about, long_about = None)]
pub struct Args {
    /// Number to dial
    #[arg(short, long, env = "AUTODIAL_NUMBER")]
    pub number: Option<String>,

    /// Keep redialing after an answered call disconnects
    #[arg(
        long,
        env = "AUTODIAL_REDIAL_AFTER_ANSWER",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub redial_after_answer: Option<bool>,

    /// Config file (default: <config dir>/autodial/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Default log level; RUST_LOG directives refine it
    #[arg(long, env = "AUTODIAL_LOG", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub json: bool,

    /// Include file and line in logs
    #[arg(long)]
    pub file_info: bool,

    /// Log span entry and exit
    #[arg(long)]
    pub log_spans: bool,

    /// Simulated remote side answers on this attempt
    #[arg(long)]
    pub answer_on_attempt: Option<u32>,

    /// Simulated call length once answered, in seconds
    #[arg(long)]
    pub talk_secs: Option<u64>,

    /// Simulate a platform that never reports call-state changes
    #[arg(long)]
    pub no_call_events: bool,

    /// Simulate a missing call permission
    #[arg(long)]
    pub deny_permission: bool,
}

/// Contents of the TOML config file
///
/// ```toml
/// phone_number = "555-1000"
/// redial_after_answer = false
///
/// [simulation]
/// answer_on_attempt = 2
/// talk_secs = 5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub phone_number: Option<String>,
    pub redial_after_answer: Option<bool>,
    pub simulation: SimulationFile,
}

impl FileConfig {
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("invalid config file")
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("autodial").join("config.toml"))
}

/// Read the config file
///
/// An explicit path must exist; a missing default file is not an error.
pub fn load_file(explicit: Option<&Path>) -> Result<FileConfig> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match default_config_path() {
            Some(path) => (path, false),
            None => return Ok(FileConfig::default()),
        },
    };

    if !required && !path.exists() {
        return Ok(FileConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    FileConfig::parse(&contents).with_context(|| format!("in {}", path.display()))
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn resolve(args: &Args, file: FileConfig) -> Result<Self> {
        let phone_number = args.number.clone().or(file.phone_number).ok_or_else(|| {
            anyhow!("no phone number: pass --number, set AUTODIAL_NUMBER or add phone_number to the config file")
        })?;
        let mut session = SessionConfig::new(phone_number);
        if let Some(redial) = args.redial_after_answer.or(file.redial_after_answer) {
            session = session.with_redial_after_answer(redial);
        }

        let defaults = SimulationConfig::default();
        let sim = file.simulation;
        let simulation = SimulationConfig {
            answer_on_attempt: args.answer_on_attempt.or(sim.answer_on_attempt),
            ring_delay: sim.ring_delay_secs.map(Duration::from_secs).unwrap_or(defaults.ring_delay),
            ring_timeout: sim
                .ring_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.ring_timeout),
            talk_duration: args
                .talk_secs
                .or(sim.talk_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.talk_duration),
            call_events: !args.no_call_events && sim.call_events.unwrap_or(defaults.call_events),
            deny_permission: args.deny_permission || sim.deny_permission.unwrap_or(false),
        };

        let mut logging = LoggingConfig::new(parse_log_level(&args.log_level)?);
        if args.json {
            logging = logging.with_json();
        }
        if args.file_info {
            logging = logging.with_file_info();
        }
        if args.log_spans {
            logging = logging.with_spans();
        }

        Ok(Self { session, simulation, logging })
    }
}
