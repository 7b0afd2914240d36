//! stderr logging for the binary.

use std::io::{self, IsTerminal};

use thiserror::Error;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Filter directives, e.g. `CONFINE_LOG=confine::seccomp=debug`.
pub const LOG_ENV: &str = "CONFINE_LOG";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid {LOG_ENV} filter: {0}")]
    Filter(String),
    #[error("cannot install log subscriber: {0}")]
    Subscriber(String),
}

/// Install the global subscriber. `verbose` raises the default level from
/// `warn` to `info`; `CONFINE_LOG` overrides either.
pub fn init(verbose: bool) -> Result<(), LoggingError> {
    let filter = filter(std::env::var(LOG_ENV).ok().as_deref(), verbose)?;
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .without_time()
        .try_init()
        .map_err(|err| LoggingError::Subscriber(err.to_string()))
}

fn filter(directives: Option<&str>, verbose: bool) -> Result<EnvFilter, LoggingError> {
    match directives.filter(|d| !d.trim().is_empty()) {
        Some(directives) => {
            EnvFilter::try_new(directives).map_err(|err| LoggingError::Filter(err.to_string()))
        }
        None => Ok(EnvFilter::new(if verbose { "info" } else { "warn" })),
    }
}
