use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::{server, telemetry};

/// Construction and run failures, tagged with the stage that failed.
#[derive(Error, Debug)]
pub enum Error {
    #[error("health checker creation failed")]
    CreateHealthCheck(#[source] health::Error),
    #[error("telemetry setup failed")]
    SetupTelemetry(#[source] telemetry::Error),
    #[error("server creation failed")]
    CreateServer(#[source] server::Error),
    #[error("client creation failed")]
    CreateClient(#[source] youless_client::Error),
    #[error("observer creation failed")]
    CreateObserver(#[source] youless_observer::Error),
    #[error("observer start failed")]
    StartObserver(#[source] youless_observer::Error),
    #[error("server run failed")]
    RunServer(#[source] server::Error),
}

/// A component torn down during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Server,
    Observer,
    Telemetry,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Server => "server",
            Branch::Observer => "observer",
            Branch::Telemetry => "telemetry",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ShutdownFailure {
    #[error("server shutdown failed")]
    Server(#[source] server::Error),
    #[error("observer stop failed")]
    Observer(#[source] youless_observer::Error),
    #[error("telemetry flush failed")]
    Flush(#[source] telemetry::Error),
    #[error("telemetry shutdown failed")]
    Telemetry(#[source] telemetry::Error),
    #[error("timed out")]
    Timeout,
    #[error("panicked")]
    Panicked(#[source] tokio::task::JoinError),
}

/// Every failure collected while shutting down. Only returned when at least
/// one branch failed.
#[derive(Debug)]
pub struct ShutdownError {
    failures: Vec<(Branch, ShutdownFailure)>,
}

impl ShutdownError {
    pub(crate) fn from_failures(failures: Vec<(Branch, ShutdownFailure)>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self { failures })
        }
    }

    pub fn failures(&self) -> &[(Branch, ShutdownFailure)] {
        &self.failures
    }

    pub fn failed(&self, branch: Branch) -> impl Iterator<Item = &ShutdownFailure> {
        self.failures
            .iter()
            .filter(move |(b, _)| *b == branch)
            .map(|(_, failure)| failure)
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shutdown was not clean")?;
        for (branch, failure) in &self.failures {
            write!(f, "; {branch}: {failure}")?;
            let mut source = failure.source();
            while let Some(err) = source {
                write!(f, ": {err}")?;
                source = err.source();
            }
        }
        Ok(())
    }
}

impl StdError for ShutdownError {}
