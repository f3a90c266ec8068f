// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by testfork.

use camino::Utf8PathBuf;
use config::ConfigError;
use std::{io, process::ExitStatus, time::Duration};
use testfork_protocol::{DecodeError, EncodeError, FrameError};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse testfork config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigError) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }
}

/// An error returned by an [`ExecutionListener`](crate::engine::ExecutionListener).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ListenerError {
    /// The engine reported a result status that testfork does not know how to record.
    #[error("test `{unique_id}` finished with unrecognized status `{status}`")]
    UnknownStatus {
        /// The unique ID of the node.
        unique_id: String,
        /// The status as reported by the engine.
        status: String,
    },
}

/// An error that occurred in a forked launcher before its report could be written.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LaunchError {
    /// Redirecting standard output to standard error failed.
    #[error("error redirecting standard output to standard error")]
    RedirectStdout(#[source] io::Error),

    /// Reading parameters from standard input failed.
    #[error("error reading test parameters from standard input")]
    ReadParameters(#[source] io::Error),

    /// The parameters could not be decoded.
    #[error("error decoding test parameters")]
    DecodeParameters(#[source] DecodeError),

    /// The test engine failed.
    #[error("test engine failed")]
    Engine(#[source] crate::engine::EngineError),

    /// The report could not be encoded.
    #[error("error encoding test report")]
    EncodeReport(#[source] EncodeError),

    /// Writing the framed report failed.
    #[error("error writing test report to standard output")]
    WriteReport(#[source] io::Error),

    /// The test engine or a listener panicked.
    #[error("test engine panicked: {message}")]
    Panicked {
        /// The panic payload, if it was a string.
        message: String,
    },
}

impl LaunchError {
    /// Creates a [`LaunchError::Panicked`] from a payload returned by
    /// [`std::panic::catch_unwind`].
    pub fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "(non-string payload)".to_owned()
        };
        Self::Panicked { message }
    }
}

/// An error that occurred while running a forked launcher from the parent process.
///
/// Every variant is an infrastructure failure. A launcher that ran its tests and reported some of
/// them as failed does not produce an error: see
/// [`TestReport::is_failure`](testfork_protocol::TestReport::is_failure).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OrchestratorError {
    /// The parameters could not be encoded.
    #[error("error encoding test parameters")]
    EncodeParameters(#[source] EncodeError),

    /// The async runtime could not be created.
    #[error("error creating Tokio runtime")]
    RuntimeCreate(#[source] io::Error),

    /// The launcher could not be spawned.
    #[error("error spawning launcher `{program}`")]
    Spawn {
        /// The program that was spawned.
        program: String,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Communicating with the launcher failed.
    #[error("error communicating with launcher `{program}`")]
    Io {
        /// The program that was spawned.
        program: String,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Neither standard output nor standard error produced anything for too long, so the launcher
    /// was killed.
    #[error(
        "launcher `{program}` produced no output for {}, killed it",
        humantime::format_duration(*.idle_timeout),
    )]
    TimedOut {
        /// The program that was spawned.
        program: String,
        /// The idle timeout that elapsed.
        idle_timeout: Duration,
    },

    /// The launcher exited without emitting a complete report.
    #[error(
        "launcher `{program}` exited with {status} without emitting a complete report{}",
        if *.partial_payload { " (output contained the start of a report)" } else { "" },
    )]
    Crashed {
        /// The program that was spawned.
        program: String,
        /// The exit status of the launcher.
        status: ExitStatus,
        /// Whether the output contained at least the start of a report.
        partial_payload: bool,
    },

    /// The launcher emitted a framed payload that is not a valid report.
    #[error("launcher `{program}` emitted a malformed report")]
    MalformedReport {
        /// The program that was spawned.
        program: String,
        /// The underlying error.
        #[source]
        error: DecodeError,
    },
}

impl OrchestratorError {
    pub(crate) fn crashed(
        program: &str,
        status: ExitStatus,
        frame_error: Option<&FrameError>,
    ) -> Self {
        OrchestratorError::Crashed {
            program: program.to_owned(),
            status,
            partial_payload: !matches!(frame_error, Some(FrameError::MissingStartMarker { .. })),
        }
    }
}

/// Displays an error followed by its chain of sources.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: std::error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: std::error::Error> std::fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)?;

        let mut source = self.error.source();
        if source.is_some() {
            write!(f, "\n  caused by:")?;
        }
        while let Some(error) = source {
            write!(f, "\n  - {error}")?;
            source = error.source();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_chain() {
        let error = LaunchError::ReadParameters(io::Error::other("pipe closed"));
        assert_eq!(
            DisplayErrorChain::new(&error).to_string(),
            "error reading test parameters from standard input\n  caused by:\n  - pipe closed"
        );

        let payload = std::panic::catch_unwind(|| -> u32 { panic!("engine blew up {}", 42) }).unwrap_err();
        assert_eq!(
            LaunchError::panicked(&*payload).to_string(),
            "test engine panicked: engine blew up 42"
        );
        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u32);
        assert_eq!(
            LaunchError::panicked(&*payload).to_string(),
            "test engine panicked: (non-string payload)"
        );

        let error = ListenerError::UnknownStatus {
            unique_id: "t".to_owned(),
            status: "X".to_owned(),
        };
        assert_eq!(
            DisplayErrorChain::new(&error).to_string(),
            "test `t` finished with unrecognized status `X`"
        );
    }
}
