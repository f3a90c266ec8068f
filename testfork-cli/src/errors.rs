// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error::Error, path::PathBuf};
use testfork_protocol::TestforkExitCode;
use testfork_runner::{
    errors::{ConfigParseError, OrchestratorError},
    output::NO_HEADING_TARGET,
};
use thiserror::Error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method.

/// An error that testfork expects and reports with a documented exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("invalid arguments")]
    InvalidArguments {
        #[source]
        err: clap::Error,
    },
    #[error("could not determine the current directory")]
    CurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 { path: PathBuf },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("no launcher specified")]
    NoLauncher,
    #[error("launcher failed")]
    LauncherFailed {
        #[from]
        err: OrchestratorError,
    },
    #[error("test run failed")]
    TestRunFailed,
    #[error("error writing to output")]
    WriteOutputError {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    pub(crate) fn test_run_failed() -> Self {
        Self::TestRunFailed
    }

    pub(crate) fn write_output_error(err: std::io::Error) -> Self {
        Self::WriteOutputError { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::InvalidArguments { .. }
            | Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::NoLauncher => TestforkExitCode::SETUP_ERROR,
            Self::LauncherFailed { .. } => TestforkExitCode::LAUNCHER_FAILED,
            Self::TestRunFailed => TestforkExitCode::TEST_RUN_FAILED,
            Self::WriteOutputError { .. } => TestforkExitCode::WRITE_OUTPUT_ERROR,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self) {
        let mut next_error = match self {
            Self::InvalidArguments { err } => {
                // clap's own rendering includes usage information.
                let _ = err.print();
                None
            }
            Self::CurrentDirFailed { err } => {
                tracing::error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { path } => {
                tracing::error!("current directory `{}` is not valid UTF-8", path.display());
                None
            }
            Self::ConfigParseError { err } => {
                tracing::error!("{err}");
                err.source()
            }
            Self::NoLauncher => {
                tracing::error!(
                    "no launcher specified (pass --launcher, or set `launcher` in the config file)"
                );
                None
            }
            Self::LauncherFailed { err } => {
                tracing::error!("{err}");
                err.source()
            }
            Self::TestRunFailed => {
                tracing::error!("test run failed");
                None
            }
            Self::WriteOutputError { err } => {
                tracing::error!("error writing to output");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            tracing::error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
