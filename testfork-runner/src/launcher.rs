// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The forked side of a run.
//!
//! A launcher binary hands its test engine to [`launch`], which performs the whole exchange with the
//! orchestrator: read [`TestParameters`] from standard input, run the engine, and write the framed
//! [`TestReport`] to standard output. Anything test code prints to standard output while the engine
//! runs is redirected to standard error.

use crate::{
    adapter,
    engine::TestEngine,
    errors::{DisplayErrorChain, LaunchError},
    output::{LOG_ENV, LogConfig},
};
use std::{
    io::{Read, Write},
    panic::{self, AssertUnwindSafe},
};
use testfork_protocol::{LauncherExitCode, TestParameters, TestReport, framing};
use tracing::{error, level_filters::LevelFilter, warn};

/// Runs the exchange on the process's standard streams and returns the exit code to use.
///
/// Errors are logged to standard error. On error no report is written. A panic in the engine or in
/// report building is caught and treated as an error.
pub fn launch(engine: &dyn TestEngine) -> i32 {
    let result = panic::catch_unwind(AssertUnwindSafe(|| try_launch(engine)))
        .unwrap_or_else(|payload| Err(LaunchError::panicked(&*payload)));
    match result {
        Ok(_) => LauncherExitCode::REPORT_EMITTED,
        Err(error) => {
            // A no-op if logging was already set up from the parameters.
            if let Err(log_error) = LogConfig::new(LevelFilter::INFO).init() {
                eprintln!("error: {}", DisplayErrorChain::new(log_error));
            }
            error!("{}", DisplayErrorChain::new(error));
            LauncherExitCode::LAUNCH_FAILED
        }
    }
}

fn try_launch(engine: &dyn TestEngine) -> Result<TestReport, LaunchError> {
    let channel = imp::redirect_stdout().map_err(LaunchError::RedirectStdout)?;

    let params = read_parameters(std::io::stdin().lock())?;
    if let Err(log_error) = LogConfig::for_level(params.log_level)
        .with_env_override()
        .init()
    {
        // Fall back to the level from the parameters, ignoring the environment.
        eprintln!("warning: ignoring {LOG_ENV}: {}", DisplayErrorChain::new(log_error));
        let _ = LogConfig::for_level(params.log_level).init();
    }

    execute_and_report(engine, &params, channel)
}

/// Reads and decodes the parameters from `input`, which is read to its end.
pub fn read_parameters<R: Read>(mut input: R) -> Result<TestParameters, LaunchError> {
    let mut bytes = Vec::new();
    input
        .read_to_end(&mut bytes)
        .map_err(LaunchError::ReadParameters)?;
    TestParameters::from_bytes(&bytes).map_err(LaunchError::DecodeParameters)
}

/// Runs `engine` according to `params` and writes the framed report to `output`.
///
/// A report is written even if the engine returned without finishing its plan.
pub fn execute_and_report<W: Write>(
    engine: &dyn TestEngine,
    params: &TestParameters,
    output: W,
) -> Result<TestReport, LaunchError> {
    if params.has_no_selectors() {
        warn!("no discovery selectors were provided, no tests will be found");
    }

    let outcome = adapter::execute(engine, params).map_err(LaunchError::Engine)?;
    if !outcome.complete {
        warn!("test report is not complete");
    }

    let bytes = outcome.report.to_bytes().map_err(LaunchError::EncodeReport)?;
    framing::write_framed(output, &bytes).map_err(LaunchError::WriteReport)?;
    Ok(outcome.report)
}

#[cfg(unix)]
mod imp {
    use std::{
        fs::File,
        io::{self, Write},
        os::fd::{FromRawFd, OwnedFd},
    };

    pub(super) type ReportChannel = File;

    /// Points file descriptor 1 at standard error, returning a handle to the original standard
    /// output.
    pub(super) fn redirect_stdout() -> io::Result<ReportChannel> {
        io::stdout().flush()?;

        // SAFETY: dup has no memory safety preconditions.
        let saved = unsafe { libc::dup(libc::STDOUT_FILENO) };
        if saved < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `saved` is a freshly duplicated descriptor that nothing else owns.
        let saved = unsafe { OwnedFd::from_raw_fd(saved) };

        // SAFETY: dup2 has no memory safety preconditions.
        if unsafe { libc::dup2(libc::STDERR_FILENO, libc::STDOUT_FILENO) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(File::from(saved))
    }
}

#[cfg(not(unix))]
mod imp {
    use std::io;

    pub(super) type ReportChannel = io::Stdout;

    /// Output from test code is not redirected on this platform.
    pub(super) fn redirect_stdout() -> io::Result<ReportChannel> {
        Ok(io::stdout())
    }
}
