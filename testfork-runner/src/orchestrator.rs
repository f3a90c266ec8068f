// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The parent side of a run: spawning a launcher and collecting its report.

use crate::{errors::OrchestratorError, output::TEST_OUTPUT_TARGET};
use camino::Utf8PathBuf;
use std::{
    io,
    process::{ExitStatus, Stdio},
    time::Duration,
};
use testfork_protocol::{TestParameters, TestReport, framing};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    process::{Child, Command},
};
use tracing::{debug, info};

/// Describes how to spawn a forked launcher.
#[derive(Clone, Debug)]
pub struct ForkedRun {
    program: String,
    args: Vec<String>,
    current_dir: Option<Utf8PathBuf>,
    envs: Vec<(String, String)>,
    idle_timeout: Option<Duration>,
}

impl ForkedRun {
    /// Creates a new run for `program` with no arguments and no idle timeout.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            envs: Vec::new(),
            idle_timeout: None,
        }
    }

    /// Appends arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory of the launcher.
    pub fn current_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Sets an environment variable for the launcher.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Kills the launcher if it produces no output for `timeout`.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Returns the program that will be spawned.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Runs the launcher on a new Tokio runtime, blocking until it exits.
    pub fn run_blocking(&self, params: &TestParameters) -> Result<TestReport, OrchestratorError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(OrchestratorError::RuntimeCreate)?;
        runtime.block_on(self.run(params))
    }

    /// Runs the launcher with `params`, returning its report.
    ///
    /// Standard error lines of the launcher are logged under the [`TEST_OUTPUT_TARGET`] target.
    pub async fn run(&self, params: &TestParameters) -> Result<TestReport, OrchestratorError> {
        let input = params
            .to_bytes()
            .map_err(OrchestratorError::EncodeParameters)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        debug!("spawning launcher `{}` with args {:?}", self.program, self.args);
        let mut child = command.spawn().map_err(|error| OrchestratorError::Spawn {
            program: self.program.clone(),
            error,
        })?;

        let stdout = self.collect_output(&mut child, input).await?;
        let status = self.wait(&mut child).await?;
        debug!(
            "launcher `{}` exited with {status}, {} bytes of output",
            self.program,
            stdout.len()
        );

        let payload = match framing::extract_payload(&stdout) {
            Ok(payload) if status.success() => payload,
            Ok(_) => return Err(OrchestratorError::crashed(&self.program, status, None)),
            Err(error) => {
                debug!("no report in launcher output: {error}");
                return Err(OrchestratorError::crashed(&self.program, status, Some(&error)));
            }
        };
        TestReport::from_bytes(payload).map_err(|error| OrchestratorError::MalformedReport {
            program: self.program.clone(),
            error,
        })
    }

    /// Writes `input` to the child, drains both of its output streams and returns standard output.
    async fn collect_output(
        &self,
        child: &mut Child,
        input: Vec<u8>,
    ) -> Result<Vec<u8>, OrchestratorError> {
        let (Some(mut stdin), Some(mut stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(self.io_error(io::Error::other("launcher streams were not captured")));
        };

        let write_input = async move {
            stdin.write_all(&input).await?;
            // Dropping stdin closes it, signaling the end of the parameters.
            stdin.shutdown().await
        };
        tokio::pin!(write_input);

        let mut stderr = BufReader::new(stderr);
        let mut stdout_buf = Vec::new();
        let mut line = Vec::new();
        let mut input_done = false;
        let mut stdout_done = false;
        let mut stderr_done = false;

        while !(stdout_done && stderr_done) {
            tokio::select! {
                res = &mut write_input, if !input_done => {
                    input_done = true;
                    if let Err(error) = res {
                        // The launcher may exit without reading its input. That shows up as a
                        // missing report.
                        debug!("error writing parameters to launcher: {error}");
                    }
                }
                res = stdout.read_buf(&mut stdout_buf), if !stdout_done => {
                    let n = res.map_err(|error| self.io_error(error))?;
                    stdout_done = n == 0;
                }
                res = stderr.read_until(b'\n', &mut line), if !stderr_done => {
                    let n = res.map_err(|error| self.io_error(error))?;
                    stderr_done = n == 0;
                    log_test_output(&line);
                    line.clear();
                }
                () = idle(self.idle_timeout) => {
                    return Err(self.kill_timed_out(child).await);
                }
            }
        }

        Ok(stdout_buf)
    }

    async fn wait(&self, child: &mut Child) -> Result<ExitStatus, OrchestratorError> {
        let waited = match self.idle_timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait()).await,
            None => Ok(child.wait().await),
        };
        match waited {
            Ok(res) => res.map_err(|error| self.io_error(error)),
            Err(_) => Err(self.kill_timed_out(child).await),
        }
    }

    async fn kill_timed_out(&self, child: &mut Child) -> OrchestratorError {
        if let Err(error) = child.kill().await {
            debug!("error killing launcher `{}`: {error}", self.program);
        }
        OrchestratorError::TimedOut {
            program: self.program.clone(),
            idle_timeout: self.idle_timeout.unwrap_or_default(),
        }
    }

    fn io_error(&self, error: io::Error) -> OrchestratorError {
        OrchestratorError::Io {
            program: self.program.clone(),
            error,
        }
    }
}

async fn idle(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

fn log_test_output(line: &[u8]) {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end();
    if !line.is_empty() {
        info!(target: TEST_OUTPUT_TARGET, "{line}");
    }
}
