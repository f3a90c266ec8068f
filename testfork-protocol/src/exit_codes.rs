// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Exit codes produced by a forked test launcher.
///
/// The launcher's exit code only says whether a report was emitted. Whether the tests inside the
/// report passed is a separate signal, see [`TestReport::is_failure`](crate::TestReport::is_failure).
pub enum LauncherExitCode {}

impl LauncherExitCode {
    /// A complete framed report was written to standard output.
    pub const REPORT_EMITTED: i32 = 0;

    /// An error occurred before a report could be produced. No payload is present.
    pub const LAUNCH_FAILED: i32 = 1;
}

/// Documented exit codes for `testfork` failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum TestforkExitCode {}

impl TestforkExitCode {
    /// No errors occurred and testfork exited normally.
    pub const OK: i32 = 0;

    /// One or more tests failed.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// The launcher crashed, timed out, or exited without emitting a complete report.
    pub const LAUNCHER_FAILED: i32 = 105;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// A user issue happened while setting up a testfork invocation.
    pub const SETUP_ERROR: i32 = 96;
}
