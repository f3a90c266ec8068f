// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for testfork: running tests in a forked launcher process.
//!
//! The basic flow is:
//!
//! 1. The orchestrator ([`orchestrator::ForkedRun`]) spawns a launcher and writes
//!    [`TestParameters`](testfork_protocol::TestParameters) to its standard input.
//! 2. The launcher ([`launcher::launch`]) builds a discovery request from the parameters and hands
//!    it to a [`TestEngine`](engine::TestEngine).
//! 3. Engine events are accumulated by a [`ReportBuilder`](report_builder::ReportBuilder) into a
//!    [`TestReport`](testfork_protocol::TestReport), with failure traces rendered by
//!    [`stack_trace`].
//! 4. The launcher writes the framed report to its standard output, and the orchestrator decodes
//!    it.

pub mod adapter;
pub mod config;
pub mod engine;
pub mod errors;
pub mod launcher;
pub mod orchestrator;
pub mod output;
pub mod report_builder;
pub mod reporter;
pub mod stack_trace;
