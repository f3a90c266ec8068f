// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! The wire protocol spoken between the testfork orchestrator and a forked test launcher.
//!
//! A run is exactly one exchange per launcher process: the orchestrator writes an encoded
//! [`TestParameters`] to the launcher's standard input and closes it, and the launcher writes a
//! [framed](framing) [`TestReport`] to its standard output before exiting. This crate has no
//! knowledge of processes or test engines; it only defines the messages and their encoding.

mod errors;
mod exit_codes;
pub mod framing;
mod parameters;
mod report;
pub mod wire;

pub use errors::*;
pub use exit_codes::*;
pub use parameters::*;
pub use report::*;
