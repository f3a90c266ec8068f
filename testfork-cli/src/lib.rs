// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs tests in a forked launcher process and reports the results.
//!
//! `testfork run` reads `.config/testfork.toml`, merges it with command-line arguments into
//! [`TestParameters`](testfork_protocol::TestParameters), hands those to a launcher process and
//! prints the report the launcher sends back.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
