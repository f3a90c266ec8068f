// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers for testfork's process-level tests.

pub mod testfork_cli;
