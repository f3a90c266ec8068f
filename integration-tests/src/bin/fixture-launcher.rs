// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A launcher that runs the fixture suites with the scripted engine.

use fixture_data::scripted_engine::ScriptedEngine;
use testfork_runner::launcher;

fn main() {
    std::process::exit(launcher::launch(&ScriptedEngine));
}
