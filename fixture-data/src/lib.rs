// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixture suites and a scripted test engine for testfork's own tests.

pub mod models;
pub mod scripted_engine;
pub mod testfork_fixtures;

/// The engine ID of [`scripted_engine::ScriptedEngine`].
pub const ENGINE_ID: &str = "fixture";

/// The unique ID of the engine's root node.
pub const ENGINE_UNIQUE_ID: &str = "[engine:fixture]";
