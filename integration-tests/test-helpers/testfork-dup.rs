// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! This is a duplicate of testfork's main.rs, so that tests in this package can run it.

use color_eyre::Result;

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = enable_ansi_support::enable_ansi_support();

    std::process::exit(testfork_cli::main_impl())
}
