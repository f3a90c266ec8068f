// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for forked runs, read from `.config/testfork.toml`.

use crate::errors::ConfigParseError;
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, File, FileFormat};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, de::Error as _};
use std::time::Duration;
use testfork_protocol::LogLevel;

/// Settings read from a config file. Every setting is optional.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ForkConfig {
    /// The launcher program.
    #[serde(default)]
    pub launcher: Option<String>,

    /// Arguments passed to the launcher before any given on the command line.
    #[serde(default)]
    pub launcher_args: Vec<String>,

    /// Whether failure traces are trimmed to the test's own frames.
    #[serde(default)]
    pub filter_stack_traces: Option<bool>,

    /// The log level used by the launcher.
    #[serde(default, deserialize_with = "deserialize_log_level")]
    pub log_level: Option<LogLevel>,

    /// Kill the launcher if it produces no output for this long.
    #[serde(default, with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,

    /// Engine configuration parameters.
    #[serde(default)]
    pub configuration: IndexMap<String, String>,
}

impl ForkConfig {
    /// The path of the config file, relative to the working directory.
    pub const CONFIG_PATH: &'static str = ".config/testfork.toml";

    /// Reads the config.
    ///
    /// If `file` is provided it must exist. Otherwise [`Self::CONFIG_PATH`] under `root` is read if
    /// present.
    pub fn from_sources(
        root: &Utf8Path,
        file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };
        Self::build(&config_file, Config::builder().add_source(source))
    }

    /// Parses the config from a TOML string. `config_file` is only used for error messages.
    pub fn from_toml_str(
        config_file: impl Into<Utf8PathBuf>,
        contents: &str,
    ) -> Result<Self, ConfigParseError> {
        Self::build(
            &config_file.into(),
            Config::builder().add_source(File::from_str(contents, FileFormat::Toml)),
        )
    }

    fn build(
        config_file: &Utf8Path,
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigParseError> {
        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|err| ConfigParseError::new(config_file, err))
    }
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<Option<LogLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let level = Option::<String>::deserialize(deserializer)?;
    level
        .map(|level| level.parse().map_err(D::Error::custom))
        .transpose()
}
