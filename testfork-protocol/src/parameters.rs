// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{DecodeError, EncodeError},
    wire::{self, WireDecode, WireEncode},
};
use bytes::{Buf, BufMut};
use indexmap::IndexMap;
use std::{fmt, str::FromStr};

/// Parameters for a forked test run.
///
/// Built once by the orchestrator, sent to the launcher as the sole content of its standard input,
/// and treated as read-only from then on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestParameters {
    /// Configuration parameters handed to the test engine as-is.
    pub configuration: IndexMap<String, String>,

    /// Whether stack traces of failed tests are trimmed down to the frames of the test's own code.
    ///
    /// True by default.
    pub filter_stack_traces: bool,

    /// Fully qualified packages to use for test discovery.
    pub select_packages: Vec<String>,
    /// Fully qualified classes to use for test discovery.
    pub select_classes: Vec<String>,
    /// Fully qualified method names to use for test discovery.
    pub select_methods: Vec<String>,
    /// Classpath resources to use for test discovery.
    pub select_resources: Vec<String>,

    /// Classpath roots to scan for tests.
    ///
    /// These have set semantics: duplicates are harmless.
    pub classpath_roots: Vec<String>,

    /// Patterns matched against fully qualified class names.
    pub filter_class_name_patterns: IncludeExcludeList,
    /// Fully qualified packages, applying to sub-packages as well.
    pub filter_packages: IncludeExcludeList,
    /// Tags attached to tests and containers.
    pub filter_tags: IncludeExcludeList,

    /// The verbosity threshold for diagnostics emitted by the launcher.
    pub log_level: LogLevel,

    /// URIs to use for test discovery.
    pub select_uris: Vec<String>,
    /// Files to use for test discovery.
    pub select_files: Vec<String>,
    /// Directories to use for test discovery.
    pub select_directories: Vec<String>,
    /// Identifiers of the test engines that participate in the run.
    pub filter_engines: IncludeExcludeList,
}

impl Default for TestParameters {
    fn default() -> Self {
        Self {
            configuration: IndexMap::new(),
            filter_stack_traces: true,
            select_packages: Vec::new(),
            select_classes: Vec::new(),
            select_methods: Vec::new(),
            select_resources: Vec::new(),
            classpath_roots: Vec::new(),
            filter_class_name_patterns: IncludeExcludeList::default(),
            filter_packages: IncludeExcludeList::default(),
            filter_tags: IncludeExcludeList::default(),
            log_level: LogLevel::default(),
            select_uris: Vec::new(),
            select_files: Vec::new(),
            select_directories: Vec::new(),
            filter_engines: IncludeExcludeList::default(),
        }
    }
}

impl TestParameters {
    /// Encodes these parameters as a versioned protocol message.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        wire::encode_message(self)
    }

    /// Decodes parameters from a complete protocol message.
    pub fn from_bytes(input: &[u8]) -> Result<Self, DecodeError> {
        wire::decode_message(input)
    }

    /// Returns true if no discovery selector of any kind was specified.
    pub fn has_no_selectors(&self) -> bool {
        self.select_packages.is_empty()
            && self.select_classes.is_empty()
            && self.select_methods.is_empty()
            && self.select_resources.is_empty()
            && self.classpath_roots.is_empty()
            && self.select_uris.is_empty()
            && self.select_files.is_empty()
            && self.select_directories.is_empty()
    }
}

impl WireEncode for TestParameters {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
        self.configuration.encode(buf)?;
        self.filter_stack_traces.encode(buf)?;

        self.select_packages.encode(buf)?;
        self.select_classes.encode(buf)?;
        self.select_methods.encode(buf)?;
        self.select_resources.encode(buf)?;

        self.classpath_roots.encode(buf)?;

        self.filter_class_name_patterns.encode(buf)?;
        self.filter_packages.encode(buf)?;
        self.filter_tags.encode(buf)?;
        self.log_level.rank().encode(buf)?;

        self.select_uris.encode(buf)?;
        self.select_files.encode(buf)?;
        self.select_directories.encode(buf)?;
        self.filter_engines.encode(buf)
    }
}

impl WireDecode for TestParameters {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        Ok(Self {
            configuration: WireDecode::decode(buf)?,
            filter_stack_traces: WireDecode::decode(buf)?,
            select_packages: WireDecode::decode(buf)?,
            select_classes: WireDecode::decode(buf)?,
            select_methods: WireDecode::decode(buf)?,
            select_resources: WireDecode::decode(buf)?,
            classpath_roots: WireDecode::decode(buf)?,
            filter_class_name_patterns: WireDecode::decode(buf)?,
            filter_packages: WireDecode::decode(buf)?,
            filter_tags: WireDecode::decode(buf)?,
            log_level: LogLevel::from_rank(i32::decode(buf)?),
            select_uris: WireDecode::decode(buf)?,
            select_files: WireDecode::decode(buf)?,
            select_directories: WireDecode::decode(buf)?,
            filter_engines: WireDecode::decode(buf)?,
        })
    }
}

/// A pair of included and excluded names or patterns.
///
/// Entries within each list are OR-combined: an item is included (or excluded) if at least one
/// entry matches it. An empty list places no constraint on that side.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncludeExcludeList {
    /// Names or patterns that are included.
    pub included: Vec<String>,
    /// Names or patterns that are excluded.
    pub excluded: Vec<String>,
}

impl IncludeExcludeList {
    /// Returns true if both lists are empty.
    pub fn is_empty(&self) -> bool {
        self.included.is_empty() && self.excluded.is_empty()
    }
}

impl WireEncode for IncludeExcludeList {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
        self.included.encode(buf)?;
        self.excluded.encode(buf)
    }
}

impl WireDecode for IncludeExcludeList {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        Ok(Self {
            included: WireDecode::decode(buf)?,
            excluded: WireDecode::decode(buf)?,
        })
    }
}

/// Verbosity threshold for launcher diagnostics.
///
/// Levels are transmitted as an integer rank rather than by name. Higher ranks are more severe.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogLevel {
    /// Everything is emitted.
    Trace,
    /// Debugging output.
    Debug,
    /// Informational output. This is the default.
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
    /// Nothing is emitted.
    Off,
}

impl LogLevel {
    /// All levels, from most to least verbose.
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Off,
    ];

    /// Returns the integer rank used on the wire.
    pub const fn rank(self) -> i32 {
        match self {
            LogLevel::Trace => 300,
            LogLevel::Debug => 500,
            LogLevel::Info => 800,
            LogLevel::Warn => 900,
            LogLevel::Error => 1000,
            LogLevel::Off => i32::MAX,
        }
    }

    /// Resolves a rank back to a level.
    ///
    /// Known ranks map to their level exactly. Any other rank resolves to the least verbose level
    /// whose rank does not exceed it, and ranks below [`LogLevel::Trace`] resolve to `Trace`.
    pub fn from_rank(rank: i32) -> Self {
        Self::ALL
            .iter()
            .rev()
            .copied()
            .find(|level| level.rank() <= rank)
            .unwrap_or(LogLevel::Trace)
    }

    /// Returns the lowercase name of this level.
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned while parsing a [`LogLevel`] value from a string.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
#[error(
    "unrecognized log level: {input}\n(known values: {})",
    LogLevel::ALL.map(LogLevel::as_str).join(", "),
)]
pub struct LogLevelParseError {
    input: String,
}

impl FromStr for LogLevel {
    type Err = LogLevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| LogLevelParseError {
                input: s.to_owned(),
            })
    }
}
