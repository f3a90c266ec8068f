// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The boundary with the test engine.
//!
//! Test discovery and execution are not implemented by testfork. Instead, an engine is handed a
//! [`DiscoveryRequest`] and reports what happens through [`ExecutionEvent`]s delivered to an
//! [`ExecutionListener`].
//!
//! # Event ordering
//!
//! Engines must uphold the following contract for every node:
//!
//! * [`Started`](ExecutionEvent::Started) precedes [`Finished`](ExecutionEvent::Finished).
//! * [`Skipped`](ExecutionEvent::Skipped) is exclusive with `Started` and `Finished`.
//! * [`PlanFinished`](ExecutionEvent::PlanFinished) is delivered once, after every other event.
//!
//! Events for sibling nodes may be delivered concurrently from several threads.

use crate::{errors::ListenerError, stack_trace::Throwable};
use camino::Utf8PathBuf;
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use std::{collections::BTreeSet, fmt, sync::Arc};
use thiserror::Error;

/// A test discovery and execution engine.
pub trait TestEngine {
    /// Discovers the nodes selected by `request` and executes them, reporting to `listener`.
    ///
    /// This blocks until the whole plan has finished. If the listener returns an error, the engine
    /// must stop and return it as [`EngineError::Listener`].
    fn execute(
        &self,
        request: &DiscoveryRequest,
        listener: &dyn ExecutionListener,
    ) -> Result<(), EngineError>;
}

/// Receives execution events from a [`TestEngine`].
pub trait ExecutionListener: Sync {
    /// Handles a single event.
    fn on_event(&self, event: ExecutionEvent<'_>) -> Result<(), ListenerError>;
}

/// An error returned by a [`TestEngine`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The listener rejected an event.
    #[error("execution listener failed")]
    Listener(#[from] ListenerError),

    /// The engine failed while discovering tests.
    #[error("test discovery failed: {message}")]
    Discovery {
        /// A description of the failure.
        message: String,
    },

    /// The engine failed while executing tests.
    #[error("test execution failed: {message}")]
    Execution {
        /// A description of the failure.
        message: String,
    },
}

/// What to discover, and which of the discovered nodes participate in the run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiscoveryRequest {
    /// Selectors whose results are unioned.
    pub selectors: Vec<DiscoverySelector>,

    /// Filters that a node must all pass.
    pub filters: Vec<DiscoveryFilter>,

    /// Engine configuration parameters.
    pub configuration: IndexMap<String, String>,
}

/// A criterion identifying candidate nodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscoverySelector {
    /// All classes in a package.
    Package(String),
    /// A fully qualified class.
    Class(String),
    /// A fully qualified method.
    Method(String),
    /// A classpath resource.
    ClasspathResource(String),
    /// Everything under a classpath root.
    ClasspathRoot(Utf8PathBuf),
    /// A URI.
    Uri(String),
    /// A file.
    File(Utf8PathBuf),
    /// A directory.
    Directory(Utf8PathBuf),
}

/// Whether a filter includes or excludes what it matches.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterMode {
    /// Only matching nodes participate.
    Include,
    /// Matching nodes do not participate.
    Exclude,
}

/// A constraint on which discovered nodes participate. Patterns within a filter are OR-combined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscoveryFilter {
    /// Regular expressions matched against fully qualified class names.
    ClassNamePatterns {
        /// Include or exclude.
        mode: FilterMode,
        /// The patterns.
        patterns: Vec<String>,
    },
    /// Packages, including their sub-packages.
    PackageNames {
        /// Include or exclude.
        mode: FilterMode,
        /// The package names.
        names: Vec<String>,
    },
    /// Tag expressions.
    Tags {
        /// Include or exclude.
        mode: FilterMode,
        /// The tags.
        tags: Vec<String>,
    },
    /// Engine identifiers.
    Engines {
        /// Include or exclude.
        mode: FilterMode,
        /// The engine IDs.
        engine_ids: Vec<String>,
    },
}

/// A node in the engine's test plan, as identified by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestNode {
    /// The engine's unique ID for this node.
    pub unique_id: String,
    /// The unique ID of the parent node, if any.
    pub parent_id: Option<String>,
    /// The name to show to users.
    pub display_name: String,
    /// Whether this node is a test.
    pub is_test: bool,
    /// Whether this node contains other nodes.
    pub is_container: bool,
    /// The tags attached to this node.
    pub tags: BTreeSet<TestTag>,
    /// Where this node was discovered, if known.
    pub source: Option<TestSource>,
}

impl TestNode {
    /// Returns the fully qualified name of the type that declares this node, if known.
    pub fn declaring_type(&self) -> Option<&str> {
        self.source.as_ref().and_then(TestSource::class_name)
    }
}

/// A tag attached to a [`TestNode`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TestTag {
    name: String,
}

impl TestTag {
    /// Creates a new tag.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the tag's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Where a node was discovered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestSource {
    /// A class.
    Class {
        /// The fully qualified class name.
        class_name: String,
    },
    /// A method in a class.
    Method {
        /// The fully qualified name of the declaring class.
        class_name: String,
        /// The method name.
        method_name: String,
    },
    /// A file, optionally with a line.
    File {
        /// The path to the file.
        path: Utf8PathBuf,
        /// The line within the file.
        line: Option<u32>,
    },
    /// Anything else, described by the engine.
    Other(String),
}

impl TestSource {
    /// Returns the fully qualified name of the declaring class, for class and method sources.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            TestSource::Class { class_name } | TestSource::Method { class_name, .. } => {
                Some(class_name)
            }
            TestSource::File { .. } | TestSource::Other(_) => None,
        }
    }
}

impl fmt::Display for TestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestSource::Class { class_name } => write!(f, "ClassSource [className = '{class_name}']"),
            TestSource::Method {
                class_name,
                method_name,
            } => write!(
                f,
                "MethodSource [className = '{class_name}', methodName = '{method_name}']"
            ),
            TestSource::File { path, line: None } => write!(f, "FileSource [file = {path}]"),
            TestSource::File {
                path,
                line: Some(line),
            } => write!(f, "FileSource [file = {path}, line = {line}]"),
            TestSource::Other(description) => f.write_str(description),
        }
    }
}

/// The status of a finished node, as reported by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The node completed successfully.
    Successful,
    /// The node was aborted, for example by a failed assumption.
    Aborted,
    /// The node failed.
    Failed,
    /// A status this version of testfork does not know about.
    Other(String),
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Successful => f.write_str("SUCCESSFUL"),
            ExecutionStatus::Aborted => f.write_str("ABORTED"),
            ExecutionStatus::Failed => f.write_str("FAILED"),
            ExecutionStatus::Other(status) => f.write_str(status),
        }
    }
}

/// The result of executing a node.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    /// The status of the node.
    pub status: ExecutionStatus,
    /// What caused an abort or a failure, if anything.
    pub throwable: Option<Arc<Throwable>>,
}

impl ExecutionResult {
    /// A successful result.
    pub fn successful() -> Self {
        Self {
            status: ExecutionStatus::Successful,
            throwable: None,
        }
    }

    /// An aborted result.
    pub fn aborted(throwable: Option<Arc<Throwable>>) -> Self {
        Self {
            status: ExecutionStatus::Aborted,
            throwable,
        }
    }

    /// A failed result.
    pub fn failed(throwable: Option<Arc<Throwable>>) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            throwable,
        }
    }
}

/// A set of key-value pairs published by a running node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedEntry {
    /// When the entry was published, in local time.
    pub timestamp: NaiveDateTime,
    /// The published pairs, in publication order.
    pub key_value_pairs: IndexMap<String, String>,
}

/// An event reported by a [`TestEngine`] while it executes a plan.
#[derive(Clone, Copy, Debug)]
pub enum ExecutionEvent<'a> {
    /// A node was skipped.
    Skipped {
        /// The node.
        node: &'a TestNode,
        /// Why the node was skipped, if known.
        reason: Option<&'a str>,
    },
    /// A node started executing.
    Started {
        /// The node.
        node: &'a TestNode,
    },
    /// A node finished executing.
    Finished {
        /// The node.
        node: &'a TestNode,
        /// The result of the execution.
        result: &'a ExecutionResult,
    },
    /// A node published a report entry.
    ReportEntryPublished {
        /// The node.
        node: &'a TestNode,
        /// The published entry.
        entry: &'a PublishedEntry,
    },
    /// The whole plan finished executing.
    PlanFinished,
}
