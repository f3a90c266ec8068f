// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builds a [`TestReport`] from the events delivered by a test engine.

use crate::{
    engine::{
        ExecutionEvent, ExecutionListener, ExecutionResult, ExecutionStatus, PublishedEntry,
        TestNode,
    },
    errors::ListenerError,
    stack_trace::{FrameFilter, render_stack_trace},
};
use chrono::{Local, NaiveDateTime, TimeZone};
use indexmap::IndexMap;
use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};
use testfork_protocol::{ReportEntry, TestData, TestIdentifier, TestReport, TestStatus};
use tracing::debug;

/// The source recorded for nodes the engine reports without one.
///
/// Consumers of existing reports match on this literal, so it is kept rather than left empty.
pub const MISSING_SOURCE: &str = "null";

/// An [`ExecutionListener`] that accumulates events into a [`TestReport`].
///
/// Events may arrive concurrently from several engine threads. Each event is handled under a single
/// lock covering both the accumulated results and the table of start times.
#[derive(Debug)]
pub struct ReportBuilder {
    filter_stack_traces: bool,
    state: Mutex<BuilderState>,
    complete: AtomicBool,
}

#[derive(Debug, Default)]
struct BuilderState {
    // Insertion order is the order in which nodes were first observed.
    results: IndexMap<TestIdentifier, TestData>,
    started: HashMap<TestIdentifier, Instant>,
}

impl BuilderState {
    fn data_mut(&mut self, identifier: TestIdentifier) -> &mut TestData {
        self.results.entry(identifier).or_default()
    }
}

impl ReportBuilder {
    /// Creates a new builder.
    ///
    /// If `filter_stack_traces` is true, failure traces are trimmed to the frames relevant to the
    /// failing node's declaring type.
    pub fn new(filter_stack_traces: bool) -> Self {
        Self {
            filter_stack_traces,
            state: Mutex::new(BuilderState::default()),
            complete: AtomicBool::new(false),
        }
    }

    /// Returns true once the engine has reported that the whole plan finished.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Returns a snapshot of the results accumulated so far, in first-observed order.
    pub fn test_report(&self) -> TestReport {
        self.lock()
            .results
            .iter()
            .map(|(identifier, data)| (identifier.clone(), data.clone()))
            .collect()
    }

    /// Consumes the builder, returning the accumulated report.
    pub fn into_report(self) -> TestReport {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .results
            .into_iter()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, BuilderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn skipped(&self, node: &TestNode, reason: Option<&str>) {
        debug!("skipped {}: {}", node.unique_id, reason.unwrap_or("<no reason>"));
        let mut state = self.lock();
        let data = state.data_mut(to_identifier(node));
        data.status = TestStatus::Skipped;
        data.skip_reason = reason.unwrap_or_default().to_owned();
    }

    fn started(&self, node: &TestNode) {
        debug!("started {}", node.unique_id);
        let now = Instant::now();
        self.lock().started.insert(to_identifier(node), now);
    }

    fn finished(&self, node: &TestNode, result: &ExecutionResult) -> Result<(), ListenerError> {
        let status = match &result.status {
            ExecutionStatus::Successful => TestStatus::Successful,
            ExecutionStatus::Aborted => TestStatus::Aborted,
            ExecutionStatus::Failed => TestStatus::Failed,
            ExecutionStatus::Other(status) => {
                return Err(ListenerError::UnknownStatus {
                    unique_id: node.unique_id.clone(),
                    status: status.clone(),
                });
            }
        };
        debug!("finished {} with {status}", node.unique_id);

        // Rendering can be expensive, so do it outside the lock.
        let stack_trace = result.throwable.as_ref().map(|throwable| {
            let filter = node
                .declaring_type()
                .filter(|_| self.filter_stack_traces)
                .map(FrameFilter::new);
            render_stack_trace(throwable, filter.as_ref())
        });

        let now = Instant::now();
        let identifier = to_identifier(node);
        let mut state = self.lock();
        let duration = match state.started.remove(&identifier) {
            Some(start) => i64::try_from(now.duration_since(start).as_millis()).unwrap_or(i64::MAX),
            None => TestData::UNKNOWN_DURATION,
        };
        let data = state.data_mut(identifier);
        data.status = status;
        data.duration = duration;
        if let Some(stack_trace) = stack_trace {
            data.stack_trace = stack_trace;
        }
        Ok(())
    }

    fn report_entry_published(&self, node: &TestNode, entry: &PublishedEntry) {
        let timestamp = epoch_millis(entry.timestamp);
        let mut state = self.lock();
        let data = state.data_mut(to_identifier(node));
        data.reports
            .extend(entry.key_value_pairs.iter().map(|(key, value)| ReportEntry {
                timestamp,
                key: key.clone(),
                value: value.clone(),
            }));
    }
}

impl ExecutionListener for ReportBuilder {
    fn on_event(&self, event: ExecutionEvent<'_>) -> Result<(), ListenerError> {
        match event {
            ExecutionEvent::Skipped { node, reason } => self.skipped(node, reason),
            ExecutionEvent::Started { node } => self.started(node),
            ExecutionEvent::Finished { node, result } => self.finished(node, result)?,
            ExecutionEvent::ReportEntryPublished { node, entry } => {
                self.report_entry_published(node, entry)
            }
            ExecutionEvent::PlanFinished => {
                debug!("test plan finished");
                self.complete.store(true, Ordering::Release);
            }
        }
        Ok(())
    }
}

/// Converts an engine node to the identifier recorded in reports.
pub fn to_identifier(node: &TestNode) -> TestIdentifier {
    TestIdentifier {
        id: node.unique_id.clone(),
        parent_id: node.parent_id.clone().unwrap_or_default(),
        display_name: node.display_name.clone(),
        is_test: node.is_test,
        is_container: node.is_container,
        tags: node.tags.iter().map(|tag| tag.name().to_owned()).collect(),
        test_source: node
            .source
            .as_ref()
            .map_or_else(|| MISSING_SOURCE.to_owned(), |source| source.to_string()),
    }
}

/// Interprets a local date-time as milliseconds since the Unix epoch.
fn epoch_millis(timestamp: NaiveDateTime) -> i64 {
    match Local.from_local_datetime(&timestamp).earliest() {
        Some(local) => local.timestamp_millis(),
        // Skipped over by a daylight saving transition.
        None => timestamp.and_utc().timestamp_millis(),
    }
}
