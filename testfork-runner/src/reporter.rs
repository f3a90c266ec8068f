// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable display of a [`TestReport`].

use chrono::DateTime;
use indexmap::IndexMap;
use owo_colors::{OwoColorize, Style};
use std::{
    collections::{HashMap, HashSet},
    fmt,
};
use testfork_protocol::{ReportEntry, TestData, TestIdentifier, TestReport, TestStatus};

/// Counts of nodes by status.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// All nodes of this kind.
    pub found: usize,
    /// Nodes that were skipped.
    pub skipped: usize,
    /// Nodes that were aborted.
    pub aborted: usize,
    /// Nodes that ran successfully.
    pub successful: usize,
    /// Nodes that failed.
    pub failed: usize,
    /// Nodes without a terminal event.
    pub not_run: usize,
}

impl StatusCounts {
    fn add(&mut self, status: TestStatus) {
        self.found += 1;
        match status {
            TestStatus::Successful => self.successful += 1,
            TestStatus::Aborted => self.aborted += 1,
            TestStatus::Skipped => self.skipped += 1,
            TestStatus::Failed => self.failed += 1,
            TestStatus::NotRun => self.not_run += 1,
        }
    }
}

/// A summary of a [`TestReport`].
///
/// A node that is both a test and a container is counted in both.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportSummary {
    /// Counts for containers.
    pub containers: StatusCounts,
    /// Counts for tests.
    pub tests: StatusCounts,
}

impl ReportSummary {
    /// Summarizes `report`.
    pub fn new(report: &TestReport) -> Self {
        let mut summary = Self::default();
        for (identifier, data) in report {
            if identifier.is_container {
                summary.containers.add(data.status);
            }
            if identifier.is_test {
                summary.tests.add(data.status);
            }
        }
        summary
    }
}

/// Displays a [`TestReport`] as a tree, followed by a summary.
#[derive(Debug)]
pub struct ReportDisplay<'a> {
    report: &'a TestReport,
    styles: Styles,
}

impl<'a> ReportDisplay<'a> {
    /// Creates a new display with no styling.
    pub fn new(report: &'a TestReport) -> Self {
        Self {
            report,
            styles: Styles::default(),
        }
    }

    /// Colorizes the output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    fn write_node(
        &self,
        f: &mut fmt::Formatter<'_>,
        tree: &Tree<'a>,
        index: usize,
        depth: usize,
        visited: &mut HashSet<usize>,
    ) -> fmt::Result {
        if !visited.insert(index) {
            return Ok(());
        }
        let Some(&(identifier, data)) = tree.entries.get(index) else {
            return Ok(());
        };
        let indent = "  ".repeat(depth);
        self.write_line(f, &indent, identifier, data)?;
        self.write_details(f, &format!("{indent}    "), data)?;

        for &child in tree.children(index) {
            self.write_node(f, tree, child, depth + 1, visited)?;
        }
        Ok(())
    }

    fn write_line(
        &self,
        f: &mut fmt::Formatter<'_>,
        indent: &str,
        identifier: &TestIdentifier,
        data: &TestData,
    ) -> fmt::Result {
        let name = if identifier.display_name.is_empty() {
            &identifier.id
        } else {
            &identifier.display_name
        };
        let status_style = match data.status {
            TestStatus::Successful => self.styles.pass,
            TestStatus::Failed => self.styles.fail,
            TestStatus::Aborted | TestStatus::Skipped => self.styles.skip,
            TestStatus::NotRun => self.styles.not_run,
        };
        write!(f, "{indent}{} {}", name, data.status.style(status_style))?;
        if let Some(millis) = data.duration_millis() {
            write!(f, " {}", format!("({millis}ms)").style(self.styles.duration))?;
        }
        writeln!(f)
    }

    fn write_details(
        &self,
        f: &mut fmt::Formatter<'_>,
        indent: &str,
        data: &TestData,
    ) -> fmt::Result {
        if data.status == TestStatus::Skipped && !data.skip_reason.is_empty() {
            writeln!(f, "{indent}reason: {}", data.skip_reason)?;
        }
        for line in data.stack_trace.lines() {
            writeln!(f, "{indent}{}", line.style(self.styles.stack_trace))?;
        }

        let mut by_timestamp: IndexMap<i64, Vec<&ReportEntry>> = IndexMap::new();
        for entry in &data.reports {
            by_timestamp.entry(entry.timestamp).or_default().push(entry);
        }
        for (timestamp, entries) in by_timestamp {
            writeln!(f, "{indent}report entry @ {}", format_timestamp(timestamp))?;
            for entry in entries {
                writeln!(f, "{indent}  {} = {}", entry.key.style(self.styles.key), entry.value)?;
            }
        }
        Ok(())
    }

    fn write_counts(
        &self,
        f: &mut fmt::Formatter<'_>,
        label: &str,
        counts: &StatusCounts,
    ) -> fmt::Result {
        writeln!(
            f,
            "{label:<11} {} found, {} skipped, {} aborted, {} successful, {} failed, {} not run",
            counts.found.style(self.styles.count),
            counts.skipped.style(self.styles.skip),
            counts.aborted.style(self.styles.skip),
            counts.successful.style(self.styles.pass),
            counts.failed.style(self.styles.fail),
            counts.not_run.style(self.styles.not_run),
        )
    }
}

impl fmt::Display for ReportDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = Tree::new(self.report);
        let mut visited = HashSet::new();
        for &root in &tree.roots {
            self.write_node(f, &tree, root, 0, &mut visited)?;
        }
        // Nodes on a parent cycle are not reachable from any root.
        for index in 0..self.report.len() {
            self.write_node(f, &tree, index, 0, &mut visited)?;
        }

        let summary = ReportSummary::new(self.report);
        writeln!(f)?;
        self.write_counts(f, "containers:", &summary.containers)?;
        self.write_counts(f, "tests:", &summary.tests)
    }
}

/// Parent-child links between report entries, by index.
///
/// Entries are distinct by `(parent_id, id)`, so one `id` may appear under several parents. A
/// child names its parent by `id` alone and is attached to the first entry with that `id`.
struct Tree<'a> {
    entries: Vec<(&'a TestIdentifier, &'a TestData)>,
    roots: Vec<usize>,
    children: Vec<Vec<usize>>,
}

impl<'a> Tree<'a> {
    fn new(report: &'a TestReport) -> Self {
        let entries: Vec<_> = report.iter().collect();
        let mut first_by_id: HashMap<&str, usize> = HashMap::new();
        for (index, &(identifier, _)) in entries.iter().enumerate() {
            first_by_id.entry(identifier.id.as_str()).or_insert(index);
        }

        let mut roots = Vec::new();
        let mut children = vec![Vec::new(); entries.len()];
        for (index, &(identifier, _)) in entries.iter().enumerate() {
            match first_by_id.get(identifier.parent_id.as_str()) {
                Some(&parent) if !identifier.is_root() => children[parent].push(index),
                _ => roots.push(index),
            }
        }
        Self {
            entries,
            roots,
            children,
        }
    }

    fn children(&self, index: usize) -> &[usize] {
        self.children.get(index).map(Vec::as_slice).unwrap_or_default()
    }
}

fn format_timestamp(millis: i64) -> String {
    match DateTime::from_timestamp_millis(millis) {
        Some(timestamp) => timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        None => millis.to_string(),
    }
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    not_run: Style,
    duration: Style,
    stack_trace: Style,
    key: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.not_run = Style::new().dimmed();
        self.duration = Style::new().dimmed();
        self.stack_trace = Style::new().red();
        self.key = Style::new().cyan();
    }
}
