// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A [`TestEngine`] that "runs" the suites in [`EXPECTED_TEST_SUITES`].
//!
//! Engine configuration parameters starting with `fixture.` change how the engine behaves, so that
//! launcher failure modes can be exercised.

use crate::{
    ENGINE_ID, ENGINE_UNIQUE_ID,
    models::{TestCaseFixture, TestCaseFixtureStatus, TestSuiteFixture},
    testfork_fixtures::EXPECTED_TEST_SUITES,
};
use chrono::NaiveDate;
use indexmap::IndexMap;
use regex::Regex;
use std::{collections::BTreeSet, sync::Arc, time::Duration};
use testfork_runner::{
    engine::{
        DiscoveryFilter, DiscoveryRequest, DiscoverySelector, EngineError, ExecutionEvent,
        ExecutionListener, ExecutionResult, ExecutionStatus, FilterMode, PublishedEntry,
        TestEngine, TestNode, TestSource, TestTag,
    },
    stack_trace::{StackFrame, Throwable},
};

/// Exit the process with this code as soon as the plan starts.
pub const EXIT_KEY: &str = "fixture.exit";
/// Never finish the plan.
pub const HANG_KEY: &str = "fixture.hang";
/// Return from the engine without reporting that the plan finished.
pub const OMIT_PLAN_FINISHED_KEY: &str = "fixture.omit-plan-finished";
/// Fail the engine with this message after the plan starts.
pub const ENGINE_ERROR_KEY: &str = "fixture.engine-error";
/// Finish the first test with this status, which is not one the listener knows about.
pub const UNKNOWN_STATUS_KEY: &str = "fixture.unknown-status";
/// Panic with this message after the plan starts.
pub const PANIC_KEY: &str = "fixture.panic";
/// Run each suite on its own thread.
pub const PARALLEL_KEY: &str = "fixture.parallel";

/// The timestamp of every report entry published by fixtures.
pub fn entry_timestamp() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .and_then(|date| date.and_hms_opt(3, 4, 5))
        .unwrap_or_default()
}

#[derive(Clone, Debug, Default)]
pub struct ScriptedEngine;

impl TestEngine for ScriptedEngine {
    fn execute(
        &self,
        request: &DiscoveryRequest,
        listener: &dyn ExecutionListener,
    ) -> Result<(), EngineError> {
        let config = &request.configuration;
        let plan = discover(request)?;

        let root = engine_node();
        listener.on_event(ExecutionEvent::Started { node: &root })?;

        if let Some(code) = config.get(EXIT_KEY) {
            let code = code.parse().map_err(|_| EngineError::Discovery {
                message: format!("invalid {EXIT_KEY}: {code}"),
            })?;
            std::process::exit(code);
        }
        if config.contains_key(HANG_KEY) {
            loop {
                std::thread::sleep(Duration::from_secs(3600));
            }
        }
        if let Some(message) = config.get(PANIC_KEY) {
            panic!("{message}");
        }
        if let Some(message) = config.get(ENGINE_ERROR_KEY) {
            return Err(EngineError::Execution {
                message: message.clone(),
            });
        }

        let unknown_status = config.get(UNKNOWN_STATUS_KEY).map(String::as_str);
        if config.contains_key(PARALLEL_KEY) {
            std::thread::scope(|scope| {
                let handles: Vec<_> = plan
                    .iter()
                    .map(|(suite, tests)| {
                        scope.spawn(move || run_suite(suite, tests, unknown_status, listener))
                    })
                    .collect();
                handles
                    .into_iter()
                    .try_for_each(|handle| {
                        handle
                            .join()
                            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                    })
            })?;
        } else {
            for (suite, tests) in &plan {
                run_suite(suite, tests, unknown_status, listener)?;
            }
        }

        listener.on_event(ExecutionEvent::Finished {
            node: &root,
            result: &ExecutionResult::successful(),
        })?;
        if !config.contains_key(OMIT_PLAN_FINISHED_KEY) {
            listener.on_event(ExecutionEvent::PlanFinished)?;
        }
        Ok(())
    }
}

type Plan = Vec<(&'static TestSuiteFixture, Vec<&'static TestCaseFixture>)>;

fn discover(request: &DiscoveryRequest) -> Result<Plan, EngineError> {
    let filters = CompiledFilters::new(&request.filters)?;
    if !filters.engine_selected {
        return Ok(Vec::new());
    }

    let mut plan = Vec::new();
    for suite in EXPECTED_TEST_SUITES.iter() {
        if !filters.matches_suite(suite) {
            continue;
        }
        let tests: Vec<_> = suite
            .test_cases
            .iter()
            .filter(|test| {
                request
                    .selectors
                    .iter()
                    .any(|selector| selects(selector, suite, test))
            })
            .filter(|test| filters.matches_tags(suite, test))
            .collect();
        if !tests.is_empty() {
            plan.push((suite, tests));
        }
    }
    Ok(plan)
}

fn selects(selector: &DiscoverySelector, suite: &TestSuiteFixture, test: &TestCaseFixture) -> bool {
    match selector {
        DiscoverySelector::Package(package) => is_in_package(suite, package),
        DiscoverySelector::Class(class_name) => class_name == suite.class_name,
        DiscoverySelector::Method(method) => method
            .split_once('#')
            .is_some_and(|(class_name, name)| class_name == suite.class_name && name == test.name),
        DiscoverySelector::ClasspathRoot(_) => true,
        DiscoverySelector::ClasspathResource(_)
        | DiscoverySelector::Uri(_)
        | DiscoverySelector::File(_)
        | DiscoverySelector::Directory(_) => false,
    }
}

fn is_in_package(suite: &TestSuiteFixture, package: &str) -> bool {
    let suite_package = suite.package();
    suite_package == package
        || suite_package
            .strip_prefix(package)
            .is_some_and(|rest| rest.starts_with('.'))
}

struct CompiledFilters<'a> {
    class_patterns: Vec<(FilterMode, Vec<Regex>)>,
    packages: Vec<(FilterMode, &'a [String])>,
    tags: Vec<(FilterMode, &'a [String])>,
    engine_selected: bool,
}

impl<'a> CompiledFilters<'a> {
    fn new(filters: &'a [DiscoveryFilter]) -> Result<Self, EngineError> {
        let mut compiled = Self {
            class_patterns: Vec::new(),
            packages: Vec::new(),
            tags: Vec::new(),
            engine_selected: true,
        };
        for filter in filters {
            match filter {
                DiscoveryFilter::ClassNamePatterns { mode, patterns } => {
                    let regexes = patterns
                        .iter()
                        .map(|pattern| {
                            Regex::new(&format!("^(?:{pattern})$")).map_err(|error| {
                                EngineError::Discovery {
                                    message: format!("invalid class name pattern: {error}"),
                                }
                            })
                        })
                        .collect::<Result<_, _>>()?;
                    compiled.class_patterns.push((*mode, regexes));
                }
                DiscoveryFilter::PackageNames { mode, names } => {
                    compiled.packages.push((*mode, names));
                }
                DiscoveryFilter::Tags { mode, tags } => compiled.tags.push((*mode, tags)),
                DiscoveryFilter::Engines { mode, engine_ids } => {
                    let listed = engine_ids.iter().any(|id| id == ENGINE_ID);
                    compiled.engine_selected &= match mode {
                        FilterMode::Include => listed,
                        FilterMode::Exclude => !listed,
                    };
                }
            }
        }
        Ok(compiled)
    }

    fn matches_suite(&self, suite: &TestSuiteFixture) -> bool {
        let class_ok = self.class_patterns.iter().all(|(mode, regexes)| {
            apply_mode(*mode, regexes.iter().any(|re| re.is_match(suite.class_name)))
        });
        let package_ok = self.packages.iter().all(|(mode, names)| {
            apply_mode(*mode, names.iter().any(|name| is_in_package(suite, name)))
        });
        class_ok && package_ok
    }

    fn matches_tags(&self, suite: &TestSuiteFixture, test: &TestCaseFixture) -> bool {
        self.tags.iter().all(|(mode, tags)| {
            let tagged = suite
                .tags
                .iter()
                .chain(test.tags)
                .any(|own| tags.iter().any(|tag| own == tag));
            apply_mode(*mode, tagged)
        })
    }
}

fn apply_mode(mode: FilterMode, matched: bool) -> bool {
    match mode {
        FilterMode::Include => matched,
        FilterMode::Exclude => !matched,
    }
}

fn run_suite(
    suite: &TestSuiteFixture,
    tests: &[&TestCaseFixture],
    unknown_status: Option<&str>,
    listener: &dyn ExecutionListener,
) -> Result<(), EngineError> {
    let suite_node = suite_node(suite);
    listener.on_event(ExecutionEvent::Started { node: &suite_node })?;

    for (index, test) in tests.iter().enumerate() {
        let node = test_node(suite, test);
        if let TestCaseFixtureStatus::Disabled { reason } = test.status {
            listener.on_event(ExecutionEvent::Skipped {
                node: &node,
                reason: Some(reason),
            })?;
            continue;
        }

        listener.on_event(ExecutionEvent::Started { node: &node })?;
        let result = match unknown_status.filter(|_| index == 0) {
            Some(status) => ExecutionResult {
                status: ExecutionStatus::Other(status.to_owned()),
                throwable: None,
            },
            None => finish_test(suite, test, &node, listener)?,
        };
        listener.on_event(ExecutionEvent::Finished {
            node: &node,
            result: &result,
        })?;
    }

    listener.on_event(ExecutionEvent::Finished {
        node: &suite_node,
        result: &ExecutionResult::successful(),
    })?;
    Ok(())
}

/// Publishes whatever `test` publishes and returns its result.
fn finish_test(
    suite: &TestSuiteFixture,
    test: &TestCaseFixture,
    node: &TestNode,
    listener: &dyn ExecutionListener,
) -> Result<ExecutionResult, EngineError> {
    let result = match test.status {
        TestCaseFixtureStatus::Pass | TestCaseFixtureStatus::Disabled { .. } => {
            ExecutionResult::successful()
        }
        TestCaseFixtureStatus::PassWithEntries => {
            let mut key_value_pairs = IndexMap::new();
            key_value_pairs.insert("attempt".to_owned(), "1".to_owned());
            key_value_pairs.insert("user".to_owned(), "fixture".to_owned());
            let entry = PublishedEntry {
                timestamp: entry_timestamp(),
                key_value_pairs,
            };
            listener.on_event(ExecutionEvent::ReportEntryPublished {
                node,
                entry: &entry,
            })?;
            ExecutionResult::successful()
        }
        TestCaseFixtureStatus::PassWithStdout => {
            println!("printed by {}.{}", suite.class_name, test.name);
            ExecutionResult::successful()
        }
        TestCaseFixtureStatus::Fail => {
            ExecutionResult::failed(Some(Arc::new(assertion_failure(suite, test))))
        }
        TestCaseFixtureStatus::FailWithCause => {
            ExecutionResult::failed(Some(Arc::new(failure_with_cause(suite, test))))
        }
        TestCaseFixtureStatus::Abort => ExecutionResult::aborted(Some(Arc::new(Throwable::new(
            "org.opentest4j.TestAbortedException",
            Some("Assumption failed: assumption is not true".to_owned()),
            with_runner_frames(vec![test_frame(suite, test)]),
        )))),
    };
    Ok(result)
}

fn engine_node() -> TestNode {
    TestNode {
        unique_id: ENGINE_UNIQUE_ID.to_owned(),
        parent_id: None,
        display_name: "Fixture Engine".to_owned(),
        is_test: false,
        is_container: true,
        tags: BTreeSet::new(),
        source: None,
    }
}

fn suite_node(suite: &TestSuiteFixture) -> TestNode {
    TestNode {
        unique_id: suite.unique_id(),
        parent_id: Some(ENGINE_UNIQUE_ID.to_owned()),
        display_name: suite
            .class_name
            .rsplit('.')
            .next()
            .unwrap_or(suite.class_name)
            .to_owned(),
        is_test: false,
        is_container: true,
        tags: suite.tags.iter().map(|&tag| TestTag::new(tag)).collect(),
        source: Some(TestSource::Class {
            class_name: suite.class_name.to_owned(),
        }),
    }
}

fn test_node(suite: &TestSuiteFixture, test: &TestCaseFixture) -> TestNode {
    TestNode {
        unique_id: test.unique_id(suite),
        parent_id: Some(suite.unique_id()),
        display_name: format!("{}()", test.name),
        is_test: true,
        is_container: false,
        tags: suite
            .tags
            .iter()
            .chain(test.tags)
            .map(|&tag| TestTag::new(tag))
            .collect(),
        source: Some(TestSource::Method {
            class_name: suite.class_name.to_owned(),
            method_name: test.name.to_owned(),
        }),
    }
}

fn test_frame(suite: &TestSuiteFixture, test: &TestCaseFixture) -> StackFrame {
    StackFrame::new(suite.class_name, test.name).with_location(suite.file_name, test.line)
}

/// The frames of the engine machinery that invokes a test method.
pub fn runner_frames() -> Vec<StackFrame> {
    vec![
        StackFrame::new("java.base/jdk.internal.reflect.DirectMethodHandleAccessor", "invoke")
            .with_location("DirectMethodHandleAccessor.java", 103),
        StackFrame::new("org.junit.platform.commons.util.ReflectionUtils", "invokeMethod")
            .with_location("ReflectionUtils.java", 728),
        StackFrame::new("java.base/java.lang.Thread", "run").with_location("Thread.java", 1583),
    ]
}

fn with_runner_frames(mut frames: Vec<StackFrame>) -> Vec<StackFrame> {
    frames.extend(runner_frames());
    frames
}

fn assertion_failure(suite: &TestSuiteFixture, test: &TestCaseFixture) -> Throwable {
    Throwable::new(
        "org.opentest4j.AssertionFailedError",
        Some("expected: <true> but was: <false>".to_owned()),
        with_runner_frames(vec![
            StackFrame::new("org.junit.jupiter.api.AssertionUtils", "fail")
                .with_location("AssertionUtils.java", 55),
            StackFrame::new("org.junit.jupiter.api.AssertTrue", "assertTrue")
                .with_location("AssertTrue.java", 40),
            test_frame(suite, test),
        ]),
    )
}

fn failure_with_cause(suite: &TestSuiteFixture, test: &TestCaseFixture) -> Throwable {
    let cause = Throwable::new(
        "java.io.IOException",
        Some("disk full".to_owned()),
        with_runner_frames(vec![
            StackFrame::new("dev.testfork.fixtures.Store", "save").with_location("Store.java", 31),
            test_frame(suite, test),
        ]),
    );
    Throwable::with_cause(
        "java.lang.IllegalStateException",
        Some("could not save".to_owned()),
        with_runner_frames(vec![test_frame(suite, test)]),
        Arc::new(cause),
    )
}
