// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data models for fixture information.

use iddqd::{IdOrdItem, IdOrdMap, id_upcast};
use testfork_protocol::TestStatus;

#[derive(Clone, Debug)]
pub struct TestSuiteFixture {
    pub class_name: &'static str,
    pub file_name: &'static str,
    pub tags: &'static [&'static str],
    pub test_cases: IdOrdMap<TestCaseFixture>,
}

impl TestSuiteFixture {
    pub fn new(
        class_name: &'static str,
        file_name: &'static str,
        test_cases: IdOrdMap<TestCaseFixture>,
    ) -> Self {
        Self {
            class_name,
            file_name,
            tags: &[],
            test_cases,
        }
    }

    pub fn with_tags(mut self, tags: &'static [&'static str]) -> Self {
        self.tags = tags;
        self
    }

    pub fn unique_id(&self) -> String {
        format!("{}/[class:{}]", crate::ENGINE_UNIQUE_ID, self.class_name)
    }

    pub fn package(&self) -> &'static str {
        self.class_name
            .rsplit_once('.')
            .map_or("", |(package, _)| package)
    }
}

impl IdOrdItem for TestSuiteFixture {
    type Key<'a> = &'a str;
    fn key(&self) -> Self::Key<'_> {
        self.class_name
    }
    id_upcast!();
}

#[derive(Clone, Debug)]
pub struct TestCaseFixture {
    pub name: &'static str,
    pub status: TestCaseFixtureStatus,
    pub line: u32,
    pub tags: &'static [&'static str],
}

impl TestCaseFixture {
    pub fn new(name: &'static str, line: u32, status: TestCaseFixtureStatus) -> Self {
        Self {
            name,
            status,
            line,
            tags: &[],
        }
    }

    pub fn with_tags(mut self, tags: &'static [&'static str]) -> Self {
        self.tags = tags;
        self
    }

    pub fn unique_id(&self, suite: &TestSuiteFixture) -> String {
        format!("{}/[method:{}()]", suite.unique_id(), self.name)
    }
}

impl IdOrdItem for TestCaseFixture {
    type Key<'a> = &'a str;
    fn key(&self) -> Self::Key<'_> {
        self.name
    }
    id_upcast!();
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TestCaseFixtureStatus {
    Pass,
    /// Passes after publishing a report entry.
    PassWithEntries,
    /// Passes after printing to standard output.
    PassWithStdout,
    /// Fails an assertion.
    Fail,
    /// Fails with an exception that has a cause.
    FailWithCause,
    /// Fails an assumption.
    Abort,
    Disabled { reason: &'static str },
}

impl TestCaseFixtureStatus {
    pub fn expected_status(self) -> TestStatus {
        match self {
            TestCaseFixtureStatus::Pass
            | TestCaseFixtureStatus::PassWithEntries
            | TestCaseFixtureStatus::PassWithStdout => TestStatus::Successful,
            TestCaseFixtureStatus::Fail | TestCaseFixtureStatus::FailWithCause => {
                TestStatus::Failed
            }
            TestCaseFixtureStatus::Abort => TestStatus::Aborted,
            TestCaseFixtureStatus::Disabled { .. } => TestStatus::Skipped,
        }
    }
}
