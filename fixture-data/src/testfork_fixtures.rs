// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The suites run by the scripted engine.

use crate::models::{TestCaseFixture, TestCaseFixtureStatus, TestSuiteFixture};
use iddqd::{IdOrdMap, id_ord_map};
use std::sync::LazyLock;

pub static EXPECTED_TEST_SUITES: LazyLock<IdOrdMap<TestSuiteFixture>> = LazyLock::new(|| {
    id_ord_map! {
        TestSuiteFixture::new(
            "dev.testfork.fixtures.BasicTest",
            "BasicTest.java",
            id_ord_map! {
                TestCaseFixture::new("passes", 12, TestCaseFixtureStatus::Pass),
                TestCaseFixture::new("fails", 18, TestCaseFixtureStatus::Fail),
                TestCaseFixture::new("abortsOnAssumption", 24, TestCaseFixtureStatus::Abort),
                TestCaseFixture::new(
                    "disabled",
                    30,
                    TestCaseFixtureStatus::Disabled { reason: "not ready yet" },
                ),
                TestCaseFixture::new("publishesEntries", 36, TestCaseFixtureStatus::PassWithEntries),
                TestCaseFixture::new("printsToStdout", 42, TestCaseFixtureStatus::PassWithStdout),
            },
        ),
        TestSuiteFixture::new(
            "dev.testfork.fixtures.CauseTest",
            "CauseTest.java",
            id_ord_map! {
                TestCaseFixture::new("wrapsCause", 15, TestCaseFixtureStatus::FailWithCause),
                TestCaseFixture::new("passes", 21, TestCaseFixtureStatus::Pass),
            },
        )
        .with_tags(&["slow"]),
        TestSuiteFixture::new(
            "dev.testfork.fixtures.tagged.TaggedTest",
            "TaggedTest.java",
            id_ord_map! {
                TestCaseFixture::new("fast", 10, TestCaseFixtureStatus::Pass).with_tags(&["fast"]),
                TestCaseFixture::new("flaky", 16, TestCaseFixtureStatus::Pass).with_tags(&["flaky"]),
                TestCaseFixture::new("untagged", 22, TestCaseFixtureStatus::Pass),
            },
        ),
    }
});

pub fn get_expected_test(class_name: &str, test_name: &str) -> &'static TestCaseFixture {
    let suite = EXPECTED_TEST_SUITES
        .get(class_name)
        .unwrap_or_else(|| panic!("suite {class_name} not found"));
    suite
        .test_cases
        .get(test_name)
        .unwrap_or_else(|| panic!("for suite {class_name}, test name {test_name} not found"))
}
