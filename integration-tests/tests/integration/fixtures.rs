// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use fixture_data::{
    ENGINE_UNIQUE_ID,
    models::{TestCaseFixture, TestSuiteFixture},
    testfork_fixtures::EXPECTED_TEST_SUITES,
};
use std::{collections::BTreeSet, time::Duration};
use testfork_protocol::{TestParameters, TestReport, TestStatus};
use testfork_runner::{errors::OrchestratorError, orchestrator::ForkedRun};

pub const FIXTURE_LAUNCHER: &str = env!("CARGO_BIN_EXE_fixture-launcher");

/// Parameters selecting every fixture suite.
pub fn all_suites() -> TestParameters {
    TestParameters {
        classpath_roots: vec!["build/classes".to_owned()],
        ..Default::default()
    }
}

pub fn run_fixtures(params: &TestParameters) -> Result<TestReport, OrchestratorError> {
    ForkedRun::new(FIXTURE_LAUNCHER)
        .idle_timeout(Some(Duration::from_secs(60)))
        .run_blocking(params)
}

/// Checks that `report` holds exactly the engine root, the given tests and the suites containing
/// them, each with the status its fixture expects.
#[track_caller]
pub fn check_report(report: &TestReport, tests: &[(&TestSuiteFixture, &TestCaseFixture)]) {
    let mut expected_ids = BTreeSet::from([ENGINE_UNIQUE_ID.to_owned()]);
    for (suite, test) in tests {
        let suite_id = suite.unique_id();
        let (identifier, data) = report
            .get_by_id(&suite_id)
            .unwrap_or_else(|| panic!("suite {suite_id} missing from report"));
        assert!(identifier.is_container, "{suite_id} is a container");
        assert_eq!(identifier.parent_id, ENGINE_UNIQUE_ID, "{suite_id} parent");
        assert_eq!(data.status, TestStatus::Successful, "{suite_id} status");
        expected_ids.insert(suite_id);

        let test_id = test.unique_id(suite);
        let (identifier, data) = report
            .get_by_id(&test_id)
            .unwrap_or_else(|| panic!("test {test_id} missing from report"));
        assert!(identifier.is_test, "{test_id} is a test");
        assert_eq!(identifier.parent_id, suite.unique_id(), "{test_id} parent");
        assert_eq!(
            data.status,
            test.status.expected_status(),
            "{test_id} status"
        );
        if data.status == TestStatus::Skipped {
            assert_eq!(data.duration_millis(), None, "{test_id} skipped without running");
        } else {
            assert!(data.duration_millis().is_some(), "{test_id} has a duration");
        }
        expected_ids.insert(test_id);
    }

    let actual_ids: BTreeSet<_> = report
        .iter()
        .map(|(identifier, _)| identifier.id.clone())
        .collect();
    assert_eq!(actual_ids, expected_ids, "report contains exactly the expected nodes");
}

/// Every fixture test, paired with its suite.
pub fn all_tests() -> Vec<(&'static TestSuiteFixture, &'static TestCaseFixture)> {
    EXPECTED_TEST_SUITES
        .iter()
        .flat_map(|suite| suite.test_cases.iter().map(move |test| (suite, test)))
        .collect()
}
