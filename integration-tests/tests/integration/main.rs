// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests
//!
//! These tests run the `fixture-launcher` binary, which serves the fixture suites through the
//! scripted engine, either directly through the orchestrator or through a `testfork-dup` binary.
//! `testfork-dup` is the same as `testfork`, except it is built as part of this package so that its
//! path is known here.

use camino_tempfile::Utf8TempDir;
use color_eyre::Result;
use fixture_data::{
    scripted_engine::{
        ENGINE_ERROR_KEY, EXIT_KEY, HANG_KEY, OMIT_PLAN_FINISHED_KEY, PANIC_KEY, PARALLEL_KEY,
        UNKNOWN_STATUS_KEY,
    },
    testfork_fixtures::{EXPECTED_TEST_SUITES, get_expected_test},
};
use indoc::indoc;
use integration_tests::testfork_cli::TestforkCli;
use pretty_assertions::assert_eq;
use std::time::Duration;
use test_case::test_case;
use testfork_protocol::{IncludeExcludeList, TestParameters, TestStatus, TestforkExitCode};
use testfork_runner::{errors::OrchestratorError, orchestrator::ForkedRun};

mod fixtures;

use fixtures::*;

fn suite(class_name: &str) -> &'static fixture_data::models::TestSuiteFixture {
    EXPECTED_TEST_SUITES
        .get(class_name)
        .unwrap_or_else(|| panic!("suite {class_name} not found"))
}

#[test]
fn run_all_suites() -> Result<()> {
    let report = run_fixtures(&all_suites())?;

    check_report(&report, &all_tests());
    assert!(report.is_failure(), "fixtures include failing tests");
    assert_eq!(report.process_exit_code(), TestforkExitCode::TEST_RUN_FAILED);
    Ok(())
}

#[test]
fn run_parallel_suites() -> Result<()> {
    let mut params = all_suites();
    params
        .configuration
        .insert(PARALLEL_KEY.to_owned(), "true".to_owned());
    let report = run_fixtures(&params)?;

    check_report(&report, &all_tests());
    Ok(())
}

#[test]
fn run_single_method() -> Result<()> {
    let params = TestParameters {
        select_methods: vec!["dev.testfork.fixtures.BasicTest#passes".to_owned()],
        ..Default::default()
    };
    let report = run_fixtures(&params)?;

    let basic = suite("dev.testfork.fixtures.BasicTest");
    check_report(
        &report,
        &[(basic, get_expected_test(basic.class_name, "passes"))],
    );
    assert!(!report.is_failure());
    Ok(())
}

#[test_case(
    IncludeExcludeList { included: vec!["fast".to_owned()], excluded: vec![] },
    &["fast"]
    ; "include tag"
)]
#[test_case(
    IncludeExcludeList { included: vec![], excluded: vec!["flaky".to_owned()] },
    &["fast", "untagged"]
    ; "exclude tag"
)]
fn tag_filters(filter_tags: IncludeExcludeList, expected: &[&str]) -> Result<()> {
    let params = TestParameters {
        select_packages: vec!["dev.testfork.fixtures.tagged".to_owned()],
        filter_tags,
        ..Default::default()
    };
    let report = run_fixtures(&params)?;

    let tagged = suite("dev.testfork.fixtures.tagged.TaggedTest");
    let tests: Vec<_> = expected
        .iter()
        .map(|name| (tagged, get_expected_test(tagged.class_name, name)))
        .collect();
    check_report(&report, &tests);
    Ok(())
}

#[test]
fn failure_traces() -> Result<()> {
    let mut params = TestParameters {
        select_methods: vec![
            "dev.testfork.fixtures.BasicTest#fails".to_owned(),
            "dev.testfork.fixtures.CauseTest#wrapsCause".to_owned(),
        ],
        filter_stack_traces: true,
        ..Default::default()
    };
    let basic = suite("dev.testfork.fixtures.BasicTest");
    let cause = suite("dev.testfork.fixtures.CauseTest");
    let fails_id = get_expected_test(basic.class_name, "fails").unique_id(basic);
    let wraps_id = get_expected_test(cause.class_name, "wrapsCause").unique_id(cause);

    let report = run_fixtures(&params)?;
    let (_, fails) = report.get_by_id(&fails_id).expect("fails() is in the report");
    assert_eq!(
        fails.stack_trace,
        "org.opentest4j.AssertionFailedError: expected: <true> but was: <false>\n\
         \tat dev.testfork.fixtures.BasicTest.fails(BasicTest.java:18)"
    );

    params.filter_stack_traces = false;
    let report = run_fixtures(&params)?;
    let (_, fails) = report.get_by_id(&fails_id).expect("fails() is in the report");
    assert!(
        fails
            .stack_trace
            .contains("\tat org.junit.jupiter.api.AssertTrue.assertTrue(AssertTrue.java:40)\n"),
        "unfiltered trace keeps assertion frames:\n{}",
        fails.stack_trace
    );
    let (_, wraps) = report
        .get_by_id(&wraps_id)
        .expect("wrapsCause() is in the report");
    assert_eq!(
        wraps.stack_trace,
        indoc! {"
            java.lang.IllegalStateException: could not save
            \tat dev.testfork.fixtures.CauseTest.wrapsCause(CauseTest.java:15)
            \tat java.base/jdk.internal.reflect.DirectMethodHandleAccessor.invoke(DirectMethodHandleAccessor.java:103)
            \tat org.junit.platform.commons.util.ReflectionUtils.invokeMethod(ReflectionUtils.java:728)
            \tat java.base/java.lang.Thread.run(Thread.java:1583)
            Caused by: java.io.IOException: disk full
            \tat dev.testfork.fixtures.Store.save(Store.java:31)
            \t... 4 more"}
    );
    Ok(())
}

#[test]
fn report_entries_and_stdout() -> Result<()> {
    let params = TestParameters {
        select_methods: vec![
            "dev.testfork.fixtures.BasicTest#publishesEntries".to_owned(),
            "dev.testfork.fixtures.BasicTest#printsToStdout".to_owned(),
        ],
        ..Default::default()
    };
    let report = run_fixtures(&params)?;

    let basic = suite("dev.testfork.fixtures.BasicTest");
    let entries_id = get_expected_test(basic.class_name, "publishesEntries").unique_id(basic);
    let (_, data) = report
        .get_by_id(&entries_id)
        .expect("publishesEntries() is in the report");
    let pairs: Vec<_> = data
        .reports
        .iter()
        .map(|entry| (entry.key.as_str(), entry.value.as_str()))
        .collect();
    assert_eq!(pairs, vec![("attempt", "1"), ("user", "fixture")]);
    assert_eq!(
        data.reports[0].timestamp, data.reports[1].timestamp,
        "pairs published together share a timestamp"
    );

    let stdout_id = get_expected_test(basic.class_name, "printsToStdout").unique_id(basic);
    let (_, data) = report
        .get_by_id(&stdout_id)
        .expect("printsToStdout() is in the report");
    assert_eq!(data.status, TestStatus::Successful);
    Ok(())
}

#[test]
fn incomplete_plan_still_reports() -> Result<()> {
    let mut params = all_suites();
    params
        .configuration
        .insert(OMIT_PLAN_FINISHED_KEY.to_owned(), "true".to_owned());
    let report = run_fixtures(&params)?;

    check_report(&report, &all_tests());
    Ok(())
}

#[test]
fn no_selectors_reports_engine_only() -> Result<()> {
    let report = run_fixtures(&TestParameters::default())?;
    check_report(&report, &[]);
    Ok(())
}

#[test_case(EXIT_KEY, "3", Some(3) ; "launcher exits early")]
#[test_case(ENGINE_ERROR_KEY, "out of cheese", Some(1) ; "engine error")]
#[test_case(UNKNOWN_STATUS_KEY, "PAUSED", Some(1) ; "unknown status")]
#[test_case(PANIC_KEY, "engine blew up", Some(1) ; "engine panics")]
fn launcher_crashes(key: &str, value: &str, expected_code: Option<i32>) {
    let mut params = all_suites();
    params
        .configuration
        .insert(key.to_owned(), value.to_owned());

    match run_fixtures(&params) {
        Err(OrchestratorError::Crashed {
            status,
            partial_payload,
            ..
        }) => {
            assert_eq!(status.code(), expected_code);
            assert!(!partial_payload, "no report is written");
        }
        other => panic!("expected a crash, got {other:?}"),
    }
}

#[test]
fn hung_launcher_times_out() {
    let mut params = all_suites();
    params
        .configuration
        .insert(HANG_KEY.to_owned(), "true".to_owned());

    let result = ForkedRun::new(FIXTURE_LAUNCHER)
        .idle_timeout(Some(Duration::from_millis(500)))
        .run_blocking(&params);
    assert!(
        matches!(result, Err(OrchestratorError::TimedOut { .. })),
        "expected a timeout, got {result:?}"
    );
}

fn testfork() -> TestforkCli {
    let mut cli = TestforkCli::new(env!("CARGO_BIN_EXE_testfork-dup"));
    cli.args(["--color", "never", "run", "--launcher", FIXTURE_LAUNCHER]);
    cli
}

#[test]
fn cli_passing_run() {
    let dir = Utf8TempDir::new().unwrap();
    let output = testfork()
        .current_dir(dir.path())
        .args(["--select-method", "dev.testfork.fixtures.BasicTest#passes"])
        .output();

    let stdout = output.stdout_as_str();
    assert!(stdout.contains("Fixture Engine SUCCESSFUL"), "{output}");
    assert!(stdout.contains("    passes() SUCCESSFUL"), "{output}");
    assert!(
        stdout.contains(
            "tests:      1 found, 0 skipped, 0 aborted, 1 successful, 0 failed, 0 not run"
        ),
        "{output}"
    );
}

#[test]
fn cli_failing_run() {
    let dir = Utf8TempDir::new().unwrap();
    let output = testfork()
        .current_dir(dir.path())
        .args(["--select-class", "dev.testfork.fixtures.CauseTest"])
        .unchecked(true)
        .output();

    assert_eq!(
        output.exit_status.code(),
        Some(TestforkExitCode::TEST_RUN_FAILED),
        "{output}"
    );
    let stdout = output.stdout_as_str();
    assert!(stdout.contains("wrapsCause() FAILED"), "{output}");
    assert!(
        stdout.contains("Caused by: java.io.IOException: disk full"),
        "{output}"
    );
}

#[test]
fn cli_launcher_crash() {
    let dir = Utf8TempDir::new().unwrap();
    let output = testfork()
        .current_dir(dir.path())
        .args(["--classpath-root", "build/classes", "-C", "fixture.exit=3"])
        .unchecked(true)
        .output();

    assert_eq!(
        output.exit_status.code(),
        Some(TestforkExitCode::LAUNCHER_FAILED),
        "{output}"
    );
    assert!(output.stdout.is_empty(), "{output}");
}

#[test]
fn cli_config_file() {
    let dir = Utf8TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join(".config")).unwrap();
    std::fs::write(
        dir.path().join(".config/testfork.toml"),
        indoc! {r#"
            [configuration]
            "fixture.exit" = "3"
        "#},
    )
    .unwrap();

    let output = testfork()
        .current_dir(dir.path())
        .args(["--classpath-root", "build/classes"])
        .unchecked(true)
        .output();
    assert_eq!(
        output.exit_status.code(),
        Some(TestforkExitCode::LAUNCHER_FAILED),
        "{output}"
    );

    std::fs::write(dir.path().join(".config/testfork.toml"), "no-such-key = 1\n").unwrap();
    let output = testfork()
        .current_dir(dir.path())
        .args(["--classpath-root", "build/classes"])
        .unchecked(true)
        .output();
    assert_eq!(
        output.exit_status.code(),
        Some(TestforkExitCode::SETUP_ERROR),
        "{output}"
    );
    assert!(
        output.stderr_as_str().contains("failed to parse testfork config"),
        "{output}"
    );
}

#[test]
fn cli_invalid_configuration_argument() {
    let output = TestforkCli::new(env!("CARGO_BIN_EXE_testfork-dup"))
        .args(["run", "--launcher", FIXTURE_LAUNCHER, "-C", "missing-equals"])
        .unchecked(true)
        .output();
    assert_eq!(
        output.exit_status.code(),
        Some(TestforkExitCode::SETUP_ERROR),
        "{output}"
    );
}
