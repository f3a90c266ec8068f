// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Translates [`TestParameters`] into a [`DiscoveryRequest`] and runs it.

use crate::{
    engine::{
        DiscoveryFilter, DiscoveryRequest, DiscoverySelector, EngineError, FilterMode, TestEngine,
    },
    report_builder::ReportBuilder,
};
use testfork_protocol::{IncludeExcludeList, TestParameters, TestReport};
use tracing::debug;

/// The result of running a plan to the end.
#[derive(Clone, Debug)]
pub struct ExecutionOutcome {
    /// The accumulated report.
    pub report: TestReport,
    /// Whether the engine reported that the plan finished.
    pub complete: bool,
}

/// Builds the discovery request described by `params`.
///
/// Every selector element becomes its own selector. Each non-empty side of an include/exclude list
/// becomes its own filter, so all dimensions constrain the run at the same time.
pub fn discovery_request(params: &TestParameters) -> DiscoveryRequest {
    let mut selectors = Vec::new();
    selectors.extend(params.select_packages.iter().cloned().map(DiscoverySelector::Package));
    selectors.extend(params.select_classes.iter().cloned().map(DiscoverySelector::Class));
    selectors.extend(params.select_methods.iter().cloned().map(DiscoverySelector::Method));
    selectors.extend(
        params
            .select_resources
            .iter()
            .cloned()
            .map(DiscoverySelector::ClasspathResource),
    );
    selectors.extend(
        params
            .classpath_roots
            .iter()
            .map(|root| DiscoverySelector::ClasspathRoot(root.into())),
    );
    selectors.extend(params.select_uris.iter().cloned().map(DiscoverySelector::Uri));
    selectors.extend(
        params
            .select_files
            .iter()
            .map(|file| DiscoverySelector::File(file.into())),
    );
    selectors.extend(
        params
            .select_directories
            .iter()
            .map(|dir| DiscoverySelector::Directory(dir.into())),
    );

    let mut filters = Vec::new();
    push_filters(&mut filters, &params.filter_class_name_patterns, |mode, patterns| {
        DiscoveryFilter::ClassNamePatterns { mode, patterns }
    });
    push_filters(&mut filters, &params.filter_packages, |mode, names| {
        DiscoveryFilter::PackageNames { mode, names }
    });
    push_filters(&mut filters, &params.filter_tags, |mode, tags| {
        DiscoveryFilter::Tags { mode, tags }
    });
    push_filters(&mut filters, &params.filter_engines, |mode, engine_ids| {
        DiscoveryFilter::Engines { mode, engine_ids }
    });

    DiscoveryRequest {
        selectors,
        filters,
        configuration: params.configuration.clone(),
    }
}

fn push_filters(
    filters: &mut Vec<DiscoveryFilter>,
    list: &IncludeExcludeList,
    make: impl Fn(FilterMode, Vec<String>) -> DiscoveryFilter,
) {
    if !list.included.is_empty() {
        filters.push(make(FilterMode::Include, list.included.clone()));
    }
    if !list.excluded.is_empty() {
        filters.push(make(FilterMode::Exclude, list.excluded.clone()));
    }
}

/// Runs the plan described by `params` on `engine`, blocking until the engine returns.
pub fn execute(
    engine: &dyn TestEngine,
    params: &TestParameters,
) -> Result<ExecutionOutcome, EngineError> {
    let request = discovery_request(params);
    debug!(
        "executing {} selectors with {} filters",
        request.selectors.len(),
        request.filters.len(),
    );

    let builder = ReportBuilder::new(params.filter_stack_traces);
    engine.execute(&request, &builder)?;

    let complete = builder.is_complete();
    Ok(ExecutionOutcome {
        report: builder.into_report(),
        complete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        ExecutionEvent, ExecutionListener, ExecutionResult, ExecutionStatus, TestNode,
    };
    use camino::Utf8PathBuf;
    use pretty_assertions::assert_eq;

    #[test]
    fn selectors_and_filters() {
        let params = TestParameters {
            select_packages: vec!["com.example".to_owned()],
            select_classes: vec!["com.example.A".to_owned(), "com.example.B".to_owned()],
            select_methods: vec!["com.example.A#run".to_owned()],
            select_resources: vec!["features/a.feature".to_owned()],
            classpath_roots: vec!["/build/classes".to_owned()],
            select_files: vec!["src/test/a.txt".to_owned()],
            filter_class_name_patterns: IncludeExcludeList {
                included: vec![".*Test".to_owned()],
                excluded: Vec::new(),
            },
            filter_tags: IncludeExcludeList {
                included: vec!["fast".to_owned()],
                excluded: vec!["flaky".to_owned(), "slow".to_owned()],
            },
            ..Default::default()
        };

        let request = discovery_request(&params);
        assert_eq!(
            request.selectors,
            vec![
                DiscoverySelector::Package("com.example".to_owned()),
                DiscoverySelector::Class("com.example.A".to_owned()),
                DiscoverySelector::Class("com.example.B".to_owned()),
                DiscoverySelector::Method("com.example.A#run".to_owned()),
                DiscoverySelector::ClasspathResource("features/a.feature".to_owned()),
                DiscoverySelector::ClasspathRoot(Utf8PathBuf::from("/build/classes")),
                DiscoverySelector::File(Utf8PathBuf::from("src/test/a.txt")),
            ]
        );
        assert_eq!(
            request.filters,
            vec![
                DiscoveryFilter::ClassNamePatterns {
                    mode: FilterMode::Include,
                    patterns: vec![".*Test".to_owned()],
                },
                DiscoveryFilter::Tags {
                    mode: FilterMode::Include,
                    tags: vec!["fast".to_owned()],
                },
                DiscoveryFilter::Tags {
                    mode: FilterMode::Exclude,
                    tags: vec!["flaky".to_owned(), "slow".to_owned()],
                },
            ]
        );
    }

    #[test]
    fn empty_parameters() {
        let request = discovery_request(&TestParameters::default());
        assert_eq!(request, DiscoveryRequest::default());
    }

    struct SingleTestEngine {
        status: ExecutionStatus,
        finish_plan: bool,
    }

    impl TestEngine for SingleTestEngine {
        fn execute(
            &self,
            request: &DiscoveryRequest,
            listener: &dyn ExecutionListener,
        ) -> Result<(), EngineError> {
            assert_eq!(request.configuration.get("mode").map(String::as_str), Some("test"));
            let node = TestNode {
                unique_id: "[engine:single]/[test:only]".to_owned(),
                parent_id: Some("[engine:single]".to_owned()),
                display_name: "only".to_owned(),
                is_test: true,
                is_container: false,
                tags: Default::default(),
                source: None,
            };
            let result = ExecutionResult {
                status: self.status.clone(),
                throwable: None,
            };
            listener.on_event(ExecutionEvent::Started { node: &node })?;
            listener.on_event(ExecutionEvent::Finished {
                node: &node,
                result: &result,
            })?;
            if self.finish_plan {
                listener.on_event(ExecutionEvent::PlanFinished)?;
            }
            Ok(())
        }
    }

    fn params() -> TestParameters {
        let mut params = TestParameters::default();
        params
            .configuration
            .insert("mode".to_owned(), "test".to_owned());
        params
    }

    #[test]
    fn execute_collects_report() {
        let engine = SingleTestEngine {
            status: ExecutionStatus::Failed,
            finish_plan: true,
        };
        let outcome = execute(&engine, &params()).unwrap();
        assert!(outcome.complete);
        assert_eq!(outcome.report.len(), 1);
        assert!(outcome.report.is_failure());

        let engine = SingleTestEngine {
            status: ExecutionStatus::Successful,
            finish_plan: false,
        };
        let outcome = execute(&engine, &params()).unwrap();
        assert!(!outcome.complete);
        assert!(!outcome.report.is_failure());
    }

    #[test]
    fn listener_errors_abort_execution() {
        let engine = SingleTestEngine {
            status: ExecutionStatus::Other("WEIRD".to_owned()),
            finish_plan: true,
        };
        let error = execute(&engine, &params()).unwrap_err();
        assert!(matches!(error, EngineError::Listener(_)), "{error:?}");
    }
}
