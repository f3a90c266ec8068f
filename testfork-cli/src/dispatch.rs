// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::Result,
    output::{OutputContext, OutputOpts},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use std::io::{BufWriter, Write};
use supports_color::Stream;
use testfork_protocol::{IncludeExcludeList, LogLevel, TestParameters, TestforkExitCode};
use testfork_runner::{config::ForkConfig, orchestrator::ForkedRun, reporter::ReportDisplay};
use tracing::debug;

/// Parses the command line, runs it and returns the process exit code.
///
/// Errors are displayed to standard error.
pub fn main_impl() -> i32 {
    let app = match TestforkApp::try_parse() {
        Ok(app) => app,
        // Help and version requests are reported as errors by clap.
        Err(err) if !err.use_stderr() => {
            let _ = err.print();
            return TestforkExitCode::OK;
        }
        Err(err) => {
            let error = ExpectedError::InvalidArguments { err };
            error.display_to_stderr();
            return error.process_exit_code();
        }
    };

    match app.exec() {
        Ok(code) => code,
        Err(error) => {
            error.display_to_stderr();
            error.process_exit_code()
        }
    }
}

/// Runs tests in a forked launcher process and reports the results.
#[derive(Debug, Parser)]
#[command(
    name = "testfork",
    version,
    styles = crate::output::clap_styles::style(),
    max_term_width = 100,
)]
pub struct TestforkApp {
    #[clap(flatten)]
    output: OutputOpts,

    /// Config file [default: <cwd>/.config/testfork.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<Utf8PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

impl TestforkApp {
    /// Executes the app, returning the exit code.
    pub fn exec(self) -> Result<i32> {
        let output = self.output.init();
        match self.command {
            Command::Run(opts) => (*opts).exec(self.config.as_deref(), output),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run tests in a launcher process
    ///
    /// The launcher is sent the selectors, filters and configuration given here, and is expected to
    /// reply with a test report.
    Run(Box<RunOpts>),
}

#[derive(Debug, Args)]
struct RunOpts {
    /// Launcher program [default: `launcher` from the config file]
    #[arg(long, value_name = "PROGRAM")]
    launcher: Option<String>,

    /// Directory to run the launcher in, and to look for the config file in
    #[arg(long, value_name = "DIR")]
    cwd: Option<Utf8PathBuf>,

    #[clap(flatten)]
    selectors: SelectorOpts,

    #[clap(flatten)]
    filters: FilterOpts,

    #[clap(flatten)]
    launcher_opts: LauncherOpts,

    /// Extra arguments passed to the launcher
    #[arg(last = true, value_name = "LAUNCHER_ARGS")]
    launcher_args: Vec<String>,
}

#[derive(Debug, Default, Args)]
#[clap(next_help_heading = "SELECTOR OPTIONS")]
struct SelectorOpts {
    /// Select all classes in a package
    #[arg(long, value_name = "PACKAGE")]
    select_package: Vec<String>,

    /// Select a fully qualified class
    #[arg(long, value_name = "CLASS")]
    select_class: Vec<String>,

    /// Select a method, as `class#method`
    #[arg(long, value_name = "METHOD")]
    select_method: Vec<String>,

    /// Select a classpath resource
    #[arg(long, value_name = "RESOURCE")]
    select_resource: Vec<String>,

    /// Select a URI
    #[arg(long, value_name = "URI")]
    select_uri: Vec<String>,

    /// Select a file
    #[arg(long, value_name = "PATH")]
    select_file: Vec<String>,

    /// Select a directory
    #[arg(long, value_name = "PATH")]
    select_directory: Vec<String>,

    /// Select everything under a classpath root
    #[arg(long, value_name = "PATH")]
    classpath_root: Vec<String>,
}

#[derive(Debug, Default, Args)]
#[clap(next_help_heading = "FILTER OPTIONS")]
struct FilterOpts {
    /// Only run classes whose names match a regular expression
    #[arg(long, value_name = "REGEX")]
    include_class_pattern: Vec<String>,

    /// Skip classes whose names match a regular expression
    #[arg(long, value_name = "REGEX")]
    exclude_class_pattern: Vec<String>,

    /// Only run classes in a package
    #[arg(long, value_name = "PACKAGE")]
    include_package: Vec<String>,

    /// Skip classes in a package
    #[arg(long, value_name = "PACKAGE")]
    exclude_package: Vec<String>,

    /// Only run tests with a tag
    #[arg(long, value_name = "TAG")]
    include_tag: Vec<String>,

    /// Skip tests with a tag
    #[arg(long, value_name = "TAG")]
    exclude_tag: Vec<String>,

    /// Only run tests from an engine
    #[arg(long, value_name = "ENGINE")]
    include_engine: Vec<String>,

    /// Skip tests from an engine
    #[arg(long, value_name = "ENGINE")]
    exclude_engine: Vec<String>,
}

#[derive(Debug, Default, Args)]
#[clap(next_help_heading = "LAUNCHER OPTIONS")]
struct LauncherOpts {
    /// Engine configuration parameter, as `key=value`
    #[arg(
        short = 'C',
        long = "configuration",
        value_name = "KEY=VALUE",
        value_parser = parse_key_value
    )]
    configuration: Vec<KeyValue>,

    /// Report full stack traces instead of trimming them to the test's own frames
    #[arg(long)]
    no_filter_stack_traces: bool,

    /// Log level used by the launcher [default: INFO]
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// Kill the launcher if it produces no output for this long, e.g. `5m`
    #[arg(long, value_name = "DURATION")]
    idle_timeout: Option<humantime::Duration>,
}

impl RunOpts {
    fn exec(self, config_file: Option<&Utf8Path>, output: OutputContext) -> Result<i32> {
        let root = match &self.cwd {
            Some(cwd) => cwd.clone(),
            None => current_dir()?,
        };
        let config = ForkConfig::from_sources(&root, config_file)?;
        debug!("read config: {config:?}");

        let params = self.to_parameters(&config);
        let launcher = self
            .launcher
            .or(config.launcher)
            .ok_or(ExpectedError::NoLauncher)?;
        let run = ForkedRun::new(launcher)
            .args(config.launcher_args.iter().chain(&self.launcher_args))
            .current_dir(root)
            .idle_timeout(
                self.launcher_opts
                    .idle_timeout
                    .map(Into::into)
                    .or(config.idle_timeout),
            );

        let report = run.run_blocking(&params)?;

        let mut display = ReportDisplay::new(&report);
        if output.color.should_colorize(Stream::Stdout) {
            display.colorize();
        }
        let mut writer = BufWriter::new(std::io::stdout().lock());
        write!(writer, "{display}")
            .and_then(|()| writer.flush())
            .map_err(ExpectedError::write_output_error)?;

        if report.is_failure() {
            return Err(ExpectedError::test_run_failed());
        }
        Ok(TestforkExitCode::OK)
    }

    /// Merges command-line arguments into the config. List-valued arguments are appended to the
    /// config's values, and everything else overrides them.
    fn to_parameters(&self, config: &ForkConfig) -> TestParameters {
        let SelectorOpts {
            select_package,
            select_class,
            select_method,
            select_resource,
            select_uri,
            select_file,
            select_directory,
            classpath_root,
        } = &self.selectors;
        let FilterOpts {
            include_class_pattern,
            exclude_class_pattern,
            include_package,
            exclude_package,
            include_tag,
            exclude_tag,
            include_engine,
            exclude_engine,
        } = &self.filters;
        let LauncherOpts {
            configuration,
            no_filter_stack_traces,
            log_level,
            ..
        } = &self.launcher_opts;

        let mut merged_configuration = config.configuration.clone();
        merged_configuration.extend(
            configuration
                .iter()
                .map(|kv| (kv.key.clone(), kv.value.clone())),
        );

        TestParameters {
            configuration: merged_configuration,
            filter_stack_traces: !no_filter_stack_traces
                && config.filter_stack_traces.unwrap_or(true),
            select_packages: select_package.clone(),
            select_classes: select_class.clone(),
            select_methods: select_method.clone(),
            select_resources: select_resource.clone(),
            classpath_roots: classpath_root.clone(),
            filter_class_name_patterns: include_exclude(
                include_class_pattern,
                exclude_class_pattern,
            ),
            filter_packages: include_exclude(include_package, exclude_package),
            filter_tags: include_exclude(include_tag, exclude_tag),
            log_level: log_level.or(config.log_level).unwrap_or_default(),
            select_uris: select_uri.clone(),
            select_files: select_file.clone(),
            select_directories: select_directory.clone(),
            filter_engines: include_exclude(include_engine, exclude_engine),
        }
    }
}

fn include_exclude(included: &[String], excluded: &[String]) -> IncludeExcludeList {
    IncludeExcludeList {
        included: included.to_vec(),
        excluded: excluded.to_vec(),
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let dir = std::env::current_dir().map_err(|err| ExpectedError::CurrentDirFailed { err })?;
    Utf8PathBuf::try_from(dir)
        .map_err(|err| ExpectedError::CurrentDirInvalidUtf8 { path: err.into_path_buf() })
}

/// A `key=value` pair given on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
struct KeyValue {
    key: String,
    value: String,
}

fn parse_key_value(input: &str) -> Result<KeyValue, String> {
    match input.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok(KeyValue {
            key: key.to_owned(),
            value: value.to_owned(),
        }),
        _ => Err(format!("expected `key=value`, found `{input}`")),
    }
}
