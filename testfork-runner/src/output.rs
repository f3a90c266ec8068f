// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logging setup shared by the orchestrator and forked launchers.
//!
//! Diagnostics always go to standard error, since a launcher's standard output carries the framed
//! report.

use owo_colors::{OwoColorize, Style, style};
use std::fmt;
use testfork_protocol::LogLevel;
use thiserror::Error;
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
    level_filters::LevelFilter,
};
use tracing_subscriber::{
    Layer,
    filter::Targets,
    fmt::{FmtContext, FormatEvent, FormatFields, format},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// The environment variable used to override log filtering, in `tracing_subscriber` targets syntax.
pub const LOG_ENV: &str = "TESTFORK_LOG";

/// The target under which standard error lines of a forked launcher are logged.
pub const TEST_OUTPUT_TARGET: &str = "testfork::test_output";

/// Events logged under this target are printed without a level heading.
pub const NO_HEADING_TARGET: &str = "testfork::no_heading";

/// Logging options.
#[derive(Clone, Debug)]
#[must_use]
pub struct LogConfig {
    default_level: LevelFilter,
    env_override: Option<&'static str>,
    colorize: bool,
}

impl LogConfig {
    /// Creates a config with the given default level, no environment override and no colors.
    pub fn new(default_level: LevelFilter) -> Self {
        Self {
            default_level,
            env_override: None,
            colorize: false,
        }
    }

    /// Creates a config from a level received over the wire.
    pub fn for_level(level: LogLevel) -> Self {
        Self::new(level_filter(level))
    }

    /// Reads overrides from [`LOG_ENV`] if it is set and non-empty.
    pub fn with_env_override(mut self) -> Self {
        self.env_override = Some(LOG_ENV);
        self
    }

    /// Sets whether level headings are colorized.
    pub fn colorize(mut self, colorize: bool) -> Self {
        self.colorize = colorize;
        self
    }

    /// Installs the global subscriber.
    ///
    /// Only the first successful call in a process has any effect.
    pub fn init(self) -> Result<(), LogInitError> {
        let targets = self.targets()?;

        let mut styles = LogStyles::default();
        if self.colorize {
            styles.colorize();
        }

        INIT_LOGGER.call_once(|| {
            let layer = tracing_subscriber::fmt::layer()
                .event_format(SimpleFormatter { styles })
                .with_writer(std::io::stderr)
                .with_filter(targets);

            // Fails if some other subscriber was installed first, for example by a test harness.
            let _ = tracing_subscriber::registry().with(layer).try_init();
        });
        Ok(())
    }

    fn targets(&self) -> Result<Targets, LogInitError> {
        let from_env = self
            .env_override
            .and_then(|var| std::env::var_os(var).map(|value| (var, value)));
        match from_env {
            Some((var, value)) if !value.is_empty() => {
                let value = value
                    .into_string()
                    .map_err(|_| LogInitError::NonUtf8 { var })?;
                value.parse().map_err(|error| LogInitError::Parse {
                    var,
                    value,
                    error,
                })
            }
            _ => Ok(Targets::new().with_default(self.default_level)),
        }
    }
}

/// Maps a wire log level to a `tracing` level filter.
pub fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Off => LevelFilter::OFF,
    }
}

/// An error that occurred while setting up logging.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LogInitError {
    /// The override variable is not valid UTF-8.
    #[error("{var} is not valid UTF-8")]
    NonUtf8 {
        /// The variable name.
        var: &'static str,
    },

    /// The override variable could not be parsed.
    #[error("unable to parse {var}=`{value}`")]
    Parse {
        /// The variable name.
        var: &'static str,
        /// The value of the variable.
        value: String,
        /// The parse error.
        #[source]
        error: tracing_subscriber::filter::ParseError,
    },
}

static INIT_LOGGER: std::sync::Once = std::sync::Once::new();

struct SimpleFormatter {
    styles: LogStyles,
}

impl<S, N> FormatEvent<S, N> for SimpleFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        if metadata.target() == TEST_OUTPUT_TARGET {
            write!(writer, "{}", "  | ".style(self.styles.test_output))?;
        } else if metadata.target() != NO_HEADING_TARGET {
            let (heading, heading_style) = match *metadata.level() {
                Level::ERROR => ("error", self.styles.error),
                Level::WARN => ("warning", self.styles.warning),
                Level::INFO => ("info", self.styles.info),
                Level::DEBUG => ("debug", self.styles.debug),
                Level::TRACE => ("trace", self.styles.trace),
            };
            write!(writer, "{}: ", heading.style(heading_style))?;
        }

        let mut visitor = MessageVisitor {
            writer: &mut writer,
            show_other: *metadata.level() >= Level::DEBUG,
            error: None,
        };
        event.record(&mut visitor);
        if let Some(error) = visitor.error {
            return Err(error);
        }

        writeln!(writer)
    }
}

static MESSAGE_FIELD: &str = "message";

struct MessageVisitor<'writer, 'a> {
    writer: &'a mut format::Writer<'writer>,
    show_other: bool,
    error: Option<fmt::Error>,
}

impl Visit for MessageVisitor<'_, '_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let result = if field.name() == MESSAGE_FIELD {
            write!(self.writer, "{value:?}")
        } else if self.show_other {
            write!(self.writer, "; {} = {:?}", field.name(), value)
        } else {
            Ok(())
        };
        if let Err(error) = result {
            self.error = Some(error);
        }
    }
}

#[derive(Debug, Default)]
struct LogStyles {
    error: Style,
    warning: Style,
    info: Style,
    debug: Style,
    trace: Style,
    test_output: Style,
}

impl LogStyles {
    fn colorize(&mut self) {
        self.error = style().red().bold();
        self.warning = style().yellow().bold();
        self.info = style().bold();
        self.debug = style().bold();
        self.trace = style().dimmed();
        self.test_output = style().dimmed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(LogLevel::Trace, LevelFilter::TRACE)]
    #[test_case(LogLevel::Info, LevelFilter::INFO)]
    #[test_case(LogLevel::Off, LevelFilter::OFF)]
    fn wire_levels(level: LogLevel, expected: LevelFilter) {
        assert_eq!(level_filter(level), expected);
        assert_eq!(level_filter(LogLevel::from_rank(level.rank())), expected);
    }

    #[test]
    fn default_targets() {
        let targets = LogConfig::for_level(LogLevel::Warn).targets().unwrap();
        assert!(targets.would_enable("testfork_runner::launcher", &Level::WARN));
        assert!(!targets.would_enable("testfork_runner::launcher", &Level::INFO));
    }
}
