// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Throwables and the sanitized rendering of their stack traces.
//!
//! Rendering follows the conventional exception-chain layout: the throwable itself, its frames, then
//! each suppressed throwable and finally its cause. Frames that a nested throwable shares with the
//! trace enclosing it are folded into a single `... N more` line.
//!
//! For the primary throwable of a failed test, frames can additionally be trimmed with a
//! [`FrameFilter`]: frames outside the test's own class are dropped from the outer end, and
//! assertion library internals are dropped from the inner end.

use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex, OnceLock, PoisonError},
};
use swrite::{SWrite, swrite};

/// Type name prefixes of assertion library internals, which are trimmed from the innermost end of a
/// filtered trace.
pub const ASSERTION_HELPER_PREFIXES: &[&str] = &["org.junit.jupiter.api.Ass"];

/// A single frame of a stack trace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StackFrame {
    /// The fully qualified name of the type that declares the method.
    pub declaring_type: String,
    /// The method name.
    pub method_name: String,
    /// The source file, if known.
    pub file_name: Option<String>,
    /// The line within the source file, if known.
    pub line_number: Option<u32>,
}

impl StackFrame {
    /// Creates a frame with no source location.
    pub fn new(declaring_type: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            method_name: method_name.into(),
            file_name: None,
            line_number: None,
        }
    }

    /// Sets the source location of this frame.
    pub fn with_location(mut self, file_name: impl Into<String>, line_number: u32) -> Self {
        self.file_name = Some(file_name.into());
        self.line_number = Some(line_number);
        self
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring_type, self.method_name)?;
        match (&self.file_name, self.line_number) {
            (Some(file), Some(line)) => write!(f, "({file}:{line})"),
            (Some(file), None) => write!(f, "({file})"),
            (None, _) => f.write_str("(Unknown Source)"),
        }
    }
}

/// An error or exception raised by test code, with its cause and suppressed throwables.
///
/// Throwables are shared through [`Arc`]. The cause can be set once after construction and
/// suppressed throwables can be appended, so cause/suppressed graphs may contain cycles;
/// [`render_stack_trace`] detects these.
#[derive(Debug)]
pub struct Throwable {
    type_name: String,
    message: Option<String>,
    frames: Vec<StackFrame>,
    cause: OnceLock<Arc<Throwable>>,
    suppressed: Mutex<Vec<Arc<Throwable>>>,
}

impl Throwable {
    /// Creates a new throwable. `frames` are ordered innermost first.
    pub fn new(
        type_name: impl Into<String>,
        message: Option<String>,
        frames: Vec<StackFrame>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            message,
            frames,
            cause: OnceLock::new(),
            suppressed: Mutex::new(Vec::new()),
        }
    }

    /// Creates a new throwable with a cause.
    pub fn with_cause(
        type_name: impl Into<String>,
        message: Option<String>,
        frames: Vec<StackFrame>,
        cause: Arc<Throwable>,
    ) -> Self {
        let throwable = Self::new(type_name, message, frames);
        let _ = throwable.cause.set(cause);
        throwable
    }

    /// Returns the fully qualified type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the frames, innermost first.
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// Returns the cause, if one was set.
    pub fn cause(&self) -> Option<&Arc<Throwable>> {
        self.cause.get()
    }

    /// Sets the cause. A cause can only be set once; on failure the rejected cause is returned.
    ///
    /// A cause that leads back to `self` forms an [`Arc`] cycle, which is never freed. Rendering
    /// recurses once per nested throwable, with no bound on the depth of an acyclic chain.
    pub fn init_cause(&self, cause: Arc<Throwable>) -> Result<(), Arc<Throwable>> {
        self.cause.set(cause)
    }

    /// Appends a suppressed throwable. As with [`Throwable::init_cause`], a cycle through the
    /// suppressed list is never freed.
    pub fn add_suppressed(&self, suppressed: Arc<Throwable>) {
        self.suppressed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(suppressed);
    }

    /// Returns a snapshot of the suppressed throwables, in the order they were added.
    pub fn suppressed(&self) -> Vec<Arc<Throwable>> {
        self.suppressed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Display for Throwable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.type_name, message),
            None => f.write_str(&self.type_name),
        }
    }
}

/// Decides which frames of a failure's stack trace belong to the test's own code.
#[derive(Clone, Debug)]
pub struct FrameFilter {
    declaring_type: String,
    helper_prefixes: Vec<String>,
}

impl FrameFilter {
    /// Creates a filter keeping frames up to the outermost one declared by `declaring_type`, and
    /// trimming [`ASSERTION_HELPER_PREFIXES`] from the inner end.
    pub fn new(declaring_type: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            helper_prefixes: ASSERTION_HELPER_PREFIXES
                .iter()
                .map(|&prefix| prefix.to_owned())
                .collect(),
        }
    }

    /// Replaces the set of helper prefixes trimmed from the inner end.
    pub fn with_helper_prefixes(
        mut self,
        prefixes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.helper_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if `frame` is declared by the test's own type.
    pub fn is_member(&self, frame: &StackFrame) -> bool {
        frame.declaring_type == self.declaring_type
    }

    fn is_helper(&self, frame: &StackFrame) -> bool {
        self.helper_prefixes
            .iter()
            .any(|prefix| frame.declaring_type.starts_with(prefix.as_str()))
    }

    /// Trims `frames` (innermost first) down to the part relevant to the test.
    ///
    /// If no frame is declared by the test's type, the frames are returned unchanged.
    pub fn apply<'a>(&self, frames: &'a [StackFrame]) -> &'a [StackFrame] {
        let Some(end) = frames.iter().rposition(|frame| self.is_member(frame)) else {
            return frames;
        };
        let kept = &frames[..=end];
        let begin = kept
            .iter()
            .take_while(|frame| self.is_helper(frame))
            .count();
        if begin == kept.len() {
            // Only reachable with a helper prefix that matches the declaring type itself.
            return frames;
        }
        &kept[begin..]
    }
}

/// Renders `throwable` with its suppressed and cause chains.
///
/// If `filter` is provided, it is applied to the frames of `throwable` itself; nested throwables are
/// always rendered with their full traces. Trailing whitespace is trimmed.
pub fn render_stack_trace(throwable: &Arc<Throwable>, filter: Option<&FrameFilter>) -> String {
    let mut writer = TraceWriter {
        out: String::new(),
        seen: HashSet::new(),
    };
    writer.seen.insert(Arc::as_ptr(throwable));

    let frames = match filter {
        Some(filter) => filter.apply(throwable.frames()),
        None => throwable.frames(),
    };
    swrite!(writer.out, "{throwable}\n");
    for frame in frames {
        swrite!(writer.out, "\tat {frame}\n");
    }
    writer.write_nested(throwable, frames, "");

    let trimmed_len = writer.out.trim_end().len();
    writer.out.truncate(trimmed_len);
    writer.out
}

struct TraceWriter {
    out: String,
    // Identity of every throwable printed so far.
    seen: HashSet<*const Throwable>,
}

impl TraceWriter {
    fn write_nested(&mut self, throwable: &Throwable, frames: &[StackFrame], prefix: &str) {
        let suppressed_prefix = format!("{prefix}\t");
        for suppressed in throwable.suppressed() {
            self.write_enclosed(&suppressed, frames, "Suppressed: ", &suppressed_prefix);
        }
        if let Some(cause) = throwable.cause() {
            self.write_enclosed(cause, frames, "Caused by: ", prefix);
        }
    }

    fn write_enclosed(
        &mut self,
        throwable: &Arc<Throwable>,
        enclosing_frames: &[StackFrame],
        caption: &str,
        prefix: &str,
    ) {
        if !self.seen.insert(Arc::as_ptr(throwable)) {
            swrite!(self.out, "{prefix}{caption}[CIRCULAR REFERENCE: {throwable}]\n");
            return;
        }

        let frames = throwable.frames();
        let in_common = frames
            .iter()
            .rev()
            .zip(enclosing_frames.iter().rev())
            .take_while(|(frame, enclosing)| frame == enclosing)
            .count();

        swrite!(self.out, "{prefix}{caption}{throwable}\n");
        for frame in &frames[..frames.len() - in_common] {
            swrite!(self.out, "{prefix}\tat {frame}\n");
        }
        if in_common > 0 {
            swrite!(self.out, "{prefix}\t... {in_common} more\n");
        }

        self.write_nested(throwable, frames, prefix);
    }
}
