// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{DecodeError, EncodeError},
    exit_codes::TestforkExitCode,
    wire::{self, WireDecode, WireEncode, decode_count, encode_count},
};
use bytes::{Buf, BufMut};
use indexmap::IndexMap;
use std::{
    collections::BTreeSet,
    fmt,
    hash::{Hash, Hasher},
};

/// Identifies a test or container that took part in a run.
///
/// Identity is the pair of [`id`](Self::id) and [`parent_id`](Self::parent_id): two identifiers
/// with the same pair compare and hash equal even if their display names, tags or sources differ.
#[derive(Clone, Debug)]
pub struct TestIdentifier {
    /// The engine-assigned unique ID. Not meant for humans.
    pub id: String,

    /// The ID of the parent identifier, or an empty string for roots.
    pub parent_id: String,

    /// The name to show to users.
    pub display_name: String,

    /// Whether this identifies a test that was executed.
    pub is_test: bool,

    /// Whether this identifies a collection of tests. A container may be a test as well.
    pub is_container: bool,

    /// The tags assigned to this node.
    pub tags: BTreeSet<String>,

    /// Where the node was discovered. Free-form, for diagnostics only.
    pub test_source: String,
}

impl TestIdentifier {
    /// Returns true if this identifier has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_empty()
    }
}

impl PartialEq for TestIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.parent_id == other.parent_id
    }
}

impl Eq for TestIdentifier {}

impl Hash for TestIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.parent_id.hash(state);
    }
}

impl fmt::Display for TestIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{{", self.id, self.display_name)?;
        let kind = match (self.is_test, self.is_container) {
            (true, true) => "test & container",
            (true, false) => "test",
            (false, true) => "container",
            (false, false) => "neither test nor container",
        };
        f.write_str(kind)?;
        if !self.tags.is_empty() {
            write!(f, ", tags=[")?;
            for (i, tag) in self.tags.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                f.write_str(tag)?;
            }
            f.write_str("]")?;
        }
        if !self.test_source.is_empty() {
            write!(f, ", source={}", self.test_source)?;
        }
        f.write_str("}")
    }
}

impl WireEncode for TestIdentifier {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
        self.id.encode(buf)?;
        self.parent_id.encode(buf)?;
        self.display_name.encode(buf)?;
        self.is_test.encode(buf)?;
        self.is_container.encode(buf)?;
        self.tags.encode(buf)?;
        self.test_source.encode(buf)
    }
}

impl WireDecode for TestIdentifier {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        Ok(Self {
            id: WireDecode::decode(buf)?,
            parent_id: WireDecode::decode(buf)?,
            display_name: WireDecode::decode(buf)?,
            is_test: WireDecode::decode(buf)?,
            is_container: WireDecode::decode(buf)?,
            tags: WireDecode::decode(buf)?,
            test_source: WireDecode::decode(buf)?,
        })
    }
}

/// The outcome of a test or container.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum TestStatus {
    /// The node ran successfully.
    ///
    /// A container may be successful even if some of the tests it contains were not.
    Successful,

    /// The node started but was stopped before completing, for example by a failed assumption.
    ///
    /// This is neither a failure nor a success.
    Aborted,

    /// The node was not run. See [`TestData::skip_reason`].
    Skipped,

    /// The node ran and failed. See [`TestData::stack_trace`].
    Failed,

    /// No terminal event was observed for the node. This usually indicates a problem somewhere.
    #[default]
    NotRun,
}

impl TestStatus {
    /// Returns the ordinal used on the wire.
    pub const fn ordinal(self) -> u8 {
        match self {
            TestStatus::Successful => 0,
            TestStatus::Aborted => 1,
            TestStatus::Skipped => 2,
            TestStatus::Failed => 3,
            TestStatus::NotRun => 4,
        }
    }

    /// Resolves a wire ordinal, if it is known.
    pub const fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(TestStatus::Successful),
            1 => Some(TestStatus::Aborted),
            2 => Some(TestStatus::Skipped),
            3 => Some(TestStatus::Failed),
            4 => Some(TestStatus::NotRun),
            _ => None,
        }
    }

    /// Returns the uppercase name of this status.
    pub const fn as_str(self) -> &'static str {
        match self {
            TestStatus::Successful => "SUCCESSFUL",
            TestStatus::Aborted => "ABORTED",
            TestStatus::Skipped => "SKIPPED",
            TestStatus::Failed => "FAILED",
            TestStatus::NotRun => "NOT_RUN",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The results of running a single [`TestIdentifier`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestData {
    /// The status of the run.
    pub status: TestStatus,

    /// How long the run took, in milliseconds, or [`Self::UNKNOWN_DURATION`].
    pub duration: i64,

    /// Why the node was skipped, or an empty string. Only meaningful for [`TestStatus::Skipped`].
    pub skip_reason: String,

    /// The (possibly filtered) stack trace of the failure, or an empty string. Only meaningful for
    /// [`TestStatus::Failed`].
    pub stack_trace: String,

    /// Entries published by the test while it ran, in publication order.
    pub reports: Vec<ReportEntry>,
}

impl TestData {
    /// The duration recorded when no measurement is available.
    pub const UNKNOWN_DURATION: i64 = -1;

    /// Returns the duration, if it was measured.
    pub fn duration_millis(&self) -> Option<u64> {
        u64::try_from(self.duration).ok()
    }
}

impl Default for TestData {
    fn default() -> Self {
        Self {
            status: TestStatus::NotRun,
            duration: Self::UNKNOWN_DURATION,
            skip_reason: String::new(),
            stack_trace: String::new(),
            reports: Vec::new(),
        }
    }
}

impl WireEncode for TestData {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
        buf.put_u8(self.status.ordinal());
        self.duration.encode(buf)?;
        self.skip_reason.encode(buf)?;
        self.stack_trace.encode(buf)?;
        self.reports.encode(buf)
    }
}

impl WireDecode for TestData {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        if !buf.has_remaining() {
            return Err(DecodeError::UnexpectedEof {
                needed: 1,
                remaining: 0,
            });
        }
        let ordinal = buf.get_u8();
        let status = TestStatus::from_ordinal(ordinal).ok_or(DecodeError::UnknownStatus(ordinal))?;
        Ok(Self {
            status,
            duration: WireDecode::decode(buf)?,
            skip_reason: WireDecode::decode(buf)?,
            stack_trace: WireDecode::decode(buf)?,
            reports: WireDecode::decode(buf)?,
        })
    }
}

/// A key-value pair published by a test while it ran.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportEntry {
    /// When the entry was published, in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// The key.
    pub key: String,
    /// The value.
    pub value: String,
}

impl WireEncode for ReportEntry {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
        self.timestamp.encode(buf)?;
        self.key.encode(buf)?;
        self.value.encode(buf)
    }
}

impl WireDecode for ReportEntry {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        Ok(Self {
            timestamp: WireDecode::decode(buf)?,
            key: WireDecode::decode(buf)?,
            value: WireDecode::decode(buf)?,
        })
    }
}

/// The results of a forked test run.
///
/// Entries are kept in the order in which their identifiers were first observed, and that order
/// survives serialization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TestReport {
    entries: IndexMap<TestIdentifier, TestData>,
}

impl TestReport {
    /// Creates a new, empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, returning the previous data for an equal identifier.
    ///
    /// Replacing an existing entry keeps its original position.
    pub fn insert(&mut self, identifier: TestIdentifier, data: TestData) -> Option<TestData> {
        self.entries.insert(identifier, data)
    }

    /// Returns the data recorded for `identifier`.
    pub fn get(&self, identifier: &TestIdentifier) -> Option<&TestData> {
        self.entries.get(identifier)
    }

    /// Looks up an entry by its identifier's unique ID.
    pub fn get_by_id(&self, id: &str) -> Option<(&TestIdentifier, &TestData)> {
        self.entries.iter().find(|(identifier, _)| identifier.id == id)
    }

    /// Iterates over entries in report order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&TestIdentifier, &TestData)> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the report has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if at least one entry failed.
    ///
    /// Aborted and skipped entries never cause failure on their own.
    pub fn is_failure(&self) -> bool {
        self.entries
            .values()
            .any(|data| data.status == TestStatus::Failed)
    }

    /// Returns the process exit code that summarizes this report.
    pub fn process_exit_code(&self) -> i32 {
        if self.is_failure() {
            TestforkExitCode::TEST_RUN_FAILED
        } else {
            TestforkExitCode::OK
        }
    }

    /// Encodes this report as a versioned protocol message.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        wire::encode_message(self)
    }

    /// Decodes a report from a complete protocol message.
    pub fn from_bytes(input: &[u8]) -> Result<Self, DecodeError> {
        wire::decode_message(input)
    }

    /// Replaces the contents of this report with entries read from `buf`.
    ///
    /// Prior entries are discarded even if decoding fails partway through.
    pub fn read_from<B: Buf>(&mut self, buf: &mut B) -> Result<(), DecodeError> {
        self.entries.clear();
        let count = decode_count(buf)?;
        for _ in 0..count {
            let identifier = TestIdentifier::decode(buf)?;
            let data = TestData::decode(buf)?;
            self.entries.insert(identifier, data);
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a TestReport {
    type Item = (&'a TestIdentifier, &'a TestData);
    type IntoIter = indexmap::map::Iter<'a, TestIdentifier, TestData>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<(TestIdentifier, TestData)> for TestReport {
    fn from_iter<T: IntoIterator<Item = (TestIdentifier, TestData)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl WireEncode for TestReport {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), EncodeError> {
        encode_count(self.entries.len(), buf)?;
        for (identifier, data) in &self.entries {
            identifier.encode(buf)?;
            data.encode(buf)?;
        }
        Ok(())
    }
}

impl WireDecode for TestReport {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        let mut report = Self::new();
        report.read_from(buf)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::{collection::vec, prelude::*};
    use std::collections::hash_map::DefaultHasher;
    use test_strategy::proptest;

    fn identifier(id: &str, parent_id: &str) -> TestIdentifier {
        TestIdentifier {
            id: id.to_owned(),
            parent_id: parent_id.to_owned(),
            display_name: id.to_owned(),
            is_test: true,
            is_container: false,
            tags: BTreeSet::new(),
            test_source: String::new(),
        }
    }

    fn data(status: TestStatus) -> TestData {
        TestData {
            status,
            ..TestData::default()
        }
    }

    fn hash_of(identifier: &TestIdentifier) -> u64 {
        let mut hasher = DefaultHasher::new();
        identifier.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn identity_ignores_descriptive_fields() {
        let a = TestIdentifier {
            display_name: "X".to_owned(),
            ..identifier("a", "p")
        };
        let b = TestIdentifier {
            display_name: "Y".to_owned(),
            tags: BTreeSet::from(["other".to_owned()]),
            test_source: "ClassSource[Foo]".to_owned(),
            is_container: true,
            ..identifier("a", "p")
        };
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        assert_ne!(a, identifier("a", "q"), "parent is part of identity");
        assert_ne!(a, identifier("b", "p"), "id is part of identity");
    }

    #[test]
    fn failure_only_from_failed_entries() {
        let mut report = TestReport::new();
        report.insert(identifier("ok", ""), data(TestStatus::Successful));
        report.insert(identifier("aborted", ""), data(TestStatus::Aborted));
        report.insert(identifier("skipped", ""), data(TestStatus::Skipped));
        assert!(!report.is_failure());
        assert_eq!(report.process_exit_code(), TestforkExitCode::OK);

        report.insert(identifier("failed", ""), data(TestStatus::Failed));
        assert!(report.is_failure());
        assert_eq!(
            report.process_exit_code(),
            TestforkExitCode::TEST_RUN_FAILED
        );

        report.insert(identifier("failed", ""), data(TestStatus::Successful));
        assert!(!report.is_failure(), "replacing the failure restores success");
    }

    #[test]
    fn empty_report_round_trip() {
        let report = TestReport::new();
        let bytes = report.to_bytes().unwrap();
        assert_eq!(TestReport::from_bytes(&bytes).unwrap(), report);
    }

    #[test]
    fn round_trip_keeps_insertion_order() {
        let mut report = TestReport::new();
        for id in ["zeta", "alpha", "mu"] {
            report.insert(identifier(id, ""), data(TestStatus::Successful));
        }
        report.insert(identifier("alpha", "zeta"), data(TestStatus::Failed));

        let decoded = TestReport::from_bytes(&report.to_bytes().unwrap()).unwrap();
        let order: Vec<_> = decoded
            .iter()
            .map(|(id, _)| (id.parent_id.as_str(), id.id.as_str()))
            .collect();
        assert_eq!(
            order,
            [("", "zeta"), ("", "alpha"), ("", "mu"), ("zeta", "alpha")]
        );
    }

    #[test]
    fn read_from_clears_prior_entries() {
        let mut source = TestReport::new();
        source.insert(identifier("new", ""), data(TestStatus::Successful));
        let mut bytes = Vec::new();
        source.encode(&mut bytes).unwrap();

        let mut target = TestReport::new();
        target.insert(identifier("stale", ""), data(TestStatus::Failed));
        target.read_from(&mut &bytes[..]).unwrap();

        assert_eq!(target, source);
        assert!(target.get_by_id("stale").is_none());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut bytes = Vec::new();
        data(TestStatus::Failed).encode(&mut bytes).unwrap();
        bytes[0] = 9;
        assert_eq!(
            TestData::decode(&mut &bytes[..]),
            Err(DecodeError::UnknownStatus(9))
        );
    }

    #[test]
    fn identifier_display() {
        let identifier = TestIdentifier {
            is_container: true,
            tags: BTreeSet::from(["fast".to_owned(), "db".to_owned()]),
            test_source: "MethodSource[Foo#bar]".to_owned(),
            ..identifier("[engine:x]", "")
        };
        assert_eq!(
            identifier.to_string(),
            "[engine:x]:[engine:x]{test & container, tags=[db, fast], source=MethodSource[Foo#bar]}"
        );
    }

    fn any_status() -> impl Strategy<Value = TestStatus> {
        (0u8..5).prop_map(|ordinal| TestStatus::from_ordinal(ordinal).unwrap())
    }

    prop_compose! {
        fn any_entry()(
            id in "[a-z:/\\[\\]]{1,10}",
            parent_id in "[a-z]{0,4}",
            display_name in ".{0,10}",
            is_test in any::<bool>(),
            is_container in any::<bool>(),
            tags in vec("[a-z]{1,5}", 0..3),
            test_source in ".{0,10}",
            status in any_status(),
            duration in -1i64..100_000,
            skip_reason in ".{0,10}",
            stack_trace in "(.|\n){0,40}",
            reports in vec((any::<i64>(), ".{0,6}", ".{0,6}"), 0..3),
        ) -> (TestIdentifier, TestData) {
            (
                TestIdentifier {
                    id,
                    parent_id,
                    display_name,
                    is_test,
                    is_container,
                    tags: tags.into_iter().collect(),
                    test_source,
                },
                TestData {
                    status,
                    duration,
                    skip_reason,
                    stack_trace,
                    reports: reports
                        .into_iter()
                        .map(|(timestamp, key, value)| ReportEntry { timestamp, key, value })
                        .collect(),
                },
            )
        }
    }

    #[proptest]
    fn report_round_trip(
        #[strategy(vec(any_entry(), 0..6))] entries: Vec<(TestIdentifier, TestData)>,
    ) {
        let report: TestReport = entries.into_iter().collect();
        let decoded = TestReport::from_bytes(&report.to_bytes().unwrap()).unwrap();

        prop_assert_eq!(decoded.len(), report.len());
        prop_assert!(
            report.iter().map(|(id, _)| id).eq(decoded.iter().map(|(id, _)| id)),
            "entries are decoded in insertion order"
        );
        for ((expected_id, expected_data), (actual_id, actual_data)) in report.iter().zip(decoded.iter()) {
            prop_assert_eq!(&actual_id.id, &expected_id.id);
            prop_assert_eq!(&actual_id.parent_id, &expected_id.parent_id);
            prop_assert_eq!(actual_id.is_test, expected_id.is_test);
            prop_assert_eq!(actual_id.is_container, expected_id.is_container);
            prop_assert_eq!(&actual_id.display_name, &expected_id.display_name);
            prop_assert_eq!(&actual_id.tags, &expected_id.tags);
            prop_assert_eq!(&actual_id.test_source, &expected_id.test_source);
            prop_assert_eq!(actual_data, expected_data);
        }
    }
}
