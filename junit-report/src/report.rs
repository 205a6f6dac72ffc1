// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::SerializeError,
    serialize::serialize_report,
    stdio::{StdioRetention, truncate_output},
};
use chrono::{DateTime, FixedOffset};
use indexmap::map::IndexMap;
use std::{io, time::Duration};

/// The root of a parsed set of JUnit reports.
///
/// A `Report` is an immutable snapshot: consumers that need fresher data parse a new one rather
/// than mutating an existing report in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Report {
    /// The name of this report, if the XML carried one.
    pub name: Option<String>,

    /// The time at which the first test in this report began execution.
    pub timestamp: Option<DateTime<FixedOffset>>,

    /// The overall time recorded on the `testsuites` element, if any.
    ///
    /// This is informational only. [`Report::duration`] sums up the suites instead.
    pub time: Option<Duration>,

    /// The test suites contained in this report.
    pub test_suites: Vec<TestSuite>,
}

impl Report {
    /// Creates a new, empty `Report`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name of the report.
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the time taken for overall execution.
    pub fn set_time(&mut self, time: Duration) -> &mut Self {
        self.time = Some(time);
        self
    }

    /// Adds a test suite to this report.
    pub fn add_test_suite(&mut self, test_suite: TestSuite) -> &mut Self {
        self.test_suites.push(test_suite);
        self
    }

    /// Adds several test suites to this report.
    pub fn add_test_suites(
        &mut self,
        test_suites: impl IntoIterator<Item = TestSuite>,
    ) -> &mut Self {
        self.test_suites.extend(test_suites);
        self
    }

    /// Moves all suites of `other` into this report.
    ///
    /// Used to combine the results of several report files into one.
    pub fn merge(&mut self, other: Report) -> &mut Self {
        if self.timestamp.is_none() {
            self.timestamp = other.timestamp;
        }
        self.test_suites.extend(other.test_suites);
        self
    }

    /// The total number of test cases, including skipped ones.
    pub fn total_count(&self) -> usize {
        self.test_suites.iter().map(|suite| suite.test_cases.len()).sum()
    }

    /// The number of test cases that failed or errored.
    pub fn fail_count(&self) -> usize {
        self.test_suites.iter().map(TestSuite::fail_count).sum()
    }

    /// The number of test cases that were skipped.
    pub fn skip_count(&self) -> usize {
        self.test_suites.iter().map(TestSuite::skip_count).sum()
    }

    /// The number of test cases that passed.
    pub fn pass_count(&self) -> usize {
        self.total_count() - self.fail_count() - self.skip_count()
    }

    /// The total duration of this report, summed over all test suites.
    ///
    /// The sum saturates at [`Duration::MAX`].
    pub fn duration(&self) -> Duration {
        saturating_sum(self.test_suites.iter().map(TestSuite::duration))
    }

    /// Returns true if this report contains no test cases.
    pub fn is_empty(&self) -> bool {
        self.total_count() == 0
    }

    /// Iterates over all test cases that failed or errored, along with their suites.
    pub fn failed_tests(&self) -> impl Iterator<Item = (&TestSuite, &TestCase)> + '_ {
        self.test_suites.iter().flat_map(|suite| {
            suite
                .test_cases
                .iter()
                .filter(|case| case.status.is_failure())
                .map(move |case| (suite, case))
        })
    }

    /// Returns the subset of this report that originated under the given pipeline block.
    ///
    /// A suite belongs to a block if it was recorded by the node with that identifier, or if the
    /// block encloses the recording node. Suites without pipeline details never match.
    pub fn result_for_pipeline_block(&self, block_id: &str) -> Report {
        Report {
            name: self.name.clone(),
            timestamp: self.timestamp,
            time: None,
            test_suites: self
                .test_suites
                .iter()
                .filter(|suite| {
                    suite
                        .pipeline
                        .as_ref()
                        .is_some_and(|details| details.is_under(block_id))
                })
                .cloned()
                .collect(),
        }
    }

    /// Applies the given stdio retention policy to every test case in this report.
    pub fn apply_stdio_retention(&mut self, retention: StdioRetention) -> &mut Self {
        for suite in &mut self.test_suites {
            for case in &mut suite.test_cases {
                case.apply_stdio_retention(retention);
            }
        }
        self
    }

    /// Serializes this report as JUnit XML to the given writer.
    pub fn serialize(&self, writer: impl io::Write) -> Result<(), SerializeError> {
        serialize_report(self, writer)
    }

    /// Serializes this report as JUnit XML to a string.
    pub fn to_string(&self) -> Result<String, SerializeError> {
        let mut buf: Vec<u8> = vec![];
        self.serialize(&mut buf)?;
        String::from_utf8(buf).map_err(SerializeError::Utf8)
    }
}

/// Identifies where in a pipeline a test suite was recorded.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PipelineDetails {
    /// The identifier of the node that recorded the suite.
    pub node_id: String,

    /// Identifiers of the stages and parallel branches enclosing the node, innermost first.
    pub enclosing_blocks: Vec<String>,

    /// Names of the stages and parallel branches enclosing the node, innermost first.
    pub enclosing_block_names: Vec<String>,
}

impl PipelineDetails {
    /// Creates pipeline details for the given recording node.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            enclosing_blocks: vec![],
            enclosing_block_names: vec![],
        }
    }

    /// Returns true if the suite was recorded by `block_id` or under it.
    pub fn is_under(&self, block_id: &str) -> bool {
        self.node_id == block_id || self.enclosing_blocks.iter().any(|id| id == block_id)
    }
}

/// A single test suite, grouping several test cases.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct TestSuite {
    /// The name of this test suite.
    pub name: String,

    /// The time at which the test suite began execution.
    pub timestamp: Option<DateTime<FixedOffset>>,

    /// The time recorded for the test suite, if any.
    pub time: Option<Duration>,

    /// The test cases that form this test suite.
    pub test_cases: Vec<TestCase>,

    /// Custom properties set during test execution, e.g. environment variables.
    pub properties: Vec<Property>,

    /// Data written to standard output while the test suite was executed.
    pub system_out: Option<Output>,

    /// Data written to standard error while the test suite was executed.
    pub system_err: Option<Output>,

    /// Where in a pipeline this suite was recorded.
    ///
    /// This is not part of the XML. It is stamped on by whoever parses the report.
    pub pipeline: Option<PipelineDetails>,

    /// Other attributes, such as "hostname" or "package".
    pub extra: IndexMap<String, String>,
}

impl TestSuite {
    /// Creates a new `TestSuite`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp: None,
            time: None,
            test_cases: vec![],
            properties: vec![],
            system_out: None,
            system_err: None,
            pipeline: None,
            extra: IndexMap::new(),
        }
    }

    /// Sets the time taken for the test suite.
    pub fn set_time(&mut self, time: Duration) -> &mut Self {
        self.time = Some(time);
        self
    }

    /// Sets the pipeline details for the test suite.
    pub fn set_pipeline(&mut self, pipeline: PipelineDetails) -> &mut Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Adds a property to this test suite.
    pub fn add_property(&mut self, property: impl Into<Property>) -> &mut Self {
        self.properties.push(property.into());
        self
    }

    /// Adds a test case to this test suite.
    pub fn add_test_case(&mut self, test_case: TestCase) -> &mut Self {
        self.test_cases.push(test_case);
        self
    }

    /// Adds several test cases to this test suite.
    pub fn add_test_cases(&mut self, test_cases: impl IntoIterator<Item = TestCase>) -> &mut Self {
        self.test_cases.extend(test_cases);
        self
    }

    /// Sets standard output.
    pub fn set_system_out(&mut self, system_out: impl AsRef<str>) -> &mut Self {
        self.system_out = Some(Output::new(system_out));
        self
    }

    /// Sets standard error.
    pub fn set_system_err(&mut self, system_err: impl AsRef<str>) -> &mut Self {
        self.system_err = Some(Output::new(system_err));
        self
    }

    /// The number of test cases in this suite that failed or errored.
    pub fn fail_count(&self) -> usize {
        self.test_cases
            .iter()
            .filter(|case| case.status.is_failure())
            .count()
    }

    /// The number of test cases in this suite that were skipped.
    pub fn skip_count(&self) -> usize {
        self.test_cases
            .iter()
            .filter(|case| case.status.is_skipped())
            .count()
    }

    /// The duration of this suite.
    ///
    /// This is the time recorded on the suite if present, and otherwise the sum of its cases.
    pub fn duration(&self) -> Duration {
        match self.time {
            Some(time) => time,
            None => saturating_sum(self.test_cases.iter().filter_map(|case| case.time)),
        }
    }

    /// Groups the test cases of this suite by class name, preserving order of first appearance.
    ///
    /// Cases without a class name are grouped under the suite name.
    pub fn classes(&self) -> IndexMap<&str, Vec<&TestCase>> {
        let mut classes: IndexMap<&str, Vec<&TestCase>> = IndexMap::new();
        for case in &self.test_cases {
            let class = case.classname.as_deref().unwrap_or(&self.name);
            classes.entry(class).or_default().push(case);
        }
        classes
    }
}

/// A single test case.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct TestCase {
    /// The name of the test case.
    pub name: String,

    /// The "classname" of the test case.
    ///
    /// `classname` and `name` together should uniquely identify a test.
    pub classname: Option<String>,

    /// The number of assertions in the test case.
    pub assertions: Option<usize>,

    /// The time it took to execute this test case.
    pub time: Option<Duration>,

    /// The status of this test.
    pub status: TestCaseStatus,

    /// Data written to standard output while the test case was executed.
    pub system_out: Option<Output>,

    /// Data written to standard error while the test case was executed.
    pub system_err: Option<Output>,

    /// Other attributes set on the element.
    pub extra: IndexMap<String, String>,
}

impl TestCase {
    /// Creates a new test case.
    pub fn new(name: impl Into<String>, status: TestCaseStatus) -> Self {
        Self {
            name: name.into(),
            classname: None,
            assertions: None,
            time: None,
            status,
            system_out: None,
            system_err: None,
            extra: IndexMap::new(),
        }
    }

    /// Sets the classname of the test.
    pub fn set_classname(&mut self, classname: impl Into<String>) -> &mut Self {
        self.classname = Some(classname.into());
        self
    }

    /// Sets the time taken for the test case.
    pub fn set_time(&mut self, time: Duration) -> &mut Self {
        self.time = Some(time);
        self
    }

    /// Sets standard output.
    pub fn set_system_out(&mut self, system_out: impl AsRef<str>) -> &mut Self {
        self.system_out = Some(Output::new(system_out));
        self
    }

    /// Sets standard error.
    pub fn set_system_err(&mut self, system_err: impl AsRef<str>) -> &mut Self {
        self.system_err = Some(Output::new(system_err));
        self
    }

    /// The fully qualified name of this test: `classname.name`, or just `name`.
    pub fn full_name(&self) -> String {
        match &self.classname {
            Some(classname) => format!("{classname}.{}", self.name),
            None => self.name.clone(),
        }
    }

    fn apply_stdio_retention(&mut self, retention: StdioRetention) {
        let Some(limit) = retention.half_limit(self.status.is_failure()) else {
            return;
        };
        for output in [&mut self.system_out, &mut self.system_err]
            .into_iter()
            .flatten()
        {
            if let Some(truncated) = truncate_output(output.as_str(), limit) {
                *output = Output::new(truncated);
            }
        }
    }
}

/// Represents the success or failure of a test case.
#[derive(Clone, Debug, PartialEq)]
pub enum TestCaseStatus {
    /// This test case passed.
    Success,

    /// This test case did not pass.
    NonSuccess {
        /// Whether this test case failed in an expected way (failure) or an unexpected way
        /// (error).
        kind: NonSuccessKind,

        /// The failure message.
        message: Option<String>,

        /// The "type" of failure that occurred.
        ty: Option<String>,

        /// The description of the failure, read from the text node of the element.
        description: Option<String>,
    },

    /// This test case was not run.
    Skipped {
        /// The skip message.
        message: Option<String>,

        /// The "type" of skip that occurred.
        ty: Option<String>,

        /// The description of the skip.
        description: Option<String>,
    },
}

impl TestCaseStatus {
    /// Creates a new `TestCaseStatus` that represents a successful test.
    pub fn success() -> Self {
        TestCaseStatus::Success
    }

    /// Creates a new `TestCaseStatus` that represents an unsuccessful test.
    pub fn non_success(kind: NonSuccessKind) -> Self {
        TestCaseStatus::NonSuccess {
            kind,
            message: None,
            ty: None,
            description: None,
        }
    }

    /// Creates a new `TestCaseStatus` that represents a skipped test.
    pub fn skipped() -> Self {
        TestCaseStatus::Skipped {
            message: None,
            ty: None,
            description: None,
        }
    }

    /// Returns true if the test failed or errored.
    pub fn is_failure(&self) -> bool {
        matches!(self, TestCaseStatus::NonSuccess { .. })
    }

    /// Returns true if the test was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, TestCaseStatus::Skipped { .. })
    }

    /// Sets the message. No-op if this is a success case.
    pub fn set_message(&mut self, message: impl Into<String>) -> &mut Self {
        match self {
            TestCaseStatus::Success => {}
            TestCaseStatus::NonSuccess { message: m, .. }
            | TestCaseStatus::Skipped { message: m, .. } => *m = Some(message.into()),
        }
        self
    }

    /// Sets the type. No-op if this is a success case.
    pub fn set_type(&mut self, ty: impl Into<String>) -> &mut Self {
        match self {
            TestCaseStatus::Success => {}
            TestCaseStatus::NonSuccess { ty: t, .. } | TestCaseStatus::Skipped { ty: t, .. } => {
                *t = Some(ty.into())
            }
        }
        self
    }

    /// Sets the description (text node). No-op if this is a success case.
    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        match self {
            TestCaseStatus::Success => {}
            TestCaseStatus::NonSuccess { description: d, .. }
            | TestCaseStatus::Skipped { description: d, .. } => *d = Some(description.into()),
        }
        self
    }
}

/// The kind of a non-successful test.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NonSuccessKind {
    /// An expected failure, serialized as `failure`.
    Failure,

    /// An unexpected error, serialized as `error`.
    Error,
}

/// Custom properties set during test execution, e.g. environment variables.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Property {
    /// The name of the property.
    pub name: String,

    /// The value of the property.
    pub value: String,
}

impl Property {
    /// Creates a new `Property` instance.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl<T> From<(T, T)> for Property
where
    T: Into<String>,
{
    fn from((k, v): (T, T)) -> Self {
        Property::new(k, v)
    }
}

/// Text written to standard output or standard error during test execution.
///
/// Characters that cannot appear in XML 1.0 are removed on construction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Output {
    output: Box<str>,
}

impl Output {
    /// Creates a new output, removing any non-printable characters from it.
    pub fn new(output: impl AsRef<str>) -> Self {
        let output = output
            .as_ref()
            .replace(
                |c| matches!(c, '\x00'..='\x08' | '\x0b' | '\x0c' | '\x0e'..='\x1f'),
                "",
            )
            .into_boxed_str();
        Self { output }
    }

    /// Returns the output.
    pub fn as_str(&self) -> &str {
        &self.output
    }

    /// Converts the output into a string.
    pub fn into_string(self) -> String {
        self.output.into_string()
    }
}

impl AsRef<str> for Output {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

fn saturating_sum(durations: impl Iterator<Item = Duration>) -> Duration {
    durations.fold(Duration::ZERO, Duration::saturating_add)
}
