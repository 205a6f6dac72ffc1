// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read JUnit/XUnit XML into a [`Report`].
//!
//! Both `<testsuites>` and bare `<testsuite>` roots are accepted. Nested test suites are
//! flattened into the report in document order. Count attributes such as `tests` or `failures`
//! are ignored: counts are always derived from the test cases actually present, which keeps
//! partially written reports consistent.

use crate::{
    NonSuccessKind, Output, Property, Report, StdioRetention, TestCase, TestCaseStatus, TestSuite,
    errors::ReadError,
};
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use std::time::Duration;

static TESTSUITES_TAG: &[u8] = b"testsuites";
static TESTSUITE_TAG: &[u8] = b"testsuite";
static TESTCASE_TAG: &[u8] = b"testcase";
static PROPERTIES_TAG: &[u8] = b"properties";
static PROPERTY_TAG: &[u8] = b"property";
static FAILURE_TAG: &[u8] = b"failure";
static ERROR_TAG: &[u8] = b"error";
static SKIPPED_TAG: &[u8] = b"skipped";
static SYSTEM_OUT_TAG: &[u8] = b"system-out";
static SYSTEM_ERR_TAG: &[u8] = b"system-err";

/// Options controlling how reports are read.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ReadOptions {
    /// How much standard output and standard error to keep.
    pub stdio_retention: StdioRetention,
}

impl ReadOptions {
    /// Creates read options with the given stdio retention.
    pub fn new(stdio_retention: StdioRetention) -> Self {
        Self { stdio_retention }
    }
}

impl Report {
    /// Reads a report from a string containing JUnit XML.
    pub fn from_xml(xml: &str, options: &ReadOptions) -> Result<Report, ReadError> {
        let mut report = ReportReader::new(xml).read()?;
        report.apply_stdio_retention(options.stdio_retention);
        Ok(report)
    }
}

struct ReportReader<'a> {
    reader: Reader<&'a [u8]>,
}

impl<'a> ReportReader<'a> {
    fn new(xml: &'a str) -> Self {
        Self {
            reader: Reader::from_str(xml),
        }
    }

    fn read(mut self) -> Result<Report, ReadError> {
        let mut report = Report::new();
        loop {
            match self.next_event()? {
                Event::Start(start) if start.local_name().as_ref() == TESTSUITES_TAG => {
                    let mut attrs = self.attributes(&start)?;
                    report.name = attrs.shift_remove("name");
                    report.time = attrs.get("time").and_then(|time| parse_time(time));
                    report.timestamp = attrs
                        .get("timestamp")
                        .and_then(|timestamp| parse_timestamp(timestamp));
                    self.read_suites(&mut report.test_suites)?;
                }
                Event::Empty(start) if start.local_name().as_ref() == TESTSUITES_TAG => {
                    let mut attrs = self.attributes(&start)?;
                    report.name = attrs.shift_remove("name");
                }
                Event::Start(start) if start.local_name().as_ref() == TESTSUITE_TAG => {
                    self.read_suite(&start, false, &mut report.test_suites)?;
                }
                Event::Empty(start) if start.local_name().as_ref() == TESTSUITE_TAG => {
                    self.read_suite(&start, true, &mut report.test_suites)?;
                }
                Event::Start(start) | Event::Empty(start) => {
                    return Err(ReadError::UnexpectedRoot {
                        name: std::str::from_utf8(start.name().as_ref())?.to_owned(),
                    });
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(report)
    }

    /// Reads the children of a `testsuites` element.
    fn read_suites(&mut self, suites: &mut Vec<TestSuite>) -> Result<(), ReadError> {
        loop {
            match self.next_event()? {
                Event::Start(start) if start.local_name().as_ref() == TESTSUITE_TAG => {
                    self.read_suite(&start, false, suites)?;
                }
                Event::Empty(start) if start.local_name().as_ref() == TESTSUITE_TAG => {
                    self.read_suite(&start, true, suites)?;
                }
                Event::Start(start) if start.local_name().as_ref() == TESTSUITES_TAG => {
                    self.read_suites(suites)?;
                }
                Event::Start(start) => self.skip(&start)?,
                Event::End(end) if end.local_name().as_ref() == TESTSUITES_TAG => return Ok(()),
                Event::Eof => {
                    return Err(ReadError::UnexpectedEof {
                        element: "testsuites",
                    });
                }
                _ => {}
            }
        }
    }

    /// Reads a `testsuite` element, pushing it (followed by any nested suites) onto `suites`.
    fn read_suite(
        &mut self,
        start: &BytesStart<'_>,
        empty: bool,
        suites: &mut Vec<TestSuite>,
    ) -> Result<(), ReadError> {
        let mut attrs = self.attributes(start)?;
        let mut suite = TestSuite::new(attrs.shift_remove("name").unwrap_or_default());
        suite.time = attrs.shift_remove("time").and_then(|time| parse_time(&time));
        suite.timestamp = attrs
            .shift_remove("timestamp")
            .and_then(|timestamp| parse_timestamp(&timestamp));
        for count_attr in ["tests", "failures", "errors", "skipped", "disabled"] {
            attrs.shift_remove(count_attr);
        }
        suite.extra = attrs;

        let mut nested = Vec::new();
        if !empty {
            loop {
                match self.next_event()? {
                    Event::Start(child) => match child.local_name().as_ref() {
                        name if name == TESTCASE_TAG => {
                            let case = self.read_case(&child, false)?;
                            suite.test_cases.push(case);
                        }
                        name if name == TESTSUITE_TAG => {
                            self.read_suite(&child, false, &mut nested)?;
                        }
                        name if name == PROPERTIES_TAG => {
                            self.read_properties(&mut suite.properties)?;
                        }
                        name if name == SYSTEM_OUT_TAG => {
                            suite.system_out = Some(Output::new(self.read_text(&child)?));
                        }
                        name if name == SYSTEM_ERR_TAG => {
                            suite.system_err = Some(Output::new(self.read_text(&child)?));
                        }
                        _ => self.skip(&child)?,
                    },
                    Event::Empty(child) => match child.local_name().as_ref() {
                        name if name == TESTCASE_TAG => {
                            let case = self.read_case(&child, true)?;
                            suite.test_cases.push(case);
                        }
                        name if name == TESTSUITE_TAG => {
                            self.read_suite(&child, true, &mut nested)?;
                        }
                        _ => {}
                    },
                    Event::End(end) if end.local_name().as_ref() == TESTSUITE_TAG => break,
                    Event::Eof => {
                        return Err(ReadError::UnexpectedEof {
                            element: "testsuite",
                        });
                    }
                    _ => {}
                }
            }
        }

        suites.push(suite);
        suites.extend(nested);
        Ok(())
    }

    fn read_case(&mut self, start: &BytesStart<'_>, empty: bool) -> Result<TestCase, ReadError> {
        let mut attrs = self.attributes(start)?;
        let mut case = TestCase::new(
            attrs.shift_remove("name").unwrap_or_default(),
            TestCaseStatus::success(),
        );
        case.classname = attrs.shift_remove("classname");
        case.time = attrs.shift_remove("time").and_then(|time| parse_time(&time));
        case.assertions = attrs
            .shift_remove("assertions")
            .and_then(|assertions| assertions.trim().parse().ok());
        case.extra = attrs;

        if empty {
            return Ok(case);
        }

        loop {
            match self.next_event()? {
                Event::Start(child) => {
                    let name = child.local_name();
                    if let Some(mut status) = status_for(name.as_ref()) {
                        self.apply_status_attributes(&child, &mut status)?;
                        let description = self.read_text(&child)?;
                        if !description.trim().is_empty() {
                            status.set_description(description);
                        }
                        case.status = status;
                    } else if name.as_ref() == SYSTEM_OUT_TAG {
                        case.system_out = Some(Output::new(self.read_text(&child)?));
                    } else if name.as_ref() == SYSTEM_ERR_TAG {
                        case.system_err = Some(Output::new(self.read_text(&child)?));
                    } else {
                        self.skip(&child)?;
                    }
                }
                Event::Empty(child) => {
                    if let Some(mut status) = status_for(child.local_name().as_ref()) {
                        self.apply_status_attributes(&child, &mut status)?;
                        case.status = status;
                    }
                }
                Event::End(end) if end.local_name().as_ref() == TESTCASE_TAG => break,
                Event::Eof => {
                    return Err(ReadError::UnexpectedEof {
                        element: "testcase",
                    });
                }
                _ => {}
            }
        }

        Ok(case)
    }

    fn apply_status_attributes(
        &self,
        start: &BytesStart<'_>,
        status: &mut TestCaseStatus,
    ) -> Result<(), ReadError> {
        let mut attrs = self.attributes(start)?;
        if let Some(message) = attrs.shift_remove("message") {
            status.set_message(message);
        }
        if let Some(ty) = attrs.shift_remove("type") {
            status.set_type(ty);
        }
        Ok(())
    }

    fn read_properties(&mut self, properties: &mut Vec<Property>) -> Result<(), ReadError> {
        loop {
            match self.next_event()? {
                Event::Empty(start) if start.local_name().as_ref() == PROPERTY_TAG => {
                    properties.push(self.property(&start)?);
                }
                Event::Start(start) if start.local_name().as_ref() == PROPERTY_TAG => {
                    let mut property = self.property(&start)?;
                    let text = self.read_text(&start)?;
                    if property.value.is_empty() {
                        property.value = text;
                    }
                    properties.push(property);
                }
                Event::Start(start) => self.skip(&start)?,
                Event::End(end) if end.local_name().as_ref() == PROPERTIES_TAG => return Ok(()),
                Event::Eof => {
                    return Err(ReadError::UnexpectedEof {
                        element: "properties",
                    });
                }
                _ => {}
            }
        }
    }

    fn property(&self, start: &BytesStart<'_>) -> Result<Property, ReadError> {
        let mut attrs = self.attributes(start)?;
        Ok(Property::new(
            attrs.shift_remove("name").unwrap_or_default(),
            attrs.shift_remove("value").unwrap_or_default(),
        ))
    }

    /// Collects the text and CDATA content of `start` up to its end tag.
    fn read_text(&mut self, start: &BytesStart<'_>) -> Result<String, ReadError> {
        let mut text = String::new();
        loop {
            match self.next_event()? {
                Event::Text(t) => {
                    let position = self.position();
                    let unescaped = t
                        .unescape()
                        .map_err(|err| ReadError::Xml { position, err })?;
                    text.push_str(&unescaped);
                }
                Event::CData(cdata) => {
                    text.push_str(&String::from_utf8_lossy(&cdata.into_inner()));
                }
                Event::Start(child) => self.skip(&child)?,
                Event::End(end) if end.name() == start.name() => return Ok(text),
                Event::Eof => {
                    return Err(ReadError::UnexpectedEof {
                        element: "text content",
                    });
                }
                _ => {}
            }
        }
    }

    fn skip(&mut self, start: &BytesStart<'_>) -> Result<(), ReadError> {
        self.reader
            .read_to_end(start.name())
            .map_err(|err| ReadError::Xml {
                position: self.position(),
                err,
            })?;
        Ok(())
    }

    fn attributes(&self, start: &BytesStart<'_>) -> Result<IndexMap<String, String>, ReadError> {
        let mut attrs = IndexMap::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|err| ReadError::Attribute {
                position: self.position(),
                err,
            })?;
            let key = std::str::from_utf8(attr.key.local_name().as_ref())?.to_owned();
            let value = attr.unescape_value().map_err(|err| ReadError::Xml {
                position: self.position(),
                err,
            })?;
            attrs.insert(key, value.into_owned());
        }
        Ok(attrs)
    }

    fn next_event(&mut self) -> Result<Event<'a>, ReadError> {
        self.reader.read_event().map_err(|err| ReadError::Xml {
            position: self.position(),
            err,
        })
    }

    fn position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }
}

fn status_for(name: &[u8]) -> Option<TestCaseStatus> {
    if name == FAILURE_TAG {
        Some(TestCaseStatus::non_success(NonSuccessKind::Failure))
    } else if name == ERROR_TAG {
        Some(TestCaseStatus::non_success(NonSuccessKind::Error))
    } else if name == SKIPPED_TAG {
        Some(TestCaseStatus::skipped())
    } else {
        None
    }
}

/// Parses a time in seconds. Thousands separators are tolerated, invalid values are dropped.
fn parse_time(input: &str) -> Option<Duration> {
    let cleaned: String = input.chars().filter(|c| *c != ',').collect();
    let secs: f64 = cleaned.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

fn parse_timestamp(input: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(input.trim()).ok()
}
