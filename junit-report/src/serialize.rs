// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serialize a `Report` as JUnit XML.

use crate::{
    NonSuccessKind, Output, Report, TestCase, TestCaseStatus, TestSuite, errors::SerializeError,
};
use quick_xml::{
    Writer,
    events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use std::{
    io::{self, Write as _},
    time::Duration,
};

static TESTSUITES_TAG: &str = "testsuites";
static TESTSUITE_TAG: &str = "testsuite";
static TESTCASE_TAG: &str = "testcase";
static PROPERTIES_TAG: &str = "properties";
static PROPERTY_TAG: &str = "property";
static FAILURE_TAG: &str = "failure";
static ERROR_TAG: &str = "error";
static SKIPPED_TAG: &str = "skipped";
static SYSTEM_OUT_TAG: &str = "system-out";
static SYSTEM_ERR_TAG: &str = "system-err";

pub(crate) fn serialize_report(
    report: &Report,
    writer: impl io::Write,
) -> Result<(), SerializeError> {
    let mut writer = Writer::new_with_indent(writer, b' ', 4);

    let decl = BytesDecl::new("1.0", Some("UTF-8"), None);
    writer.write_event(Event::Decl(decl))?;

    serialize_report_impl(report, &mut writer)?;

    // Add a trailing newline.
    writer.get_mut().write_all(b"\n")?;
    Ok(())
}

fn serialize_report_impl(
    report: &Report,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), SerializeError> {
    // Use the destructuring syntax to ensure that all fields are handled.
    let Report {
        name,
        timestamp,
        time,
        test_suites,
    } = report;

    let mut tag = BytesStart::new(TESTSUITES_TAG);
    if let Some(name) = name {
        tag.push_attribute(("name", name.as_str()));
    }
    tag.push_attribute(("tests", report.total_count().to_string().as_str()));
    tag.push_attribute(("failures", count_kind(report, NonSuccessKind::Failure).as_str()));
    tag.push_attribute(("errors", count_kind(report, NonSuccessKind::Error).as_str()));
    tag.push_attribute((
        "time",
        serialize_time(time.unwrap_or_else(|| report.duration())).as_str(),
    ));
    if let Some(timestamp) = timestamp {
        tag.push_attribute(("timestamp", timestamp.to_rfc3339().as_str()));
    }
    writer.write_event(Event::Start(tag))?;

    for test_suite in test_suites {
        serialize_test_suite(test_suite, writer)?;
    }

    writer.write_event(Event::End(BytesEnd::new(TESTSUITES_TAG)))?;
    Ok(())
}

fn serialize_test_suite(
    test_suite: &TestSuite,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), SerializeError> {
    let TestSuite {
        name,
        timestamp,
        time: _,
        test_cases,
        properties,
        system_out,
        system_err,
        // Pipeline details are not part of the JUnit format.
        pipeline: _,
        extra,
    } = test_suite;

    let failures = test_cases
        .iter()
        .filter(|case| kind_of(case) == Some(NonSuccessKind::Failure))
        .count();
    let errors = test_cases
        .iter()
        .filter(|case| kind_of(case) == Some(NonSuccessKind::Error))
        .count();

    let mut tag = BytesStart::new(TESTSUITE_TAG);
    tag.push_attribute(("name", name.as_str()));
    tag.push_attribute(("tests", test_cases.len().to_string().as_str()));
    tag.push_attribute(("disabled", test_suite.skip_count().to_string().as_str()));
    tag.push_attribute(("errors", errors.to_string().as_str()));
    tag.push_attribute(("failures", failures.to_string().as_str()));
    tag.push_attribute(("time", serialize_time(test_suite.duration()).as_str()));
    if let Some(timestamp) = timestamp {
        tag.push_attribute(("timestamp", timestamp.to_rfc3339().as_str()));
    }
    for (k, v) in extra {
        tag.push_attribute((k.as_str(), v.as_str()));
    }
    writer.write_event(Event::Start(tag))?;

    if !properties.is_empty() {
        writer.write_event(Event::Start(BytesStart::new(PROPERTIES_TAG)))?;
        for property in properties {
            let mut tag = BytesStart::new(PROPERTY_TAG);
            tag.push_attribute(("name", property.name.as_str()));
            tag.push_attribute(("value", property.value.as_str()));
            writer.write_event(Event::Empty(tag))?;
        }
        writer.write_event(Event::End(BytesEnd::new(PROPERTIES_TAG)))?;
    }

    for test_case in test_cases {
        serialize_test_case(test_case, writer)?;
    }

    serialize_output(system_out.as_ref(), SYSTEM_OUT_TAG, writer)?;
    serialize_output(system_err.as_ref(), SYSTEM_ERR_TAG, writer)?;

    writer.write_event(Event::End(BytesEnd::new(TESTSUITE_TAG)))?;
    Ok(())
}

fn serialize_test_case(
    test_case: &TestCase,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), SerializeError> {
    let TestCase {
        name,
        classname,
        assertions,
        time,
        status,
        system_out,
        system_err,
        extra,
    } = test_case;

    let mut tag = BytesStart::new(TESTCASE_TAG);
    tag.push_attribute(("name", name.as_str()));
    if let Some(classname) = classname {
        tag.push_attribute(("classname", classname.as_str()));
    }
    if let Some(assertions) = assertions {
        tag.push_attribute(("assertions", assertions.to_string().as_str()));
    }
    if let Some(time) = time {
        tag.push_attribute(("time", serialize_time(*time).as_str()));
    }
    for (k, v) in extra {
        tag.push_attribute((k.as_str(), v.as_str()));
    }

    let has_children =
        !matches!(status, TestCaseStatus::Success) || system_out.is_some() || system_err.is_some();
    if !has_children {
        writer.write_event(Event::Empty(tag))?;
        return Ok(());
    }
    writer.write_event(Event::Start(tag))?;

    match status {
        TestCaseStatus::Success => {}
        TestCaseStatus::NonSuccess {
            kind,
            message,
            ty,
            description,
        } => {
            let tag_name = match kind {
                NonSuccessKind::Failure => FAILURE_TAG,
                NonSuccessKind::Error => ERROR_TAG,
            };
            serialize_status(
                tag_name,
                message.as_deref(),
                ty.as_deref(),
                description.as_deref(),
                writer,
            )?;
        }
        TestCaseStatus::Skipped {
            message,
            ty,
            description,
        } => {
            serialize_status(
                SKIPPED_TAG,
                message.as_deref(),
                ty.as_deref(),
                description.as_deref(),
                writer,
            )?;
        }
    }

    serialize_output(system_out.as_ref(), SYSTEM_OUT_TAG, writer)?;
    serialize_output(system_err.as_ref(), SYSTEM_ERR_TAG, writer)?;

    writer.write_event(Event::End(BytesEnd::new(TESTCASE_TAG)))?;
    Ok(())
}

fn serialize_status(
    tag_name: &'static str,
    message: Option<&str>,
    ty: Option<&str>,
    description: Option<&str>,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), SerializeError> {
    let mut tag = BytesStart::new(tag_name);
    if let Some(message) = message {
        tag.push_attribute(("message", message));
    }
    if let Some(ty) = ty {
        tag.push_attribute(("type", ty));
    }
    match description {
        Some(description) => {
            writer.write_event(Event::Start(tag))?;
            writer.write_event(Event::Text(BytesText::new(description)))?;
            writer.write_event(Event::End(BytesEnd::new(tag_name)))?;
        }
        None => writer.write_event(Event::Empty(tag))?,
    }
    Ok(())
}

fn serialize_output(
    output: Option<&Output>,
    tag_name: &'static str,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), SerializeError> {
    let Some(output) = output else {
        return Ok(());
    };
    writer.write_event(Event::Start(BytesStart::new(tag_name)))?;
    // CDATA sections cannot contain their own terminator, so fall back to escaped text.
    if output.as_str().contains("]]>") {
        writer.write_event(Event::Text(BytesText::new(output.as_str())))?;
    } else {
        writer.write_event(Event::CData(BytesCData::new(output.as_str())))?;
    }
    writer.write_event(Event::End(BytesEnd::new(tag_name)))?;
    Ok(())
}

fn kind_of(case: &TestCase) -> Option<NonSuccessKind> {
    match &case.status {
        TestCaseStatus::NonSuccess { kind, .. } => Some(*kind),
        _ => None,
    }
}

fn count_kind(report: &Report, kind: NonSuccessKind) -> String {
    report
        .test_suites
        .iter()
        .flat_map(|suite| &suite.test_cases)
        .filter(|case| kind_of(case) == Some(kind))
        .count()
        .to_string()
}

fn serialize_time(time: Duration) -> String {
    format!("{:.3}", time.as_secs_f64())
}
