// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced while reading and writing JUnit reports.

use crate::StdioRetention;
use quick_xml::events::attributes::AttrError;
use std::{io, str::Utf8Error};
use thiserror::Error;

/// An error that occurs while serializing a [`Report`](crate::Report).
///
/// Returned by [`Report::serialize`](crate::Report::serialize) and
/// [`Report::to_string`](crate::Report::to_string).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SerializeError {
    /// An error occurred while writing XML events.
    #[error("error serializing JUnit report")]
    Xml(#[from] quick_xml::Error),

    /// An I/O error occurred while writing out the report.
    #[error("error writing JUnit report")]
    Io(#[from] io::Error),

    /// The serialized report was not valid UTF-8.
    #[error("serialized JUnit report is not valid UTF-8")]
    Utf8(#[source] std::string::FromUtf8Error),
}

/// An error that occurs while reading a JUnit report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReadError {
    /// The XML was malformed.
    #[error("malformed XML at byte offset {position}")]
    Xml {
        /// The byte offset at which the error was detected.
        position: u64,

        /// The underlying error.
        #[source]
        err: quick_xml::Error,
    },

    /// An attribute was malformed.
    #[error("malformed attribute at byte offset {position}")]
    Attribute {
        /// The byte offset at which the error was detected.
        position: u64,

        /// The underlying error.
        #[source]
        err: AttrError,
    },

    /// Element or attribute names were not valid UTF-8.
    #[error("invalid UTF-8 in XML")]
    Utf8(#[from] Utf8Error),

    /// The root element was neither `testsuites` nor `testsuite`.
    #[error("unexpected root element `{name}` (expected `testsuites` or `testsuite`)")]
    UnexpectedRoot {
        /// The name of the root element.
        name: String,
    },

    /// The document ended in the middle of an element.
    #[error("unexpected end of document while reading `{element}`")]
    UnexpectedEof {
        /// The element being read.
        element: &'static str,
    },
}

/// Error returned while parsing a [`StdioRetention`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for stdio-retention: {input}\n(known values: {})",
    StdioRetention::variants().join(", "),
)]
pub struct StdioRetentionParseError {
    input: String,
}

impl StdioRetentionParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}
