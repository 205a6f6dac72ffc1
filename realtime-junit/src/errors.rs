// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by realtime-junit.

use crate::{
    graph::FlowNodeId,
    host::{BuildId, BuildOutcome},
};
use camino::Utf8PathBuf;
use config::ConfigError;
use junit_report::errors::{ReadError, SerializeError};
use std::{error, fmt, io};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse realtime-junit config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// A value was outside its allowed range.
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue {
        /// The key that was invalid.
        key: &'static str,

        /// Why the value was rejected.
        reason: &'static str,
    },
}

/// Error returned while parsing a [`BuildOutcome`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for build outcome: {input}\n(known values: {})",
    BuildOutcome::variants().join(", "),
)]
pub struct BuildOutcomeParseError {
    input: String,
}

impl BuildOutcomeParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurred while parsing the reports of a build or a block.
///
/// Some of these errors are benign: they indicate that there is nothing to read *yet*. Use
/// [`Self::is_benign`] to tell them apart from errors worth surfacing.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseReportError {
    /// The workspace does not exist yet, or has already been cleaned up.
    #[error("skipping parse in nonexistent workspace `{root}`")]
    WorkspaceMissing {
        /// The workspace root that was looked for.
        root: Utf8PathBuf,
    },

    /// The node holding the workspace is not reachable.
    #[error("workspace on node `{node}` is not reachable")]
    NodeOffline {
        /// The node name.
        node: String,
    },

    /// No files matched the glob.
    #[error("no test report files matching `{glob}` were found in `{root}`")]
    NoReports {
        /// The glob that was matched against.
        glob: String,

        /// The workspace root.
        root: Utf8PathBuf,
    },

    /// The glob could not be compiled.
    #[error("invalid test report glob `{glob}`")]
    InvalidGlob {
        /// The glob that failed to compile.
        glob: String,

        /// The underlying error.
        #[source]
        err: globset::Error,
    },

    /// An error occurred while walking the workspace.
    #[error("error walking workspace `{root}`")]
    Walk {
        /// The workspace root.
        root: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: walkdir::Error,
    },

    /// A report file could not be read.
    #[error("error reading test report `{path}`")]
    Read {
        /// The report file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// A report file was not valid JUnit XML.
    #[error("error parsing test report `{path}`")]
    Xml {
        /// The report file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: ReadError,
    },
}

impl ParseReportError {
    /// Returns true if this error only means that there is nothing to parse yet.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Self::WorkspaceMissing { .. } | Self::NodeOffline { .. } | Self::NoReports { .. }
        )
    }

    /// Returns true if this error was caused by an interrupted operation.
    pub fn is_interrupted(&self) -> bool {
        match self {
            Self::Read { err, .. } => err.kind() == io::ErrorKind::Interrupted,
            Self::Walk { err, .. } => err
                .io_error()
                .is_some_and(|err| err.kind() == io::ErrorKind::Interrupted),
            _ => false,
        }
    }
}

/// An error returned by a host while accessing build data.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HostError {
    message: String,
    #[source]
    source: Option<Box<dyn error::Error + Send + Sync + 'static>>,
}

impl HostError {
    /// Creates a new host error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new host error caused by `source`.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// An error that occurred while looking up the baseline of a block.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BaselineLookupError {
    /// The flow graph of a build could not be loaded.
    #[error("failed to load flow graph of {build}")]
    FlowGraph {
        /// The build whose graph failed to load.
        build: BuildId,

        /// The underlying error.
        #[source]
        err: HostError,
    },
}

/// An error that occurred while building a flow graph.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum FlowGraphError {
    /// A node with this identifier was already added.
    #[error("duplicate flow node `{id}`")]
    DuplicateNode {
        /// The duplicate identifier.
        id: FlowNodeId,
    },

    /// A node referred to a node that has not been added.
    #[error("flow node `{id}` refers to unknown node `{unknown}`")]
    UnknownNode {
        /// The node being added.
        id: FlowNodeId,

        /// The unknown node it referred to.
        unknown: FlowNodeId,
    },
}

/// An error that occurred while attaching a tracking handle.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttachError {
    /// A handle with the same key is already attached to the build.
    #[error("{build} already has a realtime test report attached at `{url_name}`")]
    Duplicate {
        /// The build.
        build: BuildId,

        /// The URL name of the existing handle.
        url_name: String,
    },

    /// The step is not running inside a workspace.
    #[error("{build}: realtime test reporting at `{node}` requires a workspace")]
    NoWorkspace {
        /// The build.
        build: BuildId,

        /// The step's flow node.
        node: FlowNodeId,
    },
}

/// An error that occurred while archiving the final results of a build or block.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArchiveError {
    /// The workspace to archive from is not reachable.
    #[error("workspace on node `{node}` is not reachable")]
    WorkspaceUnavailable {
        /// The node name.
        node: String,
    },

    /// The reports could not be parsed.
    #[error("failed to parse test reports")]
    Parse(#[from] ParseReportError),

    /// The test result could not be serialized.
    #[error("failed to serialize test result for `{path}`")]
    Serialize {
        /// The file being written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: SerializeError,
    },

    /// The step ran without a workspace.
    #[error("no workspace to archive test results from")]
    NoWorkspace,

    /// A file or directory in the output directory could not be written.
    #[error("I/O error writing to `{path}`")]
    Io {
        /// The path being written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },
}

impl ArchiveError {
    /// Returns true if archiving failed only because no report files were found.
    pub fn is_no_results(&self) -> bool {
        matches!(self, Self::Parse(ParseReportError::NoReports { .. }))
    }
}

/// An error returned when a realtime step finishes.
#[derive(Debug, Error)]
#[error("final archiving of test results at `{node}` failed")]
pub struct FinishStepError {
    node: FlowNodeId,
    provisional_count: Option<usize>,
    #[source]
    err: ArchiveError,
}

impl FinishStepError {
    pub(crate) fn new(node: FlowNodeId, provisional_count: Option<usize>, err: ArchiveError) -> Self {
        Self {
            node,
            provisional_count,
            err,
        }
    }

    /// The number of provisional test results recorded in place of the final ones, if any.
    pub fn provisional_count(&self) -> Option<usize> {
        self.provisional_count
    }

    /// The underlying archive error.
    pub fn archive_error(&self) -> &ArchiveError {
        &self.err
    }
}

/// Displays an error along with its chain of sources.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut next = self.error.source();
        if next.is_some() {
            write!(f, "\n  caused by:")?;
        }
        while let Some(cause) = next {
            write!(f, "\n  - {cause}")?;
            next = cause.source();
        }
        Ok(())
    }
}
