// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use realtime_junit::{
    errors::{ArchiveError, AttachError, ConfigParseError, ConfigParseErrorKind},
    helpers::plural,
};
use std::error::Error;
use thiserror::Error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Process exit codes returned by `junit-realtime`.
pub enum RealtimeExitCode {}

impl RealtimeExitCode {
    /// The command succeeded and no tests failed.
    pub const OK: i32 = 0;

    /// No test results were found.
    pub const NO_RESULTS: i32 = 4;

    /// One or more tests failed.
    pub const TESTS_FAILED: i32 = 100;

    /// Final archiving of test results failed.
    pub const ARCHIVE_FAILED: i32 = 103;

    /// Writing output failed.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// An error occurred while setting up the command.
    pub const SETUP_ERROR: i32 = 96;
}

// The #[error()] strings are placeholder messages: errors are meant to be printed with
// display_to_stderr, which colorizes them.

/// An error that `junit-realtime` expects and reports to the user.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine current directory")]
    CurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 { path: std::path::PathBuf },
    #[error("workspace not found")]
    WorkspaceNotFound { workspace: Utf8PathBuf },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("failed to read baseline report")]
    BaselineReadError {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to parse baseline report")]
    BaselineParseError {
        path: Utf8PathBuf,
        #[source]
        err: junit_report::errors::ReadError,
    },
    #[error("failed to attach realtime test report")]
    AttachError {
        #[from]
        err: AttachError,
    },
    #[error("final archiving failed")]
    ArchiveError {
        provisional_count: Option<usize>,
        #[source]
        err: ArchiveError,
    },
    #[error("error writing output")]
    WriteOutputError {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    pub(crate) fn write_output_error(err: std::io::Error) -> Self {
        Self::WriteOutputError { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::WorkspaceNotFound { .. }
            | Self::ConfigParseError { .. }
            | Self::BaselineReadError { .. }
            | Self::BaselineParseError { .. }
            | Self::AttachError { .. } => RealtimeExitCode::SETUP_ERROR,
            Self::ArchiveError { err, .. } if err.is_no_results() => RealtimeExitCode::NO_RESULTS,
            Self::ArchiveError { .. } => RealtimeExitCode::ARCHIVE_FAILED,
            Self::WriteOutputError { .. } => RealtimeExitCode::WRITE_OUTPUT_ERROR,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::CurrentDirFailed { err } => {
                log::error!("could not determine current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { path } => {
                log::error!(
                    "current directory `{}` is not valid UTF-8",
                    path.display().style(styles.bold)
                );
                None
            }
            Self::WorkspaceNotFound { workspace } => {
                log::error!(
                    "workspace `{}` does not exist or is not a directory",
                    workspace.style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                match err.kind() {
                    ConfigParseErrorKind::BuildError(error) => {
                        log::error!(
                            "failed to parse realtime-junit config at `{}`",
                            err.config_file().style(styles.bold)
                        );
                        Some(error as &dyn Error)
                    }
                    ConfigParseErrorKind::DeserializeError(error) => {
                        log::error!(
                            "failed to parse realtime-junit config at `{}`: key `{}`",
                            err.config_file().style(styles.bold),
                            error.path().style(styles.bold),
                        );
                        Some(error.inner() as &dyn Error)
                    }
                    ConfigParseErrorKind::InvalidValue { key, reason } => {
                        log::error!(
                            "invalid value for `{}` in realtime-junit config at `{}`: {reason}",
                            key.style(styles.bold),
                            err.config_file().style(styles.bold),
                        );
                        None
                    }
                    other => {
                        log::error!(
                            "failed to parse realtime-junit config at `{}`",
                            err.config_file().style(styles.bold)
                        );
                        other.source()
                    }
                }
            }
            Self::BaselineReadError { path, err } => {
                log::error!(
                    "failed to read baseline report `{}`",
                    path.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::BaselineParseError { path, err } => {
                log::error!(
                    "failed to parse baseline report `{}`",
                    path.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::AttachError { err } => {
                log::error!("{err}");
                err.source()
            }
            Self::ArchiveError {
                provisional_count,
                err,
            } => {
                match provisional_count {
                    Some(count) => log::error!(
                        "final archiving of test results failed ({} provisional {} recorded)",
                        count.style(styles.bold),
                        plural::results_str(*count),
                    ),
                    None => log::error!("final archiving of test results failed"),
                }
                Some(err as &dyn Error)
            }
            Self::WriteOutputError { err } => {
                log::error!(
                    "{}",
                    "error writing output".style(styles.warning_text)
                );
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            log::error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {err}");
            next_error = err.source();
        }
    }
}
