// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Live JUnit test results for builds that are still running.
//!
//! realtime-junit attaches [tracking handles](handle::TrackingHandle) to running builds, and to
//! the blocks of pipeline builds, as they start. Each handle periodically reparses the partial
//! JUnit reports in its workspace, caches the result between refreshes, and estimates progress
//! against the final result of an earlier build. When the tracked build or block ends, the
//! [lifecycle manager](lifecycle::BlockLifecycleManager) detaches the handle and hands off to the
//! [final archiver](archiver::ExternalArchiver).
//!
//! realtime-junit talks to the build host only through the traits in [`host`].
//! [`host::local`] implements them in memory.

pub mod archiver;
pub mod baseline;
pub mod config;
pub mod errors;
pub mod graph;
pub mod handle;
pub mod helpers;
pub mod host;
pub mod lifecycle;
pub mod parser;
pub mod progress;
#[cfg(test)]
mod test_helpers;
mod time;
