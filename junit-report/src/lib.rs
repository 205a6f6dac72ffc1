// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Data model, reader and writer for JUnit/XUnit XML test reports.
//!
//! A [`Report`] is a snapshot of suites, classes and cases. Reports can be read from partially
//! written output directories many times over the life of a build, so reading never trusts the
//! aggregate counts stored in the XML: all counts are derived from the cases actually present.

pub mod errors;
mod read;
mod report;
mod serialize;
mod stdio;

pub use read::ReadOptions;
pub use report::*;
pub use stdio::{FAILING_HALF_LIMIT, PASSING_HALF_LIMIT, StdioRetention};
