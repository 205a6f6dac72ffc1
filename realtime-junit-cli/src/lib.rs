// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Command-line interface for watching the JUnit reports of a running build.
//!
//! This crate is the library half of the `junit-realtime` binary. It has no stable API.

mod dispatch;
mod display;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, OutputWriter};
