// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for realtime-junit.
//!
//! Global settings live in `.config/realtime-junit.toml`, layered over an embedded default config.
//! Per-step settings are described by [`RealtimeJunitOptions`].

mod core;
pub(crate) mod helpers;
mod options;

pub use self::core::*;
pub use options::*;
