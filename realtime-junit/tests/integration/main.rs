// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for realtime-junit, run against the in-process host.

mod fixtures;
mod lifecycle;
mod scoped_baseline;
