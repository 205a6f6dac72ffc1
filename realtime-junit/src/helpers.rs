// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for realtime-junit.

/// Utilities for pluralizing various words based on count.
pub mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "result" if `count` is 1, otherwise "results".
    pub fn results_str(count: usize) -> &'static str {
        if count == 1 { "result" } else { "results" }
    }
}
