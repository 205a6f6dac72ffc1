// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retention of standard output and standard error in parsed reports.

use crate::errors::StdioRetentionParseError;
use std::{fmt, str::FromStr};

/// Half the number of characters kept for passing test cases when output is truncated.
pub const PASSING_HALF_LIMIT: usize = 500;

/// Half the number of characters kept for failing test cases when output is truncated.
pub const FAILING_HALF_LIMIT: usize = 50_000;

/// How much of a test case's standard output and standard error is kept.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum StdioRetention {
    /// Output of every test case is truncated.
    #[default]
    None,

    /// Output of failing test cases is kept in full, other output is truncated.
    Failed,

    /// All output is kept in full.
    All,
}

impl StdioRetention {
    /// String representations of all known variants.
    pub fn variants() -> [&'static str; 3] {
        ["none", "failed", "all"]
    }

    /// Maps the legacy "keep long stdio" flag onto a retention mode.
    pub fn from_keep_long_stdio(keep_long_stdio: bool) -> Self {
        if keep_long_stdio {
            StdioRetention::All
        } else {
            StdioRetention::None
        }
    }

    /// Returns true if this corresponds to the legacy "keep long stdio" flag.
    pub fn is_keep_long_stdio(self) -> bool {
        self == StdioRetention::All
    }

    /// The half limit applied to a test case, or `None` if its output is kept in full.
    pub(crate) fn half_limit(self, failed: bool) -> Option<usize> {
        match (self, failed) {
            (StdioRetention::All, _) | (StdioRetention::Failed, true) => None,
            (StdioRetention::Failed, false) | (StdioRetention::None, false) => {
                Some(PASSING_HALF_LIMIT)
            }
            (StdioRetention::None, true) => Some(FAILING_HALF_LIMIT),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            StdioRetention::None => "none",
            StdioRetention::Failed => "failed",
            StdioRetention::All => "all",
        }
    }
}

impl fmt::Display for StdioRetention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StdioRetention {
    type Err = StdioRetentionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "none" => Ok(StdioRetention::None),
            "failed" => Ok(StdioRetention::Failed),
            "all" => Ok(StdioRetention::All),
            _ => Err(StdioRetentionParseError::new(input)),
        }
    }
}

/// Truncates `output` to its first and last `half_limit` characters, or returns `None` if it is
/// short enough already.
pub(crate) fn truncate_output(output: &str, half_limit: usize) -> Option<String> {
    let len = output.chars().count();
    if len <= half_limit * 2 {
        return None;
    }
    let head: String = output.chars().take(half_limit).collect();
    let tail: String = output.chars().skip(len - half_limit).collect();
    let elided = len - half_limit * 2;
    Some(format!("{head}\n...[truncated {elided} chars]...\n{tail}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("none", StdioRetention::None ; "none")]
    #[test_case("FAILED", StdioRetention::Failed ; "failed uppercase")]
    #[test_case("all", StdioRetention::All ; "all")]
    fn parse_valid(input: &str, expected: StdioRetention) {
        assert_eq!(input.parse::<StdioRetention>().unwrap(), expected);
    }

    #[test]
    fn parse_invalid() {
        let err = "some".parse::<StdioRetention>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unrecognized value for stdio-retention: some\n(known values: none, failed, all)"
        );
    }

    #[test_case(StdioRetention::None, false, Some(PASSING_HALF_LIMIT) ; "none passing")]
    #[test_case(StdioRetention::None, true, Some(FAILING_HALF_LIMIT) ; "none failing")]
    #[test_case(StdioRetention::Failed, false, Some(PASSING_HALF_LIMIT) ; "failed passing")]
    #[test_case(StdioRetention::Failed, true, None ; "failed failing")]
    #[test_case(StdioRetention::All, false, None ; "all passing")]
    fn half_limits(retention: StdioRetention, failed: bool, expected: Option<usize>) {
        assert_eq!(retention.half_limit(failed), expected);
    }

    #[test]
    fn truncation() {
        assert_eq!(truncate_output("abcdef", 3), None);
        assert_eq!(
            truncate_output("abcdefgh", 3).as_deref(),
            Some("abc\n...[truncated 2 chars]...\nfgh")
        );
    }

    #[test]
    fn keep_long_stdio() {
        assert_eq!(
            StdioRetention::from_keep_long_stdio(true),
            StdioRetention::All
        );
        assert_eq!(
            StdioRetention::from_keep_long_stdio(false),
            StdioRetention::None
        );
        assert!(StdioRetention::All.is_keep_long_stdio());
    }
}
