// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::helpers::deserialize_opt_stdio_retention;
use junit_report::StdioRetention;
use serde::Deserialize;
use std::time::Duration;

/// Options for archiving JUnit results with live reporting while a block runs.
///
/// These are the options of the realtime JUnit step, and also of a job's JUnit publisher
/// (the `[jobs.<name>.junit]` table).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RealtimeJunitOptions {
    test_results: String,
    #[serde(default, deserialize_with = "deserialize_opt_stdio_retention")]
    stdio_retention: Option<StdioRetention>,
    #[serde(default)]
    keep_long_stdio: Option<bool>,
    #[serde(default = "default_health_scale_factor")]
    health_scale_factor: f64,
    #[serde(default)]
    allow_empty_results: bool,
    #[serde(default)]
    skip_marking_build_unstable: bool,
    #[serde(default, with = "humantime_serde")]
    parse_interval: Option<Duration>,
}

fn default_health_scale_factor() -> f64 {
    1.0
}

impl RealtimeJunitOptions {
    /// Creates options for the given report glob, with everything else at its default.
    pub fn new(test_results: impl Into<String>) -> Self {
        Self {
            test_results: test_results.into(),
            stdio_retention: None,
            keep_long_stdio: None,
            health_scale_factor: default_health_scale_factor(),
            allow_empty_results: false,
            skip_marking_build_unstable: false,
            parse_interval: None,
        }
    }

    /// The report glob, relative to the workspace.
    pub fn test_results(&self) -> &str {
        &self.test_results
    }

    /// Replaces the report glob.
    pub fn set_test_results(&mut self, test_results: impl Into<String>) -> &mut Self {
        self.test_results = test_results.into();
        self
    }

    /// How much test output to keep.
    ///
    /// An explicit retention wins over the deprecated `keep-long-stdio` flag.
    pub fn stdio_retention(&self) -> StdioRetention {
        match (self.stdio_retention, self.keep_long_stdio) {
            (Some(retention), _) => retention,
            (None, Some(keep)) => StdioRetention::from_keep_long_stdio(keep),
            (None, None) => StdioRetention::default(),
        }
    }

    /// Sets how much test output to keep.
    pub fn set_stdio_retention(&mut self, retention: StdioRetention) -> &mut Self {
        self.stdio_retention = Some(retention);
        self
    }

    /// Sets the deprecated "keep long stdio" flag.
    pub fn set_keep_long_stdio(&mut self, keep_long_stdio: bool) -> &mut Self {
        self.keep_long_stdio = Some(keep_long_stdio);
        self
    }

    /// The factor failures are scaled by when computing build health.
    pub fn health_scale_factor(&self) -> f64 {
        self.health_scale_factor.max(0.0)
    }

    /// Sets the health scale factor. Negative values are treated as zero.
    pub fn set_health_scale_factor(&mut self, factor: f64) -> &mut Self {
        self.health_scale_factor = factor.max(0.0);
        self
    }

    /// Whether a missing or empty set of reports is accepted.
    pub fn allow_empty_results(&self) -> bool {
        self.allow_empty_results
    }

    /// Sets whether a missing or empty set of reports is accepted.
    pub fn set_allow_empty_results(&mut self, allow: bool) -> &mut Self {
        self.allow_empty_results = allow;
        self
    }

    /// Whether test failures leave the build outcome alone.
    pub fn skip_marking_build_unstable(&self) -> bool {
        self.skip_marking_build_unstable
    }

    /// Sets whether test failures leave the build outcome alone.
    pub fn set_skip_marking_build_unstable(&mut self, skip: bool) -> &mut Self {
        self.skip_marking_build_unstable = skip;
        self
    }

    /// The refresh interval override, if any. A zero interval is treated as unset.
    pub fn parse_interval(&self) -> Option<Duration> {
        self.parse_interval.filter(|interval| !interval.is_zero())
    }

    /// Sets the refresh interval override. `None` or a zero interval unset it.
    pub fn set_parse_interval(&mut self, interval: Option<Duration>) -> &mut Self {
        self.parse_interval = interval.filter(|interval| !interval.is_zero());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(None, None, StdioRetention::None ; "default")]
    #[test_case(None, Some(true), StdioRetention::All ; "keep long stdio")]
    #[test_case(None, Some(false), StdioRetention::None ; "no long stdio")]
    #[test_case(Some(StdioRetention::Failed), Some(true), StdioRetention::Failed ; "explicit wins")]
    fn stdio_retention(
        retention: Option<StdioRetention>,
        keep_long_stdio: Option<bool>,
        expected: StdioRetention,
    ) {
        let mut options = RealtimeJunitOptions::new("*.xml");
        if let Some(retention) = retention {
            options.set_stdio_retention(retention);
        }
        if let Some(keep) = keep_long_stdio {
            options.set_keep_long_stdio(keep);
        }
        assert_eq!(options.stdio_retention(), expected);
    }

    #[test]
    fn clamping() {
        let mut options = RealtimeJunitOptions::new("*.xml");
        assert_eq!(options.health_scale_factor(), 1.0);
        options.set_health_scale_factor(-3.0);
        assert_eq!(options.health_scale_factor(), 0.0);

        options.set_parse_interval(Some(Duration::ZERO));
        assert_eq!(options.parse_interval(), None);
        options.set_parse_interval(Some(Duration::from_secs(30)));
        assert_eq!(options.parse_interval(), Some(Duration::from_secs(30)));
    }
}
