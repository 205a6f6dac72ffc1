// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Progress estimates for running test suites.
//!
//! Progress compares the current, partial result against a baseline taken from an earlier build.
//! Every percentage is clamped to `0..=100`, and each pair of complementary percentages sums to
//! exactly 100.

use junit_report::Report;
use std::{fmt, time::Duration};

/// The test count and duration of an earlier, comparable result.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Baseline {
    /// The number of tests in the earlier result.
    pub expected_tests: usize,

    /// The total duration of the earlier result.
    pub expected_time: Duration,
}

impl Baseline {
    /// Creates a baseline from the given counts.
    pub fn new(expected_tests: usize, expected_time: Duration) -> Self {
        Self {
            expected_tests,
            expected_time,
        }
    }

    /// Creates a baseline from an earlier report.
    pub fn from_report(report: &Report) -> Self {
        Self::new(report.total_count(), report.duration())
    }
}

/// A point-in-time progress estimate.
///
/// All derived values are computed once, when the snapshot is created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProgressSnapshot {
    baseline: Baseline,
    completed_tests: usize,
    completed_time: Duration,
    has_failures: bool,
    completed_tests_percentage: u8,
    completed_time_percentage: u8,
    remaining_time: RemainingTime,
}

impl ProgressSnapshot {
    /// Estimates progress from a baseline and the counts observed so far.
    pub fn new(
        baseline: Baseline,
        completed_tests: usize,
        completed_time: Duration,
        has_failures: bool,
    ) -> Self {
        let completed_tests_percentage =
            percentage(completed_tests as u128, baseline.expected_tests as u128);
        let completed_time_percentage = percentage(
            completed_time.as_nanos(),
            baseline.expected_time.as_nanos(),
        );
        let remaining_time = RemainingTime(baseline.expected_time.saturating_sub(completed_time));

        Self {
            baseline,
            completed_tests,
            completed_time,
            has_failures,
            completed_tests_percentage,
            completed_time_percentage,
            remaining_time,
        }
    }

    /// Estimates progress of `current` against the baseline.
    pub fn from_report(baseline: Baseline, current: &Report) -> Self {
        Self::new(
            baseline,
            current.total_count(),
            current.duration(),
            current.fail_count() > 0,
        )
    }

    /// The baseline this snapshot was computed against.
    pub fn baseline(&self) -> Baseline {
        self.baseline
    }

    /// The number of tests completed so far.
    pub fn completed_tests(&self) -> usize {
        self.completed_tests
    }

    /// The time taken by the tests completed so far.
    pub fn completed_time(&self) -> Duration {
        self.completed_time
    }

    /// Percentage of the expected tests that have completed.
    pub fn completed_tests_percentage(&self) -> u8 {
        self.completed_tests_percentage
    }

    /// Percentage of the expected tests that are yet to run.
    pub fn tests_left_percentage(&self) -> u8 {
        100 - self.completed_tests_percentage
    }

    /// Percentage of the expected time that has elapsed.
    pub fn completed_time_percentage(&self) -> u8 {
        self.completed_time_percentage
    }

    /// Percentage of the expected time that is left.
    pub fn time_left_percentage(&self) -> u8 {
        100 - self.completed_time_percentage
    }

    /// The expected time left, based on the baseline duration.
    pub fn estimated_remaining_time(&self) -> RemainingTime {
        self.remaining_time
    }

    /// Returns true if any test has failed so far.
    pub fn has_failures(&self) -> bool {
        self.has_failures
    }

    /// The display style of the progress bar: `"red"` once a test has failed.
    pub fn style(&self) -> Option<&'static str> {
        self.has_failures.then_some("red")
    }
}

/// Computes `floor(completed / expected * 100)`, clamped to 100.
///
/// An empty baseline counts as complete.
fn percentage(completed: u128, expected: u128) -> u8 {
    if expected == 0 {
        return 100;
    }
    let percent = completed.saturating_mul(100) / expected;
    percent.min(100) as u8
}

/// An estimate of the time left, formatted as `"X min Y sec"` or `"Y sec"`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RemainingTime(Duration);

impl RemainingTime {
    /// The remaining time as a duration.
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl fmt::Display for RemainingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        let (minutes, seconds) = (secs / 60, secs % 60);
        if minutes > 0 {
            write!(f, "{minutes} min {seconds} sec")
        } else {
            write!(f, "{seconds} sec")
        }
    }
}
