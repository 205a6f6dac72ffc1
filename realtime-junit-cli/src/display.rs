// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable rendering of realtime test results.

use crate::output::ReportStyles;
use junit_report::Report;
use owo_colors::OwoColorize;
use realtime_junit::{
    archiver::HealthReport,
    helpers::plural,
    progress::ProgressSnapshot,
};
use std::io::{self, Write};

/// Writes a one-line summary of the counts in a report.
pub(crate) fn write_counts(
    out: &mut dyn Write,
    report: &Report,
    styles: &ReportStyles,
) -> io::Result<()> {
    let total = report.total_count();
    write!(
        out,
        "{} {}: {} passed, {} failed, {} skipped",
        total.style(styles.count),
        plural::tests_str(total),
        report.pass_count().style(styles.pass),
        report.fail_count().style(styles.fail),
        report.skip_count().style(styles.skip),
    )
}

/// Writes a progress estimate on a single line.
pub(crate) fn write_progress(
    out: &mut dyn Write,
    progress: &ProgressSnapshot,
    styles: &ReportStyles,
) -> io::Result<()> {
    let percentage_style = if progress.has_failures() {
        styles.fail
    } else {
        styles.count
    };
    write!(
        out,
        "{}% of tests, {}% of time, about {} left",
        progress
            .completed_tests_percentage()
            .style(percentage_style),
        progress.completed_time_percentage(),
        progress.estimated_remaining_time(),
    )
}

/// Writes a full report: counts, failed tests and progress.
pub(crate) fn write_report(
    out: &mut dyn Write,
    report: &Report,
    progress: Option<&ProgressSnapshot>,
    styles: &ReportStyles,
) -> io::Result<()> {
    write_counts(out, report, styles)?;
    writeln!(out)?;

    for (_, case) in report.failed_tests() {
        writeln!(out, "    {} {}", "FAIL".style(styles.fail), case.full_name())?;
    }

    match progress {
        Some(progress) => {
            write!(out, "progress: ")?;
            write_progress(out, progress, styles)?;
            writeln!(out)
        }
        None => writeln!(out, "progress: no baseline to compare against"),
    }
}

/// Writes a status line for `watch`.
pub(crate) fn write_status_line(
    out: &mut dyn Write,
    poll: usize,
    report: &Report,
    progress: Option<&ProgressSnapshot>,
    styles: &ReportStyles,
) -> io::Result<()> {
    write!(out, "[poll {poll:>3}] ")?;
    write_counts(out, report, styles)?;
    if let Some(progress) = progress {
        write!(out, " (")?;
        write_progress(out, progress, styles)?;
        write!(out, ")")?;
    }
    writeln!(out)
}

/// Writes the health of an archived result.
pub(crate) fn write_health(
    out: &mut dyn Write,
    health: &HealthReport,
    styles: &ReportStyles,
) -> io::Result<()> {
    let score_style = if health.score < 100 {
        styles.fail
    } else {
        styles.pass
    };
    writeln!(
        out,
        "health: {} ({})",
        health.score.style(score_style),
        health.description
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use junit_report::{NonSuccessKind, TestCase, TestCaseStatus, TestSuite};
    use pretty_assertions::assert_eq;
    use realtime_junit::progress::Baseline;
    use std::time::Duration;

    fn report() -> Report {
        let mut suite = TestSuite::new("suite");
        let mut failed = TestCase::new(
            "two",
            TestCaseStatus::non_success(NonSuccessKind::Failure),
        );
        failed.set_classname("a.Suite");
        suite.add_test_cases([TestCase::new("one", TestCaseStatus::success()), failed]);
        let mut report = Report::new();
        report.add_test_suite(suite);
        report
    }

    #[test]
    fn report_without_colors() {
        let styles = ReportStyles::default();
        let progress = ProgressSnapshot::new(
            Baseline::new(4, Duration::from_secs(10)),
            2,
            Duration::from_secs(4),
            true,
        );

        let mut out = vec![];
        write_report(&mut out, &report(), Some(&progress), &styles).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "2 tests: 1 passed, 1 failed, 0 skipped\n    \
             FAIL a.Suite.two\n\
             progress: 50% of tests, 40% of time, about 6 sec left\n"
        );

        let mut out = vec![];
        write_status_line(&mut out, 3, &report(), None, &styles).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[poll   3] 2 tests: 1 passed, 1 failed, 0 skipped\n"
        );
    }
}
