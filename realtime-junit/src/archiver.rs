// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Final, authoritative archiving of test results once a tracked block or build completes.

use crate::{
    config::RealtimeJunitOptions,
    errors::ArchiveError,
    graph::FlowNodeId,
    helpers::plural,
    host::{Build, WorkspaceLocation, WorkspaceResolver},
    parser::{ParseRequest, ReportParser},
};
use camino::Utf8PathBuf;
use junit_report::{PipelineDetails, Report};
use std::{fmt, sync::Arc};
use swrite::{SWrite, swrite};
use tracing::{debug, info};

/// A request to archive the final test results of a block or build.
#[derive(Clone, Debug)]
pub struct ArchiveRequest<'a> {
    /// The build the results belong to.
    pub build: &'a dyn Build,

    /// The flow node of the step being archived, if any.
    pub node: Option<&'a FlowNodeId>,

    /// The workspace to read reports from.
    pub workspace: &'a WorkspaceLocation,

    /// The step configuration.
    pub options: &'a RealtimeJunitOptions,

    /// Stamped onto every parsed suite.
    pub pipeline: Option<&'a PipelineDetails>,

    /// Whether an empty set of reports is acceptable.
    pub allow_empty: bool,
}

/// Counts describing an archived result.
#[derive(Clone, Debug, PartialEq)]
pub struct ArchiveSummary {
    /// The total number of tests.
    pub total: usize,

    /// The number of failed tests.
    pub failed: usize,

    /// The number of skipped tests.
    pub skipped: usize,

    /// The health of the build according to this result, if health reporting is enabled.
    pub health: Option<HealthReport>,
}

impl ArchiveSummary {
    /// Summarizes a report.
    pub fn new(report: &Report, health_scale_factor: f64) -> Self {
        Self {
            total: report.total_count(),
            failed: report.fail_count(),
            skipped: report.skip_count(),
            health: HealthReport::new(report, health_scale_factor),
        }
    }

    /// The number of tests that passed.
    pub fn passed(&self) -> usize {
        self.total - self.failed - self.skipped
    }
}

/// How healthy a build is, judged by its share of failing tests.
#[derive(Clone, Debug, PartialEq)]
pub struct HealthReport {
    /// A score from 0 (all tests failing) to 100 (no failures).
    pub score: u8,

    /// A human-readable description of the score.
    pub description: String,
}

impl HealthReport {
    /// Computes the health of a report.
    ///
    /// Each failing test costs `scale_factor` times its share of the total. Returns `None` if the
    /// scale factor is zero, which disables health reporting.
    pub fn new(report: &Report, scale_factor: f64) -> Option<Self> {
        if scale_factor < 1e-7 {
            return None;
        }

        let total = report.total_count();
        let failed = report.fail_count();
        let score = if total == 0 {
            100
        } else {
            let penalty = scale_factor * 100.0 * failed as f64 / total as f64;
            (100.0 - penalty).clamp(0.0, 100.0) as u8
        };

        let mut description = String::from("Test Result: ");
        if total == 0 {
            description.push_str("no tests");
        } else {
            swrite!(
                description,
                "{failed} {} failing out of a total of {total} {}",
                plural::tests_str(failed),
                plural::tests_str(total),
            );
        }
        description.push('.');

        Some(Self { score, description })
    }
}

/// Performs the final parse of a completed block or build and records it on the build.
pub trait ExternalArchiver: Send + Sync + fmt::Debug {
    /// Parses and records the final result.
    fn archive(&self, request: &ArchiveRequest<'_>) -> Result<ArchiveSummary, ArchiveError>;

    /// Records a provisional result in place of a final one that could not be produced.
    fn record_provisional(
        &self,
        build: &dyn Build,
        node: Option<&FlowNodeId>,
        report: Report,
    ) -> Result<(), ArchiveError>;
}

/// An [`ExternalArchiver`] that parses reports with a [`ReportParser`], records them on the build,
/// and optionally writes them out as JUnit XML.
#[derive(Debug)]
pub struct JunitArchiver {
    parser: Arc<dyn ReportParser>,
    workspaces: Arc<dyn WorkspaceResolver>,
    output_dir: Option<Utf8PathBuf>,
}

impl JunitArchiver {
    /// Creates a new archiver that only records results on the build.
    pub fn new(parser: Arc<dyn ReportParser>, workspaces: Arc<dyn WorkspaceResolver>) -> Self {
        Self {
            parser,
            workspaces,
            output_dir: None,
        }
    }

    /// Also writes archived results to `<dir>/<job>/<build number>/`.
    pub fn with_output_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    fn write_report(
        &self,
        build: &dyn Build,
        node: Option<&FlowNodeId>,
        report: &Report,
    ) -> Result<(), ArchiveError> {
        let Some(output_dir) = &self.output_dir else {
            return Ok(());
        };

        let id = build.id();
        let dir = output_dir.join(&id.job).join(id.number.to_string());
        let file_name = match node {
            Some(node) => format!("junitResult-{node}.xml"),
            None => "junitResult.xml".to_owned(),
        };
        let path = dir.join(file_name);

        std::fs::create_dir_all(&dir).map_err(|err| ArchiveError::Io {
            path: dir.clone(),
            err,
        })?;
        let xml = report.to_string().map_err(|err| ArchiveError::Serialize {
            path: path.clone(),
            err,
        })?;
        std::fs::write(&path, xml).map_err(|err| ArchiveError::Io {
            path: path.clone(),
            err,
        })?;
        debug!("wrote test result for {id} to {path}");
        Ok(())
    }
}

impl ExternalArchiver for JunitArchiver {
    fn archive(&self, request: &ArchiveRequest<'_>) -> Result<ArchiveSummary, ArchiveError> {
        let Some(root) = self.workspaces.resolve(request.workspace) else {
            return Err(ArchiveError::WorkspaceUnavailable {
                node: request.workspace.node.clone(),
            });
        };

        let report = self.parser.parse(&ParseRequest {
            glob: request.options.test_results(),
            root: &root,
            pipeline: request.pipeline,
            stdio_retention: request.options.stdio_retention(),
            allow_empty: request.allow_empty,
            skip_malformed: false,
        })?;

        let summary = ArchiveSummary::new(&report, request.options.health_scale_factor());
        self.write_report(request.build, request.node, &report)?;
        info!(
            "{}: recorded {} test {} ({} failed, {} skipped)",
            request.build.id(),
            summary.total,
            plural::results_str(summary.total),
            summary.failed,
            summary.skipped,
        );
        request.build.record_test_result(report);
        Ok(summary)
    }

    fn record_provisional(
        &self,
        build: &dyn Build,
        node: Option<&FlowNodeId>,
        report: Report,
    ) -> Result<(), ArchiveError> {
        self.write_report(build, node, &report)?;
        build.record_test_result(report);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::JobConfig,
        host::local::{LocalJob, LocalWorkspaces},
        parser::JunitParser,
        test_helpers::report_with_cases,
    };
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use junit_report::{NonSuccessKind, TestCase, TestCaseStatus, TestSuite};
    use test_case::test_case;

    fn report_with_failures(total: usize, failed: usize) -> Report {
        let mut report = Report::new();
        let mut suite = TestSuite::new("suite");
        suite.add_test_cases((0..total).map(|i| {
            let status = if i < failed {
                TestCaseStatus::non_success(NonSuccessKind::Failure)
            } else {
                TestCaseStatus::success()
            };
            TestCase::new(format!("test_{i}"), status)
        }));
        report.add_test_suite(suite);
        report
    }

    #[test_case(10, 0, 1.0, 100 ; "all passing")]
    #[test_case(10, 2, 1.0, 80 ; "some failing")]
    #[test_case(10, 2, 2.5, 50 ; "scaled")]
    #[test_case(10, 8, 2.0, 0 ; "clamped")]
    fn health_score(total: usize, failed: usize, scale_factor: f64, expected: u8) {
        let health = HealthReport::new(&report_with_failures(total, failed), scale_factor).unwrap();
        assert_eq!(health.score, expected);
    }

    #[test]
    fn health_description() {
        let health = HealthReport::new(&report_with_failures(5, 1), 1.0).unwrap();
        assert_eq!(
            health.description,
            "Test Result: 1 test failing out of a total of 5 tests."
        );

        let health = HealthReport::new(&report_with_cases(0), 1.0).unwrap();
        assert_eq!(health.score, 100);
        assert_eq!(health.description, "Test Result: no tests.");

        assert!(HealthReport::new(&report_with_failures(5, 1), 0.0).is_none());
    }

    #[test]
    fn archives_and_writes_output() {
        let workspace = Utf8TempDir::new().unwrap();
        std::fs::write(
            workspace.path().join("TEST-a.xml"),
            indoc! {r#"
                <testsuite name="a">
                    <testcase name="one"/>
                    <testcase name="two"><failure message="boom"/></testcase>
                </testsuite>
            "#},
        )
        .unwrap();
        let output = Utf8TempDir::new().unwrap();

        let job = LocalJob::new("service", JobConfig::default());
        let build = job.start_build();
        let archiver = JunitArchiver::new(
            Arc::new(JunitParser::new()),
            Arc::new(LocalWorkspaces::new()),
        )
        .with_output_dir(output.path());

        let workspace_location = WorkspaceLocation::built_in(workspace.path());
        let options = RealtimeJunitOptions::new("*.xml");
        let node = FlowNodeId::new("7");
        let summary = archiver
            .archive(&ArchiveRequest {
                build: build.as_ref(),
                node: Some(&node),
                workspace: &workspace_location,
                options: &options,
                pipeline: None,
                allow_empty: false,
            })
            .unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.passed(), 1);
        assert_eq!(summary.health.unwrap().score, 50);
        assert_eq!(build.test_result().unwrap().total_count(), 2);
        assert!(output.path().join("service/1/junitResult-7.xml").is_file());
    }

    #[test]
    fn offline_workspace() {
        let job = LocalJob::new("service", JobConfig::default());
        let build = job.start_build();
        let archiver = JunitArchiver::new(
            Arc::new(JunitParser::new()),
            Arc::new(LocalWorkspaces::new()),
        );
        let err = archiver
            .archive(&ArchiveRequest {
                build: build.as_ref(),
                node: None,
                workspace: &WorkspaceLocation::on_node("agent-1", "/ws"),
                options: &RealtimeJunitOptions::new("*.xml"),
                pipeline: None,
                allow_empty: false,
            })
            .unwrap_err();
        assert!(
            matches!(err, ArchiveError::WorkspaceUnavailable { node } if node == "agent-1"),
        );
        assert!(build.test_result().is_none());
    }
}
