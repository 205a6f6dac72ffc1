// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing JUnit report files out of a workspace.

use crate::errors::ParseReportError;
use camino::{Utf8Path, Utf8PathBuf};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use junit_report::{PipelineDetails, ReadOptions, Report, StdioRetention};
use std::fmt;
use tracing::debug;
use walkdir::WalkDir;

/// A request to parse all report files in a workspace matching a glob.
#[derive(Clone, Debug)]
pub struct ParseRequest<'a> {
    /// Comma or space separated globs, relative to `root`.
    pub glob: &'a str,

    /// The workspace root.
    pub root: &'a Utf8Path,

    /// Stamped onto every parsed suite, for results recorded inside a pipeline block.
    pub pipeline: Option<&'a PipelineDetails>,

    /// How much test output to keep.
    pub stdio_retention: StdioRetention,

    /// Whether an empty set of reports is an acceptable result.
    pub allow_empty: bool,

    /// Whether files that fail to parse are skipped rather than failing the whole parse.
    ///
    /// Reports are often caught halfway through being written while a build runs.
    pub skip_malformed: bool,
}

/// Parses JUnit reports out of a workspace.
pub trait ReportParser: Send + Sync + fmt::Debug {
    /// Parses all matching report files into a single, merged report.
    fn parse(&self, request: &ParseRequest<'_>) -> Result<Report, ParseReportError>;
}

/// A [`ReportParser`] that walks the local filesystem.
#[derive(Clone, Debug, Default)]
pub struct JunitParser;

impl JunitParser {
    /// Creates a new parser.
    pub fn new() -> Self {
        Self
    }

    fn matching_files(
        &self,
        glob: &str,
        root: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, ParseReportError> {
        let globs = build_glob_set(glob)?;

        let mut files = vec![];
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|err| ParseReportError::Walk {
                root: root.to_owned(),
                err,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            // Paths that aren't valid UTF-8 can't have been produced by a UTF-8 glob.
            let Some(path) = Utf8Path::from_path(entry.path()) else {
                continue;
            };
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            if globs.is_match(relative.as_std_path()) {
                files.push(path.to_owned());
            }
        }
        files.sort();
        Ok(files)
    }
}

impl ReportParser for JunitParser {
    fn parse(&self, request: &ParseRequest<'_>) -> Result<Report, ParseReportError> {
        let root = request.root;
        if !root.is_dir() {
            return Err(ParseReportError::WorkspaceMissing {
                root: root.to_owned(),
            });
        }

        let files = self.matching_files(request.glob, root)?;
        if files.is_empty() && !request.allow_empty {
            return Err(ParseReportError::NoReports {
                glob: request.glob.to_owned(),
                root: root.to_owned(),
            });
        }

        let options = ReadOptions::new(request.stdio_retention);
        let mut merged = Report::new();
        for path in files {
            let xml = std::fs::read_to_string(&path).map_err(|err| ParseReportError::Read {
                path: path.clone(),
                err,
            })?;
            let mut report = match Report::from_xml(&xml, &options) {
                Ok(report) => report,
                Err(err) if request.skip_malformed => {
                    debug!("skipping unparseable test report {path}: {err}");
                    continue;
                }
                Err(err) => return Err(ParseReportError::Xml { path, err }),
            };
            if let Some(pipeline) = request.pipeline {
                for suite in &mut report.test_suites {
                    suite.set_pipeline(pipeline.clone());
                }
            }
            merged.merge(report);
        }

        Ok(merged)
    }
}

/// Splits a comma or space separated list of globs and compiles it.
fn build_glob_set(glob: &str) -> Result<GlobSet, ParseReportError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in glob.split([',', ' ']).filter(|p| !p.is_empty()) {
        let compiled = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|err| ParseReportError::InvalidGlob {
                glob: glob.to_owned(),
                err,
            })?;
        builder.add(compiled);
    }
    builder.build().map_err(|err| ParseReportError::InvalidGlob {
        glob: glob.to_owned(),
        err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;

    const PASSING: &str = indoc! {r#"
        <testsuite name="a.PassingTest" time="1.5">
            <testcase name="one" classname="a.PassingTest" time="0.5"/>
            <testcase name="two" classname="a.PassingTest" time="1.0"/>
        </testsuite>
    "#};

    const FAILING: &str = indoc! {r#"
        <testsuite name="b.FailingTest">
            <testcase name="three" classname="b.FailingTest" time="2">
                <failure message="expected 1"/>
            </testcase>
        </testsuite>
    "#};

    fn workspace(files: &[(&str, &str)]) -> Utf8TempDir {
        let dir = Utf8TempDir::new().unwrap();
        for (path, contents) in files {
            let path = dir.path().join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }
        dir
    }

    fn request<'a>(glob: &'a str, root: &'a Utf8Path) -> ParseRequest<'a> {
        ParseRequest {
            glob,
            root,
            pipeline: None,
            stdio_retention: StdioRetention::None,
            allow_empty: false,
            skip_malformed: false,
        }
    }

    #[test]
    fn merges_matching_files() {
        let dir = workspace(&[
            ("target/reports/TEST-a.xml", PASSING),
            ("target/reports/nested/TEST-b.xml", FAILING),
            ("target/other.xml", FAILING),
        ]);

        let report = JunitParser::new()
            .parse(&request("target/reports/**/*.xml", dir.path()))
            .unwrap();
        assert_eq!(report.total_count(), 3);
        assert_eq!(report.fail_count(), 1);

        // Single-level globs don't descend into directories.
        let report = JunitParser::new()
            .parse(&request("target/reports/*.xml, target/other.xml", dir.path()))
            .unwrap();
        assert_eq!(report.total_count(), 3);
        let names: Vec<_> = report.test_suites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["b.FailingTest", "a.PassingTest"]);
    }

    #[test]
    fn space_separated_globs() {
        let dir = workspace(&[
            ("target/reports/TEST-a.xml", PASSING),
            ("target/other.xml", FAILING),
        ]);

        let report = JunitParser::new()
            .parse(&request("target/reports/*.xml target/other.xml", dir.path()))
            .unwrap();
        assert_eq!(report.total_count(), 3);
    }

    #[test]
    fn stamps_pipeline_details() {
        let dir = workspace(&[("TEST-a.xml", PASSING)]);
        let mut details = PipelineDetails::new("7");
        details.enclosing_blocks.push("3".to_owned());
        details.enclosing_block_names.push("build".to_owned());

        let mut req = request("*.xml", dir.path());
        req.pipeline = Some(&details);
        let report = JunitParser::new().parse(&req).unwrap();
        assert_eq!(report.test_suites[0].pipeline.as_ref(), Some(&details));
        assert_eq!(report.result_for_pipeline_block("3").total_count(), 2);
    }

    #[test]
    fn benign_absence() {
        let dir = workspace(&[("TEST-a.xml", PASSING)]);

        let missing = dir.path().join("does-not-exist");
        let err = JunitParser::new()
            .parse(&request("*.xml", &missing))
            .unwrap_err();
        assert!(matches!(err, ParseReportError::WorkspaceMissing { .. }));
        assert!(err.is_benign());

        let err = JunitParser::new()
            .parse(&request("reports/*.xml", dir.path()))
            .unwrap_err();
        assert!(matches!(err, ParseReportError::NoReports { .. }));
        assert!(err.is_benign());

        let mut req = request("reports/*.xml", dir.path());
        req.allow_empty = true;
        let report = JunitParser::new().parse(&req).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn malformed_reports() {
        let dir = workspace(&[
            ("TEST-a.xml", PASSING),
            ("TEST-b.xml", "<testsuite name=\"partial\"><testcase name=\"x\">"),
        ]);

        let err = JunitParser::new()
            .parse(&request("*.xml", dir.path()))
            .unwrap_err();
        assert!(matches!(err, ParseReportError::Xml { .. }), "{err:?}");
        assert!(!err.is_benign());

        let mut req = request("*.xml", dir.path());
        req.skip_malformed = true;
        let report = JunitParser::new().parse(&req).unwrap();
        assert_eq!(report.total_count(), 2);
    }

    #[test]
    fn invalid_glob() {
        let dir = workspace(&[]);
        let err = JunitParser::new()
            .parse(&request("reports/[*.xml", dir.path()))
            .unwrap_err();
        assert!(matches!(err, ParseReportError::InvalidGlob { .. }), "{err:?}");
    }
}
