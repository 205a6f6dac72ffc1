// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures for unit tests.

use crate::{
    archiver::JunitArchiver,
    config::RealtimeConfig,
    graph::{
        FlowGraph, FlowNode, GENERIC_STEP_FUNCTION, JUNIT_ARCHIVER_DELEGATE, JUNIT_FUNCTION,
        NodeLabel,
    },
    handle::HandleConfig,
    host::{
        Build, BuildOutcome, WorkspaceLocation, WorkspaceResolver,
        local::{LocalBuild, LocalJob, LocalWorkspaces},
    },
    lifecycle::BlockLifecycleManager,
    parser::{JunitParser, ReportParser},
};
use junit_report::{Report, StdioRetention, TestCase, TestCaseStatus, TestSuite};
use std::sync::Arc;

/// A pipeline with two stages, each allocating a workspace and archiving results:
///
/// ```text
/// 2 (stage1) -> 3 (node, ws) -> 4 (body) -> 5 (junit) -> 6 (end body) -> 7 (end node)
///   -> 8 (end stage1) -> 9 (stage2) -> 10 (parallel branch b) -> 11 (junit) -> 12 -> 13
/// ```
pub(crate) fn two_stage_graph() -> FlowGraph {
    FlowGraph::from_nodes([
        FlowNode::block_start("1", "flow-start"),
        FlowNode::block_start("2", "stage")
            .with_parents(["1"])
            .with_enclosing("1")
            .with_label(NodeLabel::Display("stage1".to_owned())),
        FlowNode::block_start("3", "node")
            .with_parents(["2"])
            .with_enclosing("2")
            .with_workspace(WorkspaceLocation::on_node("agent-1", "/ws/one")),
        FlowNode::block_start("4", "node")
            .with_parents(["3"])
            .with_enclosing("3"),
        FlowNode::atom("5", JUNIT_FUNCTION)
            .with_parents(["4"])
            .with_enclosing("4")
            .with_archiver_arguments("target/*.xml", false),
        FlowNode::block_end("6", "node", "4")
            .with_parents(["5"])
            .with_enclosing("3"),
        FlowNode::block_end("7", "node", "3")
            .with_parents(["6"])
            .with_enclosing("2"),
        FlowNode::block_end("8", "stage", "2")
            .with_parents(["7"])
            .with_enclosing("1"),
        FlowNode::block_start("9", "stage")
            .with_parents(["8"])
            .with_enclosing("1")
            .with_label(NodeLabel::Display("stage2".to_owned())),
        FlowNode::block_start("10", "parallel")
            .with_parents(["9"])
            .with_enclosing("9")
            .with_label(NodeLabel::ThreadName("branch-b".to_owned())),
        FlowNode::atom("11", GENERIC_STEP_FUNCTION)
            .with_parents(["10"])
            .with_enclosing("10")
            .with_delegate(JUNIT_ARCHIVER_DELEGATE)
            .with_archiver_arguments("reports/**/*.xml", true),
        FlowNode::block_end("12", "parallel", "10")
            .with_parents(["11"])
            .with_enclosing("9"),
        FlowNode::block_end("13", "stage", "9")
            .with_parents(["12"])
            .with_enclosing("1"),
    ])
    .expect("graph is well-formed")
}


/// A report with a single suite of `count` passing tests.
pub(crate) fn report_with_cases(count: usize) -> Report {
    let mut report = Report::new();
    if count > 0 {
        let mut suite = TestSuite::new("suite");
        suite.add_test_cases(
            (0..count).map(|i| TestCase::new(format!("test_{i}"), TestCaseStatus::success())),
        );
        report.add_test_suite(suite);
    }
    report
}

/// Starts a build of `job` and finishes it with the given outcome and test result.
pub(crate) fn finished_build(
    job: &Arc<LocalJob>,
    outcome: BuildOutcome,
    report: Option<Report>,
) -> Arc<LocalBuild> {
    let build = job.start_build();
    if let Some(report) = report {
        build.record_test_result(report);
    }
    build.finish(outcome);
    build
}

/// A handle config reading `target/*.xml` from a built-in workspace.
pub(crate) fn handle_config(build: &dyn Build, block: Option<&str>) -> HandleConfig {
    HandleConfig {
        build: build.id().clone(),
        block: block.map(Into::into),
        glob: "target/*.xml".to_owned(),
        workspace: WorkspaceLocation::built_in("/ws"),
        stdio_retention: StdioRetention::default(),
        parse_interval: None,
    }
}

/// A lifecycle manager with the default config, parsing local files.
pub(crate) fn manager() -> BlockLifecycleManager {
    let parser: Arc<dyn ReportParser> = Arc::new(JunitParser::new());
    let workspaces: Arc<dyn WorkspaceResolver> = Arc::new(LocalWorkspaces::new());
    let archiver = Arc::new(JunitArchiver::new(parser.clone(), workspaces.clone()));
    BlockLifecycleManager::new(
        &RealtimeConfig::default_config(),
        parser,
        workspaces,
        archiver,
    )
}
