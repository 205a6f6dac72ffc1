// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;
use junit_report::{Report, TestCase, TestCaseStatus, TestSuite};
use realtime_junit::{
    archiver::JunitArchiver,
    config::RealtimeConfig,
    graph::{FlowGraph, FlowNode, JUNIT_FUNCTION, NodeLabel},
    host::{WorkspaceLocation, WorkspaceResolver, local::LocalWorkspaces},
    lifecycle::BlockLifecycleManager,
    parser::{JunitParser, ReportParser},
};
use std::{sync::Arc, time::Duration};
use swrite::{SWrite, swriteln};

/// The nodes of a pipeline with two sequential stages. Each stage allocates a workspace and
/// archives `*.xml` from it:
///
/// ```text
/// 1 -> 2 (stage1) -> 3 (node, ws1) -> 4 (body) -> 5 (junit) -> 6 -> 7 -> 8
///   -> 9 (stage2) -> 10 (node, ws2) -> 11 (body) -> 12 (junit) -> 13 -> 14 -> 15
/// ```
pub(crate) fn two_stage_nodes(ws1: &Utf8Path, ws2: &Utf8Path) -> Vec<FlowNode> {
    vec![
        FlowNode::block_start("1", "flow-start"),
        FlowNode::block_start("2", "stage")
            .with_parents(["1"])
            .with_enclosing("1")
            .with_label(NodeLabel::Display("stage1".to_owned())),
        FlowNode::block_start("3", "node")
            .with_parents(["2"])
            .with_enclosing("2")
            .with_workspace(WorkspaceLocation::built_in(ws1)),
        FlowNode::block_start("4", "node")
            .with_parents(["3"])
            .with_enclosing("3"),
        FlowNode::atom("5", JUNIT_FUNCTION)
            .with_parents(["4"])
            .with_enclosing("4")
            .with_archiver_arguments("*.xml", false),
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
        FlowNode::block_start("10", "node")
            .with_parents(["9"])
            .with_enclosing("9")
            .with_workspace(WorkspaceLocation::built_in(ws2)),
        FlowNode::block_start("11", "node")
            .with_parents(["10"])
            .with_enclosing("10"),
        FlowNode::atom("12", JUNIT_FUNCTION)
            .with_parents(["11"])
            .with_enclosing("11")
            .with_archiver_arguments("*.xml", false),
        FlowNode::block_end("13", "node", "11")
            .with_parents(["12"])
            .with_enclosing("10"),
        FlowNode::block_end("14", "node", "10")
            .with_parents(["13"])
            .with_enclosing("9"),
        FlowNode::block_end("15", "stage", "9")
            .with_parents(["14"])
            .with_enclosing("1"),
    ]
}

pub(crate) fn two_stage_graph(ws1: &Utf8Path, ws2: &Utf8Path) -> FlowGraph {
    FlowGraph::from_nodes(two_stage_nodes(ws1, ws2)).expect("graph is well-formed")
}

/// A suite of `count` passing tests, each taking a second, recorded at `node` in `graph`.
pub(crate) fn suite_at(graph: &FlowGraph, node: &str, name: &str, count: usize) -> TestSuite {
    let mut suite = TestSuite::new(name);
    suite.add_test_cases((0..count).map(|i| {
        let mut case = TestCase::new(format!("test_{i}"), TestCaseStatus::success());
        case.set_classname(name).set_time(Duration::from_secs(1));
        case
    }));
    suite.set_pipeline(graph.pipeline_details(node));
    suite
}

/// The final result of a run of the two-stage pipeline: two tests in each stage.
pub(crate) fn two_stage_result(graph: &FlowGraph) -> Report {
    let mut report = Report::new();
    report
        .add_test_suite(suite_at(graph, "5", "first", 2))
        .add_test_suite(suite_at(graph, "12", "second", 2));
    report
}

/// A JUnit report with `count` passing tests.
pub(crate) fn report_xml(name: &str, count: usize) -> String {
    let mut xml = format!("<testsuite name=\"{name}\">\n");
    for i in 0..count {
        swriteln!(
            xml,
            "    <testcase classname=\"{name}\" name=\"test_{i}\" time=\"1.0\"/>"
        );
    }
    xml.push_str("</testsuite>\n");
    xml
}

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
