// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{manager, report_xml, two_stage_graph, two_stage_nodes, two_stage_result};
use camino_tempfile::Utf8TempDir;
use pretty_assertions::assert_eq;
use realtime_junit::{
    config::{JobConfig, RealtimeJunitOptions},
    handle::URL_NAME,
    host::{Build, BuildOutcome, WorkspaceLocation, local::LocalJob},
    lifecycle::StepContext,
    progress::Baseline,
};
use std::{sync::Arc, time::Duration};

fn options() -> RealtimeJunitOptions {
    RealtimeJunitOptions::new("*.xml")
}

#[test]
fn step_compares_against_its_own_stage() {
    let ws1 = Utf8TempDir::new().unwrap();
    let ws2 = Utf8TempDir::new().unwrap();
    let graph = two_stage_graph(ws1.path(), ws2.path());

    let job = LocalJob::new("pipeline", JobConfig::realtime(options()));
    let previous = job.start_build();
    previous.set_flow_graph(graph.clone());
    previous.record_test_result(two_stage_result(&graph));
    previous.finish(BuildOutcome::Success);
    assert_eq!(previous.test_result().unwrap().total_count(), 4);

    let current = job.start_build();
    current.set_flow_graph(graph);
    std::fs::write(ws2.path().join("TEST-second.xml"), report_xml("second", 1)).unwrap();

    let manager = manager();
    let ctx = StepContext::new(
        current.clone(),
        "12",
        Some(WorkspaceLocation::built_in(ws2.path())),
    );
    let handle = manager.start_step(&ctx, &options()).unwrap();

    assert_eq!(handle.total_count(), 1);
    let progress = handle.progress().expect("stage2 ran in the previous build");
    assert_eq!(
        progress.baseline(),
        Baseline::new(2, Duration::from_secs(2)),
        "only stage2 of the previous build is compared against"
    );
    assert_eq!(progress.completed_tests_percentage(), 50);
    assert_eq!(progress.estimated_remaining_time().to_string(), "1 sec");

    let summary = manager.finish_step(&ctx, &options(), true).unwrap();
    assert_eq!(summary.total, 1);
    let recorded = current.test_result().unwrap();
    assert_eq!(recorded.result_for_pipeline_block("9").total_count(), 1);
    assert_eq!(recorded.result_for_pipeline_block("2").total_count(), 0);
}

#[test]
fn stage_missing_from_previous_build_has_no_baseline() {
    let ws1 = Utf8TempDir::new().unwrap();
    let ws2 = Utf8TempDir::new().unwrap();
    let graph = two_stage_graph(ws1.path(), ws2.path());

    let job = LocalJob::new("pipeline", JobConfig::realtime(options()));
    let previous = job.start_build();
    // The previous build only ran the first stage.
    for node in two_stage_nodes(ws1.path(), ws2.path()).into_iter().take(8) {
        previous.add_flow_node(node).unwrap();
    }
    previous.record_test_result(two_stage_result(&graph).result_for_pipeline_block("2"));
    previous.finish(BuildOutcome::Success);

    let current = job.start_build();
    current.set_flow_graph(graph);
    std::fs::write(ws2.path().join("TEST-second.xml"), report_xml("second", 1)).unwrap();

    let manager = manager();
    let ctx = StepContext::new(
        current.clone(),
        "12",
        Some(WorkspaceLocation::built_in(ws2.path())),
    );
    let handle = manager.start_step(&ctx, &options()).unwrap();
    assert_eq!(handle.total_count(), 1);
    assert_eq!(handle.progress(), None);
}

#[test]
fn workspace_blocks_compare_against_their_stage() {
    let ws1 = Utf8TempDir::new().unwrap();
    let ws2 = Utf8TempDir::new().unwrap();
    let graph = two_stage_graph(ws1.path(), ws2.path());

    let job = LocalJob::new("pipeline", JobConfig::realtime(options()));
    let previous = job.start_build();
    previous.set_flow_graph(graph.clone());
    previous.record_test_result(two_stage_result(&graph));
    previous.finish(BuildOutcome::Success);

    let manager = manager();
    let current = job.start_build();
    let dyn_current: Arc<dyn Build> = current.clone();
    let mut nodes = two_stage_nodes(ws1.path(), ws2.path()).into_iter();
    let mut run_until = |last: &str| {
        for node in nodes.by_ref() {
            let id = node.id.to_string();
            current.add_flow_node(node).unwrap();
            manager.on_new_head(&dyn_current, &id);
            if id == last {
                break;
            }
        }
    };

    run_until("4");
    let attached = manager.attached(current.id());
    assert_eq!(attached.len(), 1);
    let first = attached[0].clone();
    assert_eq!(first.url_name(), format!("{URL_NAME}-3"));
    assert_eq!(first.config().glob, "*.xml");

    std::fs::write(ws1.path().join("TEST-first.xml"), report_xml("first", 1)).unwrap();
    assert_eq!(first.total_count(), 1);
    assert_eq!(
        first.progress().unwrap().baseline().expected_tests,
        2,
        "stage1 had two tests"
    );

    run_until("7");
    assert!(manager.attached(current.id()).is_empty());

    run_until("11");
    let attached = manager.attached(current.id());
    assert_eq!(attached.len(), 1);
    let second = attached[0].clone();
    assert_eq!(second.url_name(), format!("{URL_NAME}-10"));

    std::fs::write(ws2.path().join("TEST-second.xml"), report_xml("second", 2)).unwrap();
    let progress = second.progress();
    assert_eq!(progress, None, "progress is only computed by a refresh");
    assert_eq!(second.total_count(), 2);
    let progress = second.progress().unwrap();
    assert_eq!(progress.baseline().expected_tests, 2);
    assert_eq!(progress.completed_tests_percentage(), 100);

    run_until("15");
    assert!(manager.attached(current.id()).is_empty());
}
