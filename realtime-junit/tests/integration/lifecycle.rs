// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{manager, report_xml};
use camino_tempfile::Utf8TempDir;
use pretty_assertions::assert_eq;
use realtime_junit::{
    config::{JobConfig, RealtimeJunitOptions},
    handle::{LifecycleState, URL_NAME},
    host::{Build, BuildOutcome, WorkspaceLocation, local::LocalJob},
    lifecycle::Target,
};
use std::sync::Arc;

fn realtime_job_config() -> JobConfig {
    JobConfig::realtime(RealtimeJunitOptions::new("*.xml"))
}

#[test]
fn finished_build_redirects() {
    let workspace = Utf8TempDir::new().unwrap();
    let job = LocalJob::new("service", realtime_job_config());
    let build = job.start_build();
    build.set_workspace(WorkspaceLocation::built_in(workspace.path()));

    let manager = manager();
    let handle = manager
        .on_build_started(build.clone())
        .expect("job reports in realtime");
    assert_eq!(handle.url_name(), URL_NAME);
    assert!(matches!(
        manager.target(build.as_ref(), URL_NAME),
        Target::Empty
    ));
    assert!(matches!(
        manager.target(build.as_ref(), "realtimeTestReport-7"),
        Target::NotFound
    ));

    std::fs::write(workspace.path().join("TEST-a.xml"), report_xml("a", 3)).unwrap();
    match manager.target(build.as_ref(), URL_NAME) {
        Target::Result(report) => assert_eq!(report.total_count(), 3),
        other => panic!("expected a result, found {other:?}"),
    }

    // The build finishes without the lifecycle manager hearing about it.
    build.finish(BuildOutcome::Success);
    match manager.target(build.as_ref(), URL_NAME) {
        Target::Redirect(url) => assert_eq!(url, "job/service/1/"),
        other => panic!("expected a redirect, found {other:?}"),
    }
    assert!(manager.attached(build.id()).is_empty());
    assert_eq!(handle.lifecycle_state(), LifecycleState::Detached);
    assert_eq!(build.saved_handles(), vec![]);
}

#[test]
fn finalized_build_detaches_handles() {
    let workspace = Utf8TempDir::new().unwrap();
    let job = LocalJob::new("service", realtime_job_config());
    let build = job.start_build();
    build.set_workspace(WorkspaceLocation::built_in(workspace.path()));

    let manager = manager();
    let handle = manager.on_build_started(build.clone()).unwrap();
    assert_eq!(build.saved_handles(), vec![handle.config().clone()]);

    std::fs::write(workspace.path().join("TEST-a.xml"), report_xml("a", 2)).unwrap();
    assert_eq!(handle.total_count(), 2);

    manager.on_build_finalized(build.as_ref());
    assert!(manager.attached(build.id()).is_empty());
    assert_eq!(handle.lifecycle_state(), LifecycleState::Detached);

    // Detached handles keep serving their last result without reparsing.
    std::fs::write(workspace.path().join("TEST-b.xml"), report_xml("b", 5)).unwrap();
    assert_eq!(handle.total_count(), 2);
}

#[test]
fn inactive_jobs_are_not_tracked() {
    let workspace = Utf8TempDir::new().unwrap();
    let job = LocalJob::new("service", JobConfig::default());
    let build = job.start_build();
    build.set_workspace(WorkspaceLocation::built_in(workspace.path()));

    let manager = manager();
    assert!(manager.on_build_started(build.clone()).is_none());
    assert_eq!(build.save_count(), 0);
}

#[test]
fn handles_survive_restart() {
    let workspace = Utf8TempDir::new().unwrap();
    let state_dir = Utf8TempDir::new().unwrap();
    std::fs::write(workspace.path().join("TEST-a.xml"), report_xml("a", 2)).unwrap();

    let job = LocalJob::with_state_dir("service", realtime_job_config(), state_dir.path());
    let build = job.start_build();
    build.set_workspace(WorkspaceLocation::built_in(workspace.path()));

    let before = manager();
    let handle = before.on_build_started(build.clone()).unwrap();
    assert!(state_dir.path().join("1.json").exists());

    // A new manager, as after a restart, picks the handle up from the persisted state.
    let after = manager();
    let saved = build.load_saved_handles().unwrap();
    assert_eq!(saved, vec![handle.config().clone()]);
    let dyn_build: Arc<dyn Build> = build.clone();
    assert_eq!(after.restore_handles(dyn_build.clone(), saved), 1);

    let restored = after.handle(build.id(), URL_NAME).unwrap();
    assert_eq!(restored.total_count(), 2);

    // Once the build has finished, saved handles are dropped instead.
    build.finish(BuildOutcome::Success);
    let saved = build.load_saved_handles().unwrap();
    assert_eq!(manager().restore_handles(dyn_build, saved), 0);
    assert_eq!(build.load_saved_handles().unwrap(), vec![]);
}
