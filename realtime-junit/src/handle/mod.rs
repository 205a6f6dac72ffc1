// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracking handles: live, cached views of the test results of a running build or block.
//!
//! A [`TrackingHandle`] reparses its reports at most once per refresh interval and serves the
//! cached result in between. The first successful refresh also looks up a baseline, which every
//! later refresh uses to compute a [`ProgressSnapshot`].

mod policy;
mod source;

pub use policy::*;
pub use source::*;

use crate::{
    config::{RefreshMode, helpers::stdio_retention},
    errors::{DisplayErrorChain, ParseReportError},
    graph::FlowNodeId,
    host::{Build, BuildId, WorkspaceLocation},
    progress::{Baseline, ProgressSnapshot},
    time::stopwatch,
};
use debug_ignore::DebugIgnore;
use junit_report::{Report, StdioRetention, TestCase};
use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tracing::{Level, debug, warn};

/// The URL name of the handle tracking a whole build.
pub const URL_NAME: &str = "realtimeTestReport";

/// The persistent configuration of a tracking handle.
///
/// This is everything needed to recreate a handle after a restart.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HandleConfig {
    /// The build the handle is attached to.
    pub build: BuildId,

    /// The block the handle tracks, or `None` for the whole build.
    #[serde(default)]
    pub block: Option<FlowNodeId>,

    /// Comma or space separated report globs, relative to the workspace.
    pub glob: String,

    /// The workspace to read reports from.
    pub workspace: WorkspaceLocation,

    /// How much test output to keep.
    #[serde(default, with = "stdio_retention")]
    pub stdio_retention: StdioRetention,

    /// Overrides the refresh interval.
    #[serde(default, with = "humantime_serde")]
    pub parse_interval: Option<Duration>,
}

impl HandleConfig {
    /// The URL name of the handle: [`URL_NAME`] for whole builds, `URL_NAME-<node id>` for
    /// blocks. Unique among the handles of a build.
    pub fn url_name(&self) -> String {
        match &self.block {
            Some(block) => format!("{URL_NAME}-{block}"),
            None => URL_NAME.to_owned(),
        }
    }
}

/// Where a handle is in its lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LifecycleState {
    /// The handle is attached and refreshing.
    Attached,

    /// The tracked block has finished and final archiving is under way.
    Completing,

    /// The handle has been detached and will not refresh again.
    Detached,
}

#[derive(Copy, Clone, Debug)]
enum BaselineState {
    Unresolved,
    Resolved(Option<Baseline>),
}

#[derive(Debug)]
struct HandleState {
    lifecycle: LifecycleState,
    result: Option<Arc<Report>>,
    result_started: Option<Instant>,
    last_refresh: Option<Instant>,
    baseline: BaselineState,
    progress: Option<Arc<ProgressSnapshot>>,
}

/// A live view of the test results of a running build or block.
#[derive(Debug)]
pub struct TrackingHandle {
    config: HandleConfig,
    build: DebugIgnore<Arc<dyn Build>>,
    source: Box<dyn ReportSource>,
    policy: RefreshPolicy,
    state: Mutex<HandleState>,
}

impl TrackingHandle {
    /// Creates a new handle, initially attached with no cached result.
    pub fn new(
        build: Arc<dyn Build>,
        config: HandleConfig,
        source: Box<dyn ReportSource>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            config,
            build: DebugIgnore(build),
            source,
            policy,
            state: Mutex::new(HandleState {
                lifecycle: LifecycleState::Attached,
                result: None,
                result_started: None,
                last_refresh: None,
                baseline: BaselineState::Unresolved,
                progress: None,
            }),
        }
    }

    /// The persistent configuration of this handle.
    pub fn config(&self) -> &HandleConfig {
        &self.config
    }

    /// The build this handle is attached to.
    pub fn build(&self) -> &Arc<dyn Build> {
        &self.build
    }

    /// The block this handle tracks, or `None` for the whole build.
    pub fn block(&self) -> Option<&FlowNodeId> {
        self.config.block.as_ref()
    }

    /// See [`HandleConfig::url_name`].
    pub fn url_name(&self) -> String {
        self.config.url_name()
    }

    /// A human-readable name for this handle.
    pub fn display_name(&self) -> String {
        if self.config.block.is_none() {
            return "Realtime Test Result".to_owned();
        }
        let workspace = &self.config.workspace;
        if workspace.is_built_in() {
            "Realtime test result on built-in node".to_owned()
        } else {
            format!("Realtime test result on {}", workspace.node)
        }
    }

    /// Where this handle is in its lifecycle.
    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lock().lifecycle
    }

    /// Returns the current result, reparsing the reports if the cached result is stale.
    ///
    /// Returns `None` until a parse has succeeded. A failed refresh keeps the last good result.
    pub fn result(&self) -> Option<Arc<Report>> {
        let interval = self.policy.interval(
            self.source.refresh_interval_override(),
            self.build.estimated_duration(),
        );

        {
            let state = self.lock();
            if state.lifecycle == LifecycleState::Detached {
                return state.result.clone();
            }
            if self.policy.mode() == RefreshMode::Interval
                && state
                    .last_refresh
                    .is_some_and(|last| last.elapsed() < interval)
            {
                debug!(
                    "{} on {}: serving cached result",
                    self.config.url_name(),
                    self.config.build
                );
                return state.result.clone();
            }
        }

        self.refresh()
    }

    /// The number of failed tests in the current result.
    pub fn fail_count(&self) -> usize {
        self.result().map_or(0, |report| report.fail_count())
    }

    /// The number of skipped tests in the current result.
    pub fn skip_count(&self) -> usize {
        self.result().map_or(0, |report| report.skip_count())
    }

    /// The total number of tests in the current result.
    pub fn total_count(&self) -> usize {
        self.result().map_or(0, |report| report.total_count())
    }

    /// The failed tests in the current result.
    pub fn failed_tests(&self) -> Vec<TestCase> {
        self.result().map_or_else(Vec::new, |report| {
            report
                .failed_tests()
                .map(|(_, case)| case.clone())
                .collect()
        })
    }

    /// The progress estimate computed by the most recent successful refresh.
    ///
    /// This does not trigger a refresh. It is `None` until a refresh has succeeded, and stays
    /// `None` if no baseline was found.
    pub fn progress(&self) -> Option<Arc<ProgressSnapshot>> {
        self.lock().progress.clone()
    }

    pub(crate) fn begin_completing(&self) {
        let mut state = self.lock();
        if state.lifecycle == LifecycleState::Attached {
            state.lifecycle = LifecycleState::Completing;
        }
    }

    pub(crate) fn mark_detached(&self) {
        self.lock().lifecycle = LifecycleState::Detached;
    }

    fn refresh(&self) -> Option<Arc<Report>> {
        let stopwatch = stopwatch();
        let report = match self.source.parse() {
            Ok(report) => Arc::new(report),
            Err(err) if refresh_failure_level(&err) == Level::DEBUG => {
                debug!(
                    "{} on {}: {}",
                    self.config.url_name(),
                    self.config.build,
                    err
                );
                return self.lock().result.clone();
            }
            Err(err) => {
                let what = if err.is_interrupted() {
                    "refresh of test results was interrupted"
                } else {
                    "failed to refresh test results"
                };
                warn!(
                    "{} on {}: {what}: {}",
                    self.config.url_name(),
                    self.config.build,
                    DisplayErrorChain::new(&err)
                );
                return self.lock().result.clone();
            }
        };
        let snapshot = stopwatch.snapshot();
        debug!(
            "{} on {}: parsed {} tests in {:?} (started at {}, finished at {})",
            self.config.url_name(),
            self.config.build,
            report.total_count(),
            snapshot.duration,
            snapshot.start_time,
            snapshot.end_time(),
        );

        // The baseline lookup can be slow, so don't hold the lock across it.
        let needs_baseline = matches!(self.lock().baseline, BaselineState::Unresolved);
        let lookup = needs_baseline.then(|| self.source.find_previous_result());

        let mut state = self.lock();
        if state.lifecycle == LifecycleState::Detached {
            debug!(
                "{} on {}: detached during refresh, discarding result",
                self.config.url_name(),
                self.config.build
            );
            return state.result.clone();
        }
        if state
            .result_started
            .is_some_and(|started| started > stopwatch.instant())
        {
            // A parse that started later has already stored its result.
            return state.result.clone();
        }

        match lookup {
            Some(Ok(previous)) => {
                if matches!(state.baseline, BaselineState::Unresolved) {
                    let baseline = previous.as_deref().map(Baseline::from_report);
                    debug!(
                        "{} on {}: baseline is {baseline:?}",
                        self.config.url_name(),
                        self.config.build
                    );
                    state.baseline = BaselineState::Resolved(baseline);
                }
            }
            Some(Err(err)) => {
                warn!(
                    "{} on {}: failed to look up baseline, will retry: {}",
                    self.config.url_name(),
                    self.config.build,
                    DisplayErrorChain::new(&err)
                );
            }
            None => {}
        }

        state.progress = match state.baseline {
            BaselineState::Resolved(Some(baseline)) => {
                Some(Arc::new(ProgressSnapshot::from_report(baseline, &report)))
            }
            BaselineState::Resolved(None) | BaselineState::Unresolved => None,
        };
        state.result = Some(report.clone());
        state.result_started = Some(stopwatch.instant());
        state.last_refresh = Some(Instant::now());
        Some(report)
    }

    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The level a failed refresh is logged at. Only "nothing to read yet" is quiet.
fn refresh_failure_level(err: &ParseReportError) -> Level {
    if err.is_benign() {
        Level::DEBUG
    } else {
        Level::WARN
    }
}
