// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An in-process build host.
//!
//! [`LocalJob`] and [`LocalBuild`] keep all build state in memory. When a state directory is set,
//! the handles attached to each build are persisted there as JSON, so that they can be restored
//! by a later process.

use super::{Build, BuildId, BuildOutcome, Job, WorkspaceLocation, WorkspaceResolver};
use crate::{
    config::JobConfig,
    errors::{FlowGraphError, HostError},
    graph::{FlowGraph, FlowNode, FlowNodeId},
    handle::HandleConfig,
};
use camino::{Utf8Path, Utf8PathBuf};
use junit_report::Report;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};
use tracing::debug;

/// A job whose builds run in this process.
#[derive(Debug)]
pub struct LocalJob {
    name: String,
    config: Mutex<JobConfig>,
    state_dir: Option<Utf8PathBuf>,
    next_number: AtomicU32,
    latest: Mutex<Weak<LocalBuild>>,
}

impl LocalJob {
    /// Creates a new job with the given realtime settings.
    pub fn new(name: impl Into<String>, config: JobConfig) -> Arc<Self> {
        Arc::new(Self::new_impl(name.into(), config, None))
    }

    /// Creates a new job that persists the attached handles of its builds into `state_dir`.
    pub fn with_state_dir(
        name: impl Into<String>,
        config: JobConfig,
        state_dir: impl Into<Utf8PathBuf>,
    ) -> Arc<Self> {
        Arc::new(Self::new_impl(name.into(), config, Some(state_dir.into())))
    }

    fn new_impl(name: String, config: JobConfig, state_dir: Option<Utf8PathBuf>) -> Self {
        Self {
            name,
            config: Mutex::new(config),
            state_dir,
            next_number: AtomicU32::new(1),
            latest: Mutex::new(Weak::new()),
        }
    }

    /// Replaces the realtime settings of this job.
    pub fn set_config(&self, config: JobConfig) {
        *lock(&self.config) = config;
    }

    /// Starts a new build of this job.
    pub fn start_build(self: &Arc<Self>) -> Arc<LocalBuild> {
        let number = self.next_number.fetch_add(1, Ordering::SeqCst);
        let mut latest = lock(&self.latest);
        let build = Arc::new(LocalBuild {
            id: BuildId::new(self.name.clone(), number),
            job: self.clone(),
            previous: latest.upgrade(),
            state: Mutex::new(LocalBuildState::default()),
        });
        *latest = Arc::downgrade(&build);
        debug!("started {}", build.id);
        build
    }

    /// The most recently started build of this job.
    pub fn latest_build(&self) -> Option<Arc<LocalBuild>> {
        lock(&self.latest).upgrade()
    }

    fn state_file(&self, number: u32) -> Option<Utf8PathBuf> {
        self.state_dir
            .as_ref()
            .map(|dir| dir.join(format!("{number}.json")))
    }
}

impl Job for LocalJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> JobConfig {
        lock(&self.config).clone()
    }

    fn last_successful_build(&self) -> Option<Arc<dyn Build>> {
        let latest = self.latest_build()?;
        std::iter::successors(Some(latest), |build| build.previous.clone())
            .find(|build| {
                let state = build.lock();
                !state.building && state.outcome == Some(BuildOutcome::Success)
            })
            .map(|build| build as Arc<dyn Build>)
    }
}

/// A build that runs in this process.
#[derive(Debug)]
pub struct LocalBuild {
    id: BuildId,
    job: Arc<LocalJob>,
    previous: Option<Arc<LocalBuild>>,
    state: Mutex<LocalBuildState>,
}

#[derive(Debug)]
struct LocalBuildState {
    building: bool,
    outcome: Option<BuildOutcome>,
    estimated_duration: Option<Duration>,
    workspace: Option<WorkspaceLocation>,
    multi_configuration: bool,
    test_result: Option<Arc<Report>>,
    flow_graph: Option<Arc<FlowGraph>>,
    node_warnings: Vec<(FlowNodeId, String)>,
    console: Vec<String>,
    saved: Vec<HandleConfig>,
    save_count: usize,
}

impl Default for LocalBuildState {
    fn default() -> Self {
        Self {
            building: true,
            outcome: None,
            estimated_duration: None,
            workspace: None,
            multi_configuration: false,
            test_result: None,
            flow_graph: None,
            node_warnings: vec![],
            console: vec![],
            saved: vec![],
            save_count: 0,
        }
    }
}

/// The state of a local build as persisted on disk.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PersistedBuild {
    attached: Vec<HandleConfig>,
}

impl LocalBuild {
    fn lock(&self) -> MutexGuard<'_, LocalBuildState> {
        lock(&self.state)
    }

    /// The local job this build belongs to.
    pub fn local_job(&self) -> &Arc<LocalJob> {
        &self.job
    }

    /// Sets how long this build is expected to take.
    pub fn set_estimated_duration(&self, duration: Duration) {
        self.lock().estimated_duration = Some(duration);
    }

    /// Sets the workspace of this build.
    pub fn set_workspace(&self, workspace: WorkspaceLocation) {
        self.lock().workspace = Some(workspace);
    }

    /// Marks this build as one configuration of a multi-configuration build.
    pub fn set_multi_configuration(&self, multi_configuration: bool) {
        self.lock().multi_configuration = multi_configuration;
    }

    /// Replaces the flow graph of this build.
    pub fn set_flow_graph(&self, graph: FlowGraph) {
        self.lock().flow_graph = Some(Arc::new(graph));
    }

    /// Adds a node to this build's flow graph, creating the graph if needed.
    pub fn add_flow_node(&self, node: FlowNode) -> Result<(), FlowGraphError> {
        let mut state = self.lock();
        let graph = state
            .flow_graph
            .get_or_insert_with(|| Arc::new(FlowGraph::new()));
        Arc::make_mut(graph).add_node(node)?;
        Ok(())
    }

    /// Finishes this build with the given outcome.
    ///
    /// An outcome set earlier (for example by [`Build::mark_unstable`]) is only ever made worse.
    pub fn finish(&self, outcome: BuildOutcome) {
        let mut state = self.lock();
        state.building = false;
        state.outcome = Some(match state.outcome {
            Some(existing) => existing.combine(outcome),
            None => outcome,
        });
    }

    /// The lines written to this build's console.
    pub fn console_lines(&self) -> Vec<String> {
        self.lock().console.clone()
    }

    /// The warnings attached to flow nodes of this build.
    pub fn node_warnings(&self) -> Vec<(FlowNodeId, String)> {
        self.lock().node_warnings.clone()
    }

    /// The handles persisted by the most recent save.
    pub fn saved_handles(&self) -> Vec<HandleConfig> {
        self.lock().saved.clone()
    }

    /// How many times this build has been saved.
    pub fn save_count(&self) -> usize {
        self.lock().save_count
    }

    /// Reads the handles persisted for this build by an earlier process.
    pub fn load_saved_handles(&self) -> Result<Vec<HandleConfig>, HostError> {
        let Some(path) = self.job.state_file(self.id.number) else {
            return Ok(vec![]);
        };
        read_persisted(&path).map(|persisted| persisted.attached)
    }
}

impl Build for LocalBuild {
    fn id(&self) -> &BuildId {
        &self.id
    }

    fn job(&self) -> Arc<dyn Job> {
        self.job.clone()
    }

    fn url(&self) -> String {
        format!("job/{}/{}/", self.id.job, self.id.number)
    }

    fn is_building(&self) -> bool {
        self.lock().building
    }

    fn estimated_duration(&self) -> Option<Duration> {
        self.lock().estimated_duration
    }

    fn outcome(&self) -> Option<BuildOutcome> {
        self.lock().outcome
    }

    fn previous_build(&self) -> Option<Arc<dyn Build>> {
        self.previous.clone().map(|build| build as Arc<dyn Build>)
    }

    fn test_result(&self) -> Option<Arc<Report>> {
        self.lock().test_result.clone()
    }

    fn record_test_result(&self, report: Report) {
        let mut state = self.lock();
        let merged = match state.test_result.take() {
            Some(existing) => {
                let mut merged = Arc::unwrap_or_clone(existing);
                merged.merge(report);
                merged
            }
            None => report,
        };
        state.test_result = Some(Arc::new(merged));
    }

    fn flow_graph(&self) -> Result<Option<Arc<FlowGraph>>, HostError> {
        Ok(self.lock().flow_graph.clone())
    }

    fn workspace(&self) -> Option<WorkspaceLocation> {
        self.lock().workspace.clone()
    }

    fn is_multi_configuration(&self) -> bool {
        self.lock().multi_configuration
    }

    fn mark_unstable(&self) {
        let mut state = self.lock();
        state.outcome = Some(match state.outcome {
            Some(existing) => existing.combine(BuildOutcome::Unstable),
            None => BuildOutcome::Unstable,
        });
    }

    fn add_node_warning(&self, node: &FlowNodeId, message: String) {
        self.lock().node_warnings.push((node.clone(), message));
    }

    fn console(&self, line: &str) {
        self.lock().console.push(line.to_owned());
    }

    fn save(&self, attached: &[HandleConfig]) -> Result<(), HostError> {
        {
            let mut state = self.lock();
            state.saved = attached.to_vec();
            state.save_count += 1;
        }

        if let Some(path) = self.job.state_file(self.id.number) {
            let persisted = PersistedBuild {
                attached: attached.to_vec(),
            };
            write_persisted(&path, &persisted)?;
        }
        Ok(())
    }
}

fn read_persisted(path: &Utf8Path) -> Result<PersistedBuild, HostError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(PersistedBuild::default());
        }
        Err(err) => {
            return Err(HostError::with_source(
                format!("failed to read build state from `{path}`"),
                err,
            ));
        }
    };
    serde_json::from_str(&contents).map_err(|err| {
        HostError::with_source(format!("failed to parse build state at `{path}`"), err)
    })
}

fn write_persisted(path: &Utf8Path, persisted: &PersistedBuild) -> Result<(), HostError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            HostError::with_source(format!("failed to create state directory `{parent}`"), err)
        })?;
    }
    let json = serde_json::to_string_pretty(persisted).map_err(|err| {
        HostError::with_source(format!("failed to serialize build state for `{path}`"), err)
    })?;
    std::fs::write(path, json).map_err(|err| {
        HostError::with_source(format!("failed to write build state to `{path}`"), err)
    })
}

/// A [`WorkspaceResolver`] for workspaces that are all readable from this process.
///
/// Workspaces on the built-in node resolve to their path. Workspaces on other nodes resolve to
/// their path only while that node is marked online.
#[derive(Debug, Default)]
pub struct LocalWorkspaces {
    online: Mutex<BTreeSet<String>>,
}

impl LocalWorkspaces {
    /// Creates a resolver with no remote nodes online.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a remote node as online or offline.
    pub fn set_online(&self, node: impl Into<String>, online: bool) {
        let node = node.into();
        let mut nodes = lock(&self.online);
        if online {
            nodes.insert(node);
        } else {
            nodes.remove(&node);
        }
    }
}

impl WorkspaceResolver for LocalWorkspaces {
    fn resolve(&self, location: &WorkspaceLocation) -> Option<Utf8PathBuf> {
        if location.is_built_in() || lock(&self.online).contains(&location.node) {
            Some(location.path.clone())
        } else {
            None
        }
    }
}

/// Locks a mutex, recovering the data if another thread panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
