// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::BlockLifecycleManager;
use crate::{
    errors::DisplayErrorChain,
    graph::{FlowGraph, FlowNodeKind},
    handle::{HandleConfig, TrackingHandle, URL_NAME},
    host::Build,
};
use junit_report::StdioRetention;
use std::{collections::BTreeSet, sync::Arc};
use tracing::{debug, warn};

/// Report globs discovered from the archiving steps of an earlier build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) struct DiscoveredGlobs {
    pub(super) glob: String,
    pub(super) keep_long_stdio: bool,
}

impl DiscoveredGlobs {
    /// Collects the globs of every JUnit archiving step in `graph`.
    pub(super) fn from_graph(graph: &FlowGraph) -> Option<Self> {
        let mut globs = BTreeSet::new();
        let mut keep_long_stdio = false;
        for node in graph.iter_depth_first() {
            if !node.is_junit_archiver() {
                continue;
            }
            if let Some(args) = &node.archiver {
                globs.insert(args.test_results.as_str());
                keep_long_stdio |= args.keep_long_stdio;
            }
        }

        if globs.is_empty() {
            return None;
        }
        Some(Self {
            glob: globs.into_iter().collect::<Vec<_>>().join(","),
            keep_long_stdio,
        })
    }
}

impl BlockLifecycleManager {
    /// Attaches a whole-build handle to a newly started build.
    ///
    /// Nothing is attached unless the job reports in realtime, declares the globs its archiver
    /// reads, and the build has a workspace.
    pub fn on_build_started(&self, build: Arc<dyn Build>) -> Option<Arc<TrackingHandle>> {
        let config = build.job().config();
        if !config.is_active() {
            return None;
        }
        let options = config.junit.as_ref()?;
        let Some(workspace) = build.workspace() else {
            debug!("{}: no workspace, not tracking test results", build.id());
            return None;
        };

        let glob = if build.is_multi_configuration() {
            multi_configuration_glob(options.test_results())
        } else {
            options.test_results().to_owned()
        };
        let handle_config = HandleConfig {
            build: build.id().clone(),
            block: None,
            glob,
            workspace,
            stdio_retention: options.stdio_retention(),
            parse_interval: options.parse_interval(),
        };

        match self.attach(build, handle_config) {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!("{err}");
                None
            }
        }
    }

    /// Detaches every handle from a build that has finished.
    pub fn on_build_finalized(&self, build: &dyn Build) {
        self.detach_all(build);
    }

    /// Reacts to a new node being added to a pipeline build's flow graph.
    ///
    /// A block started directly inside a workspace-owning block gets a handle, keyed by the
    /// workspace block, that watches the report globs archived by the job's last successful build.
    /// The end of a workspace-owning block detaches that handle again.
    pub fn on_new_head(&self, build: &Arc<dyn Build>, node_id: &str) {
        let graph = match build.flow_graph() {
            Ok(Some(graph)) => graph,
            Ok(None) => return,
            Err(err) => {
                warn!(
                    "{}: failed to load flow graph: {}",
                    build.id(),
                    DisplayErrorChain::new(&err)
                );
                return;
            }
        };
        let Some(node) = graph.node(node_id) else {
            debug!("{}: unknown flow node `{node_id}`", build.id());
            return;
        };

        match &node.kind {
            FlowNodeKind::BlockStart => {
                let Some(parent) = node.parents.first().and_then(|id| graph.node(id.as_str()))
                else {
                    return;
                };
                let Some(workspace) = &parent.workspace else {
                    return;
                };
                let job = build.job();
                let config = job.config();
                if !config.report_in_realtime {
                    return;
                }

                let previous = job.last_successful_build();
                let discovered = match previous.as_ref().map(|b| b.flow_graph()) {
                    Some(Ok(Some(graph))) => DiscoveredGlobs::from_graph(&graph),
                    Some(Err(err)) => {
                        warn!(
                            "{}: failed to load flow graph of last successful build: {}",
                            build.id(),
                            DisplayErrorChain::new(&err)
                        );
                        None
                    }
                    Some(Ok(None)) | None => None,
                };
                let Some(discovered) = discovered else {
                    debug!(
                        "{}: no archived test reports to watch in block `{}`",
                        build.id(),
                        parent.id
                    );
                    return;
                };

                let stdio_retention = if discovered.keep_long_stdio {
                    StdioRetention::All
                } else {
                    StdioRetention::default()
                };
                let handle_config = HandleConfig {
                    build: build.id().clone(),
                    block: Some(parent.id.clone()),
                    glob: discovered.glob,
                    workspace: workspace.clone(),
                    stdio_retention,
                    parse_interval: config.junit.as_ref().and_then(|o| o.parse_interval()),
                };
                if let Err(err) = self.attach(build.clone(), handle_config) {
                    warn!("{err}");
                }
            }
            FlowNodeKind::BlockEnd { start } => {
                let Some(start) = graph.node(start.as_str()) else {
                    return;
                };
                if start.workspace.is_some() {
                    let url_name = format!("{URL_NAME}-{}", start.id);
                    self.detach(build.as_ref(), &url_name);
                }
            }
            FlowNodeKind::Atom => {}
        }
    }
}

/// Prefixes every glob with `**/`, since each configuration of a multi-configuration build reads
/// reports from its own subdirectory.
fn multi_configuration_glob(glob: &str) -> String {
    glob.split([',', ' '])
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| format!("**/{chunk}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{JobConfig, RealtimeJunitOptions},
        graph::{FlowNode, JUNIT_FUNCTION},
        host::{BuildOutcome, WorkspaceLocation, local::LocalJob},
        test_helpers::{manager, two_stage_graph},
    };
    use pretty_assertions::assert_eq;

    #[test]
    fn discovers_globs() {
        let discovered = DiscoveredGlobs::from_graph(&two_stage_graph()).unwrap();
        assert_eq!(
            discovered,
            DiscoveredGlobs {
                glob: "reports/**/*.xml,target/*.xml".to_owned(),
                keep_long_stdio: true,
            }
        );
    }

    #[test]
    fn multi_configuration_globs() {
        assert_eq!(
            multi_configuration_glob("target/*.xml, reports/*.xml"),
            "**/target/*.xml,**/reports/*.xml"
        );
    }

    #[test]
    fn whole_build_handles() {
        let manager = manager();
        let job = LocalJob::new("service", JobConfig::default());

        let inactive = job.start_build();
        inactive.set_workspace(WorkspaceLocation::built_in("/ws"));
        assert!(manager.on_build_started(inactive.clone()).is_none());

        job.set_config(JobConfig::realtime(RealtimeJunitOptions::new("target/*.xml")));
        let active = job.start_build();
        active.set_workspace(WorkspaceLocation::built_in("/ws"));
        active.set_multi_configuration(true);
        let handle = manager.on_build_started(active.clone()).unwrap();
        assert_eq!(handle.config().glob, "**/target/*.xml");
        assert_eq!(handle.url_name(), "realtimeTestReport");

        manager.on_build_finalized(active.as_ref());
        assert!(manager.attached(active.id()).is_empty());
    }

    #[test]
    fn workspace_blocks_follow_the_graph() {
        let manager = manager();
        let job = LocalJob::new("service", JobConfig::default());
        let mut config = JobConfig::default();
        config.report_in_realtime = true;
        job.set_config(config);

        let previous = job.start_build();
        previous.set_flow_graph(two_stage_graph());
        previous.finish(BuildOutcome::Success);

        let current = job.start_build();
        let build: Arc<dyn Build> = current.clone();
        let nodes = [
            FlowNode::block_start("1", "flow-start"),
            FlowNode::block_start("2", "node")
                .with_parents(["1"])
                .with_enclosing("1")
                .with_workspace(WorkspaceLocation::on_node("agent-1", "/ws")),
            FlowNode::block_start("3", "node")
                .with_parents(["2"])
                .with_enclosing("2"),
        ];
        for node in nodes {
            let id = node.id.clone();
            current.add_flow_node(node).unwrap();
            manager.on_new_head(&build, id.as_str());
        }

        let attached = manager.attached(current.id());
        assert_eq!(attached.len(), 1);
        let handle = &attached[0];
        assert_eq!(handle.url_name(), "realtimeTestReport-2");
        assert_eq!(handle.config().glob, "reports/**/*.xml,target/*.xml");
        assert_eq!(handle.config().stdio_retention, StdioRetention::All);
        assert_eq!(handle.display_name(), "Realtime test result on agent-1");

        for node in [
            FlowNode::atom("4", JUNIT_FUNCTION)
                .with_parents(["3"])
                .with_enclosing("3"),
            FlowNode::block_end("5", "node", "3")
                .with_parents(["4"])
                .with_enclosing("2"),
            FlowNode::block_end("6", "node", "2")
                .with_parents(["5"])
                .with_enclosing("1"),
        ] {
            let id = node.id.clone();
            current.add_flow_node(node).unwrap();
            manager.on_new_head(&build, id.as_str());
        }
        assert!(manager.attached(current.id()).is_empty());
    }

    #[test]
    fn no_previous_build_means_nothing_to_watch() {
        let manager = manager();
        let job = LocalJob::new("service", JobConfig::default());
        let mut config = JobConfig::default();
        config.report_in_realtime = true;
        job.set_config(config);

        let current = job.start_build();
        let build: Arc<dyn Build> = current.clone();
        current
            .add_flow_node(
                FlowNode::block_start("1", "node")
                    .with_workspace(WorkspaceLocation::built_in("/ws")),
            )
            .unwrap();
        current
            .add_flow_node(FlowNode::block_start("2", "node").with_parents(["1"]))
            .unwrap();
        manager.on_new_head(&build, "2");
        assert!(manager.attached(current.id()).is_empty());
    }
}
