// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::BlockLifecycleManager;
use crate::{
    archiver::{ArchiveRequest, ArchiveSummary},
    config::RealtimeJunitOptions,
    errors::{ArchiveError, AttachError, DisplayErrorChain, FinishStepError},
    graph::FlowNodeId,
    handle::{HandleConfig, TrackingHandle, URL_NAME},
    helpers::plural,
    host::{Build, WorkspaceLocation},
};
use junit_report::PipelineDetails;
use std::sync::Arc;
use tracing::{debug, warn};

/// The context a realtime step runs in.
#[derive(Clone, Debug)]
pub struct StepContext {
    /// The build the step belongs to.
    pub build: Arc<dyn Build>,

    /// The flow node of the step.
    pub node: FlowNodeId,

    /// The workspace the step runs in, if any.
    pub workspace: Option<WorkspaceLocation>,
}

impl StepContext {
    /// Creates a new step context.
    pub fn new(
        build: Arc<dyn Build>,
        node: impl Into<String>,
        workspace: Option<WorkspaceLocation>,
    ) -> Self {
        Self {
            build,
            node: FlowNodeId::new(node),
            workspace,
        }
    }

    fn url_name(&self) -> String {
        format!("{URL_NAME}-{}", self.node)
    }

    fn pipeline_details(&self) -> PipelineDetails {
        match self.build.flow_graph() {
            Ok(Some(graph)) if graph.node(self.node.as_str()).is_some() => {
                graph.pipeline_details(self.node.as_str())
            }
            _ => PipelineDetails::new(self.node.as_str()),
        }
    }
}

impl BlockLifecycleManager {
    /// Attaches a handle for a realtime step, before its body runs.
    pub fn start_step(
        &self,
        ctx: &StepContext,
        options: &RealtimeJunitOptions,
    ) -> Result<Arc<TrackingHandle>, AttachError> {
        let Some(workspace) = ctx.workspace.clone() else {
            return Err(AttachError::NoWorkspace {
                build: ctx.build.id().clone(),
                node: ctx.node.clone(),
            });
        };

        let config = HandleConfig {
            build: ctx.build.id().clone(),
            block: Some(ctx.node.clone()),
            glob: options.test_results().to_owned(),
            workspace,
            stdio_retention: options.stdio_retention(),
            parse_interval: options.parse_interval(),
        };
        self.attach(ctx.build.clone(), config)
    }

    /// Detaches the handle of a realtime step once its body has finished, and archives the final
    /// result.
    ///
    /// If final archiving fails, the last result seen by the handle is recorded in its place and
    /// the archive error is returned.
    pub fn finish_step(
        &self,
        ctx: &StepContext,
        options: &RealtimeJunitOptions,
        body_succeeded: bool,
    ) -> Result<ArchiveSummary, FinishStepError> {
        let build = ctx.build.as_ref();
        let url_name = ctx.url_name();

        let provisional = match self.handle(build.id(), &url_name) {
            Some(handle) => {
                handle.begin_completing();
                let result = handle.result();
                self.detach(build, &url_name);
                result
            }
            None => {
                debug!("{}: no realtime handle at `{url_name}`", build.id());
                None
            }
        };

        let result = match &ctx.workspace {
            Some(workspace) => {
                let pipeline = ctx.pipeline_details();
                self.archiver.archive(&ArchiveRequest {
                    build,
                    node: Some(&ctx.node),
                    workspace,
                    options,
                    pipeline: Some(&pipeline),
                    allow_empty: options.allow_empty_results() || !body_succeeded,
                })
            }
            None => Err(ArchiveError::NoWorkspace),
        };

        match result {
            Ok(summary) => {
                if summary.failed > 0 {
                    build.add_node_warning(&ctx.node, format!("{} tests failed", summary.failed));
                    if !options.skip_marking_build_unstable() {
                        build.mark_unstable();
                    }
                }
                Ok(summary)
            }
            Err(err) => {
                let Some(provisional) = provisional else {
                    return Err(FinishStepError::new(ctx.node.clone(), None, err));
                };

                let count = provisional.total_count();
                build.console(&format!(
                    "Final archiving failed; recording {count} provisional test {}.",
                    plural::results_str(count),
                ));
                if let Err(record_err) = self.archiver.record_provisional(
                    build,
                    Some(&ctx.node),
                    Arc::unwrap_or_clone(provisional),
                ) {
                    warn!(
                        "{}: failed to record provisional test results: {}",
                        build.id(),
                        DisplayErrorChain::new(&record_err)
                    );
                }
                Err(FinishStepError::new(ctx.node.clone(), Some(count), err))
            }
        }
    }
}
