// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::HandleConfig;
use crate::{
    baseline::BaselineResolver,
    errors::{BaselineLookupError, DisplayErrorChain, ParseReportError},
    graph::FlowNodeId,
    host::{Build, WorkspaceResolver},
    parser::{ParseRequest, ReportParser},
};
use junit_report::{PipelineDetails, Report};
use std::{fmt, sync::Arc, time::Duration};
use tracing::debug;

/// Where a tracking handle gets its results and baselines from.
pub trait ReportSource: Send + Sync + fmt::Debug {
    /// Parses the current, possibly partial, result.
    fn parse(&self) -> Result<Report, ParseReportError>;

    /// Looks up the comparable result of an earlier build.
    fn find_previous_result(&self) -> Result<Option<Arc<Report>>, BaselineLookupError>;

    /// A refresh interval that overrides the policy's, if any.
    fn refresh_interval_override(&self) -> Option<Duration> {
        None
    }
}

/// A [`ReportSource`] that parses report files out of a build's workspace.
///
/// Handles for whole builds compare against the whole result of an earlier build. Handles for a
/// block compare against the part of an earlier result recorded under the enclosing stage or
/// parallel branch of the same name.
#[derive(Debug)]
pub struct WorkspaceReportSource {
    build: Arc<dyn Build>,
    config: HandleConfig,
    parser: Arc<dyn ReportParser>,
    workspaces: Arc<dyn WorkspaceResolver>,
    resolver: BaselineResolver,
}

impl WorkspaceReportSource {
    /// Creates a new source.
    pub fn new(
        build: Arc<dyn Build>,
        config: HandleConfig,
        parser: Arc<dyn ReportParser>,
        workspaces: Arc<dyn WorkspaceResolver>,
        resolver: BaselineResolver,
    ) -> Self {
        Self {
            build,
            config,
            parser,
            workspaces,
            resolver,
        }
    }

    fn pipeline_details(&self) -> Option<PipelineDetails> {
        let block = self.config.block.as_ref()?;
        let details = match self.build.flow_graph() {
            Ok(Some(graph)) if graph.node(block.as_str()).is_some() => {
                graph.pipeline_details(block.as_str())
            }
            Ok(_) => PipelineDetails::new(block.as_str()),
            Err(err) => {
                debug!(
                    "unable to load flow graph of {}: {}",
                    self.build.id(),
                    DisplayErrorChain::new(&err)
                );
                PipelineDetails::new(block.as_str())
            }
        };
        Some(details)
    }

    fn locate_block(&self, block: &FlowNodeId) -> Result<BlockLocation, BaselineLookupError> {
        let graph = self
            .build
            .flow_graph()
            .map_err(|err| BaselineLookupError::FlowGraph {
                build: self.build.id().clone(),
                err,
            })?;
        let Some(graph) = graph else {
            return Ok(BlockLocation::Unknown);
        };
        if graph.node(block.as_str()).is_none() {
            return Ok(BlockLocation::Unknown);
        }
        Ok(match graph.enclosing_block_name(block.as_str()) {
            Some(name) => BlockLocation::Within(name.to_owned()),
            None => BlockLocation::TopLevel,
        })
    }
}

/// Where a tracked block sits in the current build's flow graph.
#[derive(Clone, Debug, Eq, PartialEq)]
enum BlockLocation {
    /// The build has no flow graph, or the block is not in it.
    Unknown,

    /// The block is not inside any stage or parallel branch.
    TopLevel,

    /// The block is inside the stage or parallel branch of this name.
    Within(String),
}

impl ReportSource for WorkspaceReportSource {
    fn parse(&self) -> Result<Report, ParseReportError> {
        let workspace = &self.config.workspace;
        let Some(root) = self.workspaces.resolve(workspace) else {
            return Err(ParseReportError::NodeOffline {
                node: workspace.node.clone(),
            });
        };

        let pipeline = self.pipeline_details();
        self.parser.parse(&ParseRequest {
            glob: &self.config.glob,
            root: &root,
            pipeline: pipeline.as_ref(),
            stdio_retention: self.config.stdio_retention,
            allow_empty: false,
            skip_malformed: true,
        })
    }

    fn find_previous_result(&self) -> Result<Option<Arc<Report>>, BaselineLookupError> {
        match &self.config.block {
            None => Ok(self
                .resolver
                .find_previous_result(self.build.as_ref())
                .map(|previous| previous.report)),
            Some(block) => match self.locate_block(block)? {
                BlockLocation::Unknown => {
                    debug!(
                        "block {block} is not in the flow graph of {}, so there is no baseline",
                        self.build.id()
                    );
                    Ok(None)
                }
                BlockLocation::TopLevel => self
                    .resolver
                    .find_previous_block_result(self.build.as_ref(), None),
                BlockLocation::Within(name) => self
                    .resolver
                    .find_previous_block_result(self.build.as_ref(), Some(&name)),
            },
        }
    }

    fn refresh_interval_override(&self) -> Option<Duration> {
        self.config.parse_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{JobConfig, RealtimeConfig},
        errors::HostError,
        graph::FlowGraph,
        host::{
            BuildId, BuildOutcome, Job, WorkspaceLocation,
            local::{LocalBuild, LocalJob, LocalWorkspaces},
        },
        parser::JunitParser,
        test_helpers::{finished_build, handle_config, report_with_cases, two_stage_graph},
    };
    use junit_report::{TestCase, TestCaseStatus, TestSuite};

    /// A running build whose flow graph can't be loaded.
    #[derive(Debug)]
    struct UnreadableGraph(Arc<LocalBuild>);

    impl Build for UnreadableGraph {
        fn id(&self) -> &BuildId {
            self.0.id()
        }

        fn job(&self) -> Arc<dyn Job> {
            self.0.job()
        }

        fn url(&self) -> String {
            self.0.url()
        }

        fn is_building(&self) -> bool {
            self.0.is_building()
        }

        fn estimated_duration(&self) -> Option<Duration> {
            self.0.estimated_duration()
        }

        fn outcome(&self) -> Option<BuildOutcome> {
            self.0.outcome()
        }

        fn previous_build(&self) -> Option<Arc<dyn Build>> {
            self.0.previous_build()
        }

        fn test_result(&self) -> Option<Arc<Report>> {
            self.0.test_result()
        }

        fn record_test_result(&self, report: Report) {
            self.0.record_test_result(report)
        }

        fn flow_graph(&self) -> Result<Option<Arc<FlowGraph>>, HostError> {
            Err(HostError::new("graph storage unavailable"))
        }

        fn workspace(&self) -> Option<WorkspaceLocation> {
            self.0.workspace()
        }

        fn mark_unstable(&self) {
            self.0.mark_unstable()
        }

        fn add_node_warning(&self, node: &FlowNodeId, message: String) {
            self.0.add_node_warning(node, message)
        }

        fn console(&self, line: &str) {
            self.0.console(line)
        }

        fn save(&self, attached: &[HandleConfig]) -> Result<(), HostError> {
            self.0.save(attached)
        }
    }

    fn source(build: Arc<dyn Build>, block: &str) -> WorkspaceReportSource {
        let config = handle_config(build.as_ref(), Some(block));
        WorkspaceReportSource::new(
            build,
            config,
            Arc::new(JunitParser::new()),
            Arc::new(LocalWorkspaces::new()),
            BaselineResolver::new(RealtimeConfig::default_config().baseline()),
        )
    }

    /// A previous result with two tests recorded under stage1 and two under stage2.
    fn staged_report() -> Report {
        let mut report = Report::new();
        for (node, stage, name) in [("5", "2", "stage1"), ("11", "9", "stage2")] {
            let mut suite = TestSuite::new(format!("suite-{name}"));
            suite.add_test_cases([
                TestCase::new("a", TestCaseStatus::success()),
                TestCase::new("b", TestCaseStatus::success()),
            ]);
            let mut details = PipelineDetails::new(node);
            details.enclosing_blocks.push(stage.to_owned());
            details.enclosing_block_names.push(name.to_owned());
            suite.set_pipeline(details);
            report.add_test_suite(suite);
        }
        report
    }

    #[test]
    fn block_baseline_uses_enclosing_stage() {
        let job = LocalJob::new("service", JobConfig::default());
        let previous = finished_build(&job, BuildOutcome::Success, Some(staged_report()));
        previous.set_flow_graph(two_stage_graph());
        let current = job.start_build();
        current.set_flow_graph(two_stage_graph());

        let baseline = source(current, "5").find_previous_result().unwrap().unwrap();
        assert_eq!(baseline.total_count(), 2);
    }

    #[test]
    fn top_level_block_uses_whole_build() {
        let job = LocalJob::new("service", JobConfig::default());
        let _previous = finished_build(&job, BuildOutcome::Success, Some(report_with_cases(4)));
        let current = job.start_build();
        current.set_flow_graph(two_stage_graph());

        // Node 1 is the start of the flow, outside every stage.
        let baseline = source(current, "1").find_previous_result().unwrap().unwrap();
        assert_eq!(baseline.total_count(), 4);
    }

    #[test]
    fn block_missing_from_graph_has_no_baseline() {
        let job = LocalJob::new("service", JobConfig::default());
        let _previous = finished_build(&job, BuildOutcome::Success, Some(report_with_cases(4)));
        let current = job.start_build();
        current.set_flow_graph(two_stage_graph());

        assert!(source(current, "99").find_previous_result().unwrap().is_none());
    }

    #[test]
    fn build_without_graph_has_no_block_baseline() {
        let job = LocalJob::new("service", JobConfig::default());
        let _previous = finished_build(&job, BuildOutcome::Success, Some(report_with_cases(4)));
        let current = job.start_build();

        assert!(source(current, "12").find_previous_result().unwrap().is_none());
    }

    #[test]
    fn unreadable_graph_is_an_error() {
        let job = LocalJob::new("service", JobConfig::default());
        let _previous = finished_build(&job, BuildOutcome::Success, Some(report_with_cases(4)));
        let current = job.start_build();

        let err = source(Arc::new(UnreadableGraph(current)), "12")
            .find_previous_result()
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to load flow graph of service #2");
    }
}
