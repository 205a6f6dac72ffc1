// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Finding a comparable earlier result to estimate progress against.

use crate::{
    config::BaselineConfig,
    errors::BaselineLookupError,
    graph::block_named,
    host::{Build, BuildOutcome},
};
use junit_report::Report;
use std::sync::Arc;
use tracing::debug;

/// An earlier build's final test result.
#[derive(Clone, Debug)]
pub struct PreviousResult {
    /// The earlier build.
    pub build: Arc<dyn Build>,

    /// Its final test result.
    pub report: Arc<Report>,
}

/// Looks up baselines among the earlier builds of a job.
#[derive(Clone, Debug)]
pub struct BaselineResolver {
    search_limit: usize,
    acceptable_outcomes: Vec<BuildOutcome>,
}

impl BaselineResolver {
    /// Creates a new resolver from config.
    pub fn new(config: &BaselineConfig) -> Self {
        let acceptable_outcomes = [
            BuildOutcome::Success,
            BuildOutcome::Unstable,
            BuildOutcome::Failure,
            BuildOutcome::NotBuilt,
            BuildOutcome::Aborted,
        ]
        .into_iter()
        .filter(|outcome| config.is_acceptable(*outcome))
        .collect();

        Self {
            search_limit: config.search_limit(),
            acceptable_outcomes,
        }
    }

    /// Returns the final result of the closest earlier build that finished with an acceptable
    /// outcome and recorded test results.
    ///
    /// At most `search-limit` earlier builds are looked at.
    pub fn find_previous_result(&self, build: &dyn Build) -> Option<PreviousResult> {
        std::iter::successors(build.previous_build(), |b| b.previous_build())
            .take(self.search_limit)
            .filter(|b| {
                b.outcome()
                    .is_some_and(|outcome| self.acceptable_outcomes.contains(&outcome))
            })
            .find_map(|b| {
                let report = b.test_result()?;
                debug!("using {} as the baseline for {}", b.id(), build.id());
                Some(PreviousResult { build: b, report })
            })
    }

    /// Returns the part of an earlier result that was recorded under the block named
    /// `block_name`.
    ///
    /// With no block name, this is the earlier build's whole result. If the earlier build has no
    /// flow graph, or no block of that name, there is no baseline.
    pub fn find_previous_block_result(
        &self,
        build: &dyn Build,
        block_name: Option<&str>,
    ) -> Result<Option<Arc<Report>>, BaselineLookupError> {
        let Some(previous) = self.find_previous_result(build) else {
            return Ok(None);
        };
        let Some(block_name) = block_name else {
            return Ok(Some(previous.report));
        };

        let graph = previous
            .build
            .flow_graph()
            .map_err(|err| BaselineLookupError::FlowGraph {
                build: previous.build.id().clone(),
                err,
            })?;
        let Some(graph) = graph else {
            debug!(
                "{} has no flow graph, so there is no baseline for block `{block_name}`",
                previous.build.id()
            );
            return Ok(None);
        };

        let Some(node) = graph.find_first(block_named(block_name)) else {
            debug!(
                "{} has no block named `{block_name}`",
                previous.build.id()
            );
            return Ok(None);
        };
        Ok(Some(Arc::new(
            previous.report.result_for_pipeline_block(node.id.as_str()),
        )))
    }
}
