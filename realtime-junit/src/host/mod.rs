// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The build host that realtime reports are tracked against.
//!
//! A host owns jobs and builds, stores their final test results and persists the tracking handles
//! attached to running builds. realtime-junit only ever talks to the host through the [`Job`],
//! [`Build`] and [`WorkspaceResolver`] traits. [`local`] contains an in-process implementation.

pub mod local;

use crate::{
    config::JobConfig,
    errors::{BuildOutcomeParseError, HostError},
    graph::{FlowGraph, FlowNodeId},
    handle::HandleConfig,
};
use camino::Utf8PathBuf;
use junit_report::Report;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc, time::Duration};

/// Identifies a single execution of a job.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BuildId {
    /// The name of the job.
    pub job: String,

    /// The build number, starting from 1.
    pub number: u32,
}

impl BuildId {
    /// Creates a new build identifier.
    pub fn new(job: impl Into<String>, number: u32) -> Self {
        Self {
            job: job.into(),
            number,
        }
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.job, self.number)
    }
}

/// The outcome of a finished build.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildOutcome {
    /// The build succeeded.
    Success,

    /// The build completed, but some tests failed.
    Unstable,

    /// The build failed.
    Failure,

    /// The build was not run.
    NotBuilt,

    /// The build was aborted.
    Aborted,
}

impl BuildOutcome {
    /// String representations of all known variants.
    pub fn variants() -> [&'static str; 5] {
        ["success", "unstable", "failure", "not-built", "aborted"]
    }

    /// Returns the worse of the two outcomes.
    ///
    /// An outcome can only ever get worse over the course of a build.
    pub fn combine(self, other: Self) -> Self {
        self.max(other)
    }

    fn as_str(self) -> &'static str {
        match self {
            BuildOutcome::Success => "success",
            BuildOutcome::Unstable => "unstable",
            BuildOutcome::Failure => "failure",
            BuildOutcome::NotBuilt => "not-built",
            BuildOutcome::Aborted => "aborted",
        }
    }
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildOutcome {
    type Err = BuildOutcomeParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let outcome = match input {
            "success" => BuildOutcome::Success,
            "unstable" => BuildOutcome::Unstable,
            "failure" => BuildOutcome::Failure,
            "not-built" => BuildOutcome::NotBuilt,
            "aborted" => BuildOutcome::Aborted,
            other => return Err(BuildOutcomeParseError::new(other)),
        };
        Ok(outcome)
    }
}

/// Where a workspace lives: the node (agent) that holds it, and its path on that node.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct WorkspaceLocation {
    /// The name of the node, or the empty string for the built-in node.
    #[serde(default)]
    pub node: String,

    /// The path of the workspace on that node.
    pub path: Utf8PathBuf,
}

impl WorkspaceLocation {
    /// Creates a workspace location on the built-in node.
    pub fn built_in(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            node: String::new(),
            path: path.into(),
        }
    }

    /// Creates a workspace location on the named node.
    pub fn on_node(node: impl Into<String>, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            node: node.into(),
            path: path.into(),
        }
    }

    /// Returns true if the workspace lives on the built-in node.
    pub fn is_built_in(&self) -> bool {
        self.node.is_empty()
    }
}

/// Resolves a workspace location into a path that can be read locally.
pub trait WorkspaceResolver: Send + Sync + fmt::Debug {
    /// Returns a readable path for the workspace, or `None` if its node is not reachable.
    fn resolve(&self, location: &WorkspaceLocation) -> Option<Utf8PathBuf>;
}

/// A job, the definition that builds are executions of.
pub trait Job: Send + Sync + fmt::Debug {
    /// The name of this job.
    fn name(&self) -> &str;

    /// The realtime reporting configuration of this job.
    fn config(&self) -> JobConfig;

    /// The most recent build of this job that completed successfully.
    fn last_successful_build(&self) -> Option<Arc<dyn Build>>;
}

/// A single execution of a job.
pub trait Build: Send + Sync + fmt::Debug {
    /// The identifier of this build.
    fn id(&self) -> &BuildId;

    /// The job this build belongs to.
    fn job(&self) -> Arc<dyn Job>;

    /// The URL of this build's page, relative to the host root.
    fn url(&self) -> String;

    /// Returns true while the build is running.
    fn is_building(&self) -> bool;

    /// How long the build is expected to take, if known.
    fn estimated_duration(&self) -> Option<Duration>;

    /// The outcome of this build, if one has been set.
    fn outcome(&self) -> Option<BuildOutcome>;

    /// The build of the same job that ran before this one.
    fn previous_build(&self) -> Option<Arc<dyn Build>>;

    /// The final test result recorded for this build.
    fn test_result(&self) -> Option<Arc<Report>>;

    /// Records a test result on this build, merging it with any result recorded earlier.
    fn record_test_result(&self, report: Report);

    /// The flow graph of this build, or `None` for builds that are not pipelines.
    fn flow_graph(&self) -> Result<Option<Arc<FlowGraph>>, HostError>;

    /// The workspace of a whole build, for builds that are not pipelines.
    fn workspace(&self) -> Option<WorkspaceLocation>;

    /// Returns true if this is one configuration of a multi-configuration build.
    fn is_multi_configuration(&self) -> bool {
        false
    }

    /// Marks this build as unstable. The outcome never gets better than it already is.
    fn mark_unstable(&self);

    /// Attaches a warning to a node of this build's flow graph.
    fn add_node_warning(&self, node: &FlowNodeId, message: String);

    /// Writes a line to the build's console.
    fn console(&self, line: &str);

    /// Persists the handles currently attached to this build.
    fn save(&self, attached: &[HandleConfig]) -> Result<(), HostError>;
}
