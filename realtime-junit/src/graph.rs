// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flow graphs of pipeline builds.
//!
//! A pipeline build is recorded as a directed acyclic graph of flow nodes. Edges point from a node
//! to the nodes that ran after it, so the *heads* of the graph are the most recently added nodes.
//! Blocks (stages, parallel branches, `node` allocations and so on) are delimited by a start node
//! and an end node.

use crate::{errors::FlowGraphError, host::WorkspaceLocation};
use junit_report::PipelineDetails;
use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::{Dfs, Reversed, Visitable},
};
use serde::{Deserialize, Serialize};
use std::{borrow::Borrow, collections::HashMap, fmt};

/// The function name of the dedicated JUnit archiving step.
pub const JUNIT_FUNCTION: &str = "junit";

/// The function name of the generic step that delegates to a build step implementation.
pub const GENERIC_STEP_FUNCTION: &str = "step";

/// The delegate name of the JUnit archiver, when run through [`GENERIC_STEP_FUNCTION`].
pub const JUNIT_ARCHIVER_DELEGATE: &str = "JUnitResultArchiver";

/// The identifier of a flow node.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowNodeId(String);

impl FlowNodeId {
    /// Creates a new flow node identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlowNodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl Borrow<str> for FlowNodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The kind of a flow node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FlowNodeKind {
    /// The start of a block.
    BlockStart,

    /// The end of the block started by `start`.
    BlockEnd {
        /// The start node of the block.
        start: FlowNodeId,
    },

    /// A step that does not open a block.
    Atom,
}

/// A human-readable label on a flow node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeLabel {
    /// A display label, as carried by stages.
    Display(String),

    /// A thread name, as carried by parallel branches.
    ThreadName(String),
}

impl NodeLabel {
    /// The name of the block this label belongs to.
    pub fn name(&self) -> &str {
        match self {
            NodeLabel::Display(name) | NodeLabel::ThreadName(name) => name,
        }
    }
}

/// Arguments of a JUnit archiving step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArchiverArguments {
    /// The report glob.
    pub test_results: String,

    /// Whether long standard output and standard error were kept.
    pub keep_long_stdio: bool,
}

/// A single node in a flow graph.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlowNode {
    /// The identifier of this node.
    pub id: FlowNodeId,

    /// The kind of this node.
    pub kind: FlowNodeKind,

    /// The function name of the step that produced this node.
    pub function_name: String,

    /// For [`GENERIC_STEP_FUNCTION`] nodes, the name of the step implementation delegated to.
    pub delegate: Option<String>,

    /// The nodes that ran immediately before this one.
    pub parents: Vec<FlowNodeId>,

    /// The start node of the innermost block enclosing this node.
    pub enclosing: Option<FlowNodeId>,

    /// The label of this node.
    pub label: Option<NodeLabel>,

    /// The workspace allocated by this node, if it allocates one.
    pub workspace: Option<WorkspaceLocation>,

    /// The arguments of this node, if it is a JUnit archiving step.
    pub archiver: Option<ArchiverArguments>,
}

impl FlowNode {
    fn new(id: impl Into<String>, kind: FlowNodeKind, function_name: impl Into<String>) -> Self {
        Self {
            id: FlowNodeId::new(id),
            kind,
            function_name: function_name.into(),
            delegate: None,
            parents: vec![],
            enclosing: None,
            label: None,
            workspace: None,
            archiver: None,
        }
    }

    /// Creates a node that starts a block.
    pub fn block_start(id: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self::new(id, FlowNodeKind::BlockStart, function_name)
    }

    /// Creates a node that ends the block started by `start`.
    pub fn block_end(
        id: impl Into<String>,
        function_name: impl Into<String>,
        start: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            FlowNodeKind::BlockEnd {
                start: FlowNodeId::new(start),
            },
            function_name,
        )
    }

    /// Creates a node for a step that does not open a block.
    pub fn atom(id: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self::new(id, FlowNodeKind::Atom, function_name)
    }

    /// Sets the parents of this node.
    pub fn with_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents = parents.into_iter().map(FlowNodeId::new).collect();
        self
    }

    /// Sets the innermost block enclosing this node.
    pub fn with_enclosing(mut self, enclosing: impl Into<String>) -> Self {
        self.enclosing = Some(FlowNodeId::new(enclosing));
        self
    }

    /// Sets the label of this node.
    pub fn with_label(mut self, label: NodeLabel) -> Self {
        self.label = Some(label);
        self
    }

    /// Marks this node as allocating the given workspace.
    pub fn with_workspace(mut self, workspace: WorkspaceLocation) -> Self {
        self.workspace = Some(workspace);
        self
    }

    /// Sets the step implementation this node delegates to.
    pub fn with_delegate(mut self, delegate: impl Into<String>) -> Self {
        self.delegate = Some(delegate.into());
        self
    }

    /// Records the arguments of a JUnit archiving step.
    pub fn with_archiver_arguments(
        mut self,
        test_results: impl Into<String>,
        keep_long_stdio: bool,
    ) -> Self {
        self.archiver = Some(ArchiverArguments {
            test_results: test_results.into(),
            keep_long_stdio,
        });
        self
    }

    /// Returns true if this node is a JUnit archiving step.
    pub fn is_junit_archiver(&self) -> bool {
        match self.function_name.as_str() {
            JUNIT_FUNCTION => true,
            GENERIC_STEP_FUNCTION => self.delegate.as_deref() == Some(JUNIT_ARCHIVER_DELEGATE),
            _ => false,
        }
    }

    /// Returns true if this node starts a stage or a parallel branch.
    pub fn is_stage_or_parallel(&self) -> bool {
        self.kind == FlowNodeKind::BlockStart && self.label.is_some()
    }

    /// The block name of this node: its thread name for parallel branches, its display label
    /// otherwise.
    pub fn block_name(&self) -> Option<&str> {
        self.label.as_ref().map(NodeLabel::name)
    }
}

/// Returns a predicate matching nodes whose block name is `name`.
pub fn block_named(name: &str) -> impl Fn(&FlowNode) -> bool + '_ {
    move |node| node.block_name() == Some(name)
}

/// The flow graph of a pipeline build.
#[derive(Clone, Debug, Default)]
pub struct FlowGraph {
    graph: DiGraph<FlowNode, ()>,
    indexes: HashMap<FlowNodeId, NodeIndex>,
}

impl FlowGraph {
    /// Creates a new, empty flow graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from nodes in the order they were added.
    pub fn from_nodes(nodes: impl IntoIterator<Item = FlowNode>) -> Result<Self, FlowGraphError> {
        let mut graph = Self::new();
        for node in nodes {
            graph.add_node(node)?;
        }
        Ok(graph)
    }

    /// Adds a node to the graph. Every node it refers to must already be present.
    pub fn add_node(&mut self, node: FlowNode) -> Result<&FlowNode, FlowGraphError> {
        if self.indexes.contains_key(&node.id) {
            return Err(FlowGraphError::DuplicateNode { id: node.id });
        }

        let referenced = node.parents.iter().chain(&node.enclosing).chain(match &node.kind {
            FlowNodeKind::BlockEnd { start } => Some(start),
            _ => None,
        });
        for id in referenced {
            if !self.indexes.contains_key(id) {
                return Err(FlowGraphError::UnknownNode {
                    id: node.id.clone(),
                    unknown: id.clone(),
                });
            }
        }

        let parents: Vec<_> = node.parents.iter().map(|id| self.indexes[id]).collect();
        let id = node.id.clone();
        let ix = self.graph.add_node(node);
        for parent in parents {
            self.graph.add_edge(parent, ix, ());
        }
        self.indexes.insert(id, ix);
        Ok(&self.graph[ix])
    }

    /// Returns the node with the given identifier.
    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.indexes.get(id).map(|ix| &self.graph[*ix])
    }

    /// The number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns true if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// The current heads of the graph, most recently added first.
    pub fn heads(&self) -> impl Iterator<Item = &FlowNode> + '_ {
        self.head_indexes().map(|ix| &self.graph[ix])
    }

    /// Walks the graph depth-first, from the heads back towards the start.
    pub fn iter_depth_first(&self) -> DepthFirstIter<'_> {
        let mut heads: Vec<_> = self.head_indexes().collect();
        heads.reverse();
        let dfs = match heads.pop() {
            Some(first) => Dfs::new(Reversed(&self.graph), first),
            None => Dfs::empty(Reversed(&self.graph)),
        };
        DepthFirstIter {
            graph: self,
            dfs,
            remaining_heads: heads,
        }
    }

    /// Returns the first node matching `predicate` in depth-first order from the heads.
    pub fn find_first(&self, predicate: impl Fn(&FlowNode) -> bool) -> Option<&FlowNode> {
        self.iter_depth_first().find(|node| predicate(node))
    }

    /// The start nodes of all blocks enclosing the given node, innermost first.
    pub fn enclosing_blocks(&self, id: &str) -> Vec<&FlowNode> {
        let mut blocks = vec![];
        let mut next = self.node(id).and_then(|node| node.enclosing.as_ref());
        while let Some(enclosing) = next {
            let Some(node) = self.node(enclosing.as_str()) else {
                break;
            };
            blocks.push(node);
            next = node.enclosing.as_ref();
        }
        blocks
    }

    /// The stages and parallel branches enclosing the given node, innermost first.
    pub fn enclosing_stages_and_parallels(&self, id: &str) -> Vec<&FlowNode> {
        self.enclosing_blocks(id)
            .into_iter()
            .filter(|node| node.is_stage_or_parallel())
            .collect()
    }

    /// The name of the innermost named stage or parallel branch enclosing the given node.
    pub fn enclosing_block_name(&self, id: &str) -> Option<&str> {
        self.enclosing_stages_and_parallels(id)
            .into_iter()
            .find_map(|node| node.block_name())
    }

    /// Describes where in this graph the given node sits, for stamping onto parsed test suites.
    pub fn pipeline_details(&self, id: &str) -> PipelineDetails {
        let mut details = PipelineDetails::new(id);
        for block in self.enclosing_stages_and_parallels(id) {
            details.enclosing_blocks.push(block.id.to_string());
            details
                .enclosing_block_names
                .push(block.block_name().unwrap_or_default().to_owned());
        }
        details
    }

    fn head_indexes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph
            .node_indices()
            .rev()
            .filter(|ix| {
                self.graph
                    .neighbors_directed(*ix, Direction::Outgoing)
                    .next()
                    .is_none()
            })
    }
}

/// A depth-first iterator over a [`FlowGraph`], returned by [`FlowGraph::iter_depth_first`].
pub struct DepthFirstIter<'g> {
    graph: &'g FlowGraph,
    dfs: Dfs<NodeIndex, <DiGraph<FlowNode, ()> as Visitable>::Map>,
    remaining_heads: Vec<NodeIndex>,
}

impl<'g> Iterator for DepthFirstIter<'g> {
    type Item = &'g FlowNode;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(ix) = self.dfs.next(Reversed(&self.graph.graph)) {
                return Some(&self.graph.graph[ix]);
            }
            let head = self.remaining_heads.pop()?;
            self.dfs.move_to(head);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::two_stage_graph;
    use pretty_assertions::assert_eq;

    #[test]
    fn depth_first_from_heads() {
        let graph = two_stage_graph();
        let heads: Vec<_> = graph.heads().map(|node| node.id.as_str()).collect();
        assert_eq!(heads, vec!["13"]);

        let order: Vec<_> = graph
            .iter_depth_first()
            .map(|node| node.id.as_str())
            .collect();
        assert_eq!(
            order,
            vec!["13", "12", "11", "10", "9", "8", "7", "6", "5", "4", "3", "2", "1"]
        );
    }

    #[test]
    fn find_block_by_name() {
        let graph = two_stage_graph();
        let stage = graph.find_first(block_named("stage1")).unwrap();
        assert_eq!(stage.id.as_str(), "2");
        let branch = graph.find_first(block_named("branch-b")).unwrap();
        assert_eq!(branch.id.as_str(), "10");
        assert!(graph.find_first(block_named("stage3")).is_none());
    }

    #[test]
    fn enclosing_names_and_details() {
        let graph = two_stage_graph();
        assert_eq!(graph.enclosing_block_name("5"), Some("stage1"));
        assert_eq!(graph.enclosing_block_name("11"), Some("branch-b"));
        assert_eq!(graph.enclosing_block_name("1"), None);

        let details = graph.pipeline_details("11");
        assert_eq!(details.node_id, "11");
        assert_eq!(details.enclosing_blocks, vec!["10", "9"]);
        assert_eq!(details.enclosing_block_names, vec!["branch-b", "stage2"]);
    }

    #[test]
    fn archiver_steps() {
        let graph = two_stage_graph();
        let archivers: Vec<_> = graph
            .iter_depth_first()
            .filter(|node| node.is_junit_archiver())
            .map(|node| node.id.as_str())
            .collect();
        assert_eq!(archivers, vec!["11", "5"]);
        assert!(!FlowNode::atom("x", GENERIC_STEP_FUNCTION).is_junit_archiver());
    }

    #[test]
    fn rejects_malformed_nodes() {
        let mut graph = FlowGraph::new();
        graph.add_node(FlowNode::block_start("1", "flow-start")).unwrap();
        assert_eq!(
            graph.add_node(FlowNode::atom("1", "sh")).unwrap_err(),
            FlowGraphError::DuplicateNode { id: "1".into() }
        );
        assert_eq!(
            graph
                .add_node(FlowNode::atom("2", "sh").with_parents(["7"]))
                .unwrap_err(),
            FlowGraphError::UnknownNode {
                id: "2".into(),
                unknown: "7".into()
            }
        );
    }
}
