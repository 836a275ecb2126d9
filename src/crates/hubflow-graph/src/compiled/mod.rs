//! Compiled graph
//!
//! A [`CompiledGraph`] is the validated, immutable form of a
//! [`StateGraph`](crate::StateGraph). Cloning is cheap (the structure sits
//! behind an `Arc`), so one compiled graph can be built at startup and shared
//! by every run.
//!
//! Execution lives in [`execution`] and streaming in [`streaming`].

mod execution;
mod streaming;

pub use streaming::{ChannelObserver, GraphStream, StreamEvent, STREAM_BUFFER};

use crate::graph::{Edge, Graph, NodeId};
use std::sync::Arc;

/// An executable, validated state machine
pub struct CompiledGraph<S> {
    name: Arc<str>,
    graph: Arc<Graph<S>>,
}

impl<S> Clone for CompiledGraph<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            graph: self.graph.clone(),
        }
    }
}

impl<S> std::fmt::Debug for CompiledGraph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("graph", &self.graph)
            .finish()
    }
}

impl<S> CompiledGraph<S> {
    pub(crate) fn new(name: String, graph: Graph<S>) -> Self {
        Self {
            name: Arc::from(name),
            graph: Arc::new(graph),
        }
    }

    /// Name given to the builder
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying graph structure
    pub fn graph(&self) -> &Graph<S> {
        &self.graph
    }

    /// Registered node names, sorted
    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.graph.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Branch labels and targets of a node's conditional edge
    ///
    /// Returns `None` when the node has a direct edge or does not exist.
    pub fn branches(&self, node: &str) -> Option<Vec<(&str, &str)>> {
        match self.graph.edges.get(node)? {
            Edge::Conditional { branches, .. } => Some(
                branches
                    .iter()
                    .map(|(label, target)| (label.as_str(), target.as_str()))
                    .collect(),
            ),
            Edge::Direct(_) => None,
        }
    }

    pub(crate) fn edge(&self, node: &str) -> Option<&Edge<S>> {
        self.graph.edges.get(node)
    }

    pub(crate) fn executor(&self, node: &NodeId) -> Option<&crate::graph::NodeExecutor<S>> {
        self.graph.nodes.get(node)
    }
}
