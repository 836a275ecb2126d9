//! StateGraph builder API
//!
//! [`StateGraph`] is the way workflows are assembled: register async nodes,
//! connect them with direct or conditional edges, then [`compile`] into an
//! executable [`CompiledGraph`].
//!
//! ```text
//! StateGraph (builder)                      CompiledGraph (executable)
//! ┌───────────────────────────┐ compile() ┌──────────────────────────┐
//! │ nodes  + edges + routers  │ ────────► │ validated, immutable,    │
//! │ (mutable, may be invalid) │           │ cheap to clone and share │
//! └───────────────────────────┘           └──────────────────────────┘
//! ```
//!
//! Mistakes made while building (duplicate node names, reserved names, a
//! second outgoing edge for the same node) are recorded and reported by
//! [`compile`], so building code can stay a flat list of calls.
//!
//! # Example
//!
//! ```rust
//! use hubflow_graph::{StateGraph, END, START};
//!
//! # async fn example() -> hubflow_graph::Result<()> {
//! let mut graph = StateGraph::<u32>::new("counter");
//! graph.add_node("increment", |n: u32| async move { Ok(n + 1) });
//! graph.add_edge(START, "increment");
//! graph.add_conditional_edge(
//!     "increment",
//!     |n: &u32| if *n < 3 { "again".to_string() } else { "done".to_string() },
//!     [("again", "increment"), ("done", END)],
//! );
//!
//! let compiled = graph.compile()?;
//! assert_eq!(compiled.invoke(0).await?, 3);
//! # Ok(())
//! # }
//! ```
//!
//! [`compile`]: StateGraph::compile

use crate::compiled::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::graph::{Edge, Graph, NodeExecutor, NodeId, END, START};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

/// Builder for a state machine over states of type `S`
pub struct StateGraph<S> {
    name: String,
    graph: Graph<S>,
    errors: Vec<String>,
}

impl<S> StateGraph<S>
where
    S: Send + 'static,
{
    /// Create an empty builder. The name shows up in logs and errors.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: Graph::new(),
            errors: Vec::new(),
        }
    }

    /// Add a node
    ///
    /// The executor receives the state by value and returns the next state.
    pub fn add_node<F, Fut>(&mut self, id: impl Into<NodeId>, executor: F) -> &mut Self
    where
        F: Fn(S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S>> + Send + 'static,
    {
        let executor: NodeExecutor<S> = Arc::new(move |state| Box::pin(executor(state)));
        self.add_node_with_executor(id, executor)
    }

    /// Add a node from an already boxed executor
    pub fn add_node_with_executor(
        &mut self,
        id: impl Into<NodeId>,
        executor: NodeExecutor<S>,
    ) -> &mut Self {
        let id = id.into();

        if id == START || id == END {
            self.errors.push(format!("Node name '{}' is reserved", id));
        } else if self.graph.nodes.contains_key(&id) {
            self.errors.push(format!("Node '{}' is defined twice", id));
        } else {
            self.graph.nodes.insert(id, executor);
        }

        self
    }

    /// Add an unconditional edge
    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> &mut Self {
        let from = from.into();
        self.insert_edge(from, Edge::Direct(to.into()));
        self
    }

    /// Add a conditional edge
    ///
    /// `branches` is the exhaustive list of labels `router` may return,
    /// each mapped to a target node or [`END`].
    pub fn add_conditional_edge<R, I, L, T>(
        &mut self,
        from: impl Into<NodeId>,
        router: R,
        branches: I,
    ) -> &mut Self
    where
        R: Fn(&S) -> String + Send + Sync + 'static,
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<NodeId>,
    {
        let from = from.into();
        let branches: BTreeMap<String, NodeId> = branches
            .into_iter()
            .map(|(label, target)| (label.into(), target.into()))
            .collect();

        self.insert_edge(
            from,
            Edge::Conditional {
                router: Arc::new(router),
                branches,
            },
        );
        self
    }

    /// Shortcut for `add_edge(START, node)`
    pub fn set_entry(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.add_edge(START, node)
    }

    fn insert_edge(&mut self, from: NodeId, edge: Edge<S>) {
        if from == END {
            self.errors.push("END cannot have outgoing edges".to_string());
            return;
        }
        if self.graph.edges.contains_key(&from) {
            self.errors.push(format!("Node '{}' already has an outgoing edge", from));
            return;
        }
        self.graph.edges.insert(from, edge);
    }

    /// Access the graph under construction
    pub fn graph(&self) -> &Graph<S> {
        &self.graph
    }

    /// Validate and freeze the graph
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for the first recorded builder
    /// mistake or structural problem (see [`Graph::validate`]).
    pub fn compile(self) -> Result<CompiledGraph<S>> {
        if let Some(first) = self.errors.first() {
            tracing::error!(graph = %self.name, error = %first, "Graph build failed");
            return Err(GraphError::Validation(format!("{}: {}", self.name, first)));
        }

        self.graph
            .validate()
            .map_err(|e| match e {
                GraphError::Validation(msg) => {
                    GraphError::Validation(format!("{}: {}", self.name, msg))
                }
                other => other,
            })?;

        let unreachable = self.graph.unreachable_nodes();
        if !unreachable.is_empty() {
            tracing::warn!(graph = %self.name, nodes = ?unreachable, "Graph has unreachable nodes");
        }

        tracing::debug!(
            graph = %self.name,
            node_count = self.graph.nodes.len(),
            "Compiled graph"
        );

        Ok(CompiledGraph::new(self.name, self.graph))
    }
}
