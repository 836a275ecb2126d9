//! # hubflow-graph - state machine runtime for hubflow workflows
//!
//! A small, typed take on the state-graph model: named async nodes that
//! transform a state value, wired together with direct and conditional
//! edges, validated once and then executed any number of times.
//!
//! - **Typed state**: each graph is generic over its state `S`, threaded by
//!   value from node to node
//! - **Conditional routing**: a router maps the state to a label from an
//!   exhaustive branch map; unknown labels fail fast
//! - **Cycles**: a node may route back to itself or an earlier node
//! - **Observation**: [`StepObserver`] sees every `(node, state)` transition
//! - **Streaming**: [`CompiledGraph::stream`] turns a run into a stream of
//!   [`StreamEvent`]s
//!
//! ## Quick Start
//!
//! ```rust
//! use hubflow_graph::{StateGraph, END, START};
//!
//! #[derive(Clone, Debug, Default)]
//! struct Counter {
//!     value: u32,
//!     limit: u32,
//! }
//!
//! # async fn example() -> hubflow_graph::Result<()> {
//! let mut graph = StateGraph::<Counter>::new("counter");
//! graph.add_node("tick", |mut c: Counter| async move {
//!     c.value += 1;
//!     Ok(c)
//! });
//! graph.add_edge(START, "tick");
//! graph.add_conditional_edge(
//!     "tick",
//!     |c: &Counter| if c.value < c.limit { "continue".into() } else { "complete".into() },
//!     [("continue", "tick"), ("complete", END)],
//! );
//!
//! let compiled = graph.compile()?;
//! let done = compiled.invoke(Counter { value: 0, limit: 5 }).await?;
//! assert_eq!(done.value, 5);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod compiled;
pub mod error;
pub mod graph;
pub mod observer;

pub use builder::StateGraph;
pub use compiled::{ChannelObserver, CompiledGraph, GraphStream, StreamEvent, STREAM_BUFFER};
pub use error::{GraphError, Result};
pub use graph::{Edge, Graph, NodeExecutor, NodeFuture, NodeId, Router, END, START};
pub use observer::{NoopObserver, PathRecorder, StepObserver};
