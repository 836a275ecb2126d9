//! Error types for graph construction and execution
//!
//! All errors implement `std::error::Error` via the `thiserror` crate.
//!
//! # Error Hierarchy
//!
//! ```text
//! GraphError
//! ├── Validation      - Graph structure errors, raised by compile()
//! ├── Routing         - Router returned a label with no mapped destination
//! ├── NodeExecution   - Node execution failures
//! ├── Execution       - General execution errors
//! ├── Timeout         - A node exceeded a caller-set deadline
//! └── Cancelled       - The run was cancelled by its caller
//! ```
//!
//! `Validation` and `Routing` both indicate a defect in how the graph was
//! wired, not a problem with the data flowing through it. They should never
//! be retried.
//!
//! # Example
//!
//! ```rust
//! use hubflow_graph::error::GraphError;
//!
//! fn describe(err: &GraphError) -> &'static str {
//!     match err {
//!         GraphError::Validation(_) | GraphError::Routing { .. } => "wiring defect",
//!         GraphError::Timeout { .. } | GraphError::Cancelled(_) => "interrupted",
//!         _ => "node failure",
//!     }
//! }
//!
//! let err = GraphError::routing("check", "maybe");
//! assert_eq!(describe(&err), "wiring defect");
//! ```

use thiserror::Error;

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while building or running a graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Graph structure validation failed
    ///
    /// Raised by [`StateGraph::compile`](crate::StateGraph::compile) when the
    /// graph references unknown nodes, has a node without an outgoing edge,
    /// or gives a node more than one successor.
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// A conditional edge produced a label that is not in its branch map
    ///
    /// The branch map is the exhaustive set of labels a router may return.
    /// Anything else is a wiring defect and stops the run immediately.
    #[error("Node '{node}' routed to unmapped label '{label}'")]
    Routing {
        /// Node whose conditional edge was evaluated
        node: String,
        /// Label returned by the router
        label: String,
    },

    /// Node execution failed with context
    ///
    /// ```rust
    /// use hubflow_graph::error::GraphError;
    ///
    /// let err = GraphError::node_execution("invoke_stop", "stop 7 failed");
    /// assert_eq!(format!("{}", err), "Node 'invoke_stop' execution failed: stop 7 failed");
    /// ```
    #[error("Node '{node}' execution failed: {error}")]
    NodeExecution {
        /// Name of the node that failed
        node: String,
        /// Error message from node execution
        error: String,
    },

    /// Generic execution error without specific node context
    #[error("Execution failed: {0}")]
    Execution(String),

    /// An operation inside a node exceeded its deadline
    #[error("Operation timed out after {duration_ms}ms: {operation}")]
    Timeout {
        /// What was being waited on
        operation: String,
        /// The deadline that elapsed
        duration_ms: u64,
    },

    /// The run was cancelled before it could finish
    #[error("Execution cancelled: {0}")]
    Cancelled(String),
}

impl GraphError {
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }

    pub fn routing(node: impl Into<String>, label: impl Into<String>) -> Self {
        Self::Routing {
            node: node.into(),
            label: label.into(),
        }
    }

    /// Returns true for errors caused by how the graph was wired.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Routing { .. })
    }
}
