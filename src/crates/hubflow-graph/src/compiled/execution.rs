//! Graph execution methods (invoke, invoke_with_observer)

use super::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::graph::{Edge, NodeId, END, START};
use crate::observer::{NoopObserver, StepObserver};

impl<S> CompiledGraph<S>
where
    S: Send + Sync + 'static,
{
    /// Execute the graph to completion
    ///
    /// # Example
    ///
    /// ```rust
    /// use hubflow_graph::{StateGraph, END, START};
    ///
    /// # async fn example() -> hubflow_graph::Result<()> {
    /// let mut graph = StateGraph::<i64>::new("double");
    /// graph.add_node("double", |n: i64| async move { Ok(n * 2) });
    /// graph.add_edge(START, "double");
    /// graph.add_edge("double", END);
    ///
    /// let compiled = graph.compile()?;
    /// assert_eq!(compiled.invoke(21).await?, 42);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn invoke(&self, input: S) -> Result<S> {
        self.invoke_with_observer(input, &mut NoopObserver).await
    }

    /// Execute the graph, reporting each transition to `observer`
    ///
    /// The observer is called after every node with the node name and the
    /// state it produced. The final state is the same as [`invoke`] would
    /// return.
    ///
    /// # Errors
    ///
    /// - [`GraphError::Routing`] if a router returns an unmapped label
    /// - whatever error a node returns, unchanged
    ///
    /// [`invoke`]: Self::invoke
    pub async fn invoke_with_observer<O>(&self, input: S, observer: &mut O) -> Result<S>
    where
        O: StepObserver<S> + ?Sized,
    {
        let mut state = input;
        let mut current = self.next_node(START, &state)?;
        let mut steps: u64 = 0;

        while current != END {
            let executor = self
                .executor(&current)
                .cloned()
                .ok_or_else(|| GraphError::Execution(format!("Node '{}' not found", current)))?;

            tracing::trace!(graph = %self.name(), node = %current, step = steps, "Executing node");

            state = executor(state).await.map_err(|e| {
                tracing::debug!(graph = %self.name(), node = %current, error = %e, "Node failed");
                e
            })?;
            steps += 1;

            observer.on_step(&current, &state).await;
            current = self.next_node(&current, &state)?;
        }

        tracing::trace!(graph = %self.name(), steps, "Graph reached END");
        Ok(state)
    }

    /// Resolve the successor of `from` for the given state
    pub(crate) fn next_node(&self, from: &str, state: &S) -> Result<NodeId> {
        match self.edge(from) {
            Some(Edge::Direct(target)) => Ok(target.clone()),
            Some(Edge::Conditional { router, branches }) => {
                let label = router(state);
                branches.get(&label).cloned().ok_or_else(|| {
                    tracing::error!(
                        graph = %self.name(),
                        node = %from,
                        label = %label,
                        "Unmapped routing label"
                    );
                    GraphError::routing(from, label)
                })
            }
            None => Err(GraphError::Execution(format!(
                "Node '{}' has no outgoing edge",
                from
            ))),
        }
    }
}
