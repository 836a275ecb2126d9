//! Streaming execution
//!
//! ```text
//! ┌──────────────┐   Bounded channel (100)   ┌─────────────┐
//! │ spawned run  │ ────────────────────────► │  consumer   │
//! │  + observer  │       StreamEvent<S>      │  (Stream)   │
//! └──────────────┘                           └─────────────┘
//! ```
//!
//! The run executes on its own tokio task. A slow consumer applies
//! backpressure through the bounded channel; a consumer that drops the
//! stream simply stops receiving events while the run finishes.

use super::CompiledGraph;
use crate::error::GraphError;
use crate::graph::NodeId;
use crate::observer::StepObserver;
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;
use tokio::sync::mpsc;

/// Capacity of the channel between a running graph and its stream
pub const STREAM_BUFFER: usize = 100;

/// Events yielded by [`CompiledGraph::stream`]
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent<S> {
    /// A node finished and produced `state`
    Update {
        /// Node that just executed
        node: NodeId,
        /// State after the node
        state: S,
    },
    /// The run reached END
    Complete {
        /// Final state
        state: S,
    },
    /// The run stopped with an error
    Error {
        /// Why execution stopped
        error: GraphError,
    },
}

impl<S> StreamEvent<S> {
    /// True for `Complete` and `Error`
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Update { .. })
    }
}

/// Stream of [`StreamEvent`]s, always ending with exactly one terminal event
pub type GraphStream<S> = Pin<Box<dyn Stream<Item = StreamEvent<S>> + Send>>;

/// Observer that forwards every step into an mpsc channel
#[derive(Debug)]
pub struct ChannelObserver<S> {
    tx: mpsc::Sender<StreamEvent<S>>,
}

impl<S> ChannelObserver<S> {
    pub fn new(tx: mpsc::Sender<StreamEvent<S>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl<S> StepObserver<S> for ChannelObserver<S>
where
    S: Clone + Send + Sync,
{
    async fn on_step(&mut self, node: &str, state: &S) {
        let event = StreamEvent::Update {
            node: node.to_string(),
            state: state.clone(),
        };
        // A closed receiver means nobody is listening; the run carries on.
        let _ = self.tx.send(event).await;
    }
}

impl<S> CompiledGraph<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Run the graph on a background task and stream its transitions
    ///
    /// Must be called from within a tokio runtime. The stream is finite and
    /// cannot be restarted; call `stream` again for a fresh run.
    ///
    /// # Example
    ///
    /// ```rust
    /// use futures::StreamExt;
    /// use hubflow_graph::{StateGraph, StreamEvent, END, START};
    ///
    /// # async fn example() -> hubflow_graph::Result<()> {
    /// let mut graph = StateGraph::<u8>::new("one_step");
    /// graph.add_node("bump", |n: u8| async move { Ok(n + 1) });
    /// graph.add_edge(START, "bump");
    /// graph.add_edge("bump", END);
    ///
    /// let events: Vec<_> = graph.compile()?.stream(1).collect().await;
    /// assert_eq!(events.last(), Some(&StreamEvent::Complete { state: 2 }));
    /// # Ok(())
    /// # }
    /// ```
    pub fn stream(&self, input: S) -> GraphStream<S> {
        let (tx, mut rx) = mpsc::channel(STREAM_BUFFER);
        let graph = self.clone();

        tokio::spawn(async move {
            let mut observer = ChannelObserver::new(tx.clone());
            let terminal = match graph.invoke_with_observer(input, &mut observer).await {
                Ok(state) => StreamEvent::Complete { state },
                Err(error) => StreamEvent::Error { error },
            };
            let _ = tx.send(terminal).await;
        });

        Box::pin(async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        })
    }
}
