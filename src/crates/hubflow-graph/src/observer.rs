//! Step observation
//!
//! A [`StepObserver`] is told about every node transition as it happens:
//! the name of the node that just ran and the state it produced. Observers
//! only watch. The state they see is borrowed and the run continues the
//! same way whether anyone is listening or not.

use async_trait::async_trait;

/// Receives `(node, state)` after each node executes
#[async_trait]
pub trait StepObserver<S: Sync>: Send {
    /// Called once per executed node, in execution order
    async fn on_step(&mut self, node: &str, state: &S);
}

/// Observer that ignores every step
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

#[async_trait]
impl<S: Sync> StepObserver<S> for NoopObserver {
    async fn on_step(&mut self, _node: &str, _state: &S) {}
}

/// Observer that records the visited node names
///
/// Handy for asserting the path a run took.
#[derive(Debug, Default, Clone)]
pub struct PathRecorder {
    path: Vec<String>,
}

impl PathRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node names in the order they ran
    pub fn path(&self) -> &[String] {
        &self.path
    }
}

#[async_trait]
impl<S: Sync> StepObserver<S> for PathRecorder {
    async fn on_step(&mut self, node: &str, _state: &S) {
        self.path.push(node.to_string());
    }
}
