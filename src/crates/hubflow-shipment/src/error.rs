//! Error types for shipment processing
//!
//! ```text
//! EngineError
//! ├── Validation     - input shipment is malformed (caller-correctable)
//! ├── Configuration  - engine settings are out of range
//! ├── Build          - workflow graphs failed to compile (wiring defect)
//! └── Processing     - a run stopped part-way; carries the partial result
//!
//! ReviewError        - reviewer failures, isolated to a single PO
//! StopError          - a stop's fan-out was cut short (deadline, cancellation)
//! ```

use crate::engine::ShipmentRunResult;
use hubflow_graph::GraphError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// The input shipment does not conform to the data model
///
/// Detected before orchestration starts; the run never begins.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The document could not be decoded (bad JSON, unknown enum value,
    /// missing field, wrong type)
    #[error("Malformed shipment document: {0}")]
    Malformed(String),

    /// A required identifier is blank
    #[error("Field '{field}' of {entity} must not be empty")]
    EmptyField {
        entity: String,
        field: &'static str,
    },

    /// Two stops share an id
    #[error("Stop id {0} appears more than once")]
    DuplicateStop(i64),

    /// Two POs in one stop share a number
    #[error("PO '{po_num}' appears more than once in stop {stop_id}")]
    DuplicatePo { stop_id: i64, po_num: String },

    /// A stop names a different parent shipment
    #[error("Stop {stop_id} belongs to shipment {found}, expected {expected}")]
    ForeignStop {
        stop_id: i64,
        found: i64,
        expected: i64,
    },
}

/// Failure of the external reviewer for one PO
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReviewError {
    /// The reviewer could not produce an answer
    #[error("Reviewer unavailable: {0}")]
    Unavailable(String),

    /// The reviewer did not answer before the deadline
    #[error("Reviewer did not answer within {0:?}")]
    Timeout(Duration),

    /// The run was cancelled while waiting for the reviewer
    #[error("Review cancelled")]
    Cancelled,
}

/// Why a single PO could not be resolved
///
/// Reported next to the PO's result label; never aborts sibling POs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoFailure {
    /// A reviewer call exceeded `review_timeout_secs`
    ReviewTimeout { after_ms: u64 },
    /// The reviewer returned an error
    ReviewerUnavailable { message: String },
    /// The run was cancelled during review
    Cancelled,
    /// The PO task failed for any other reason (including a panic)
    Unexpected { message: String },
}

impl From<ReviewError> for PoFailure {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::Unavailable(message) => PoFailure::ReviewerUnavailable { message },
            ReviewError::Timeout(after) => PoFailure::ReviewTimeout {
                after_ms: after.as_millis() as u64,
            },
            ReviewError::Cancelled => PoFailure::Cancelled,
        }
    }
}

impl std::fmt::Display for PoFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoFailure::ReviewTimeout { after_ms } => {
                write!(f, "review timed out after {}ms", after_ms)
            }
            PoFailure::ReviewerUnavailable { message } => {
                write!(f, "reviewer unavailable: {}", message)
            }
            PoFailure::Cancelled => f.write_str("review cancelled"),
            PoFailure::Unexpected { message } => write!(f, "unexpected failure: {}", message),
        }
    }
}

/// A stop's PO fan-out did not run to completion
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StopError {
    #[error("Stop {stop_id} exceeded its {after:?} deadline")]
    Timeout { stop_id: i64, after: Duration },

    #[error("Stop {stop_id} was cancelled")]
    Cancelled { stop_id: i64 },
}

impl StopError {
    /// Map onto the runtime's error taxonomy
    pub fn into_graph_error(self) -> GraphError {
        match self {
            StopError::Timeout { stop_id, after } => GraphError::Timeout {
                operation: format!("stop {}", stop_id),
                duration_ms: after.as_millis() as u64,
            },
            StopError::Cancelled { stop_id } => {
                GraphError::Cancelled(format!("stop {} was cancelled", stop_id))
            }
        }
    }
}

/// Errors surfaced by [`ShipmentEngine`](crate::ShipmentEngine)
#[derive(Error, Debug)]
pub enum EngineError {
    /// The shipment was rejected before processing started
    #[error("Invalid shipment: {0}")]
    Validation(#[from] ValidationError),

    /// Engine settings are invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A workflow graph failed to compile
    #[error("Failed to build workflow: {0}")]
    Build(#[source] GraphError),

    /// Processing stopped part-way
    ///
    /// `partial` holds every stop processed before the failure, with
    /// `processing_complete == false`.
    #[error("Shipment processing failed: {error}")]
    Processing {
        #[source]
        error: GraphError,
        partial: Box<ShipmentRunResult>,
    },
}

impl EngineError {
    /// True when the caller can fix the problem by changing its input
    pub fn is_caller_error(&self) -> bool {
        matches!(self, EngineError::Validation(_) | EngineError::Configuration(_))
    }

    /// Partial result of an interrupted run, if any
    pub fn partial(&self) -> Option<&ShipmentRunResult> {
        match self {
            EngineError::Processing { partial, .. } => Some(partial),
            _ => None,
        }
    }
}
