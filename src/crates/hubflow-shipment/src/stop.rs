//! Stop processor
//!
//! ```text
//! START ──► check_stop_type ──┬── "pickup" ──────────────► END
//!                             └── "dropoff" ──► process_pos ──► END
//! ```
//!
//! Pickups are confirmed upstream and bypass PO processing. Drop-offs hand
//! their POs to the [`PoFanOut`] and take their escalation from its
//! aggregate.

use crate::error::StopError;
use crate::fanout::{FanOutResult, PoFanOut, FALLBACK_ESCALATION_REASON};
use crate::model::{PoState, Stop, StopType};
use crate::po::PoOutcome;
use hubflow_graph::{CompiledGraph, StateGraph, END, START};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Node names of the stop graph
pub const CHECK_STOP_TYPE: &str = "check_stop_type";
pub const PROCESS_POS: &str = "process_pos";

/// Run state threaded through the stop graph
#[derive(Debug, Clone, Serialize)]
pub struct StopRunState {
    pub stop: Stop,
    pub po_results: BTreeMap<String, PoState>,
    pub po_outcomes: Vec<PoOutcome>,
    pub all_pos_processed: bool,
    #[serde(skip)]
    cancel: CancellationToken,
}

impl StopRunState {
    pub fn new(stop: Stop, cancel: CancellationToken) -> Self {
        Self {
            stop,
            po_results: BTreeMap::new(),
            po_outcomes: Vec::new(),
            all_pos_processed: false,
            cancel,
        }
    }
}

/// What one stop produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopOutcome {
    pub stop_id: i64,
    pub stop_type: StopType,
    pub po_outcomes: Vec<PoOutcome>,
    /// Equal to the stop's final `is_escalated`
    pub needs_human_review: bool,
    pub escalation_message: Option<String>,
}

/// Full output of [`StopProcessor::process`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedStop {
    pub stop: Stop,
    pub po_results: BTreeMap<String, PoState>,
    pub outcome: StopOutcome,
}

impl From<StopRunState> for ProcessedStop {
    fn from(state: StopRunState) -> Self {
        let outcome = StopOutcome {
            stop_id: state.stop.id,
            stop_type: state.stop.stop_type,
            po_outcomes: state.po_outcomes,
            needs_human_review: state.stop.is_escalated,
            escalation_message: state.stop.escalation_reason.clone(),
        };
        Self {
            stop: state.stop,
            po_results: state.po_results,
            outcome,
        }
    }
}

fn route_stop_type(state: &StopRunState) -> String {
    match state.stop.stop_type {
        StopType::PickUp => "pickup".to_string(),
        StopType::DropOff => "dropoff".to_string(),
    }
}

/// Decide the stop's path; pickups are settled here
fn check_stop_type(mut state: StopRunState) -> StopRunState {
    debug!(stop_id = state.stop.id, stop_type = %state.stop.stop_type, "Checking stop type");

    if state.stop.stop_type == StopType::PickUp {
        info!(stop_id = state.stop.id, "Pickup stop, skipping PO processing");
        state.stop.is_escalated = false;
        state.stop.escalation_reason = None;
        state.po_results.clear();
        state.all_pos_processed = true;
    }
    state
}

async fn process_pos(
    mut state: StopRunState,
    fan_out: PoFanOut,
) -> Result<StopRunState, StopError> {
    let stop_id = state.stop.id;
    let pos = std::mem::take(&mut state.stop.po_list);

    let batch: FanOutResult = fan_out.run(stop_id, pos, &state.cancel).await?;
    let is_escalated = batch.is_escalated;

    state.stop.po_list = batch.pos();
    state.stop.is_escalated = is_escalated;
    state.stop.escalation_reason = if is_escalated {
        Some(
            batch
                .escalation_reason
                .unwrap_or_else(|| FALLBACK_ESCALATION_REASON.to_string()),
        )
    } else {
        None
    };
    state.po_results = batch.results;
    state.po_outcomes = batch.outcomes;
    state.all_pos_processed = true;

    if is_escalated {
        warn!(
            stop_id,
            reason = state.stop.escalation_reason.as_deref().unwrap_or_default(),
            "Stop escalated"
        );
    } else {
        info!(stop_id, po_count = state.po_results.len(), "All POs resolved");
    }
    Ok(state)
}

/// Runs the stop graph
#[derive(Clone)]
pub struct StopProcessor {
    graph: CompiledGraph<StopRunState>,
}

impl std::fmt::Debug for StopProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopProcessor")
            .field("graph", &self.graph.name())
            .finish()
    }
}

impl StopProcessor {
    pub fn new(fan_out: PoFanOut) -> hubflow_graph::Result<Self> {
        let mut graph = StateGraph::<StopRunState>::new("stop");

        graph.add_node(CHECK_STOP_TYPE, |state: StopRunState| async move {
            Ok(check_stop_type(state))
        });
        graph.add_node(PROCESS_POS, move |state: StopRunState| {
            let fan_out = fan_out.clone();
            async move {
                process_pos(state, fan_out)
                    .await
                    .map_err(StopError::into_graph_error)
            }
        });

        graph.add_edge(START, CHECK_STOP_TYPE);
        graph.add_conditional_edge(
            CHECK_STOP_TYPE,
            route_stop_type,
            [("pickup", END), ("dropoff", PROCESS_POS)],
        );
        graph.add_edge(PROCESS_POS, END);

        Ok(Self {
            graph: graph.compile()?,
        })
    }

    pub fn graph(&self) -> &CompiledGraph<StopRunState> {
        &self.graph
    }

    /// Process one stop
    ///
    /// # Errors
    ///
    /// Fails only when the stop's fan-out is cut short (deadline or
    /// cancellation). PO-level problems are part of the outcome.
    pub async fn process(
        &self,
        stop: Stop,
        cancel: CancellationToken,
    ) -> hubflow_graph::Result<ProcessedStop> {
        let state = self.graph.invoke(StopRunState::new(stop, cancel)).await?;
        Ok(ProcessedStop::from(state))
    }
}
