//! Shipment orchestrator
//!
//! ```text
//! START ──► shipment_processor ──► stop_invoker ──┬── "complete" ──► END
//!                                      ▲          │
//!                                      │          └── "continue"
//!                                      │                 │
//!                                      └──── next_stop ◄─┘
//! ```
//!
//! Stops run strictly one after another. `stop_invoker` processes the stop
//! under the cursor, or marks the run complete once the cursor has passed
//! the last stop; `next_stop` advances the cursor.

use crate::model::{PoState, Shipment};
use crate::stop::{StopOutcome, StopProcessor};
use hubflow_graph::{CompiledGraph, GraphError, StateGraph, StepObserver, END, START};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Node names of the shipment graph
pub const SHIPMENT_PROCESSOR: &str = "shipment_processor";
pub const STOP_INVOKER: &str = "stop_invoker";
pub const NEXT_STOP: &str = "next_stop";

/// Per-stop PO result maps, keyed by stop id
pub type StopResults = BTreeMap<i64, BTreeMap<String, PoState>>;

/// Run state threaded through the shipment graph
#[derive(Debug, Clone, Serialize)]
pub struct ShipmentRunState {
    pub shipment: Shipment,
    /// Index of the next stop to process; never exceeds `shipment.stops.len()`
    pub current_stop_index: usize,
    pub stop_results: StopResults,
    pub stop_outcomes: Vec<StopOutcome>,
    pub processing_complete: bool,
    #[serde(skip)]
    cancel: CancellationToken,
}

impl ShipmentRunState {
    pub fn new(shipment: Shipment, cancel: CancellationToken) -> Self {
        Self {
            shipment,
            current_stop_index: 0,
            stop_results: BTreeMap::new(),
            stop_outcomes: Vec::new(),
            processing_complete: false,
            cancel,
        }
    }
}

fn start_shipment(mut state: ShipmentRunState) -> ShipmentRunState {
    info!(
        shipment_id = state.shipment.id,
        tms_id = %state.shipment.tms_id,
        bol_num = %state.shipment.bol_num,
        stops = state.shipment.stops.len(),
        "Processing shipment"
    );
    state.current_stop_index = 0;
    state.stop_results.clear();
    state.stop_outcomes.clear();
    state.processing_complete = false;
    state
}

async fn invoke_stop(
    mut state: ShipmentRunState,
    processor: StopProcessor,
) -> hubflow_graph::Result<ShipmentRunState> {
    let index = state.current_stop_index;
    let Some(stop) = state.shipment.stops.get(index).cloned() else {
        info!(shipment_id = state.shipment.id, "All stops processed");
        state.processing_complete = true;
        return Ok(state);
    };

    if state.cancel.is_cancelled() {
        return Err(GraphError::Cancelled(format!(
            "run cancelled before stop {}",
            stop.id
        )));
    }

    info!(
        stop_id = stop.id,
        stop_type = %stop.stop_type,
        position = index + 1,
        total = state.shipment.stops.len(),
        "Processing stop"
    );

    let processed = processor.process(stop, state.cancel.clone()).await?;
    state.stop_results.insert(processed.stop.id, processed.po_results);
    state.stop_outcomes.push(processed.outcome);
    state.shipment.stops[index] = processed.stop;

    Ok(state)
}

fn advance(mut state: ShipmentRunState) -> ShipmentRunState {
    state.current_stop_index += 1;
    debug!(cursor = state.current_stop_index, "Advancing to next stop");
    state
}

fn route_after_stop(state: &ShipmentRunState) -> String {
    if state.processing_complete {
        "complete".to_string()
    } else {
        "continue".to_string()
    }
}

/// Runs the shipment graph
#[derive(Clone)]
pub struct ShipmentOrchestrator {
    graph: CompiledGraph<ShipmentRunState>,
}

impl std::fmt::Debug for ShipmentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShipmentOrchestrator")
            .field("graph", &self.graph.name())
            .finish()
    }
}

impl ShipmentOrchestrator {
    pub fn new(processor: StopProcessor) -> hubflow_graph::Result<Self> {
        let mut graph = StateGraph::<ShipmentRunState>::new("shipment");

        graph.add_node(SHIPMENT_PROCESSOR, |state: ShipmentRunState| async move {
            Ok(start_shipment(state))
        });
        graph.add_node(STOP_INVOKER, move |state: ShipmentRunState| {
            invoke_stop(state, processor.clone())
        });
        graph.add_node(NEXT_STOP, |state: ShipmentRunState| async move {
            Ok(advance(state))
        });

        graph.add_edge(START, SHIPMENT_PROCESSOR);
        graph.add_edge(SHIPMENT_PROCESSOR, STOP_INVOKER);
        graph.add_conditional_edge(
            STOP_INVOKER,
            route_after_stop,
            [("complete", END), ("continue", NEXT_STOP)],
        );
        graph.add_edge(NEXT_STOP, STOP_INVOKER);

        Ok(Self {
            graph: graph.compile()?,
        })
    }

    pub fn graph(&self) -> &CompiledGraph<ShipmentRunState> {
        &self.graph
    }

    /// Process every stop of `shipment` in order
    pub async fn run(
        &self,
        shipment: Shipment,
        cancel: CancellationToken,
    ) -> hubflow_graph::Result<ShipmentRunState> {
        self.graph.invoke(ShipmentRunState::new(shipment, cancel)).await
    }

    /// Same as [`run`](Self::run), reporting each transition to `observer`
    pub async fn run_with_observer<O>(
        &self,
        shipment: Shipment,
        cancel: CancellationToken,
        observer: &mut O,
    ) -> hubflow_graph::Result<ShipmentRunState>
    where
        O: StepObserver<ShipmentRunState> + ?Sized,
    {
        self.graph
            .invoke_with_observer(ShipmentRunState::new(shipment, cancel), observer)
            .await
    }
}
