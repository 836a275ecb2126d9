//! Run entrypoints
//!
//! [`ShipmentEngine`] wires the three levels together once and then runs any
//! number of shipments, synchronously ([`ShipmentEngine::run`]) or as a
//! stream of progress events ([`ShipmentEngine::run_streaming`]).
//!
//! ```text
//! ShipmentEngine
//!   └── ShipmentOrchestrator   (stops, sequential)
//!         └── StopProcessor    (pickup / drop-off routing)
//!               └── PoFanOut   (POs, concurrent, bounded)
//!                     └── PoResolver (transition + review loop)
//! ```

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::fanout::PoFanOut;
use crate::model::Shipment;
use crate::po::PoResolver;
use crate::reviewer::Reviewer;
use crate::shipment::{ShipmentOrchestrator, ShipmentRunState, StopResults};
use crate::stop::{StopOutcome, StopProcessor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use hubflow_graph::{GraphError, StepObserver, STREAM_BUFFER};
use serde::{Serialize, Serializer};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};
use uuid::Uuid;

/// Outcome of one shipment run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShipmentRunResult {
    pub run_id: Uuid,
    /// The shipment with every processed stop updated in place
    pub shipment: Shipment,
    /// stop id -> (po_num -> result label)
    pub stop_results: StopResults,
    pub processing_complete: bool,
    pub current_stop_index: usize,
    pub stop_outcomes: Vec<StopOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ShipmentRunResult {
    fn from_state(run_id: Uuid, started_at: DateTime<Utc>, state: ShipmentRunState) -> Self {
        Self {
            run_id,
            shipment: state.shipment,
            stop_results: state.stop_results,
            processing_complete: state.processing_complete,
            current_stop_index: state.current_stop_index,
            stop_outcomes: state.stop_outcomes,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Ids of the stops left escalated, in stop order
    pub fn escalated_stops(&self) -> Vec<i64> {
        self.stop_outcomes
            .iter()
            .filter(|outcome| outcome.needs_human_review)
            .map(|outcome| outcome.stop_id)
            .collect()
    }

    /// True if any stop still needs a human decision
    pub fn needs_human_review(&self) -> bool {
        self.stop_outcomes
            .iter()
            .any(|outcome| outcome.needs_human_review)
    }
}

fn serialize_display<T, S>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    T: std::fmt::Display,
    S: Serializer,
{
    serializer.collect_str(value)
}

/// Events yielded by [`ShipmentEngine::run_streaming`]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A shipment-level node finished
    Step {
        node: String,
        state: ShipmentRunState,
    },
    /// The run finished; always the last event of a successful run
    Completed(ShipmentRunResult),
    /// The run stopped; `partial` holds what was done before the failure
    Failed {
        #[serde(serialize_with = "serialize_display")]
        error: GraphError,
        partial: ShipmentRunResult,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Step { .. })
    }
}

/// Finite stream of [`ProgressEvent`]s with exactly one terminal event
pub type ProgressStream = Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>;

/// Keeps the most recent state so a failed run can report partial progress,
/// optionally forwarding each step to a channel
struct RunObserver {
    last: ShipmentRunState,
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl RunObserver {
    fn new(initial: ShipmentRunState, tx: Option<mpsc::Sender<ProgressEvent>>) -> Self {
        Self { last: initial, tx }
    }
}

#[async_trait]
impl StepObserver<ShipmentRunState> for RunObserver {
    async fn on_step(&mut self, node: &str, state: &ShipmentRunState) {
        self.last = state.clone();
        if let Some(tx) = &self.tx {
            let event = ProgressEvent::Step {
                node: node.to_string(),
                state: state.clone(),
            };
            if tx.send(event).await.is_err() {
                // Consumer went away; the run still finishes
                self.tx = None;
            }
        }
    }
}

/// Hierarchical shipment workflow engine
///
/// Built once from an [`EngineConfig`] and a [`Reviewer`]; immutable and
/// cheap to clone afterwards, so one engine can serve concurrent runs. Each
/// run owns its shipment exclusively.
#[derive(Debug, Clone)]
pub struct ShipmentEngine {
    config: EngineConfig,
    orchestrator: ShipmentOrchestrator,
}

impl ShipmentEngine {
    /// Compile the PO, stop and shipment graphs
    ///
    /// # Errors
    ///
    /// [`EngineError::Configuration`] for out-of-range settings,
    /// [`EngineError::Build`] if a graph fails to compile.
    pub fn new(config: EngineConfig, reviewer: Arc<dyn Reviewer>) -> Result<Self> {
        config.validate()?;

        let resolver = PoResolver::new(reviewer, &config).map_err(EngineError::Build)?;
        let fan_out = PoFanOut::new(resolver, &config);
        let processor = StopProcessor::new(fan_out).map_err(EngineError::Build)?;
        let orchestrator = ShipmentOrchestrator::new(processor).map_err(EngineError::Build)?;

        Ok(Self {
            config,
            orchestrator,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &ShipmentOrchestrator {
        &self.orchestrator
    }

    /// Process a shipment to completion
    pub async fn run(&self, shipment: Shipment) -> Result<ShipmentRunResult> {
        self.run_with_cancellation(shipment, CancellationToken::new()).await
    }

    /// Parse, validate and process a shipment document
    pub async fn run_json(&self, document: &str) -> Result<ShipmentRunResult> {
        let shipment = Shipment::from_json(document)?;
        self.run(shipment).await
    }

    /// Process a shipment, giving up when `cancel` fires
    ///
    /// Cancelling aborts outstanding reviewer waits, fails the stop in
    /// progress and skips the remaining stops.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] before any processing
    /// - [`EngineError::Processing`] with the partial result otherwise
    #[tracing::instrument(skip(self, shipment, cancel), fields(shipment_id = shipment.id))]
    pub async fn run_with_cancellation(
        &self,
        shipment: Shipment,
        cancel: CancellationToken,
    ) -> Result<ShipmentRunResult> {
        shipment.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, stops = shipment.stops.len(), "Starting shipment run");

        let mut observer =
            RunObserver::new(ShipmentRunState::new(shipment.clone(), cancel.clone()), None);
        match self
            .orchestrator
            .run_with_observer(shipment, cancel, &mut observer)
            .await
        {
            Ok(state) => {
                let result = ShipmentRunResult::from_state(run_id, started_at, state);
                info!(
                    %run_id,
                    escalated_stops = ?result.escalated_stops(),
                    "Shipment run complete"
                );
                Ok(result)
            }
            Err(error) => {
                error!(%run_id, error = %error, "Shipment run failed");
                let partial = ShipmentRunResult::from_state(run_id, started_at, observer.last);
                Err(EngineError::Processing {
                    error,
                    partial: Box::new(partial),
                })
            }
        }
    }

    /// Process a shipment, yielding a [`ProgressEvent`] per step
    ///
    /// The run executes on its own task. Validation happens up front, so an
    /// invalid shipment is an error here rather than an event.
    pub fn run_streaming(&self, shipment: Shipment) -> Result<ProgressStream> {
        self.run_streaming_with_cancellation(shipment, CancellationToken::new())
    }

    pub fn run_streaming_with_cancellation(
        &self,
        shipment: Shipment,
        cancel: CancellationToken,
    ) -> Result<ProgressStream> {
        shipment.validate()?;

        let (tx, mut rx) = mpsc::channel(STREAM_BUFFER);
        let orchestrator = self.orchestrator.clone();
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run_streaming", shipment_id = shipment.id, %run_id);

        tokio::spawn(
            async move {
                let started_at = Utc::now();
                info!(stops = shipment.stops.len(), "Starting streaming shipment run");

                let mut observer = RunObserver::new(
                    ShipmentRunState::new(shipment.clone(), cancel.clone()),
                    Some(tx.clone()),
                );
                let terminal = match orchestrator
                    .run_with_observer(shipment, cancel, &mut observer)
                    .await
                {
                    Ok(state) => ProgressEvent::Completed(ShipmentRunResult::from_state(
                        run_id, started_at, state,
                    )),
                    Err(error) => {
                        error!(error = %error, "Streaming shipment run failed");
                        ProgressEvent::Failed {
                            error,
                            partial: ShipmentRunResult::from_state(
                                run_id,
                                started_at,
                                observer.last,
                            ),
                        }
                    }
                };
                let _ = tx.send(terminal).await;
            }
            .instrument(span),
        );

        Ok(Box::pin(async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PoState, PurchaseOrder, Stop, StopType};
    use crate::reviewer::StaticReviewer;
    use futures::StreamExt;

    fn engine() -> ShipmentEngine {
        ShipmentEngine::new(EngineConfig::default(), Arc::new(StaticReviewer::approving())).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ShipmentEngine::new(
            EngineConfig::default().with_max_concurrency(0),
            Arc::new(StaticReviewer::approving()),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn test_unbounded_concurrency_rejected() {
        let err = ShipmentEngine::new(
            EngineConfig::default().with_max_concurrency(usize::MAX),
            Arc::new(StaticReviewer::approving()),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_invalid_shipment_never_runs() {
        let shipment = Shipment::new(1, "", "BOL");
        let err = engine().run(shipment).await.unwrap_err();
        assert!(err.is_caller_error());
        assert!(err.partial().is_none());
    }

    #[tokio::test]
    async fn test_result_carries_run_metadata() {
        let result = engine()
            .run(
                Shipment::new(1, "TMS", "BOL").with_stop(
                    Stop::new(1, 1, StopType::DropOff)
                        .with_po(PurchaseOrder::new("PO-1", PoState::Pending)),
                ),
            )
            .await
            .unwrap();

        assert!(result.finished_at >= result.started_at);
        assert!(!result.needs_human_review());
        assert_eq!(result.run_id.get_version_num(), 4);
    }

    #[tokio::test]
    async fn test_cancelled_run_returns_partial() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine()
            .run_with_cancellation(
                Shipment::new(1, "TMS", "BOL").with_stop(Stop::new(1, 1, StopType::PickUp)),
                cancel,
            )
            .await
            .unwrap_err();

        let partial = err.partial().unwrap();
        assert!(!partial.processing_complete);
        assert!(partial.stop_results.is_empty());
        assert!(!err.is_caller_error());
    }

    #[tokio::test]
    async fn test_step_event_serializes_with_tag() {
        let mut events = engine()
            .run_streaming(Shipment::new(1, "TMS", "BOL"))
            .unwrap();
        let first = events.next().await.unwrap();
        let json = serde_json::to_value(&first).unwrap();
        assert_eq!(json["event"], "step");
        assert_eq!(json["node"], "shipment_processor");
    }
}
