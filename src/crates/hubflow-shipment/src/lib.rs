//! # hubflow-shipment - hierarchical shipment workflow engine
//!
//! Processes a [`Shipment`] through three nested state machines built on
//! [`hubflow_graph`]:
//!
//! - **Shipment** ([`shipment`]): walks the stops strictly in order
//! - **Stop** ([`stop`]): pickups are skipped, drop-offs resolve their POs
//! - **PO** ([`po`]): applies the state transition and, for escalated POs,
//!   asks a [`Reviewer`] until the escalation is resolved or the attempt
//!   budget runs out
//!
//! POs of one stop resolve concurrently ([`fanout`]); results roll up from
//! PO to stop to shipment.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hubflow_shipment::{EngineConfig, PoState, PurchaseOrder, Shipment, ShipmentEngine,
//!     StaticReviewer, Stop, StopType};
//! use std::sync::Arc;
//!
//! # async fn example() -> hubflow_shipment::Result<()> {
//! let engine = ShipmentEngine::new(EngineConfig::default(), Arc::new(StaticReviewer::approving()))?;
//!
//! let shipment = Shipment::new(1001, "TMS-2026-001", "BOL-ABC123")
//!     .with_stop(Stop::new(1, 1001, StopType::PickUp)
//!         .with_po(PurchaseOrder::new("PO-A", PoState::Scheduled)))
//!     .with_stop(Stop::new(2, 1001, StopType::DropOff)
//!         .with_po(PurchaseOrder::new("PO-D", PoState::Escalated).with_reason("Dock closed")));
//!
//! let result = engine.run(shipment).await?;
//! assert!(result.processing_complete);
//! assert_eq!(result.stop_results[&2]["PO-D"], PoState::Scheduled);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod model;
pub mod po;
pub mod reviewer;
pub mod shipment;
pub mod stop;

pub use config::EngineConfig;
pub use engine::{ProgressEvent, ProgressStream, ShipmentEngine, ShipmentRunResult};
pub use error::{EngineError, PoFailure, Result, ReviewError, StopError, ValidationError};
pub use fanout::{FanOutResult, PoFanOut};
pub use model::{PoState, PurchaseOrder, Shipment, ShipmentStatus, Stop, StopType};
pub use po::{PoOutcome, PoResolver};
pub use reviewer::{is_acceptable, ReviewRequest, Reviewer, ScriptedReviewer, StaticReviewer};
pub use shipment::{ShipmentOrchestrator, ShipmentRunState, StopResults};
pub use stop::{ProcessedStop, StopOutcome, StopProcessor};

// Cancellation tokens are part of the public API
pub use tokio_util::sync::CancellationToken;
