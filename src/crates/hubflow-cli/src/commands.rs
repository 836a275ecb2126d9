//! Command implementations for the hubflow binary

use anyhow::{Context, Result};
use futures::StreamExt;
use hubflow_shipment::{
    EngineConfig, EngineError, PoState, ProgressEvent, PurchaseOrder, Reviewer, Shipment,
    ShipmentEngine, ShipmentRunResult, StaticReviewer, Stop, StopType,
};
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::console::ConsoleReviewer;

/// Where escalation decisions come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReviewerKind {
    /// Ask on the terminal
    Console,
    /// Approve every escalated PO
    Approve,
    /// Reject every escalated PO
    Reject,
}

impl ReviewerKind {
    pub fn build(self) -> Arc<dyn Reviewer> {
        match self {
            ReviewerKind::Console => Arc::new(ConsoleReviewer::stdio()),
            ReviewerKind::Approve => Arc::new(StaticReviewer::approving()),
            ReviewerKind::Reject => Arc::new(StaticReviewer::rejecting()),
        }
    }
}

/// Command-line overrides applied on top of file and environment settings
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub max_concurrency: Option<usize>,
    pub max_review_attempts: Option<u32>,
}

/// Defaults, then the config file, then `HUBFLOW_*`, then flags
pub fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(path)?;
    if let Some(value) = overrides.max_concurrency {
        config.max_concurrency = value;
    }
    if let Some(value) = overrides.max_review_attempts {
        config.max_review_attempts = value;
    }
    config.validate()?;
    debug!(?config, "Engine configuration loaded");
    Ok(config)
}

/// Read and validate a shipment document
pub fn load_shipment(path: &Path) -> Result<Shipment> {
    let document = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let shipment = Shipment::from_json(&document)
        .with_context(|| format!("Invalid shipment in {}", path.display()))?;
    debug!(path = %path.display(), shipment_id = shipment.id, "Loaded shipment");
    Ok(shipment)
}

/// Human-readable report of a finished run
pub fn render_summary(result: &ShipmentRunResult) -> String {
    let mut out = String::new();
    let rule = "=".repeat(70);

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "PROCESSING COMPLETE");
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Run ID: {}", result.run_id);
    let _ = writeln!(out, "Shipment ID: {}", result.shipment.id);
    let _ = writeln!(out, "Processing Complete: {}", result.processing_complete);

    let _ = writeln!(out, "\nStop Processing Results:");
    for (stop_id, po_results) in &result.stop_results {
        let _ = writeln!(out, "  Stop {}:", stop_id);
        for (po_num, label) in po_results {
            let _ = writeln!(out, "    {}: {}", po_num, label);
        }
    }

    let _ = writeln!(out, "\nStop Summary:");
    for (idx, stop) in result.shipment.stops.iter().enumerate() {
        let _ = writeln!(out, "  Stop {} (ID: {}):", idx + 1, stop.id);
        let _ = writeln!(out, "    Type: {}", stop.stop_type);
        let _ = writeln!(out, "    Escalated: {}", stop.is_escalated);
        if let Some(reason) = &stop.escalation_reason {
            let _ = writeln!(out, "    Reason: {}", reason);
        }
        let _ = writeln!(out, "    POs: {}", stop.po_list.len());
        for po in &stop.po_list {
            let _ = writeln!(
                out,
                "      - {}: {} (Escalated: {})",
                po.po_num, po.po_state, po.is_escalated
            );
        }
    }
    out
}

/// Run a shipment and print the summary
pub async fn run(engine: &ShipmentEngine, shipment: Shipment, out: &mut impl Write) -> Result<()> {
    info!(shipment_id = shipment.id, "Running shipment");
    match engine.run(shipment).await {
        Ok(result) => {
            if result.needs_human_review() {
                warn!(stops = ?result.escalated_stops(), "Stops left for human review");
            }
            write!(out, "{}", render_summary(&result))?;
            Ok(())
        }
        Err(EngineError::Processing { error, partial }) => {
            warn!(error = %error, "Run failed, printing partial result");
            write!(out, "{}", render_summary(&partial))?;
            Err(anyhow::Error::new(error).context("Shipment processing failed"))
        }
        Err(err) => Err(err.into()),
    }
}

/// Run a shipment, writing one JSON event per line
///
/// Fails after the last event if the run itself failed.
pub async fn run_streaming(
    engine: &ShipmentEngine,
    shipment: Shipment,
    out: &mut impl Write,
) -> Result<()> {
    info!(shipment_id = shipment.id, "Streaming shipment run");
    let mut events = engine.run_streaming(shipment)?;
    let mut failure = None;

    while let Some(event) = events.next().await {
        serde_json::to_writer(&mut *out, &event)?;
        writeln!(out)?;
        out.flush()?;

        if let ProgressEvent::Failed { error, .. } = event {
            warn!(error = %error, "Streaming run failed");
            failure = Some(error);
        }
    }

    match failure {
        Some(error) => Err(anyhow::Error::new(error).context("Shipment processing failed")),
        None => Ok(()),
    }
}

/// Validate a shipment document without processing it
pub fn validate(path: &Path, out: &mut impl Write) -> Result<()> {
    info!(path = %path.display(), "Validating shipment");
    let shipment = load_shipment(path)?;
    let po_count: usize = shipment.stops.iter().map(|stop| stop.po_list.len()).sum();
    writeln!(
        out,
        "✓ Shipment {} is valid ({} stops, {} POs)",
        shipment.id,
        shipment.stops.len(),
        po_count
    )?;
    Ok(())
}

/// Demo shipment: one pickup and one drop-off with every PO state
pub fn sample_shipment() -> Shipment {
    Shipment::new(1001, "TMS-2026-001", "BOL-ABC123")
        .with_stop(
            Stop::new(1, 1001, StopType::PickUp)
                .with_po(PurchaseOrder::new("PO-A", PoState::Scheduled)),
        )
        .with_stop(
            Stop::new(2, 1001, StopType::DropOff)
                .with_po(PurchaseOrder::new("PO-B", PoState::Scheduled))
                .with_po(PurchaseOrder::new("PO-C", PoState::Pending))
                .with_po(
                    PurchaseOrder::new("PO-D", PoState::Escalated)
                        .with_reason("Delivery window conflicts with dock hours"),
                ),
        )
}
