//! Shipment data model
//!
//! A [`Shipment`] holds an ordered list of [`Stop`]s; each stop holds the
//! [`PurchaseOrder`]s picked up or dropped off there. Enum values travel as
//! SCREAMING_SNAKE_CASE strings, matching the documents upstream systems
//! send:
//!
//! ```json
//! {
//!   "id": 1001, "tms_id": "TMS-2026-001", "bol_num": "BOL-ABC123", "status": "NEW",
//!   "stops": [
//!     { "id": 1, "shipment_id": 1001, "type": "PICK_UP", "is_escalated": false,
//!       "po_list": [ { "po_num": "PO-A", "po_state": "SCHEDULED", "is_escalated": false } ] }
//!   ]
//! }
//! ```

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Shipment-level status. Informational; the engine never changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    New,
    Escalated,
    NeedsAction,
    Requested,
    Confirmed,
}

/// Whether goods are collected or delivered at a stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopType {
    PickUp,
    DropOff,
}

/// Purchase order state, also used as the per-PO processing result label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoState {
    /// Scheduled for pickup or delivery
    Scheduled,
    /// Awaiting scheduling confirmation
    Pending,
    /// Requires an external decision
    Escalated,
}

impl PoState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoState::Scheduled => "SCHEDULED",
            PoState::Pending => "PENDING",
            PoState::Escalated => "ESCALATED",
        }
    }
}

impl fmt::Display for PoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StopType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopType::PickUp => "PICK_UP",
            StopType::DropOff => "DROP_OFF",
        }
    }
}

impl fmt::Display for StopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Leaf unit of work with its own state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub po_num: String,
    #[serde(alias = "state")]
    pub po_state: PoState,
    #[serde(default)]
    pub is_escalated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
}

impl PurchaseOrder {
    pub fn new(po_num: impl Into<String>, po_state: PoState) -> Self {
        Self {
            po_num: po_num.into(),
            po_state,
            is_escalated: po_state == PoState::Escalated,
            escalation_reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.escalation_reason = Some(reason.into());
        self
    }
}

/// A pickup or drop-off location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stop {
    pub id: i64,
    pub shipment_id: i64,
    #[serde(rename = "type")]
    pub stop_type: StopType,
    #[serde(default)]
    pub po_list: Vec<PurchaseOrder>,
    #[serde(default)]
    pub is_escalated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
}

impl Stop {
    pub fn new(id: i64, shipment_id: i64, stop_type: StopType) -> Self {
        Self {
            id,
            shipment_id,
            stop_type,
            po_list: Vec::new(),
            is_escalated: false,
            escalation_reason: None,
        }
    }

    pub fn with_po(mut self, po: PurchaseOrder) -> Self {
        self.po_list.push(po);
        self
    }
}

/// Top-level unit: an ordered sequence of stops
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: i64,
    pub tms_id: String,
    pub bol_num: String,
    pub status: ShipmentStatus,
    #[serde(default)]
    pub stops: Vec<Stop>,
}

impl Shipment {
    pub fn new(id: i64, tms_id: impl Into<String>, bol_num: impl Into<String>) -> Self {
        Self {
            id,
            tms_id: tms_id.into(),
            bol_num: bol_num.into(),
            status: ShipmentStatus::New,
            stops: Vec::new(),
        }
    }

    pub fn with_stop(mut self, stop: Stop) -> Self {
        self.stops.push(stop);
        self
    }

    /// Parse a shipment document and validate it
    ///
    /// # Errors
    ///
    /// [`ValidationError::Malformed`] for JSON that does not match the model
    /// (unknown enum values, missing fields, wrong types), or any error from
    /// [`Shipment::validate`].
    pub fn from_json(document: &str) -> Result<Self, ValidationError> {
        let shipment: Shipment = serde_json::from_str(document)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        shipment.validate()?;
        Ok(shipment)
    }

    /// Check the structural invariants the engine relies on
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tms_id.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                entity: format!("shipment {}", self.id),
                field: "tms_id",
            });
        }
        if self.bol_num.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                entity: format!("shipment {}", self.id),
                field: "bol_num",
            });
        }

        let mut stop_ids = HashSet::new();
        for stop in &self.stops {
            if !stop_ids.insert(stop.id) {
                return Err(ValidationError::DuplicateStop(stop.id));
            }
            if stop.shipment_id != self.id {
                return Err(ValidationError::ForeignStop {
                    stop_id: stop.id,
                    found: stop.shipment_id,
                    expected: self.id,
                });
            }

            let mut po_nums = HashSet::new();
            for po in &stop.po_list {
                if po.po_num.trim().is_empty() {
                    return Err(ValidationError::EmptyField {
                        entity: format!("a PO in stop {}", stop.id),
                        field: "po_num",
                    });
                }
                if !po_nums.insert(po.po_num.as_str()) {
                    return Err(ValidationError::DuplicatePo {
                        stop_id: stop.id,
                        po_num: po.po_num.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "id": 1001,
        "tms_id": "TMS-2026-001",
        "bol_num": "BOL-ABC123",
        "status": "NEW",
        "stops": [
            {
                "id": 1,
                "shipment_id": 1001,
                "type": "PICK_UP",
                "is_escalated": false,
                "po_list": [
                    {"po_num": "PO-A", "po_state": "SCHEDULED", "is_escalated": false}
                ]
            },
            {
                "id": 2,
                "shipment_id": 1001,
                "type": "DROP_OFF",
                "is_escalated": false,
                "po_list": [
                    {"po_num": "PO-B", "state": "PENDING", "is_escalated": false},
                    {"po_num": "PO-C", "po_state": "ESCALATED", "is_escalated": true,
                     "escalation_reason": "Dock closed"}
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_sample_document() {
        let shipment = Shipment::from_json(SAMPLE).unwrap();
        assert_eq!(shipment.stops.len(), 2);
        assert_eq!(shipment.status, ShipmentStatus::New);
        assert_eq!(shipment.stops[0].stop_type, StopType::PickUp);
        assert_eq!(shipment.stops[1].po_list[0].po_state, PoState::Pending);
        assert_eq!(
            shipment.stops[1].po_list[1].escalation_reason.as_deref(),
            Some("Dock closed")
        );
    }

    #[test]
    fn test_unknown_enum_value_is_malformed() {
        let doc = SAMPLE.replace("\"PICK_UP\"", "\"TELEPORT\"");
        assert!(matches!(
            Shipment::from_json(&doc),
            Err(ValidationError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let doc = r#"{"id": 1, "tms_id": "T", "status": "NEW", "stops": []}"#;
        let err = Shipment::from_json(doc).unwrap_err();
        assert!(err.to_string().contains("bol_num"));
    }

    #[test]
    fn test_duplicate_po_rejected() {
        let shipment = Shipment::new(1, "T", "B").with_stop(
            Stop::new(5, 1, StopType::DropOff)
                .with_po(PurchaseOrder::new("PO-1", PoState::Scheduled))
                .with_po(PurchaseOrder::new("PO-1", PoState::Pending)),
        );
        assert_eq!(
            shipment.validate(),
            Err(ValidationError::DuplicatePo {
                stop_id: 5,
                po_num: "PO-1".to_string()
            })
        );
    }

    #[test]
    fn test_duplicate_stop_and_foreign_stop_rejected() {
        let dup = Shipment::new(1, "T", "B")
            .with_stop(Stop::new(5, 1, StopType::DropOff))
            .with_stop(Stop::new(5, 1, StopType::PickUp));
        assert_eq!(dup.validate(), Err(ValidationError::DuplicateStop(5)));

        let foreign = Shipment::new(1, "T", "B").with_stop(Stop::new(9, 2, StopType::DropOff));
        assert!(matches!(
            foreign.validate(),
            Err(ValidationError::ForeignStop { stop_id: 9, .. })
        ));
    }

    #[test]
    fn test_serialized_labels_are_screaming_snake_case() {
        let stop = Stop::new(1, 1, StopType::DropOff)
            .with_po(PurchaseOrder::new("PO-1", PoState::Escalated));
        let json = serde_json::to_value(&stop).unwrap();
        assert_eq!(json["type"], "DROP_OFF");
        assert_eq!(json["po_list"][0]["po_state"], "ESCALATED");
        assert_eq!(PoState::Pending.to_string(), "PENDING");
    }
}
