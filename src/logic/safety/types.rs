//! Learning Safety Gate Types
//!
//! Validation events, verdicts and conflict records. The event journal is
//! append-only: rollback and supersession change bookkeeping status, the
//! asserted history itself is never deleted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::cache::types::GroundTruth;

// ============================================================================
// VALIDATOR KINDS
// ============================================================================

/// Who asserted a validation. Trust is ordered: automated sources can
/// never overwrite human ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidatorKind {
    Human,
    /// Automated heuristic classifier or consensus vote
    Automated,
    /// Rollback path only
    AdministrativeOverride,
}

impl ValidatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatorKind::Human => "human",
            ValidatorKind::Automated => "automated",
            ValidatorKind::AdministrativeOverride => "administrative_override",
        }
    }

    pub fn trust_level(&self) -> u8 {
        match self {
            ValidatorKind::Automated => 1,
            ValidatorKind::Human => 2,
            ValidatorKind::AdministrativeOverride => 3,
        }
    }
}

// ============================================================================
// VALIDATION EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Approved,
    Rejected,
    Pending,
    /// Was approved, later overwritten or rolled back; no longer counts
    Superseded,
}

/// One entry in the append-only validation journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationEvent {
    pub id: Uuid,
    pub detector_id: String,
    pub rule_id: String,
    pub fingerprint: String,
    pub file_type: String,
    pub label: GroundTruth,
    pub validator: ValidatorKind,
    pub timestamp: i64,
    pub justification: String,
    pub status: EventStatus,
    /// Staleness decay applied at approval time (1.0 = fresh)
    pub confidence_factor: f64,
}

impl ValidationEvent {
    /// Journal key: validations are ordered per (fingerprint, rule)
    pub fn key(&self) -> (String, String) {
        (self.fingerprint.clone(), self.rule_id.clone())
    }
}

// ============================================================================
// VALIDATION INPUT / OUTPUT
// ============================================================================

/// Input from the external review tool or automated classifier
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub detector_id: String,
    pub rule_id: String,
    pub fingerprint: String,
    pub file_type: String,
    pub label: GroundTruth,
    pub validator: ValidatorKind,
    pub justification: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Approved,
    Rejected,
    Pending,
}

/// Why two validations collided and how the gate resolved it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub prior_event_id: Uuid,
    pub prior_validator: ValidatorKind,
    pub prior_label: GroundTruth,
    pub resolution: ConflictResolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictResolution {
    /// Incoming human validation supersedes the automated one on file
    HumanOverridesAutomated,
    /// Incoming automated validation bounced off human ground truth
    AutomatedRejectedByHuman,
    /// Same-trust disagreement: the later validation supersedes
    Superseded,
}

/// Explicit result of every validate() call - never a silent no-op
#[derive(Debug, Clone)]
pub struct ValidationVerdict {
    pub outcome: ValidationOutcome,
    pub event_id: Uuid,
    pub reasons: Vec<String>,
    pub conflict: Option<ConflictInfo>,
    pub confidence_factor: f64,
}

// ============================================================================
// GATE ERRORS
// ============================================================================

#[derive(Debug)]
pub enum GateError {
    UnknownEvent(Uuid),
    /// Only approved events can be rolled back
    NotApproved(Uuid),
    IoError(std::io::Error),
    SerializationError(serde_json::Error),
}

impl std::fmt::Display for GateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateError::UnknownEvent(id) => write!(f, "Unknown validation event: {}", id),
            GateError::NotApproved(id) => {
                write!(f, "Event {} is not approved and cannot be rolled back", id)
            }
            GateError::IoError(e) => write!(f, "IO Error: {}", e),
            GateError::SerializationError(e) => write!(f, "Serialization Error: {}", e),
        }
    }
}

impl std::error::Error for GateError {}

impl From<std::io::Error> for GateError {
    fn from(err: std::io::Error) -> Self {
        GateError::IoError(err)
    }
}

impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        GateError::SerializationError(err)
    }
}
