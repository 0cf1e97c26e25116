//! Consensus Types
//!
//! Data structures for the orchestrator's scan lifecycle and its
//! externally visible output. No resolution logic here.

use serde::{Deserialize, Serialize};

use crate::logic::cache::types::Severity;

// ============================================================================
// SCAN LIFECYCLE
// ============================================================================

/// Per-scan state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    Idle,
    AgentsRunning,
    Aggregating,
    Done,
}

impl ScanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Idle => "idle",
            ScanState::AgentsRunning => "agents_running",
            ScanState::Aggregating => "aggregating",
            ScanState::Done => "done",
        }
    }
}

// ============================================================================
// RESOLUTION OUTCOMES
// ============================================================================

/// How a per-line group was reduced to one finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionMethod {
    /// All contributors agreed on severity and classification
    Unanimous,
    /// Contributors disagreed; severity-weighted resolution applied
    SeverityWeighted,
    /// Only one detector fired
    SingleDetector,
}

/// Outcome of voting over contributors' classification references.
/// A tie is never guessed away - it escalates to human review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceResolution {
    /// Every voting contributor carried the same reference set
    Unanimous(Vec<String>),
    /// A strict majority agreed on this reference set
    Majority(Vec<String>),
    /// Votes tied - escalated instead of guessed
    RequiresHumanReview,
    /// No contributor carried references
    NoReferences,
}

impl ReferenceResolution {
    pub fn needs_review(&self) -> bool {
        matches!(self, ReferenceResolution::RequiresHumanReview)
    }
}

// ============================================================================
// CONSENSUS FINDING
// ============================================================================

/// The externally visible unit of scan output: one resolved finding per
/// (file, line) that survived consensus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusFinding {
    pub file_path: String,
    pub line_number: usize,
    /// Highest severity among contributors
    pub severity: Severity,
    /// Severity-weighted mean of contributor confidences
    pub confidence: f64,
    /// Contributing detector identities, sorted
    pub detector_ids: Vec<String>,
    pub detection_count: usize,
    /// True when contributors disagreed on severity or classification
    pub disagreement: bool,
    pub method: ResolutionMethod,
    pub references: ReferenceResolution,
}

// ============================================================================
// SCAN STATISTICS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub files_scanned: usize,
    pub files_failed: usize,
    pub agents_run: usize,
    pub detections: usize,
    pub consensus_findings: usize,
    pub weak_dropped: usize,
    pub review_required: usize,
    pub conflicts_resolved: usize,
    pub emergency_evictions: usize,
    pub memory_usage_bytes: u64,
    pub cancelled: bool,
}

/// Result of scanning one file
#[derive(Debug, Clone, Serialize)]
pub struct FileScanOutcome {
    pub file_path: String,
    pub findings: Vec<ConsensusFinding>,
    pub detections: usize,
    pub agents_selected: usize,
    /// Terminal lifecycle state of this scan invocation
    pub state: ScanState,
}

// ============================================================================
// ORCHESTRATOR ERRORS
// ============================================================================

#[derive(Debug)]
pub enum OrchestratorError {
    /// Memory budget of zero bytes cannot be enforced
    InvalidMemoryBudget,
    /// An orchestrator without agents cannot scan
    NoAgents,
}

impl std::fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestratorError::InvalidMemoryBudget => {
                write!(f, "Memory budget must be greater than zero")
            }
            OrchestratorError::NoAgents => write!(f, "At least one agent is required"),
        }
    }
}

impl std::error::Error for OrchestratorError {}
