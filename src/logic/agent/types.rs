//! Pattern Agent Types
//!
//! Rule definitions come from the external pattern database; this module
//! only defines their shape and the per-match result.

use serde::{Deserialize, Serialize};

use crate::logic::cache::types::Severity;

// ============================================================================
// RULE DEFINITION
// ============================================================================

/// One detection rule, as supplied by the external rule database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Regex source; compiled at agent construction, never at scan time
    pub pattern: String,
    pub severity: Severity,
    /// External taxonomy identifiers (CWE, ATT&CK technique ids)
    pub classification_refs: Vec<String>,
    pub enabled: bool,
}

// ============================================================================
// DETECTION RESULT
// ============================================================================

/// One per-line detection produced by one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detector_id: String,
    pub rule_id: String,
    pub file_path: String,
    /// 1-based line number of the match
    pub line_number: usize,
    pub matched_text: String,
    /// Fixed window of surrounding lines
    pub context: String,
    pub confidence: f64,
    pub severity: Severity,
    pub classification_refs: Vec<String>,
    pub fingerprint: String,
    pub timestamp: i64,
}

// ============================================================================
// AGENT ERRORS
// ============================================================================

#[derive(Debug)]
pub enum AgentError {
    /// Rule pattern failed to compile - a construction-time failure
    InvalidPattern {
        rule_id: String,
        source: regex::Error,
    },
    EmptyRuleId,
    /// Rule is switched off in the database; callers filter or skip
    DisabledRule { rule_id: String },
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::InvalidPattern { rule_id, source } => {
                write!(f, "Invalid pattern for rule '{}': {}", rule_id, source)
            }
            AgentError::EmptyRuleId => write!(f, "Rule id must not be empty"),
            AgentError::DisabledRule { rule_id } => {
                write!(f, "Rule '{}' is disabled", rule_id)
            }
        }
    }
}

impl std::error::Error for AgentError {}
