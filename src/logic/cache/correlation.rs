//! Pattern / File-Type Correlation Table
//!
//! Learns which rules are worth running against which file types.
//! Entries are created lazily on first observation and never deleted -
//! stale knowledge only decays in the derived accuracy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::{DECAY_HALF_LIFE_DAYS, STALENESS_WINDOW_DAYS};

/// Prior weight (pseudo-observations) for the Bayesian blend
const BLEND_PRIOR_WEIGHT: f64 = 5.0;

const SECS_PER_DAY: f64 = 86_400.0;

// ============================================================================
// CORRELATION ENTRY
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationEntry {
    /// Observations of this rule against this file type
    pub detections: u64,
    /// Gate-approved true positives among them
    pub true_positives: u64,
    /// Unix timestamp of the most recent update
    pub last_updated: i64,
}

impl CorrelationEntry {
    /// Raw accuracy, 0.0 when nothing observed
    pub fn accuracy(&self) -> f64 {
        if self.detections == 0 {
            return 0.0;
        }
        self.true_positives as f64 / self.detections as f64
    }

    /// Accuracy with staleness decay applied
    pub fn decayed_accuracy(&self, now: i64) -> f64 {
        let elapsed_days = (now - self.last_updated) as f64 / SECS_PER_DAY;
        self.accuracy() * staleness_decay(elapsed_days)
    }
}

/// 1.0 within the staleness window, exponential half-life decay past it
pub fn staleness_decay(elapsed_days: f64) -> f64 {
    let excess = elapsed_days - STALENESS_WINDOW_DAYS as f64;
    if excess <= 0.0 {
        return 1.0;
    }
    0.5f64.powf(excess / DECAY_HALF_LIFE_DAYS)
}

// ============================================================================
// CORRELATION TABLE
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationTable {
    entries: HashMap<String, CorrelationEntry>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(rule_id: &str, file_type: &str) -> String {
        format!("{}\x1f{}", rule_id, file_type)
    }

    /// Record one observation of a rule against a file type
    pub fn record_observation(&mut self, rule_id: &str, file_type: &str, now: i64) {
        let entry = self.entries.entry(Self::key(rule_id, file_type)).or_default();
        entry.detections += 1;
        entry.last_updated = now;
    }

    /// Record a gate-approved true positive
    pub fn record_true_positive(&mut self, rule_id: &str, file_type: &str, now: i64) {
        let entry = self.entries.entry(Self::key(rule_id, file_type)).or_default();
        entry.true_positives += 1;
        // A validated TP without an observed detection means the record
        // arrived pre-labeled; count the detection too.
        if entry.true_positives > entry.detections {
            entry.detections = entry.true_positives;
        }
        entry.last_updated = now;
    }

    /// Undo one true positive (rollback path)
    pub fn revert_true_positive(&mut self, rule_id: &str, file_type: &str) {
        if let Some(entry) = self.entries.get_mut(&Self::key(rule_id, file_type)) {
            entry.true_positives = entry.true_positives.saturating_sub(1);
        }
    }

    pub fn get(&self, rule_id: &str, file_type: &str) -> Option<&CorrelationEntry> {
        self.entries.get(&Self::key(rule_id, file_type))
    }

    /// Rules worth running against a file type, best first
    pub fn predict(&self, file_type: &str, min_accuracy: f64, now: i64) -> Vec<(String, f64)> {
        let suffix = format!("\x1f{}", file_type);
        let mut out: Vec<(String, f64)> = self
            .entries
            .iter()
            .filter(|(key, _)| key.ends_with(&suffix))
            .map(|(key, entry)| {
                let rule_id = key[..key.len() - suffix.len()].to_string();
                (rule_id, entry.decayed_accuracy(now))
            })
            .filter(|(_, accuracy)| *accuracy >= min_accuracy)
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    /// Blend an agent's base confidence with learned accuracy for its
    /// (rule, file type). More observations pull harder toward history.
    pub fn bayesian_confidence(
        &self,
        base: f64,
        rule_id: &str,
        file_type: &str,
        now: i64,
    ) -> f64 {
        match self.get(rule_id, file_type) {
            Some(entry) if entry.detections > 0 => {
                let n = entry.detections as f64;
                let accuracy = entry.decayed_accuracy(now);
                (base * BLEND_PRIOR_WEIGHT + accuracy * n) / (BLEND_PRIOR_WEIGHT + n)
            }
            _ => base,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
