//! Validation Audit Journal
//!
//! Append-only record of every validation event the gate has seen,
//! approved or not. Used to trace how a detector's statistics got where
//! they are and to attribute bad learning to its source.
//!
//! Log format: JSON Lines (.jsonl)

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::types::{EventStatus, GateError, ValidationEvent, ValidatorKind};
use crate::constants::AUDIT_RETENTION_PER_KEY;

// ============================================================================
// JOURNAL
// ============================================================================

/// In-memory journal with optional JSONL persistence. Events are only
/// ever appended; supersession flips a status flag but the entry stays.
#[derive(Debug, Default)]
pub struct AuditJournal {
    events: Vec<ValidationEvent>,
    /// (fingerprint, rule_id) -> indices into `events`, oldest first
    by_key: HashMap<(String, String), Vec<usize>>,
    persist_path: Option<PathBuf>,
}

impl AuditJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Journal that mirrors every append to a JSONL file
    pub fn with_persistence<P: AsRef<Path>>(path: P) -> Self {
        Self {
            events: Vec::new(),
            by_key: HashMap::new(),
            persist_path: Some(path.as_ref().to_path_buf()),
        }
    }

    // ========================================================================
    // PUBLIC API
    // ========================================================================

    /// Append an event, returning its journal index
    pub fn append(&mut self, event: ValidationEvent) -> usize {
        if let Some(path) = &self.persist_path {
            if let Err(e) = append_to_disk(path, &event) {
                log::error!("Failed to persist audit event {}: {}", event.id, e);
            }
        }

        let idx = self.events.len();
        self.by_key.entry(event.key()).or_default().push(idx);
        self.events.push(event);
        idx
    }

    pub fn get(&self, idx: usize) -> Option<&ValidationEvent> {
        self.events.get(idx)
    }

    pub fn find_by_id(&self, id: Uuid) -> Option<(usize, &ValidationEvent)> {
        self.events.iter().enumerate().find(|(_, e)| e.id == id)
    }

    /// Flip an event's bookkeeping status. The original assertion stays
    /// in the journal untouched.
    pub fn set_status(&mut self, idx: usize, status: EventStatus) -> Result<(), GateError> {
        match self.events.get_mut(idx) {
            Some(event) => {
                event.status = status;
                Ok(())
            }
            None => Err(GateError::UnknownEvent(Uuid::nil())),
        }
    }

    /// All events for one (fingerprint, rule) key, oldest first
    pub fn events_for_key(&self, fingerprint: &str, rule_id: &str) -> Vec<&ValidationEvent> {
        self.by_key
            .get(&(fingerprint.to_string(), rule_id.to_string()))
            .map(|indices| indices.iter().map(|&i| &self.events[i]).collect())
            .unwrap_or_default()
    }

    /// The most recent N events for a key, newest first
    pub fn recent_for_key(&self, fingerprint: &str, rule_id: &str) -> Vec<&ValidationEvent> {
        let mut events = self.events_for_key(fingerprint, rule_id);
        events.reverse();
        events.truncate(AUDIT_RETENTION_PER_KEY);
        events
    }

    /// Latest event for a key that currently counts towards statistics
    pub fn latest_approved(&self, fingerprint: &str, rule_id: &str) -> Option<(usize, &ValidationEvent)> {
        let indices = self
            .by_key
            .get(&(fingerprint.to_string(), rule_id.to_string()))?;
        indices
            .iter()
            .rev()
            .map(|&i| (i, &self.events[i]))
            .find(|(_, e)| e.status == EventStatus::Approved)
    }

    pub fn get_recent(&self, limit: usize) -> Vec<&ValidationEvent> {
        let start = self.events.len().saturating_sub(limit);
        self.events[start..].iter().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    // ========================================================================
    // STATISTICS
    // ========================================================================

    pub fn stats(&self) -> AuditStats {
        let mut stats = AuditStats {
            total_events: self.events.len(),
            oldest_entry: self.events.first().map(|e| e.timestamp),
            newest_entry: self.events.last().map(|e| e.timestamp),
            ..AuditStats::default()
        };

        for event in &self.events {
            match event.status {
                EventStatus::Approved => stats.approved += 1,
                EventStatus::Rejected => stats.rejected += 1,
                EventStatus::Pending => stats.pending += 1,
                EventStatus::Superseded => stats.superseded += 1,
            }
            if event.validator == ValidatorKind::AdministrativeOverride {
                stats.rollbacks += 1;
            }
        }

        stats
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    /// Rebuild the journal from a JSONL file. Corrupt lines are skipped
    /// with a warning rather than losing the whole journal.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, GateError> {
        let path = path.as_ref();
        let mut journal = Self::with_persistence(path);

        if !path.exists() {
            return Ok(journal);
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut skipped = 0usize;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            // Indexed directly so loading does not re-mirror to disk
            match serde_json::from_str::<ValidationEvent>(&line) {
                Ok(event) => {
                    let idx = journal.events.len();
                    journal.by_key.entry(event.key()).or_default().push(idx);
                    journal.events.push(event);
                }
                Err(e) => {
                    skipped += 1;
                    log::warn!("Skipping corrupt audit line: {}", e);
                }
            }
        }

        log::info!(
            "Loaded {} audit events from {:?} ({} corrupt lines skipped)",
            journal.events.len(),
            path,
            skipped
        );
        Ok(journal)
    }

    /// Rewrite the full journal to a JSONL file (status flips included)
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), GateError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        for event in &self.events {
            let json = serde_json::to_string(event)?;
            writeln!(writer, "{}", json)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AuditStats {
    pub total_events: usize,
    pub approved: usize,
    pub rejected: usize,
    pub pending: usize,
    pub superseded: usize,
    pub rollbacks: usize,
    pub oldest_entry: Option<i64>,
    pub newest_entry: Option<i64>,
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

fn append_to_disk(path: &Path, event: &ValidationEvent) -> Result<(), GateError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    let json = serde_json::to_string(event)?;
    writeln!(writer, "{}", json)?;
    writer.flush()?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::cache::types::GroundTruth;
    use chrono::Utc;

    fn event(fingerprint: &str, rule: &str, label: GroundTruth) -> ValidationEvent {
        ValidationEvent {
            id: Uuid::new_v4(),
            detector_id: "pattern-agent/test".to_string(),
            rule_id: rule.to_string(),
            fingerprint: fingerprint.to_string(),
            file_type: "py".to_string(),
            label,
            validator: ValidatorKind::Human,
            timestamp: Utc::now().timestamp(),
            justification: "reviewed".to_string(),
            status: EventStatus::Approved,
            confidence_factor: 1.0,
        }
    }

    #[test]
    fn test_append_and_key_lookup() {
        let mut journal = AuditJournal::new();
        journal.append(event("fp1", "r1", GroundTruth::TruePositive));
        journal.append(event("fp1", "r1", GroundTruth::FalsePositive));
        journal.append(event("fp2", "r1", GroundTruth::TruePositive));

        assert_eq!(journal.len(), 3);
        assert_eq!(journal.events_for_key("fp1", "r1").len(), 2);
        assert_eq!(journal.events_for_key("fp2", "r1").len(), 1);
        assert!(journal.events_for_key("fp9", "r1").is_empty());
    }

    #[test]
    fn test_latest_approved_skips_superseded() {
        let mut journal = AuditJournal::new();
        let first = journal.append(event("fp1", "r1", GroundTruth::TruePositive));
        journal.append(event("fp1", "r1", GroundTruth::FalsePositive));

        let (latest_idx, _) = journal.latest_approved("fp1", "r1").unwrap();
        assert_ne!(latest_idx, first);

        journal.set_status(latest_idx, EventStatus::Superseded).unwrap();
        let (idx, e) = journal.latest_approved("fp1", "r1").unwrap();
        assert_eq!(idx, first);
        assert_eq!(e.label, GroundTruth::TruePositive);
    }

    #[test]
    fn test_jsonl_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validation_audit.jsonl");

        {
            let mut journal = AuditJournal::with_persistence(&path);
            journal.append(event("fp1", "r1", GroundTruth::TruePositive));
            journal.append(event("fp1", "r1", GroundTruth::FalsePositive));
        }

        let restored = AuditJournal::load_from(&path).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.events_for_key("fp1", "r1").len(), 2);
    }

    #[test]
    fn test_load_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validation_audit.jsonl");

        let mut journal = AuditJournal::with_persistence(&path);
        journal.append(event("fp1", "r1", GroundTruth::TruePositive));

        // Simulate a torn write at the tail
        use std::io::Write as _;
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{\"id\": \"not a full ev").unwrap();

        let restored = AuditJournal::load_from(&path).unwrap();
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn test_stats_counts_by_status() {
        let mut journal = AuditJournal::new();
        journal.append(event("fp1", "r1", GroundTruth::TruePositive));
        let mut rejected = event("fp1", "r1", GroundTruth::FalsePositive);
        rejected.status = EventStatus::Rejected;
        journal.append(rejected);
        let mut pending = event("fp2", "r1", GroundTruth::TruePositive);
        pending.status = EventStatus::Pending;
        pending.validator = ValidatorKind::Automated;
        journal.append(pending);

        let stats = journal.stats();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.rollbacks, 0);
    }
}
