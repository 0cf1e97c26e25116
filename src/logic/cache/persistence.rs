//! Cache Persistence - JSON Snapshot Save/Load
//!
//! Statistics and correlations are authoritative; raw detection records
//! are bounded to the most recent window. Load rebuilds the Bloom, trie
//! and eviction indexes from the records. All I/O happens only when the
//! caller asks for it.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::correlation::CorrelationTable;
use super::types::{CacheError, DetectionRecord, DetectorStatistics};
use crate::constants::SNAPSHOT_RECORD_LIMIT;

const SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// SNAPSHOT
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: u32,
    pub saved_at: i64,
    pub stats: std::collections::HashMap<String, DetectorStatistics>,
    pub correlations: CorrelationTable,
    /// Most recent records only; older ones are re-derivable knowledge
    pub records: Vec<DetectionRecord>,
}

impl CacheSnapshot {
    pub fn new(
        stats: std::collections::HashMap<String, DetectorStatistics>,
        correlations: CorrelationTable,
        mut records: Vec<DetectionRecord>,
    ) -> Self {
        // Keep the most recent window
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(SNAPSHOT_RECORD_LIMIT);
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: chrono::Utc::now().timestamp(),
            stats,
            correlations,
            records,
        }
    }
}

// ============================================================================
// SAVE / LOAD
// ============================================================================

pub fn save_snapshot(path: &Path, snapshot: &CacheSnapshot) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, snapshot)?;

    log::debug!(
        "Saved cache snapshot: {} records, {} detectors",
        snapshot.records.len(),
        snapshot.stats.len()
    );
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<CacheSnapshot, CacheError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let snapshot: CacheSnapshot = serde_json::from_reader(reader)?;

    log::info!(
        "Loaded cache snapshot v{}: {} records, {} detectors",
        snapshot.version,
        snapshot.records.len(),
        snapshot.stats.len()
    );
    Ok(snapshot)
}
