//! Detection Cache Types
//!
//! Core types for cached detection knowledge.
//! No logic here - only data structures and derived accessors.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// SEVERITY
// ============================================================================

/// Finding severity, ordered LOW < MEDIUM < HIGH < CRITICAL
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Weight used for severity-weighted confidence averaging and eviction scoring
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Low => 1.0,
            Severity::Medium => 2.0,
            Severity::High => 3.0,
            Severity::Critical => 4.0,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// GROUND TRUTH
// ============================================================================

/// Validated outcome of a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroundTruth {
    TruePositive,
    FalsePositive,
    Unknown,
}

impl GroundTruth {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroundTruth::TruePositive => "true_positive",
            GroundTruth::FalsePositive => "false_positive",
            GroundTruth::Unknown => "unknown",
        }
    }

    /// The label a rollback event asserts to cancel this one
    pub fn inverse(&self) -> GroundTruth {
        match self {
            GroundTruth::TruePositive => GroundTruth::FalsePositive,
            GroundTruth::FalsePositive => GroundTruth::TruePositive,
            GroundTruth::Unknown => GroundTruth::Unknown,
        }
    }
}

// ============================================================================
// CACHE KEY
// ============================================================================

/// Cache key: one detector's observation of one file location
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub detector_id: String,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(detector_id: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            detector_id: detector_id.into(),
            fingerprint: fingerprint.into(),
        }
    }

    /// Byte form fed to the Bloom filter and walked through the trie.
    /// 0x1f (unit separator) cannot appear in either component.
    pub fn composite(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.detector_id.len() + self.fingerprint.len() + 1);
        bytes.extend_from_slice(self.detector_id.as_bytes());
        bytes.push(0x1f);
        bytes.extend_from_slice(self.fingerprint.as_bytes());
        bytes
    }
}

/// Compute a stable fingerprint for a (file, location) pair
pub fn compute_fingerprint(file_path: &str, line_number: usize, line_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.as_bytes());
    hasher.update(b":");
    hasher.update(line_number.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(line_text.as_bytes());
    let digest = hasher.finalize();
    // 16 bytes is plenty of collision margin at cache scale
    hex::encode(&digest[..16])
}

// ============================================================================
// DETECTION RECORD
// ============================================================================

/// One observed match of one rule against one file location.
/// Immutable once validated - later validations supersede, never mutate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub detector_id: String,
    pub rule_id: String,
    pub fingerprint: String,
    pub file_type: String,
    /// Confidence at observation time (0.0 - 1.0)
    pub confidence: f64,
    pub severity: Severity,
    pub ground_truth: GroundTruth,
    /// Unix timestamp of the observation
    pub timestamp: i64,
    /// How many times this exact key has been re-observed
    pub hit_count: u64,
}

impl DetectionRecord {
    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.detector_id.clone(), self.fingerprint.clone())
    }

    pub fn is_validated(&self) -> bool {
        self.ground_truth != GroundTruth::Unknown
    }
}

// ============================================================================
// DETECTOR STATISTICS
// ============================================================================

/// Per-detector running counters, mutated only through gate-approved events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorStatistics {
    pub total_detections: u64,
    pub validated_count: u64,
    pub true_positives: u64,
    pub false_positives: u64,
}

impl DetectorStatistics {
    /// true_positives / (true_positives + false_positives).
    /// Undefined without validated data - treated as 0.0.
    pub fn precision(&self) -> f64 {
        let validated = self.true_positives + self.false_positives;
        if validated == 0 {
            return 0.0;
        }
        self.true_positives as f64 / validated as f64
    }

    pub fn record_detection(&mut self) {
        self.total_detections += 1;
    }

    pub fn record_validation(&mut self, label: GroundTruth) {
        match label {
            GroundTruth::TruePositive => {
                self.validated_count += 1;
                self.true_positives += 1;
            }
            GroundTruth::FalsePositive => {
                self.validated_count += 1;
                self.false_positives += 1;
            }
            GroundTruth::Unknown => {}
        }
    }

    /// Undo one previously applied validation (rollback path)
    pub fn revert_validation(&mut self, label: GroundTruth) {
        match label {
            GroundTruth::TruePositive => {
                self.validated_count = self.validated_count.saturating_sub(1);
                self.true_positives = self.true_positives.saturating_sub(1);
            }
            GroundTruth::FalsePositive => {
                self.validated_count = self.validated_count.saturating_sub(1);
                self.false_positives = self.false_positives.saturating_sub(1);
            }
            GroundTruth::Unknown => {}
        }
    }
}

// ============================================================================
// CACHE ERRORS
// ============================================================================

#[derive(Debug)]
pub enum CacheError {
    IoError(std::io::Error),
    SerializationError(serde_json::Error),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::IoError(e) => write!(f, "IO Error: {}", e),
            CacheError::SerializationError(e) => write!(f, "Serialization Error: {}", e),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::IoError(err)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::SerializationError(err)
    }
}

// ============================================================================
// TESTS
// ============================================================================
