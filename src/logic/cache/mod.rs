//! Detection Cache - Deduplicated, Accuracy-Aware Detection Store
//!
//! Owns every past (detector, fingerprint) observation, the per-detector
//! precision statistics, and the (rule, file-type) correlation table.
//!
//! Lookup is two-stage: a Bloom membership test (false positives possible,
//! false negatives impossible) followed by an exact trie walk that kills
//! any Bloom false positive. The caller never sees a wrong record.
//!
//! Shared across scanning threads as `Arc<DetectionCache>`; one RwLock
//! guards the interior, so lookups run concurrently and mutations
//! serialize.

pub mod bloom;
pub mod correlation;
pub mod eviction;
pub mod persistence;
pub mod trie;
pub mod types;


use std::collections::{HashMap, HashSet};

use chrono::Utc;
use parking_lot::RwLock;

use bloom::BloomFilter;
use correlation::CorrelationTable;
use eviction::{eviction_score, EvictionHeap};
use trie::KeyTrie;
use types::{CacheKey, DetectionRecord, DetectorStatistics, GroundTruth, Severity};

// ============================================================================
// OBSERVATION INPUT
// ============================================================================

/// One observation handed to `put`. The label field is reserved for the
/// Learning Safety Gate - agents and the orchestrator always pass None.
#[derive(Debug, Clone)]
pub struct Observation {
    pub detector_id: String,
    pub rule_id: String,
    pub fingerprint: String,
    pub file_type: String,
    pub confidence: f64,
    pub severity: Severity,
    pub label: Option<GroundTruth>,
}

// ============================================================================
// CACHE STATE
// ============================================================================

struct CacheInner {
    bloom: BloomFilter,
    trie: KeyTrie,
    heap: EvictionHeap,
    stats: HashMap<String, DetectorStatistics>,
    correlations: CorrelationTable,
    /// fingerprints per detector, for targeted emergency eviction
    keys_by_detector: HashMap<String, HashSet<String>>,
    evictions_total: u64,
}

pub struct DetectionCache {
    inner: RwLock<CacheInner>,
    capacity: usize,
}

impl DetectionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                bloom: BloomFilter::with_capacity(capacity),
                trie: KeyTrie::new(),
                heap: EvictionHeap::new(),
                stats: HashMap::new(),
                correlations: CorrelationTable::new(),
                keys_by_detector: HashMap::new(),
                evictions_total: 0,
            }),
            capacity,
        }
    }

    /// Default capacity, overridable via SCAN_CACHE_CAPACITY
    pub fn with_default_capacity() -> Self {
        Self::new(crate::constants::get_cache_capacity())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // ========================================================================
    // PUT / GET
    // ========================================================================

    /// Record an observation. Re-inserting an existing key updates its
    /// record in place rather than duplicating. May trigger eviction when
    /// capacity is exceeded.
    pub fn put(&self, observation: Observation) -> usize {
        let now = Utc::now().timestamp();
        let mut inner = self.inner.write();

        inner
            .stats
            .entry(observation.detector_id.clone())
            .or_default()
            .record_detection();
        inner
            .correlations
            .record_observation(&observation.rule_id, &observation.file_type, now);

        if let Some(label) = observation.label.filter(|l| *l != GroundTruth::Unknown) {
            if let Some(stats) = inner.stats.get_mut(&observation.detector_id) {
                stats.record_validation(label);
            }
            if label == GroundTruth::TruePositive {
                inner.correlations.record_true_positive(
                    &observation.rule_id,
                    &observation.file_type,
                    now,
                );
            }
        }

        let key = CacheKey::new(
            observation.detector_id.clone(),
            observation.fingerprint.clone(),
        );
        let composite = key.composite();

        if let Some(existing) = inner.trie.get_mut(&composite) {
            existing.hit_count += 1;
            existing.confidence = observation.confidence;
            existing.timestamp = now;
            if let Some(label) = observation.label {
                if label != GroundTruth::Unknown {
                    existing.ground_truth = label;
                }
            }
        } else {
            let record = DetectionRecord {
                detector_id: observation.detector_id.clone(),
                rule_id: observation.rule_id.clone(),
                fingerprint: observation.fingerprint.clone(),
                file_type: observation.file_type.clone(),
                confidence: observation.confidence,
                severity: observation.severity,
                ground_truth: observation.label.unwrap_or(GroundTruth::Unknown),
                timestamp: now,
                hit_count: 1,
            };
            inner.bloom.insert(&composite);
            inner.trie.insert(&composite, record);
            inner
                .keys_by_detector
                .entry(observation.detector_id.clone())
                .or_default()
                .insert(observation.fingerprint.clone());
        }

        let precision = inner
            .stats
            .get(&observation.detector_id)
            .map(|s| s.precision())
            .unwrap_or(0.0);
        let score = eviction_score(precision, 0, observation.severity);
        inner.heap.push(key, score);

        if inner.trie.len() > self.capacity {
            Self::evict_to_capacity(&mut inner, self.capacity)
        } else {
            0
        }
    }

    /// Two-stage lookup. Bloom miss short-circuits; a Bloom hit is
    /// confirmed by the trie walk, so no false positive ever escapes.
    pub fn get(&self, detector_id: &str, fingerprint: &str) -> Option<DetectionRecord> {
        let key = CacheKey::new(detector_id, fingerprint);
        let composite = key.composite();

        let inner = self.inner.read();
        if !inner.bloom.contains(&composite) {
            return None;
        }
        inner.trie.get(&composite).cloned()
    }

    // ========================================================================
    // LEARNED-STATE QUERIES
    // ========================================================================

    /// Rules historically worth running against a file type, best first
    pub fn predict(&self, file_type: &str, min_accuracy: f64) -> Vec<(String, f64)> {
        let now = Utc::now().timestamp();
        self.inner.read().correlations.predict(file_type, min_accuracy, now)
    }

    /// Blend a base confidence with the learned (rule, file type) accuracy
    pub fn blend_confidence(&self, base: f64, rule_id: &str, file_type: &str) -> f64 {
        let now = Utc::now().timestamp();
        self.inner
            .read()
            .correlations
            .bayesian_confidence(base, rule_id, file_type, now)
    }

    pub fn precision(&self, detector_id: &str) -> f64 {
        self.inner
            .read()
            .stats
            .get(detector_id)
            .map(|s| s.precision())
            .unwrap_or(0.0)
    }

    pub fn detector_stats(&self, detector_id: &str) -> Option<DetectorStatistics> {
        self.inner.read().stats.get(detector_id).cloned()
    }

    // ========================================================================
    // VALIDATION PATH (Learning Safety Gate only)
    // ========================================================================

    /// Apply one gate-approved validation. Updates statistics and the
    /// correlation table atomically, supersedes the cached record's label
    /// if the record is still live, and re-scores it for eviction.
    /// `confidence_factor` carries the gate's staleness decay (1.0 fresh).
    pub fn record_validation(
        &self,
        detector_id: &str,
        rule_id: &str,
        fingerprint: &str,
        file_type: &str,
        label: GroundTruth,
        confidence_factor: f64,
    ) {
        let now = Utc::now().timestamp();
        let mut inner = self.inner.write();

        inner
            .stats
            .entry(detector_id.to_string())
            .or_default()
            .record_validation(label);
        if label == GroundTruth::TruePositive {
            // The scan-time put already counted the observation itself
            inner.correlations.record_true_positive(rule_id, file_type, now);
        }

        let key = CacheKey::new(detector_id, fingerprint);
        let composite = key.composite();
        let severity = if let Some(record) = inner.trie.get_mut(&composite) {
            record.ground_truth = label;
            record.confidence = (record.confidence * confidence_factor)
                .clamp(crate::constants::CONFIDENCE_FLOOR, crate::constants::CONFIDENCE_CEILING);
            record.timestamp = now;
            Some(record.severity)
        } else {
            None
        };

        // Statistics are authoritative even when the raw record was evicted
        if let Some(severity) = severity {
            let precision = inner
                .stats
                .get(detector_id)
                .map(|s| s.precision())
                .unwrap_or(0.0);
            let score = eviction_score(precision, 0, severity);
            inner.heap.push(key, score);
        }

        log::debug!(
            "Validation applied: detector={} rule={} label={}",
            detector_id,
            rule_id,
            label.as_str()
        );
    }

    /// Undo one previously applied validation (gate rollback path)
    pub fn revert_validation(
        &self,
        detector_id: &str,
        rule_id: &str,
        fingerprint: &str,
        file_type: &str,
        label: GroundTruth,
    ) {
        let mut inner = self.inner.write();
        if let Some(stats) = inner.stats.get_mut(detector_id) {
            stats.revert_validation(label);
        }
        if label == GroundTruth::TruePositive {
            inner.correlations.revert_true_positive(rule_id, file_type);
        }

        let composite = CacheKey::new(detector_id, fingerprint).composite();
        if let Some(record) = inner.trie.get_mut(&composite) {
            record.ground_truth = GroundTruth::Unknown;
        }
    }

    // ========================================================================
    // EVICTION
    // ========================================================================

    /// Shed lowest-value records until the live set fits capacity.
    /// Removes raw detection records only - statistics, correlations and
    /// validation history are never eviction targets.
    pub fn evict(&self) -> usize {
        let mut inner = self.inner.write();
        let capacity = self.capacity;
        Self::evict_to_capacity(&mut inner, capacity)
    }

    fn evict_to_capacity(inner: &mut CacheInner, capacity: usize) -> usize {
        let mut removed = 0;
        while inner.trie.len() > capacity {
            match inner.heap.pop_lowest() {
                Some(key) => {
                    Self::remove_record(inner, &key);
                    removed += 1;
                }
                None => break,
            }
        }
        if removed > 0 {
            inner.evictions_total += removed as u64;
            log::debug!("Evicted {} records (capacity {})", removed, capacity);
        }
        removed
    }

    /// Best-effort shrink under memory pressure: drops records belonging
    /// to the lowest-precision quartile of detectors, up to `max_records`.
    pub fn emergency_evict(&self, max_records: usize) -> usize {
        let mut inner = self.inner.write();

        let mut by_precision: Vec<(String, f64)> = inner
            .stats
            .iter()
            .map(|(id, s)| (id.clone(), s.precision()))
            .collect();
        by_precision.sort_by(|a, b| a.1.total_cmp(&b.1));
        let quartile = (by_precision.len() / 4).max(1).min(by_precision.len());

        let mut removed = 0;
        for (detector_id, _) in by_precision.into_iter().take(quartile) {
            let fingerprints: Vec<String> = inner
                .keys_by_detector
                .get(&detector_id)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            for fingerprint in fingerprints {
                if removed >= max_records {
                    break;
                }
                let key = CacheKey::new(detector_id.clone(), fingerprint);
                if Self::remove_record(&mut inner, &key) {
                    removed += 1;
                }
            }
            if removed >= max_records {
                break;
            }
        }

        inner.evictions_total += removed as u64;
        log::warn!(
            "Emergency eviction removed {} records from low-precision detectors",
            removed
        );
        removed
    }

    fn remove_record(inner: &mut CacheInner, key: &CacheKey) -> bool {
        let composite = key.composite();
        // Bloom bits stay set; the trie is the deciding stage
        let removed = inner.trie.remove(&composite).is_some();
        if removed {
            inner.heap.invalidate(key);
            if let Some(set) = inner.keys_by_detector.get_mut(&key.detector_id) {
                set.remove(&key.fingerprint);
            }
        }
        removed
    }

    // ========================================================================
    // STATISTICS
    // ========================================================================

    pub fn len(&self) -> usize {
        self.inner.read().trie.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().trie.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        let validated = inner.stats.values().map(|s| s.validated_count).sum();
        CacheStats {
            live_records: inner.trie.len(),
            capacity: self.capacity,
            detector_count: inner.stats.len(),
            validated_count: validated,
            correlation_count: inner.correlations.len(),
            bloom_bits: inner.bloom.bit_size(),
            evictions_total: inner.evictions_total,
        }
    }
}

impl DetectionCache {
    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    /// Point-in-time snapshot of the learned state plus a bounded window
    /// of recent raw records.
    pub fn snapshot(&self) -> persistence::CacheSnapshot {
        let inner = self.inner.read();
        let records = inner.trie.records().into_iter().cloned().collect();
        persistence::CacheSnapshot::new(
            inner.stats.clone(),
            inner.correlations.clone(),
            records,
        )
    }

    /// Rebuild a cache from a snapshot: membership, confirmation and
    /// eviction indexes are reconstructed from the records.
    pub fn from_snapshot(snapshot: persistence::CacheSnapshot, capacity: usize) -> Self {
        let cache = Self::new(capacity);
        {
            let mut inner = cache.inner.write();
            inner.stats = snapshot.stats;
            inner.correlations = snapshot.correlations;

            for record in snapshot.records {
                let key = record.key();
                let composite = key.composite();
                let precision = inner
                    .stats
                    .get(&record.detector_id)
                    .map(|s| s.precision())
                    .unwrap_or(0.0);
                let age = chrono::Utc::now().timestamp() - record.timestamp;
                let score = eviction_score(precision, age, record.severity);

                inner.bloom.insert(&composite);
                inner
                    .keys_by_detector
                    .entry(record.detector_id.clone())
                    .or_default()
                    .insert(record.fingerprint.clone());
                inner.trie.insert(&composite, record);
                inner.heap.push(key, score);
            }
        }
        cache
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), types::CacheError> {
        persistence::save_snapshot(path, &self.snapshot())
    }

    pub fn load_from(
        path: &std::path::Path,
        capacity: usize,
    ) -> Result<Self, types::CacheError> {
        let snapshot = persistence::load_snapshot(path)?;
        Ok(Self::from_snapshot(snapshot, capacity))
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub live_records: usize,
    pub capacity: usize,
    pub detector_count: usize,
    pub validated_count: u64,
    pub correlation_count: usize,
    pub bloom_bits: usize,
    pub evictions_total: u64,
}
