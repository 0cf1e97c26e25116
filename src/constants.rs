//! Central Configuration Constants
//!
//! Single source of truth for all tuning defaults.
//! To change a scanner-wide default, only edit this file.

/// Maximum detection records held by the cache before eviction kicks in
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Bloom filter sizing: bits allocated per expected key
pub const BLOOM_BITS_PER_KEY: usize = 10;

/// Bloom filter hash function count
pub const BLOOM_HASH_COUNT: usize = 4;

/// Half-life (days) for the age decay term in eviction scoring
pub const DECAY_HALF_LIFE_DAYS: f64 = 30.0;

/// Validated knowledge older than this (days) starts decaying in confidence
pub const STALENESS_WINDOW_DAYS: i64 = 90;

/// Automated validations need this many confirming events before approval
pub const MIN_AUTOMATED_CONFIRMATIONS: usize = 3;

/// A lone detection must reach this confidence to survive consensus
pub const SINGLE_DETECTION_CONFIDENCE_MIN: f64 = 0.75;

/// Fraction of the memory budget that triggers emergency eviction
pub const MEMORY_PRESSURE_FRACTION: f64 = 0.90;

/// Default process memory budget (bytes)
pub const DEFAULT_MEMORY_BUDGET_BYTES: u64 = 512 * 1024 * 1024;

/// Minimum historical accuracy for an agent to be selected in adaptive mode
pub const ADAPTIVE_ACCURACY_THRESHOLD: f64 = 0.5;

/// Adjusted confidences are clamped to [floor, ceiling]
pub const CONFIDENCE_FLOOR: f64 = 0.01;
pub const CONFIDENCE_CEILING: f64 = 0.99;

/// Lines of surrounding context captured per detection
pub const CONTEXT_WINDOW_LINES: usize = 2;

/// Detection records kept in a persisted cache snapshot
pub const SNAPSHOT_RECORD_LIMIT: usize = 1_000;

/// Validation events always retained per detection key, even under pressure
pub const AUDIT_RETENTION_PER_KEY: usize = 10;

/// Engine version
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name
pub const ENGINE_NAME: &str = "plugin-scan-core";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get cache capacity from environment or use default
pub fn get_cache_capacity() -> usize {
    std::env::var("SCAN_CACHE_CAPACITY")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_CACHE_CAPACITY)
}

/// Get memory budget from environment or use default
pub fn get_memory_budget() -> u64 {
    std::env::var("SCAN_MEMORY_BUDGET_BYTES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_MEMORY_BUDGET_BYTES)
}
