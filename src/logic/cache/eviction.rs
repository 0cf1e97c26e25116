//! Eviction Heap - Lowest-Value-First with Lazy Deletion
//!
//! Value is NOT recency or frequency:
//!   score = precision(detector) x decay(age) x severity_weight
//! so knowledge from historically unreliable detectors is shed first and
//! recent high-severity validated findings last.
//!
//! Updates never search the heap. A re-scored key gets a fresh entry with
//! a bumped generation; the old entry stays behind as stale and is
//! classified explicitly on pop, so correctness never depends on timing.
//! Pushes compact the heap once stale entries outnumber live ones, which
//! bounds it at twice the live key count. Each pop is O(log n) amortized.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use super::types::{CacheKey, Severity};
use crate::constants::DECAY_HALF_LIFE_DAYS;

const SECS_PER_DAY: f64 = 86_400.0;

/// Below this size, stale entries are cheaper than compaction passes
const COMPACT_MIN_ENTRIES: usize = 64;

// ============================================================================
// SCORING
// ============================================================================

/// Retention value of one cached record
pub fn eviction_score(precision: f64, age_secs: i64, severity: Severity) -> f64 {
    let age_days = (age_secs.max(0) as f64) / SECS_PER_DAY;
    let decay = 0.5f64.powf(age_days / DECAY_HALF_LIFE_DAYS);
    precision * decay * severity.weight()
}

// ============================================================================
// HEAP ENTRIES
// ============================================================================

#[derive(Debug, Clone)]
struct HeapEntry {
    key: CacheKey,
    score: f64,
    generation: u64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.generation == other.generation
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // Reversed: BinaryHeap is a max-heap, we want the lowest score on top
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

/// Outcome of classifying a popped heap entry
#[derive(Debug, PartialEq)]
pub enum PoppedEntry {
    /// Entry is current: this key is the live minimum
    Valid { key: CacheKey, score: f64 },
    /// Entry was superseded or its key removed; skip it
    Stale,
}

// ============================================================================
// EVICTION HEAP
// ============================================================================

#[derive(Default)]
pub struct EvictionHeap {
    heap: BinaryHeap<HeapEntry>,
    /// Current generation per live key; entries with older generations are stale
    generations: HashMap<CacheKey, u64>,
    next_generation: u64,
}

impl EvictionHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or re-score a key. Any previous entry for it becomes stale.
    /// Compacts once stale entries outnumber live ones, so a stable working
    /// set that keeps re-scoring cannot grow the heap without bound.
    pub fn push(&mut self, key: CacheKey, score: f64) {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.generations.insert(key.clone(), generation);
        self.heap.push(HeapEntry {
            key,
            score,
            generation,
        });
        if self.heap.len() > COMPACT_MIN_ENTRIES
            && self.heap.len() > self.generations.len() * 2
        {
            self.compact();
        }
    }

    /// Drop a key without touching the heap; its entries go stale in place.
    pub fn invalidate(&mut self, key: &CacheKey) {
        self.generations.remove(key);
    }

    /// Pop the lowest-scored live key, skipping stale entries.
    pub fn pop_lowest(&mut self) -> Option<CacheKey> {
        while let Some(entry) = self.heap.pop() {
            match self.classify(&entry) {
                PoppedEntry::Valid { key, .. } => {
                    self.generations.remove(&key);
                    return Some(key);
                }
                PoppedEntry::Stale => continue,
            }
        }
        None
    }

    fn classify(&self, entry: &HeapEntry) -> PoppedEntry {
        match self.generations.get(&entry.key) {
            Some(&current) if current == entry.generation => PoppedEntry::Valid {
                key: entry.key.clone(),
                score: entry.score,
            },
            _ => PoppedEntry::Stale,
        }
    }

    /// Rebuild the heap from current-generation entries only. O(live),
    /// amortized across the pushes that created the stale entries.
    fn compact(&mut self) {
        let entries = std::mem::take(&mut self.heap);
        self.heap = entries
            .into_iter()
            .filter(|entry| self.generations.get(&entry.key) == Some(&entry.generation))
            .collect();
    }

    /// Live key count (not the raw heap size, which includes stale entries)
    pub fn live_len(&self) -> usize {
        self.generations.len()
    }

    /// Raw heap size including stale entries
    pub fn entry_len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
