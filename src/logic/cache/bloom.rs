//! Bloom Filter - Fast Membership Stage
//!
//! First stage of the two-stage lookup. May report false positives,
//! never false negatives. Every positive is confirmed (or eliminated)
//! by the trie walk in the second stage.
//!
//! No deletion support: evicted keys leave their bits set, which only
//! costs extra trie walks, never correctness.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

use crate::constants::{BLOOM_BITS_PER_KEY, BLOOM_HASH_COUNT};

// ============================================================================
// BLOOM FILTER
// ============================================================================

pub struct BloomFilter {
    bits: Vec<u64>,
    bit_count: usize,
    hash_count: usize,
    inserted: usize,
}

impl BloomFilter {
    /// Size the filter for an expected number of keys
    pub fn with_capacity(expected_keys: usize) -> Self {
        let bit_count = (expected_keys.max(64) * BLOOM_BITS_PER_KEY).next_power_of_two();
        Self {
            bits: vec![0u64; bit_count / 64],
            bit_count,
            hash_count: BLOOM_HASH_COUNT,
            inserted: 0,
        }
    }

    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = self.hash_pair(key);
        for i in 0..self.hash_count {
            let bit = self.bit_index(h1, h2, i);
            self.bits[bit / 64] |= 1u64 << (bit % 64);
        }
        self.inserted += 1;
    }

    /// May return true for keys never inserted; never returns false for
    /// keys that were.
    pub fn contains(&self, key: &[u8]) -> bool {
        let (h1, h2) = self.hash_pair(key);
        for i in 0..self.hash_count {
            let bit = self.bit_index(h1, h2, i);
            if self.bits[bit / 64] & (1u64 << (bit % 64)) == 0 {
                return false;
            }
        }
        true
    }

    pub fn inserted_count(&self) -> usize {
        self.inserted
    }

    pub fn bit_size(&self) -> usize {
        self.bit_count
    }

    pub fn clear(&mut self) {
        self.bits.fill(0);
        self.inserted = 0;
    }

    // ========================================================================
    // INTERNAL HELPERS
    // ========================================================================

    /// Double hashing: bit_i = h1 + i * h2 (Kirsch-Mitzenmacher)
    fn bit_index(&self, h1: u64, h2: u64, i: usize) -> usize {
        let combined = h1.wrapping_add((i as u64).wrapping_mul(h2));
        (combined % self.bit_count as u64) as usize
    }

    fn hash_pair(&self, key: &[u8]) -> (u64, u64) {
        let mut hasher = DefaultHasher::new();
        hasher.write(key);
        let h1 = hasher.finish();

        let mut hasher = DefaultHasher::new();
        hasher.write_u64(0x9e37_79b9_7f4a_7c15);
        hasher.write(key);
        let h2 = hasher.finish() | 1; // Force odd so the stride never degenerates

        (h1, h2)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_false_negatives() {
        let mut bloom = BloomFilter::with_capacity(1000);
        for i in 0..1000 {
            bloom.insert(format!("detector-{}", i).as_bytes());
        }
        for i in 0..1000 {
            assert!(bloom.contains(format!("detector-{}", i).as_bytes()));
        }
    }

    #[test]
    fn test_empty_filter_contains_nothing() {
        let bloom = BloomFilter::with_capacity(100);
        assert!(!bloom.contains(b"anything"));
    }

    #[test]
    fn test_false_positive_rate_bounded() {
        let mut bloom = BloomFilter::with_capacity(1000);
        for i in 0..1000 {
            bloom.insert(format!("member-{}", i).as_bytes());
        }

        let mut false_positives = 0;
        for i in 0..10_000 {
            if bloom.contains(format!("non-member-{}", i).as_bytes()) {
                false_positives += 1;
            }
        }
        // 10 bits/key with 4 hashes sits near 1%; allow generous slack
        assert!(false_positives < 500, "fp count {}", false_positives);
    }

    #[test]
    fn test_clear() {
        let mut bloom = BloomFilter::with_capacity(100);
        bloom.insert(b"key");
        assert!(bloom.contains(b"key"));
        bloom.clear();
        assert!(!bloom.contains(b"key"));
        assert_eq!(bloom.inserted_count(), 0);
    }
}
