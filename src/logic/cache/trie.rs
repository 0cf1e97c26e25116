//! Key Trie - Deterministic Confirmation Stage
//!
//! Second stage of the two-stage lookup. Walks the exact key bytes, so a
//! hit is always the queried key's record - any Bloom false positive dies
//! here. Terminal nodes own the detection records.

use super::types::DetectionRecord;
use std::collections::HashMap;

// ============================================================================
// TRIE
// ============================================================================

#[derive(Default)]
struct TrieNode {
    children: HashMap<u8, TrieNode>,
    record: Option<DetectionRecord>,
}

impl TrieNode {
    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.record.is_none()
    }
}

#[derive(Default)]
pub struct KeyTrie {
    root: TrieNode,
    len: usize,
}

impl KeyTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Returns the previous record for this exact key.
    pub fn insert(&mut self, key: &[u8], record: DetectionRecord) -> Option<DetectionRecord> {
        let mut node = &mut self.root;
        for &byte in key {
            node = node.children.entry(byte).or_default();
        }
        let previous = node.record.replace(record);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Exact walk. Returns None the moment a byte has no edge.
    pub fn get(&self, key: &[u8]) -> Option<&DetectionRecord> {
        let mut node = &self.root;
        for &byte in key {
            node = node.children.get(&byte)?;
        }
        node.record.as_ref()
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut DetectionRecord> {
        let mut node = &mut self.root;
        for &byte in key {
            node = node.children.get_mut(&byte)?;
        }
        node.record.as_mut()
    }

    /// Remove the record for a key, pruning dead branches on the way out.
    pub fn remove(&mut self, key: &[u8]) -> Option<DetectionRecord> {
        let removed = Self::remove_inner(&mut self.root, key);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    fn remove_inner(node: &mut TrieNode, key: &[u8]) -> Option<DetectionRecord> {
        match key.split_first() {
            None => node.record.take(),
            Some((&byte, rest)) => {
                let child = node.children.get_mut(&byte)?;
                let removed = Self::remove_inner(child, rest);
                if removed.is_some() && child.is_empty() {
                    node.children.remove(&byte);
                }
                removed
            }
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Collect references to every live record (snapshot support)
    pub fn records(&self) -> Vec<&DetectionRecord> {
        let mut out = Vec::with_capacity(self.len);
        Self::collect(&self.root, &mut out);
        out
    }

    fn collect<'a>(node: &'a TrieNode, out: &mut Vec<&'a DetectionRecord>) {
        if let Some(record) = &node.record {
            out.push(record);
        }
        for child in node.children.values() {
            Self::collect(child, out);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::cache::types::{GroundTruth, Severity};

    fn record(detector: &str, fingerprint: &str) -> DetectionRecord {
        DetectionRecord {
            detector_id: detector.to_string(),
            rule_id: "r1".to_string(),
            fingerprint: fingerprint.to_string(),
            file_type: "py".to_string(),
            confidence: 0.8,
            severity: Severity::High,
            ground_truth: GroundTruth::Unknown,
            timestamp: 0,
            hit_count: 1,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let mut trie = KeyTrie::new();
        trie.insert(b"d1\x1fabc", record("d1", "abc"));
        assert_eq!(trie.len(), 1);

        let found = trie.get(b"d1\x1fabc").unwrap();
        assert_eq!(found.detector_id, "d1");
        assert!(trie.get(b"d1\x1fabd").is_none());
        assert!(trie.get(b"d1\x1fab").is_none());
    }

    #[test]
    fn test_replace_does_not_duplicate() {
        let mut trie = KeyTrie::new();
        trie.insert(b"d1\x1fabc", record("d1", "abc"));
        let previous = trie.insert(b"d1\x1fabc", record("d1", "abc"));
        assert!(previous.is_some());
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn test_remove_prunes() {
        let mut trie = KeyTrie::new();
        trie.insert(b"d1\x1faaa", record("d1", "aaa"));
        trie.insert(b"d1\x1faab", record("d1", "aab"));

        assert!(trie.remove(b"d1\x1faaa").is_some());
        assert_eq!(trie.len(), 1);
        assert!(trie.get(b"d1\x1faaa").is_none());
        assert!(trie.get(b"d1\x1faab").is_some());

        // Removing a missing key is a no-op
        assert!(trie.remove(b"d1\x1faaa").is_none());
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn test_records_traversal() {
        let mut trie = KeyTrie::new();
        for fp in ["x1", "x2", "x3"] {
            trie.insert(format!("d1\x1f{}", fp).as_bytes(), record("d1", fp));
        }
        assert_eq!(trie.records().len(), 3);
    }
}
