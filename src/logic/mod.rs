//! Logic Module - Scanning Engines
//!
//! - `cache/` - Detection cache (Bloom + trie lookup, precision statistics,
//!   correlation learning, scored eviction)
//! - `agent/` - Pattern detection agents over compiled rule sets
//! - `consensus/` - Multi-agent scan orchestration and finding resolution
//! - `safety/` - Learning safety gate in front of detector statistics

pub mod agent;
pub mod cache;
pub mod consensus;
pub mod safety;
