//! Plugin Security Scanner - Detection Cache & Consensus Core
//!
//! Engine library behind the plugin scanner: pattern agents detect, the
//! consensus orchestrator resolves their disagreements, the detection
//! cache remembers and learns, and the safety gate keeps that learning
//! from being poisoned.
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//! use plugin_scan_core::logic::agent::{builtin_rules, PatternAgent};
//! use plugin_scan_core::logic::cache::DetectionCache;
//! use plugin_scan_core::logic::consensus::{ConsensusOrchestrator, OrchestratorConfig};
//! use plugin_scan_core::logic::safety::LearningSafetyGate;
//!
//! let cache = Arc::new(DetectionCache::new(10_000));
//! let agents = builtin_rules()
//!     .into_iter()
//!     .map(|rule| PatternAgent::new(rule, Arc::clone(&cache)))
//!     .collect::<Result<Vec<_>, _>>()
//!     .unwrap();
//! let orchestrator = ConsensusOrchestrator::new(
//!     agents,
//!     Arc::clone(&cache),
//!     OrchestratorConfig::default(),
//! )
//! .unwrap();
//! let gate = LearningSafetyGate::new(Arc::clone(&cache));
//! let _ = (orchestrator, gate);
//! ```

pub mod constants;
pub mod logic;

pub use logic::agent::{builtin_rules, PatternAgent};
pub use logic::cache::{DetectionCache, Observation};
pub use logic::consensus::{ConsensusOrchestrator, OrchestratorConfig};
pub use logic::safety::LearningSafetyGate;
