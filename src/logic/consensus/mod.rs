//! Consensus Orchestrator - Multi-Agent Scan Coordination
//!
//! Runs the agent set (all, or an adaptively selected subset) over each
//! file, groups per-line detections, and resolves every group into at
//! most one ConsensusFinding. Enforces the process memory budget via
//! best-effort emergency eviction before each file.
//!
//! Per-scan lifecycle: Idle -> AgentsRunning -> Aggregating -> Done.

pub mod memory;
pub mod resolver;
pub mod types;

#[cfg(test)]
mod tests;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::constants::{get_memory_budget, ADAPTIVE_ACCURACY_THRESHOLD};
use crate::logic::agent::types::DetectionResult;
use crate::logic::agent::PatternAgent;
use crate::logic::cache::types::Severity;
use crate::logic::cache::{DetectionCache, Observation};
use memory::MemoryMonitor;
use types::{ConsensusFinding, FileScanOutcome, OrchestratorError, ScanState, ScanStats};

/// Upper bound on records removed per emergency eviction round
const EMERGENCY_EVICT_LIMIT: usize = 500;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Adaptive mode: skip agents with weak history for the file type.
    /// CRITICAL-severity agents always run regardless.
    pub adaptive: bool,
    pub accuracy_threshold: f64,
    pub memory_budget_bytes: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            adaptive: false,
            accuracy_threshold: ADAPTIVE_ACCURACY_THRESHOLD,
            memory_budget_bytes: get_memory_budget(),
        }
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct ConsensusOrchestrator {
    agents: Vec<PatternAgent>,
    cache: Arc<DetectionCache>,
    config: OrchestratorConfig,
    monitor: MemoryMonitor,
    stats: Mutex<ScanStats>,
}

/// Advance one scan's lifecycle. Each scan_file call owns its own state
/// machine, so concurrent scans never see each other's phases.
fn advance(file_path: &str, from: ScanState, to: ScanState) -> ScanState {
    log::trace!("{}: {} -> {}", file_path, from.as_str(), to.as_str());
    to
}

impl ConsensusOrchestrator {
    /// Configuration errors fail fast, before any file is touched.
    pub fn new(
        agents: Vec<PatternAgent>,
        cache: Arc<DetectionCache>,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        if agents.is_empty() {
            return Err(OrchestratorError::NoAgents);
        }
        if config.memory_budget_bytes == 0 {
            return Err(OrchestratorError::InvalidMemoryBudget);
        }

        let monitor = MemoryMonitor::new(config.memory_budget_bytes);
        Ok(Self {
            agents,
            cache,
            config,
            monitor,
            stats: Mutex::new(ScanStats::default()),
        })
    }

    pub fn stats(&self) -> ScanStats {
        self.stats.lock().clone()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = ScanStats::default();
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    // ========================================================================
    // SCANNING
    // ========================================================================

    /// Scan one file's source text and resolve consensus findings.
    pub fn scan_file(&self, file_path: &str, source: &str, file_type: &str) -> FileScanOutcome {
        self.check_memory_pressure();

        let mut state = advance(file_path, ScanState::Idle, ScanState::AgentsRunning);
        let selected = self.select_agents(file_type);
        let selected_count = selected.len();

        let mut detections: Vec<DetectionResult> = Vec::new();
        let mut agent_failures = 0usize;
        for agent in &selected {
            // One misbehaving agent must not take down the scan
            match catch_unwind(AssertUnwindSafe(|| {
                agent.detect(source, file_path, file_type)
            })) {
                Ok(found) => detections.extend(found),
                Err(_) => {
                    agent_failures += 1;
                    log::error!(
                        "Agent {} failed on {} - isolated, scan continues",
                        agent.detector_id(),
                        file_path
                    );
                }
            }
        }

        // Record every observation (unlabeled - labels go through the gate)
        for detection in &detections {
            self.cache.put(Observation {
                detector_id: detection.detector_id.clone(),
                rule_id: detection.rule_id.clone(),
                fingerprint: detection.fingerprint.clone(),
                file_type: file_type.to_string(),
                confidence: detection.confidence,
                severity: detection.severity,
                label: None,
            });
        }

        state = advance(file_path, state, ScanState::Aggregating);
        let detection_count = detections.len();
        let groups = resolver::group_by_line(detections);
        let mut findings: Vec<ConsensusFinding> = groups
            .values()
            .filter_map(|group| resolver::resolve_line(group))
            .collect();
        findings.sort_by_key(|f| f.line_number);

        let resolved_lines = findings.len();
        let grouped_lines = groups.len();

        {
            let mut stats = self.stats.lock();
            stats.files_scanned += 1;
            if agent_failures > 0 {
                stats.files_failed += 1;
            }
            stats.agents_run += selected_count;
            stats.detections += detection_count;
            stats.consensus_findings += resolved_lines;
            stats.weak_dropped += grouped_lines - resolved_lines;
            stats.review_required += findings
                .iter()
                .filter(|f| f.references.needs_review())
                .count();
            stats.conflicts_resolved += findings.iter().filter(|f| f.disagreement).count();
            stats.memory_usage_bytes = self.monitor.usage_bytes();
        }

        state = advance(file_path, state, ScanState::Done);

        FileScanOutcome {
            file_path: file_path.to_string(),
            findings,
            detections: detection_count,
            agents_selected: selected_count,
            state,
        }
    }

    /// Scan a batch, abortable between files. Cache state stays consistent
    /// at every file boundary.
    pub fn scan_files(
        &self,
        files: &[(String, String, String)],
        cancel: &AtomicBool,
    ) -> Vec<FileScanOutcome> {
        let mut outcomes = Vec::with_capacity(files.len());
        for (file_path, source, file_type) in files {
            if cancel.load(Ordering::SeqCst) {
                log::info!(
                    "Scan cancelled after {} of {} files",
                    outcomes.len(),
                    files.len()
                );
                self.stats.lock().cancelled = true;
                break;
            }
            outcomes.push(self.scan_file(file_path, source, file_type));
        }
        outcomes
    }

    // ========================================================================
    // AGENT SELECTION
    // ========================================================================

    /// Default: every agent. Adaptive: agents with proven accuracy for the
    /// file type, plus unconditionally every CRITICAL agent. With no
    /// learned history at all, adaptive falls back to the full set.
    fn select_agents(&self, file_type: &str) -> Vec<&PatternAgent> {
        if !self.config.adaptive {
            return self.agents.iter().collect();
        }

        let any_history = !self.cache.predict(file_type, 0.0).is_empty();
        if !any_history {
            log::debug!("No history for file type '{}' - running all agents", file_type);
            return self.agents.iter().collect();
        }

        let proven: std::collections::HashSet<String> = self
            .cache
            .predict(file_type, self.config.accuracy_threshold)
            .into_iter()
            .map(|(rule_id, _)| rule_id)
            .collect();

        let selected: Vec<&PatternAgent> = self
            .agents
            .iter()
            .filter(|agent| {
                agent.severity() == Severity::Critical || proven.contains(&agent.rule().id)
            })
            .collect();

        log::debug!(
            "Adaptive selection for '{}': {} of {} agents",
            file_type,
            selected.len(),
            self.agents.len()
        );
        selected
    }

    // ========================================================================
    // MEMORY PRESSURE
    // ========================================================================

    fn check_memory_pressure(&self) {
        if !self.monitor.over_pressure() {
            return;
        }

        log::warn!(
            "Memory usage {} above {:.0}% of budget {} - emergency eviction",
            self.monitor.usage_bytes(),
            crate::constants::MEMORY_PRESSURE_FRACTION * 100.0,
            self.monitor.budget_bytes()
        );
        let removed = self.cache.emergency_evict(EMERGENCY_EVICT_LIMIT);
        if removed == 0 {
            // Degraded but never halted
            log::error!("Emergency eviction freed nothing - continuing overcommitted");
        }
        self.stats.lock().emergency_evictions += removed;
    }
}
