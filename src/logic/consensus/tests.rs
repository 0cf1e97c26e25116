use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::types::{OrchestratorError, ScanState};
use super::{ConsensusOrchestrator, OrchestratorConfig};
use crate::logic::agent::types::RuleDefinition;
use crate::logic::agent::PatternAgent;
use crate::logic::cache::types::{GroundTruth, Severity};
use crate::logic::cache::DetectionCache;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn rule(id: &str, pattern: &str, severity: Severity) -> RuleDefinition {
    RuleDefinition {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        pattern: pattern.to_string(),
        severity,
        classification_refs: vec![format!("CWE-{}", id.len())],
        enabled: true,
    }
}

fn orchestrator(
    rules: Vec<RuleDefinition>,
    cache: Arc<DetectionCache>,
    config: OrchestratorConfig,
) -> ConsensusOrchestrator {
    let agents = rules
        .into_iter()
        .map(|r| PatternAgent::new(r, Arc::clone(&cache)).unwrap())
        .collect();
    ConsensusOrchestrator::new(agents, cache, config).unwrap()
}

#[test]
fn test_construction_fails_fast() {
    let cache = Arc::new(DetectionCache::new(100));

    let no_agents = ConsensusOrchestrator::new(
        Vec::new(),
        Arc::clone(&cache),
        OrchestratorConfig::default(),
    );
    assert!(matches!(no_agents, Err(OrchestratorError::NoAgents)));

    let agent = PatternAgent::new(
        rule("r1", "eval", Severity::High),
        Arc::clone(&cache),
    )
    .unwrap();
    let zero_budget = ConsensusOrchestrator::new(
        vec![agent],
        cache,
        OrchestratorConfig {
            memory_budget_bytes: 0,
            ..Default::default()
        },
    );
    assert!(matches!(
        zero_budget,
        Err(OrchestratorError::InvalidMemoryBudget)
    ));
}

#[test]
fn test_scan_reaches_done_state() {
    init_logging();
    let cache = Arc::new(DetectionCache::new(100));
    let orch = orchestrator(
        vec![rule("r1", "eval", Severity::High)],
        cache,
        OrchestratorConfig::default(),
    );
    let outcome = orch.scan_file("a.py", "x = 1\n", "py");
    assert_eq!(outcome.state, ScanState::Done);

    // Each invocation carries its own lifecycle; a second scan's outcome
    // is independent of the first
    let outcome = orch.scan_file("b.py", "y = 2\n", "py");
    assert_eq!(outcome.state, ScanState::Done);
}

#[test]
fn test_critical_low_confidence_survives_medium_does_not() {
    let cache = Arc::new(DetectionCache::new(1_000));
    // Both rules written so heuristics drive confidence well below 0.75
    let orch = orchestrator(
        vec![
            rule("crit", r"os\.system", Severity::Critical),
            rule("med", r"md5\(", Severity::Medium),
        ],
        cache,
        OrchestratorConfig::default(),
    );

    // Context markers push both agents' confidence down near 0.40
    let source = "# test fixture example mock\nos.system(cmd)\n";
    let outcome = orch.scan_file("fixtures.py", source, "py");
    assert_eq!(outcome.findings.len(), 1);
    assert_eq!(outcome.findings[0].severity, Severity::Critical);
    assert!(outcome.findings[0].confidence < 0.75);

    let source = "# test fixture example mock\nh = md5(data)\n";
    let outcome = orch.scan_file("fixtures.py", source, "py");
    assert!(outcome.findings.is_empty());
    assert!(orch.stats().weak_dropped >= 1);
}

#[test]
fn test_overlapping_detections_merge_per_line() {
    let cache = Arc::new(DetectionCache::new(1_000));
    let orch = orchestrator(
        vec![
            rule("shell", r"os\.system", Severity::Critical),
            rule("exec-any", r"system", Severity::Medium),
        ],
        cache,
        OrchestratorConfig::default(),
    );

    let outcome = orch.scan_file("run.py", "os.system(cmd)\n", "py");
    assert_eq!(outcome.findings.len(), 1);
    let finding = &outcome.findings[0];
    assert_eq!(finding.detection_count, 2);
    assert_eq!(finding.severity, Severity::Critical);
    assert_eq!(finding.detector_ids.len(), 2);
}

#[test]
fn test_adaptive_mode_never_skips_critical() {
    let cache = Arc::new(DetectionCache::new(1_000));

    // Teach the cache that only "good" has history for py, all accurate
    for i in 0..4 {
        cache.put(crate::logic::cache::Observation {
            detector_id: "pattern-agent/good".to_string(),
            rule_id: "good".to_string(),
            fingerprint: format!("h-{}", i),
            file_type: "py".to_string(),
            confidence: 0.8,
            severity: Severity::High,
            label: None,
        });
        cache.record_validation(
            "pattern-agent/good",
            "good",
            &format!("h-{}", i),
            "py",
            GroundTruth::TruePositive,
            1.0,
        );
    }

    let orch = orchestrator(
        vec![
            rule("good", r"eval", Severity::High),
            rule("noisy", r"open", Severity::Low),
            rule("crit", r"os\.system", Severity::Critical),
        ],
        cache,
        OrchestratorConfig {
            adaptive: true,
            ..Default::default()
        },
    );

    // "noisy" has no proven accuracy and is skipped; "crit" runs anyway
    let outcome = orch.scan_file("a.py", "eval(x)\nopen(f)\nos.system(c)\n", "py");
    assert_eq!(outcome.agents_selected, 2);
    assert!(outcome
        .findings
        .iter()
        .any(|f| f.detector_ids.iter().any(|d| d.contains("crit"))));
    assert!(!outcome
        .findings
        .iter()
        .any(|f| f.detector_ids.iter().any(|d| d.contains("noisy"))));
}

#[test]
fn test_adaptive_with_no_history_runs_all() {
    let cache = Arc::new(DetectionCache::new(100));
    let orch = orchestrator(
        vec![
            rule("a", r"eval", Severity::Low),
            rule("b", r"exec", Severity::Medium),
        ],
        cache,
        OrchestratorConfig {
            adaptive: true,
            ..Default::default()
        },
    );

    let outcome = orch.scan_file("a.py", "nothing here\n", "py");
    assert_eq!(outcome.agents_selected, 2);
}

#[test]
fn test_cancellation_between_files() {
    let cache = Arc::new(DetectionCache::new(100));
    let orch = orchestrator(
        vec![rule("r1", r"eval", Severity::High)],
        cache,
        OrchestratorConfig::default(),
    );

    let cancel = AtomicBool::new(true);
    let files = vec![
        ("a.py".to_string(), "eval(x)".to_string(), "py".to_string()),
        ("b.py".to_string(), "eval(y)".to_string(), "py".to_string()),
    ];
    let outcomes = orch.scan_files(&files, &cancel);
    assert!(outcomes.is_empty());
    assert!(orch.stats().cancelled);

    cancel.store(false, Ordering::SeqCst);
    let outcomes = orch.scan_files(&files, &cancel);
    assert_eq!(outcomes.len(), 2);
}

#[test]
fn test_memory_pressure_triggers_emergency_eviction() {
    init_logging();
    let cache = Arc::new(DetectionCache::new(10_000));
    for i in 0..50 {
        cache.put(crate::logic::cache::Observation {
            detector_id: "d-noise".to_string(),
            rule_id: "noise".to_string(),
            fingerprint: format!("m-{}", i),
            file_type: "py".to_string(),
            confidence: 0.5,
            severity: Severity::Low,
            label: None,
        });
    }

    let orch = orchestrator(
        vec![rule("r1", r"eval", Severity::High)],
        Arc::clone(&cache),
        OrchestratorConfig {
            memory_budget_bytes: 1, // any real process is over this
            ..Default::default()
        },
    );

    let before = cache.len();
    orch.scan_file("a.py", "eval(x)\n", "py");
    assert!(cache.len() < before + 2);
    assert!(orch.stats().emergency_evictions > 0);
}

#[test]
fn test_scan_stats_accumulate() {
    let cache = Arc::new(DetectionCache::new(1_000));
    let orch = orchestrator(
        vec![rule("shell", r"os\.system", Severity::Critical)],
        cache,
        OrchestratorConfig::default(),
    );

    orch.scan_file("a.py", "os.system(a)\n", "py");
    orch.scan_file("b.py", "os.system(b)\nclean line\n", "py");

    let stats = orch.stats();
    assert_eq!(stats.files_scanned, 2);
    assert_eq!(stats.detections, 2);
    assert_eq!(stats.consensus_findings, 2);
    assert!(stats.memory_usage_bytes > 0);

    orch.reset_stats();
    assert_eq!(orch.stats().files_scanned, 0);
}
