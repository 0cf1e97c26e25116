//! Pattern Agent - One Rule, One Detector
//!
//! A single parametrized agent type wraps one detection rule: it matches
//! source lines, extracts a context window, and layers three confidence
//! adjustments - static heuristics, the cache's learned (rule, file-type)
//! accuracy, and any validated outcome recorded for the exact
//! (detector, fingerprint) key.
//!
//! "No match" is the normal case and never an error. A malformed pattern
//! fails construction, not the scan.

pub mod heuristics;
pub mod rules;
pub mod types;

pub use rules::builtin_rules;

use std::sync::Arc;

use chrono::Utc;
use regex::Regex;

use crate::constants::{CONFIDENCE_CEILING, CONFIDENCE_FLOOR, CONTEXT_WINDOW_LINES};
use crate::logic::cache::types::{compute_fingerprint, GroundTruth, Severity};
use crate::logic::cache::DetectionCache;
use types::{AgentError, DetectionResult, RuleDefinition};

/// Multiplier toward zero for a previously validated false positive
const KNOWN_FP_FACTOR: f64 = 0.1;

/// A validated true positive closes half the gap to certainty
const KNOWN_TP_PULL: f64 = 0.5;

// ============================================================================
// PATTERN AGENT
// ============================================================================

pub struct PatternAgent {
    detector_id: String,
    rule: RuleDefinition,
    regex: Regex,
    cache: Arc<DetectionCache>,
}

impl PatternAgent {
    /// Fails fast on a malformed or disabled rule. Scan time never sees
    /// a bad pattern, and a disabled rule never gets a detector.
    pub fn new(rule: RuleDefinition, cache: Arc<DetectionCache>) -> Result<Self, AgentError> {
        if rule.id.trim().is_empty() {
            return Err(AgentError::EmptyRuleId);
        }
        if !rule.enabled {
            return Err(AgentError::DisabledRule {
                rule_id: rule.id.clone(),
            });
        }
        let regex = Regex::new(&rule.pattern).map_err(|source| AgentError::InvalidPattern {
            rule_id: rule.id.clone(),
            source,
        })?;

        Ok(Self {
            detector_id: format!("pattern-agent/{}", rule.id),
            rule,
            regex,
            cache,
        })
    }

    pub fn detector_id(&self) -> &str {
        &self.detector_id
    }

    pub fn rule(&self) -> &RuleDefinition {
        &self.rule
    }

    pub fn severity(&self) -> Severity {
        self.rule.severity
    }

    /// Run the rule over a source text. Empty vec = nothing matched.
    pub fn detect(&self, source: &str, file_path: &str, file_type: &str) -> Vec<DetectionResult> {
        let lines: Vec<&str> = source.lines().collect();
        let mut results = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            let Some(found) = self.regex.find(line) else {
                continue;
            };
            let line_number = idx + 1;
            let context = extract_context(&lines, idx);
            let fingerprint = compute_fingerprint(file_path, line_number, line);

            let confidence = self.confidence_for(line, &context, file_type, &fingerprint);

            results.push(DetectionResult {
                detector_id: self.detector_id.clone(),
                rule_id: self.rule.id.clone(),
                file_path: file_path.to_string(),
                line_number,
                matched_text: found.as_str().to_string(),
                context,
                confidence,
                severity: self.rule.severity,
                classification_refs: self.rule.classification_refs.clone(),
                fingerprint,
                timestamp: Utc::now().timestamp(),
            });
        }

        if !results.is_empty() {
            log::debug!(
                "{}: {} match(es) in {}",
                self.detector_id,
                results.len(),
                file_path
            );
        }
        results
    }

    /// Heuristic base, Bayesian blend, then the exact-key prior
    fn confidence_for(
        &self,
        matched_line: &str,
        context: &str,
        file_type: &str,
        fingerprint: &str,
    ) -> f64 {
        let base = heuristics::base_confidence(self.rule.severity);
        let mut confidence = heuristics::adjust_for_context(base, matched_line, context);
        confidence = self
            .cache
            .blend_confidence(confidence, &self.rule.id, file_type);

        if let Some(prior) = self.cache.get(&self.detector_id, fingerprint) {
            match prior.ground_truth {
                GroundTruth::FalsePositive => confidence *= KNOWN_FP_FACTOR,
                GroundTruth::TruePositive => {
                    confidence += (1.0 - confidence) * KNOWN_TP_PULL;
                }
                GroundTruth::Unknown => {}
            }
        }

        confidence.clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING)
    }
}

/// Fixed window of lines around a match, inclusive of the match line
fn extract_context(lines: &[&str], idx: usize) -> String {
    let start = idx.saturating_sub(CONTEXT_WINDOW_LINES);
    let end = (idx + CONTEXT_WINDOW_LINES + 1).min(lines.len());
    lines[start..end].join("\n")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::cache::{DetectionCache, Observation};

    fn shell_rule() -> RuleDefinition {
        RuleDefinition {
            id: "shell-exec".to_string(),
            name: "Shell Command Execution".to_string(),
            description: String::new(),
            pattern: r"os\.system\s*\(".to_string(),
            severity: Severity::Critical,
            classification_refs: vec!["CWE-78".to_string()],
            enabled: true,
        }
    }

    fn agent() -> PatternAgent {
        PatternAgent::new(shell_rule(), Arc::new(DetectionCache::new(100))).unwrap()
    }

    #[test]
    fn test_malformed_pattern_fails_construction() {
        let mut rule = shell_rule();
        rule.pattern = "([unclosed".to_string();
        let result = PatternAgent::new(rule, Arc::new(DetectionCache::new(10)));
        assert!(matches!(result, Err(AgentError::InvalidPattern { .. })));
    }

    #[test]
    fn test_empty_rule_id_rejected() {
        let mut rule = shell_rule();
        rule.id = "  ".to_string();
        let result = PatternAgent::new(rule, Arc::new(DetectionCache::new(10)));
        assert!(matches!(result, Err(AgentError::EmptyRuleId)));
    }

    #[test]
    fn test_disabled_rule_never_becomes_a_detector() {
        let mut rule = shell_rule();
        rule.enabled = false;
        let result = PatternAgent::new(rule, Arc::new(DetectionCache::new(10)));
        assert!(matches!(result, Err(AgentError::DisabledRule { .. })));
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let results = agent().detect("print('hello')\n", "a.py", "py");
        assert!(results.is_empty());
    }

    #[test]
    fn test_match_carries_location_and_context() {
        let source = "import os\n\ncmd = input()\nos.system(cmd)\nprint('done')\n";
        let results = agent().detect(source, "runner.py", "py");

        assert_eq!(results.len(), 1);
        let detection = &results[0];
        assert_eq!(detection.line_number, 4);
        assert_eq!(detection.matched_text, "os.system(");
        assert!(detection.context.contains("cmd = input()"));
        assert!(detection.context.contains("print('done')"));
        assert_eq!(detection.severity, Severity::Critical);
        assert!(detection.confidence > 0.5);
    }

    #[test]
    fn test_test_fixture_context_lowers_confidence() {
        let clean = agent().detect("os.system(cmd)\n", "runner.py", "py");
        let fixture = agent().detect(
            "# test fixture example\nos.system(cmd)\n",
            "conftest.py",
            "py",
        );
        assert!(fixture[0].confidence < clean[0].confidence);
    }

    #[test]
    fn test_known_false_positive_crushes_confidence() {
        let cache = Arc::new(DetectionCache::new(100));
        let agent = PatternAgent::new(shell_rule(), Arc::clone(&cache)).unwrap();

        let source = "os.system(constant_cleanup_cmd)\n";
        let first = agent.detect(source, "cleanup.py", "py");
        let fingerprint = first[0].fingerprint.clone();

        cache.put(Observation {
            detector_id: agent.detector_id().to_string(),
            rule_id: "shell-exec".to_string(),
            fingerprint: fingerprint.clone(),
            file_type: "py".to_string(),
            confidence: first[0].confidence,
            severity: Severity::Critical,
            label: None,
        });
        cache.record_validation(
            agent.detector_id(),
            "shell-exec",
            &fingerprint,
            "py",
            GroundTruth::FalsePositive,
            1.0,
        );

        let second = agent.detect(source, "cleanup.py", "py");
        assert!(second[0].confidence < first[0].confidence * 0.2);
        assert!(second[0].confidence >= CONFIDENCE_FLOOR);
    }

    #[test]
    fn test_known_true_positive_boosts_confidence() {
        let cache = Arc::new(DetectionCache::new(100));
        let agent = PatternAgent::new(shell_rule(), Arc::clone(&cache)).unwrap();

        let source = "os.system(user_supplied)\n";
        let first = agent.detect(source, "handler.py", "py");
        let fingerprint = first[0].fingerprint.clone();

        cache.put(Observation {
            detector_id: agent.detector_id().to_string(),
            rule_id: "shell-exec".to_string(),
            fingerprint: fingerprint.clone(),
            file_type: "py".to_string(),
            confidence: first[0].confidence,
            severity: Severity::Critical,
            label: None,
        });
        cache.record_validation(
            agent.detector_id(),
            "shell-exec",
            &fingerprint,
            "py",
            GroundTruth::TruePositive,
            1.0,
        );

        let second = agent.detect(source, "handler.py", "py");
        assert!(second[0].confidence > first[0].confidence);
        assert!(second[0].confidence <= CONFIDENCE_CEILING);
    }
}
