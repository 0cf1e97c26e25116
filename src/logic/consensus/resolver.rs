//! Consensus Resolver
//!
//! Reduces each per-line group of detections to at most one finding.
//! Resolution is a pure function of the group's multiset - detector order
//! never changes the outcome.

use std::collections::HashMap;

use super::types::{ConsensusFinding, ReferenceResolution, ResolutionMethod};
use crate::constants::SINGLE_DETECTION_CONFIDENCE_MIN;
use crate::logic::agent::types::DetectionResult;
use crate::logic::cache::types::Severity;

// ============================================================================
// GROUPING
// ============================================================================

/// Group detections by line number, preserving the multiset per line
pub fn group_by_line(detections: Vec<DetectionResult>) -> HashMap<usize, Vec<DetectionResult>> {
    let mut groups: HashMap<usize, Vec<DetectionResult>> = HashMap::new();
    for detection in detections {
        groups.entry(detection.line_number).or_default().push(detection);
    }
    groups
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// Resolve one line's detections. None = too weak to report.
pub fn resolve_line(group: &[DetectionResult]) -> Option<ConsensusFinding> {
    match group {
        [] => None,
        [single] => resolve_single(single),
        many => Some(resolve_multiple(many)),
    }
}

/// A lone detection survives only on strong confidence - or CRITICAL
/// severity, which is never silently dropped.
fn resolve_single(detection: &DetectionResult) -> Option<ConsensusFinding> {
    if detection.confidence < SINGLE_DETECTION_CONFIDENCE_MIN
        && detection.severity != Severity::Critical
    {
        return None;
    }

    let references = if detection.classification_refs.is_empty() {
        ReferenceResolution::NoReferences
    } else {
        ReferenceResolution::Unanimous(sorted(&detection.classification_refs))
    };

    Some(ConsensusFinding {
        file_path: detection.file_path.clone(),
        line_number: detection.line_number,
        severity: detection.severity,
        confidence: detection.confidence,
        detector_ids: vec![detection.detector_id.clone()],
        detection_count: 1,
        disagreement: false,
        method: ResolutionMethod::SingleDetector,
        references,
    })
}

fn resolve_multiple(group: &[DetectionResult]) -> ConsensusFinding {
    let severity = group
        .iter()
        .map(|d| d.severity)
        .max()
        .unwrap_or(Severity::Low);

    // Severity-weighted mean: higher-severity contributors weigh more
    let weight_sum: f64 = group.iter().map(|d| d.severity.weight()).sum();
    let confidence = group
        .iter()
        .map(|d| d.confidence * d.severity.weight())
        .sum::<f64>()
        / weight_sum;

    let mut detector_ids: Vec<String> = group.iter().map(|d| d.detector_id.clone()).collect();
    detector_ids.sort();
    detector_ids.dedup();

    let severities_agree = group.iter().all(|d| d.severity == severity);
    let references = resolve_references(group);
    let refs_agree = !matches!(
        references,
        ReferenceResolution::Majority(_) | ReferenceResolution::RequiresHumanReview
    );
    let disagreement = !severities_agree || !refs_agree;

    ConsensusFinding {
        file_path: group[0].file_path.clone(),
        line_number: group[0].line_number,
        severity,
        confidence,
        detector_ids,
        detection_count: group.len(),
        disagreement,
        method: if disagreement {
            ResolutionMethod::SeverityWeighted
        } else {
            ResolutionMethod::Unanimous
        },
        references,
    }
}

// ============================================================================
// REFERENCE VOTING
// ============================================================================

/// Vote over contributors' classification-reference sets: unanimous wins,
/// else strict majority, else the human-review sentinel. Never a guess.
fn resolve_references(group: &[DetectionResult]) -> ReferenceResolution {
    // Contributors without references abstain
    let ballots: Vec<Vec<String>> = group
        .iter()
        .filter(|d| !d.classification_refs.is_empty())
        .map(|d| sorted(&d.classification_refs))
        .collect();

    if ballots.is_empty() {
        return ReferenceResolution::NoReferences;
    }
    if ballots.iter().all(|b| *b == ballots[0]) {
        return ReferenceResolution::Unanimous(ballots[0].clone());
    }

    let mut counts: HashMap<&[String], usize> = HashMap::new();
    for ballot in &ballots {
        *counts.entry(ballot.as_slice()).or_insert(0) += 1;
    }
    let (winner, votes) = counts
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(ballot, count)| (ballot.to_vec(), *count))
        .unwrap_or_default();

    if votes * 2 > ballots.len() {
        ReferenceResolution::Majority(winner)
    } else {
        ReferenceResolution::RequiresHumanReview
    }
}

fn sorted(refs: &[String]) -> Vec<String> {
    let mut out = refs.to_vec();
    out.sort();
    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(
        detector: &str,
        confidence: f64,
        severity: Severity,
        refs: &[&str],
    ) -> DetectionResult {
        DetectionResult {
            detector_id: detector.to_string(),
            rule_id: detector.to_string(),
            file_path: "lib.py".to_string(),
            line_number: 12,
            matched_text: "os.system(".to_string(),
            context: String::new(),
            confidence,
            severity,
            classification_refs: refs.iter().map(|r| r.to_string()).collect(),
            fingerprint: "fp".to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_weak_single_dropped() {
        let group = [detection("d1", 0.40, Severity::Medium, &["CWE-78"])];
        assert!(resolve_line(&group).is_none());
    }

    #[test]
    fn test_critical_single_bypasses_threshold() {
        let group = [detection("d1", 0.40, Severity::Critical, &["CWE-78"])];
        let finding = resolve_line(&group).expect("critical must survive");
        assert_eq!(finding.method, ResolutionMethod::SingleDetector);
        assert_eq!(finding.severity, Severity::Critical);
        assert!((finding.confidence - 0.40).abs() < 1e-9);
    }

    #[test]
    fn test_strong_single_accepted() {
        let group = [detection("d1", 0.80, Severity::Medium, &[])];
        let finding = resolve_line(&group).unwrap();
        assert_eq!(finding.references, ReferenceResolution::NoReferences);
    }

    #[test]
    fn test_multiple_takes_max_severity_and_weighted_mean() {
        let group = [
            detection("d1", 0.9, Severity::Critical, &["CWE-78"]),
            detection("d2", 0.5, Severity::Low, &["CWE-78"]),
        ];
        let finding = resolve_line(&group).unwrap();
        assert_eq!(finding.severity, Severity::Critical);
        // (0.9*4 + 0.5*1) / 5 = 0.82
        assert!((finding.confidence - 0.82).abs() < 1e-9);
        assert_eq!(finding.detection_count, 2);
        assert!(finding.disagreement); // severities differ
        assert_eq!(finding.method, ResolutionMethod::SeverityWeighted);
    }

    #[test]
    fn test_unanimous_group() {
        let group = [
            detection("d1", 0.8, Severity::High, &["CWE-78"]),
            detection("d2", 0.6, Severity::High, &["CWE-78"]),
        ];
        let finding = resolve_line(&group).unwrap();
        assert!(!finding.disagreement);
        assert_eq!(finding.method, ResolutionMethod::Unanimous);
        assert_eq!(
            finding.references,
            ReferenceResolution::Unanimous(vec!["CWE-78".to_string()])
        );
    }

    #[test]
    fn test_resolution_commutative_in_detector_order() {
        let a = detection("d1", 0.9, Severity::Critical, &["CWE-78"]);
        let b = detection("d2", 0.5, Severity::Low, &["CWE-95"]);
        let c = detection("d3", 0.7, Severity::High, &["CWE-78"]);

        let forward = resolve_line(&[a.clone(), b.clone(), c.clone()]).unwrap();
        let reversed = resolve_line(&[c, b, a]).unwrap();

        assert_eq!(forward.severity, reversed.severity);
        assert!((forward.confidence - reversed.confidence).abs() < 1e-9);
        assert_eq!(forward.detector_ids, reversed.detector_ids);
        assert_eq!(forward.references, reversed.references);
    }

    #[test]
    fn test_reference_tie_requires_human_review() {
        // Two detectors, two different references, one vote each
        let group = [
            detection("d1", 0.9, Severity::High, &["CWE-78"]),
            detection("d2", 0.9, Severity::High, &["CWE-95"]),
        ];
        let finding = resolve_line(&group).unwrap();
        assert_eq!(finding.references, ReferenceResolution::RequiresHumanReview);
        assert!(finding.disagreement);
    }

    #[test]
    fn test_reference_majority_wins() {
        let group = [
            detection("d1", 0.9, Severity::High, &["CWE-78"]),
            detection("d2", 0.9, Severity::High, &["CWE-78"]),
            detection("d3", 0.9, Severity::High, &["CWE-95"]),
        ];
        let finding = resolve_line(&group).unwrap();
        assert_eq!(
            finding.references,
            ReferenceResolution::Majority(vec!["CWE-78".to_string()])
        );
    }

    #[test]
    fn test_abstaining_contributors_do_not_block_unanimity() {
        let group = [
            detection("d1", 0.9, Severity::High, &["CWE-78"]),
            detection("d2", 0.9, Severity::High, &[]),
        ];
        let finding = resolve_line(&group).unwrap();
        assert_eq!(
            finding.references,
            ReferenceResolution::Unanimous(vec!["CWE-78".to_string()])
        );
    }
}
