//! Static Confidence Heuristics
//!
//! Context-driven adjustments applied before the learned (Bayesian and
//! exact-key) stages. Deterministic and explainable: severity sets the
//! base, surrounding code pulls it down when the match smells benign.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::logic::cache::types::Severity;

// ============================================================================
// MARKER LISTS
// ============================================================================

/// Substrings suggesting the match sits in non-production context
const BENIGN_CONTEXT_MARKERS: &[&str] = &[
    "test",
    "fixture",
    "example",
    "sample",
    "mock",
    "dummy",
    "tutorial",
    "docstring",
];

/// Idioms of security tooling itself: code that defines detection
/// patterns matches its own rules constantly. Cut confidence sharply.
const SECURITY_TOOLING_IDIOMS: &[&str] = &[
    "detection_pattern",
    "dangerous_patterns",
    "signature_db",
    "denylist",
    "blocklist",
    "re.compile(",
    "regex::regex::new",
    "rule_definition",
    "scanner",
];

/// Per-marker confidence reduction for benign context
const BENIGN_MARKER_PENALTY: f64 = 0.15;

/// Multiplier applied once when tooling idioms are present
const TOOLING_IDIOM_FACTOR: f64 = 0.3;

/// Multiplier when the matched line itself is commented out
const COMMENTED_OUT_FACTOR: f64 = 0.5;

static COMMENT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(#|//|/\*|\*|--|;)").unwrap());

// ============================================================================
// HEURISTICS
// ============================================================================

/// Base confidence before any context or learned adjustment
pub fn base_confidence(severity: Severity) -> f64 {
    match severity {
        Severity::Low => 0.55,
        Severity::Medium => 0.65,
        Severity::High => 0.75,
        Severity::Critical => 0.85,
    }
}

/// Whether a matched line sits behind a line-comment marker. Commented-out
/// code still warrants a finding, just a weaker one.
pub fn is_comment_line(line: &str) -> bool {
    COMMENT_LINE.is_match(line)
}

/// Apply context heuristics to a base confidence. `matched_line` is the
/// line the pattern fired on; `context` the window around it.
pub fn adjust_for_context(base: f64, matched_line: &str, context: &str) -> f64 {
    let lowered = context.to_lowercase();
    let mut confidence = base;

    if is_comment_line(matched_line) {
        confidence *= COMMENTED_OUT_FACTOR;
    }

    let benign_hits = BENIGN_CONTEXT_MARKERS
        .iter()
        .filter(|marker| lowered.contains(*marker))
        .count();
    confidence -= benign_hits as f64 * BENIGN_MARKER_PENALTY;

    if SECURITY_TOOLING_IDIOMS
        .iter()
        .any(|idiom| lowered.contains(idiom))
    {
        confidence *= TOOLING_IDIOM_FACTOR;
    }

    confidence.max(0.0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_tracks_severity() {
        assert!(base_confidence(Severity::Critical) > base_confidence(Severity::Low));
    }

    #[test]
    fn test_clean_context_untouched() {
        let line = "subprocess.run(user_input, shell=True)";
        let adjusted = adjust_for_context(0.75, line, line);
        assert_eq!(adjusted, 0.75);
    }

    #[test]
    fn test_benign_markers_reduce() {
        let adjusted = adjust_for_context(
            0.75,
            "    os.system(cmd)",
            "def test_shell():\n    # example usage\n    os.system(cmd)",
        );
        assert!(adjusted < 0.75 - BENIGN_MARKER_PENALTY + 1e-9);
    }

    #[test]
    fn test_tooling_idioms_reduce_sharply() {
        let line = "DANGEROUS_PATTERNS = [re.compile(r'exec')]";
        let adjusted = adjust_for_context(0.8, line, line);
        assert!(adjusted < 0.3);
    }

    #[test]
    fn test_commented_out_match_halved() {
        let active = adjust_for_context(0.8, "os.system(cmd)", "os.system(cmd)");
        let commented = adjust_for_context(0.8, "# os.system(cmd)", "# os.system(cmd)");
        assert!((commented - active * COMMENTED_OUT_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn test_comment_line_detection() {
        assert!(is_comment_line("  // eval(payload)"));
        assert!(is_comment_line("# os.system(cmd)"));
        assert!(!is_comment_line("os.system(cmd)  # launch"));
    }
}
