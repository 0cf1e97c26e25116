//! Built-in Rule Set
//!
//! Default dangerous-pattern rules shipped with the engine. The external
//! rule database can extend or replace these; authoring methodology lives
//! outside the core.

use super::types::RuleDefinition;
use crate::logic::cache::types::Severity;

pub fn builtin_rules() -> Vec<RuleDefinition> {
    vec![
        RuleDefinition {
            id: "shell-exec".to_string(),
            name: "Shell Command Execution".to_string(),
            description: "Direct shell execution of possibly tainted input".to_string(),
            pattern: r"(?i)\b(os\.system|subprocess\.(run|call|Popen)|child_process\.exec|shell_exec|popen)\s*\(".to_string(),
            severity: Severity::Critical,
            classification_refs: vec!["CWE-78".to_string(), "T1059".to_string()],
            enabled: true,
        },
        RuleDefinition {
            id: "eval-injection".to_string(),
            name: "Dynamic Code Evaluation".to_string(),
            description: "eval/exec on runtime-built strings".to_string(),
            pattern: r"(?i)\b(eval|exec|Function)\s*\(".to_string(),
            severity: Severity::High,
            classification_refs: vec!["CWE-95".to_string(), "T1059".to_string()],
            enabled: true,
        },
        RuleDefinition {
            id: "hardcoded-secret".to_string(),
            name: "Hardcoded Credential".to_string(),
            description: "Secret material embedded in source".to_string(),
            pattern: r#"(?i)(api[_-]?key|secret|password|token)\s*[:=]\s*["'][A-Za-z0-9+/=_\-]{12,}["']"#.to_string(),
            severity: Severity::High,
            classification_refs: vec!["CWE-798".to_string()],
            enabled: true,
        },
        RuleDefinition {
            id: "path-traversal".to_string(),
            name: "Path Traversal".to_string(),
            description: "Parent-directory escapes in file paths".to_string(),
            pattern: r"\.\./(\.\./)+".to_string(),
            severity: Severity::Medium,
            classification_refs: vec!["CWE-22".to_string()],
            enabled: true,
        },
        RuleDefinition {
            id: "net-exfil".to_string(),
            name: "Outbound Data Transfer".to_string(),
            description: "Raw outbound requests to non-constant hosts".to_string(),
            pattern: r"(?i)\b(urllib\.request|requests\.(post|put)|fetch|curl\s+-d|XMLHttpRequest)\b".to_string(),
            severity: Severity::Medium,
            classification_refs: vec!["CWE-200".to_string(), "T1041".to_string()],
            enabled: true,
        },
        RuleDefinition {
            id: "weak-hash".to_string(),
            name: "Weak Hash Algorithm".to_string(),
            description: "MD5/SHA1 used for security decisions".to_string(),
            pattern: r"(?i)\b(md5|sha1)\s*\(".to_string(),
            severity: Severity::Low,
            classification_refs: vec!["CWE-327".to_string()],
            enabled: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rules_compile() {
        for rule in builtin_rules() {
            assert!(regex::Regex::new(&rule.pattern).is_ok(), "rule {}", rule.id);
            assert!(!rule.classification_refs.is_empty());
        }
    }

    #[test]
    fn test_unique_ids() {
        let rules = builtin_rules();
        let mut ids: Vec<_> = rules.iter().map(|r| r.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), rules.len());
    }
}
