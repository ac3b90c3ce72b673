//! Operator-managed pod/agent name conventions.
//!
//! Pod name = `<poolName>-agent-<suffix>` where `<suffix>` is either a
//! non-negative decimal index (the format new pods are created with) or
//! an 8-char alphanumeric token (a legacy format that must still be
//! recognized as operator-managed, per the open question in the design
//! notes). Only names matching one of these two forms count toward
//! `maxAgents` bookkeeping or are ever touched by the engine.

/// Returns true if `name` is an operator-managed name for `pool_name`,
/// under either the numeric or legacy 8-char suffix convention.
pub fn is_operator_managed(pool_name: &str, name: &str) -> bool {
    let prefix = format!("{pool_name}-agent-");
    let Some(suffix) = name.strip_prefix(&prefix) else {
        return false;
    };
    is_numeric_suffix(suffix) || is_legacy_suffix(suffix)
}

/// Parses the numeric index out of a pod name, if it has one. Legacy
/// 8-char suffixes have no numeric index and return `None` even though
/// they are still operator-managed.
pub fn parse_index(pool_name: &str, name: &str) -> Option<u32> {
    let prefix = format!("{pool_name}-agent-");
    let suffix = name.strip_prefix(&prefix)?;
    if is_numeric_suffix(suffix) {
        suffix.parse().ok()
    } else {
        None
    }
}

pub fn pod_name(pool_name: &str, index: u32) -> String {
    format!("{pool_name}-agent-{index}")
}

fn is_numeric_suffix(suffix: &str) -> bool {
    !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit())
}

fn is_legacy_suffix(suffix: &str) -> bool {
    suffix.len() == 8 && suffix.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Smallest non-negative integer not already used by an operator-managed
/// pod name in `existing_names`. Fails when `maxAgents` worth of slots
/// are already taken — the caller (planner or PodGateway) is expected to
/// have filtered `existing_names` down to live, non-terminal pods first.
pub fn next_available_index(
    pool_name: &str,
    existing_names: &[String],
    max_agents: i32,
) -> Option<u32> {
    let mut used: Vec<u32> = existing_names
        .iter()
        .filter_map(|n| parse_index(pool_name, n))
        .collect();
    used.sort_unstable();
    used.dedup();

    let mut candidate = 0u32;
    for idx in &used {
        if *idx == candidate {
            candidate += 1;
        } else if *idx > candidate {
            break;
        }
    }

    if candidate >= max_agents.max(0) as u32 {
        None
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_suffix_is_managed() {
        assert!(is_operator_managed("ci", "ci-agent-0"));
        assert!(is_operator_managed("ci", "ci-agent-42"));
    }

    #[test]
    fn test_legacy_suffix_is_managed() {
        assert!(is_operator_managed("ci", "ci-agent-ab12cd34"));
    }

    #[test]
    fn test_unrelated_name_is_not_managed() {
        assert!(!is_operator_managed("ci", "ci-agent-"));
        assert!(!is_operator_managed("ci", "some-other-pod"));
        assert!(!is_operator_managed("ci", "ci-agent-toolong12345"));
        assert!(!is_operator_managed("ci", "other-agent-0"));
    }

    #[test]
    fn test_parse_index_numeric_only() {
        assert_eq!(parse_index("ci", "ci-agent-7"), Some(7));
        assert_eq!(parse_index("ci", "ci-agent-ab12cd34"), None);
        assert_eq!(parse_index("ci", "unrelated"), None);
    }

    #[test]
    fn test_next_available_index_fills_gap() {
        let existing = vec!["ci-agent-0".to_string(), "ci-agent-2".to_string()];
        assert_eq!(next_available_index("ci", &existing, 10), Some(1));
    }

    #[test]
    fn test_next_available_index_appends_when_dense() {
        let existing = vec!["ci-agent-0".to_string(), "ci-agent-1".to_string()];
        assert_eq!(next_available_index("ci", &existing, 10), Some(2));
    }

    #[test]
    fn test_next_available_index_none_when_full() {
        let existing: Vec<String> = (0..3).map(|i| format!("ci-agent-{i}")).collect();
        assert_eq!(next_available_index("ci", &existing, 3), None);
    }

    #[test]
    fn test_next_available_index_ignores_legacy_and_foreign_names() {
        let existing = vec!["ci-agent-deadbeef".to_string(), "other-pod".to_string()];
        assert_eq!(next_available_index("ci", &existing, 3), Some(0));
    }
}
