// src/registry/relations.rs

//! Wildcard patterns over task ids.
//!
//! A pattern is a full task id (`"reports.extract"`), a collection wildcard
//! (`"reports.*"`) or the global wildcard (`"*"`). Matching always excludes
//! the subject task itself: a task never depends on itself, and wildcard
//! expansion skips self-matches.

/// Does `pattern`, owned by task `subject`, match `candidate`?
pub fn pattern_matches(pattern: &str, candidate: &str, subject: &str) -> bool {
    if candidate == subject {
        return false;
    }

    if pattern == "*" {
        return true;
    }

    match pattern.strip_suffix('*') {
        Some(prefix) => candidate.starts_with(prefix),
        None => pattern == candidate,
    }
}
