// SPDX-License-Identifier: MIT OR Apache-2.0

//! Matching of object path, interface and member name patterns.
//!
//! A pattern is either an exact string or a prefix ending in a single `*`. There is no infix or
//! multi-wildcard support; patterns carrying a `*` anywhere but the final position are rejected
//! when a policy or manifest is installed, so the matcher never sees them.
use thiserror::Error;

/// Matches a rule pattern against a concrete name.
///
/// `"*"` matches everything including the empty string. The empty pattern matches nothing: a
/// rule field left unset covers no operation at all.
pub fn matches(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => !pattern.is_empty() && pattern == value,
    }
}

/// Validates a rule pattern. `*` is only allowed as the final character.
pub fn validate(pattern: &str) -> Result<(), PatternError> {
    match pattern.find('*') {
        Some(position) if position + 1 != pattern.len() => {
            Err(PatternError::MisplacedWildcard(pattern.to_string()))
        }
        _ => Ok(()),
    }
}

/// Error types for rule patterns.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PatternError {
    #[error("wildcard is only allowed as the final character of a pattern: \"{0}\"")]
    MisplacedWildcard(String),
}
