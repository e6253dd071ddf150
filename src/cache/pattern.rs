//! Key pattern matching for bulk eviction.

use regex::Regex;
use tracing::debug;

/// Selects keys for `TtlCache::clear`.
///
/// A pattern is compiled as a regular expression; text that is not a valid
/// regex is matched as a plain substring instead, so building a pattern
/// never fails.
#[derive(Debug, Clone)]
pub enum KeyPattern {
    Regex(Regex),
    Substring(String),
}

impl KeyPattern {
    pub fn parse(pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(regex) => KeyPattern::Regex(regex),
            Err(err) => {
                debug!(pattern, error = %err, "pattern is not a regex, using substring match");
                KeyPattern::Substring(pattern.to_string())
            }
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Regex(regex) => regex.is_match(key),
            KeyPattern::Substring(needle) => key.contains(needle.as_str()),
        }
    }
}
