//! Comma-separated exact/glob patterns used to exclude health checks.

use regex::Regex;
use tracing::warn;

#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Glob(Regex),
}

impl Pattern {
    fn parse(raw: &str) -> Self {
        if !raw.contains(['*', '?']) {
            return Self::Exact(raw.to_string());
        }
        match Regex::new(&glob_to_regex(raw)) {
            Ok(regex) => Self::Glob(regex),
            Err(err) => {
                warn!(pattern = raw, error = %err, "glob too large, matching literally");
                Self::Exact(raw.to_string())
            }
        }
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == value,
            Self::Glob(regex) => regex.is_match(value),
        }
    }
}

/// Translates a glob into an anchored regex: `*` is any run, `?` one character.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    out
}

/// A parsed exclude pattern list such as `"db-*,route:legacy?,infra"`.
///
/// Blank entries are ignored; an empty list matches nothing.
#[derive(Debug, Clone, Default)]
pub struct ExcludePatterns {
    raw: Option<String>,
    patterns: Vec<Pattern>,
}

impl ExcludePatterns {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let patterns: Vec<Pattern> = raw
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Pattern::parse)
            .collect();
        Self {
            raw: (!patterns.is_empty()).then(|| raw.trim().to_string()),
            patterns,
        }
    }

    /// Returns `true` if any pattern matches `value`.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(value))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The source text, or `None` when no pattern is set.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.raw.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_glob_entries() {
        let patterns = ExcludePatterns::parse("infra, db-*,cache-?");
        assert!(patterns.matches("infra"));
        assert!(!patterns.matches("infra2"));
        assert!(patterns.matches("db-primary"));
        assert!(patterns.matches("db-"));
        assert!(patterns.matches("cache-1"));
        assert!(!patterns.matches("cache-12"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let patterns = ExcludePatterns::parse("route:a.b*");
        assert!(patterns.matches("route:a.bcd"));
        assert!(!patterns.matches("route:axbcd"));
    }

    #[test]
    fn blank_list_matches_nothing() {
        let patterns = ExcludePatterns::parse(" , ,");
        assert!(patterns.is_empty());
        assert!(patterns.as_str().is_none());
        assert!(!patterns.matches(""));
    }
}
