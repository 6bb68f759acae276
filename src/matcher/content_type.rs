//! Content type matching implementation.

use super::MatcherError;
use crate::config::{ContentTypeMatcher, PatternType};
use glob::{MatchOptions, Pattern as GlobPattern};
use regex::{Regex, RegexBuilder};

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compiled content type matcher.
#[derive(Debug)]
pub enum ContentTypeMatcherImpl {
    /// Exact string match
    Exact(String),
    /// Glob pattern match
    Glob(GlobPattern),
    /// Regex pattern match
    Regex(Regex),
}

impl ContentTypeMatcherImpl {
    /// Compile a content type matcher from configuration.
    pub fn compile(config: &ContentTypeMatcher) -> Result<Self, MatcherError> {
        match config.pattern_type {
            PatternType::Exact => Ok(Self::Exact(config.pattern.clone())),
            PatternType::Glob => {
                let pattern = GlobPattern::new(&config.pattern)?;
                Ok(Self::Glob(pattern))
            }
            PatternType::Regex => {
                let regex = RegexBuilder::new(&config.pattern)
                    .case_insensitive(true)
                    .build()?;
                Ok(Self::Regex(regex))
            }
        }
    }

    /// Check a media type (without parameters) against this matcher.
    pub fn matches(&self, content_type: &str) -> bool {
        match self {
            Self::Exact(pattern) => pattern.eq_ignore_ascii_case(content_type),
            Self::Glob(pattern) => pattern.matches_with(content_type, GLOB_OPTIONS),
            Self::Regex(regex) => regex.is_match(content_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(pattern: &str, pattern_type: PatternType) -> ContentTypeMatcherImpl {
        ContentTypeMatcherImpl::compile(&ContentTypeMatcher {
            pattern: pattern.to_string(),
            pattern_type,
        })
        .unwrap()
    }

    #[test]
    fn test_exact_match() {
        let matcher = compile("text/html", PatternType::Exact);
        assert!(matcher.matches("text/html"));
        assert!(matcher.matches("Text/HTML"));
        assert!(!matcher.matches("text/htmlx"));
    }

    #[test]
    fn test_glob_match() {
        let matcher = compile("text/*", PatternType::Glob);
        assert!(matcher.matches("text/html"));
        assert!(matcher.matches("text/plain"));
        assert!(!matcher.matches("application/json"));
    }

    #[test]
    fn test_regex_match() {
        let matcher = compile("^text/html", PatternType::Regex);
        assert!(matcher.matches("text/html"));
        assert!(!matcher.matches("application/xhtml+xml"));
    }

    #[test]
    fn test_invalid_regex() {
        let result = ContentTypeMatcherImpl::compile(&ContentTypeMatcher {
            pattern: "text/(".to_string(),
            pattern_type: PatternType::Regex,
        });
        assert!(matches!(result, Err(MatcherError::InvalidRegex(_))));
    }
}
