//! Message scope matchers.

mod content_type;

pub use content_type::ContentTypeMatcherImpl;

use crate::config::ContentTypeMatcher;

/// Compiled content type scope of a transform definition.
///
/// An empty scope applies to every message, including ones without a
/// `Content-Type` header.
#[derive(Debug, Default)]
pub struct ContentTypeScope {
    matchers: Vec<ContentTypeMatcherImpl>,
}

impl ContentTypeScope {
    /// Compile a scope from configuration.
    pub fn compile(config: &[ContentTypeMatcher]) -> Result<Self, MatcherError> {
        let matchers = config
            .iter()
            .map(ContentTypeMatcherImpl::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { matchers })
    }

    /// Whether a message with this media type is in scope.
    pub fn applies_to(&self, content_type: Option<&str>) -> bool {
        if self.matchers.is_empty() {
            return true;
        }
        match content_type {
            Some(ct) => self.matchers.iter().any(|m| m.matches(ct)),
            None => false,
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.matchers.is_empty()
    }
}

/// Errors that can occur during matcher compilation.
#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(#[from] glob::PatternError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternType;

    #[test]
    fn test_empty_scope_applies_to_all() {
        let scope = ContentTypeScope::compile(&[]).unwrap();
        assert!(scope.is_unrestricted());
        assert!(scope.applies_to(Some("image/png")));
        assert!(scope.applies_to(None));
    }

    #[test]
    fn test_scope_any_of() {
        let scope = ContentTypeScope::compile(&[
            ContentTypeMatcher {
                pattern: "text/html".to_string(),
                pattern_type: PatternType::Exact,
            },
            ContentTypeMatcher {
                pattern: "application/*+xml".to_string(),
                pattern_type: PatternType::Glob,
            },
        ])
        .unwrap();

        assert!(scope.applies_to(Some("text/html")));
        assert!(scope.applies_to(Some("application/xhtml+xml")));
        assert!(!scope.applies_to(Some("text/plain")));
        assert!(!scope.applies_to(None));
    }
}
