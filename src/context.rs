//! Adaptation context for variable resolution and interpolation.

use crate::message::Message;
use regex::Regex;
use std::sync::LazyLock;

/// Regex for matching variable expressions like ${...}
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// Context available while rewriting an adapted message header.
#[derive(Debug, Clone)]
pub struct AdaptContext<'a> {
    /// Service URI
    pub service_uri: &'a str,
    /// Service tag (version)
    pub service_tag: &'a str,
    /// Version string of the transform definition in use
    pub definition_version: &'a str,
    /// Load generation of the transform definition in use
    pub definition_generation: u64,
    /// Transaction id
    pub xaction_id: u64,
    /// The virgin message
    pub virgin: &'a Message,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<'a> AdaptContext<'a> {
    /// Resolve a variable expression.
    ///
    /// Supports:
    /// - `${service.uri}`, `${service.tag}`
    /// - `${definition.version}`, `${definition.generation}`
    /// - `${xaction}` - Transaction id
    /// - `${content_type}` - Virgin body media type
    /// - `${header.X-Custom}` - Virgin header value
    /// - `${now}` - Current timestamp (RFC 3339)
    pub fn resolve(&self, expr: &str) -> Option<String> {
        let (head, rest) = match expr.split_once('.') {
            Some((h, r)) => (h, Some(r)),
            None => (expr, None),
        };

        match (head, rest) {
            ("service", Some("uri")) => Some(self.service_uri.to_string()),
            ("service", Some("tag")) => Some(self.service_tag.to_string()),
            ("definition", Some("version")) => Some(self.definition_version.to_string()),
            ("definition", Some("generation")) => Some(self.definition_generation.to_string()),
            ("header", Some(name)) => self.virgin.header().get(name).map(str::to_string),
            ("xaction", None) => Some(self.xaction_id.to_string()),
            ("content_type", None) => self.virgin.content_type().map(str::to_string),
            ("now", None) => Some(self.timestamp.to_rfc3339()),
            _ => None,
        }
    }

    /// Interpolate all ${...} variables in a string.
    ///
    /// Unknown variables resolve to the empty string.
    pub fn interpolate(&self, template: &str) -> String {
        VAR_REGEX
            .replace_all(template, |caps: &regex::Captures| {
                self.resolve(&caps[1]).unwrap_or_default()
            })
            .to_string()
    }
}
