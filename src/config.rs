//! Configuration types for the adaptation service and its transform definition.

use serde::{Deserialize, Serialize};

/// Main configuration for the adaptation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Configuration version
    pub version: String,
    /// Global settings
    pub settings: Settings,
    /// Edits applied to every adapted message header
    pub headers: HeaderTransform,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: Settings::default(),
            headers: HeaderTransform::default(),
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Service URI, unique per registry
    pub service_uri: String,
    /// Path of the transform definition artifact (YAML or JSON)
    pub definition_path: String,
    /// Maximum adapted bytes one transaction may rewrite before failing open
    pub max_body_size: usize,
    /// Default look-behind window for regex rules (bytes)
    pub default_window: usize,
    /// Chunk size used by the local exchange driver (bytes)
    pub chunk_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_uri: "ecap://zentinel.dev/adapt/modifying".to_string(),
            definition_path: "/etc/zentinel/adapt.yaml".to_string(),
            max_body_size: 10 * 1024 * 1024, // 10MB
            default_window: 64,
            chunk_size: 16 * 1024,
        }
    }
}

/// Header transformation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderTransform {
    /// Headers to add (appended next to existing ones)
    pub add: Vec<HeaderValue>,
    /// Headers to set (overwrite)
    pub set: Vec<HeaderValue>,
    /// Headers to remove
    pub remove: Vec<String>,
}

impl Default for HeaderTransform {
    fn default() -> Self {
        Self {
            add: vec![HeaderValue {
                name: "X-Zentinel-Adapt".to_string(),
                value: "${service.uri}".to_string(),
            }],
            set: vec![],
            remove: vec![],
        }
    }
}

/// Header name-value pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderValue {
    /// Header name
    pub name: String,
    /// Header value (supports variable substitution)
    pub value: String,
}

/// On-disk transform definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefinitionFile {
    /// Definition version, reported in logs and headers
    pub version: String,
    /// Content types the rules apply to (empty = all)
    pub content_types: Vec<ContentTypeMatcher>,
    /// Replacement rules, applied in order
    pub rules: Vec<ReplaceRule>,
}

impl Default for DefinitionFile {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            content_types: vec![],
            rules: vec![],
        }
    }
}

/// Content type matcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentTypeMatcher {
    /// The pattern to match
    pub pattern: String,
    /// Match type: exact, glob, regex
    #[serde(default, rename = "type")]
    pub pattern_type: PatternType,
}

/// Pattern matching type.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Exact string match (case-insensitive)
    Exact,
    /// Glob pattern (*, ?)
    #[default]
    Glob,
    /// Regular expression
    Regex,
}

/// A body replacement rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceRule {
    /// Rule name (for logging/debugging)
    pub name: String,
    /// Whether the rule is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Text or expression to find
    pub find: String,
    /// How `find` is interpreted
    #[serde(default, rename = "type")]
    pub kind: MatchKind,
    /// Replacement; regex rules may reference groups as `$1` or `${name}`
    pub replace: String,
    /// Longest match a regex rule can produce (bytes); literal rules ignore it
    #[serde(default)]
    pub window: Option<usize>,
    /// Match without regard to ASCII case
    #[serde(default)]
    pub case_insensitive: bool,
}

fn default_true() -> bool {
    true
}

/// How a replacement rule matches.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    #[default]
    Literal,
    Regex,
}
