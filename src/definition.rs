//! Compiled transform definitions.
//!
//! A definition is read from a YAML or JSON artifact, compiled once, and then
//! shared read-only (behind an `Arc`) by every transaction that started while
//! it was current.

use crate::config::{DefinitionFile, MatchKind, ReplaceRule};
use crate::matcher::{ContentTypeScope, MatcherError};
use crate::transformer::{
    CompiledRule, ContentTransformer, PassThrough, Replacer, REGEX_LOOKAROUND,
};
use chrono::{DateTime, Utc};
use regex::bytes::RegexBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A compiled, immutable transform definition.
#[derive(Debug)]
pub struct TransformDefinition {
    version: String,
    generation: u64,
    loaded_at: DateTime<Utc>,
    scope: ContentTypeScope,
    rules: Vec<Arc<CompiledRule>>,
}

impl TransformDefinition {
    /// Compile a parsed definition file.
    ///
    /// `default_window` applies to regex rules that do not declare their own.
    pub fn compile(file: &DefinitionFile, default_window: usize) -> Result<Self, DefinitionError> {
        let scope = ContentTypeScope::compile(&file.content_types)?;

        let rules = file
            .rules
            .iter()
            .filter(|r| r.enabled)
            .map(|r| compile_rule(r, default_window).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            version: file.version.clone(),
            generation: 0,
            loaded_at: Utc::now(),
            scope,
            rules,
        })
    }

    /// Parse definition text, choosing JSON or YAML by the path's extension.
    pub fn parse(content: &str, path: &Path, default_window: usize) -> Result<Self, DefinitionError> {
        let file: DefinitionFile = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(content)?
        } else {
            serde_yaml::from_str(content)?
        };
        Self::compile(&file, default_window)
    }

    /// Read and compile a definition artifact.
    pub fn load(path: &Path, default_window: usize) -> Result<Self, DefinitionError> {
        let content = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let definition = Self::parse(&content, path, default_window)?;

        debug!(
            path = %path.display(),
            version = %definition.version,
            rules = definition.rules.len(),
            scoped = !definition.scope.is_unrestricted(),
            "Compiled transform definition"
        );

        Ok(definition)
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Create a transformer for one transaction.
    ///
    /// Messages outside the content type scope, and definitions without
    /// rules, get a pass-through transformer.
    pub fn instantiate(
        &self,
        content_type: Option<&str>,
        max_body_size: usize,
    ) -> Box<dyn ContentTransformer> {
        if self.rules.is_empty() || !self.scope.applies_to(content_type) {
            return Box::new(PassThrough);
        }
        Box::new(Replacer::new(&self.rules, max_body_size))
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Load generation assigned by the factory (1 for the initial load).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn rules(&self) -> &[Arc<CompiledRule>] {
        &self.rules
    }
}

fn compile_rule(rule: &ReplaceRule, default_window: usize) -> Result<CompiledRule, DefinitionError> {
    let (pattern, unicode, expand, window) = match rule.kind {
        MatchKind::Literal => (regex::escape(&rule.find), false, false, rule.find.len()),
        MatchKind::Regex => (
            rule.find.clone(),
            true,
            true,
            rule.window.unwrap_or(default_window),
        ),
    };

    let regex = RegexBuilder::new(&pattern)
        .case_insensitive(rule.case_insensitive)
        .unicode(unicode)
        .build()
        .map_err(|source| DefinitionError::Pattern {
            rule: rule.name.clone(),
            source,
        })?;

    if regex.is_match(b"") {
        return Err(DefinitionError::EmptyMatch {
            rule: rule.name.clone(),
        });
    }

    if window == 0 {
        return Err(DefinitionError::ZeroWindow {
            rule: rule.name.clone(),
        });
    }

    let compiled = CompiledRule::new(
        rule.name.clone(),
        regex,
        rule.replace.as_bytes(),
        expand,
        window,
    );
    Ok(match rule.kind {
        MatchKind::Literal => compiled,
        MatchKind::Regex => compiled.with_lookaround(REGEX_LOOKAROUND),
    })
}

/// Errors that can occur while loading a transform definition.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("Failed to read definition {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid content type scope: {0}")]
    Scope(#[from] MatcherError),

    #[error("Rule '{rule}': invalid pattern: {source}")]
    Pattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("Rule '{rule}': pattern matches the empty string")]
    EmptyMatch { rule: String },

    #[error("Rule '{rule}': window must be at least one byte")]
    ZeroWindow { rule: String },
}
