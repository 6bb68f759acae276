//! Transformer factory with modification-time based reload.

use crate::definition::{DefinitionError, TransformDefinition};
use crate::transformer::ContentTransformer;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Produces per-transaction transformers from a cached definition.
///
/// The definition artifact is re-checked before every transaction. A changed
/// modification time triggers a reload; the new definition replaces the cached
/// `Arc`, so transactions already running keep the one they started with.
pub struct TransformerFactory {
    /// Definition artifact path
    source: PathBuf,
    /// Window for regex rules without their own
    default_window: usize,
    /// Current definition and the artifact mtime it was read at
    cached: RwLock<Cached>,
    /// Successful reloads after the initial load
    reloads: AtomicU64,
    /// Failed reload attempts
    reload_failures: AtomicU64,
}

struct Cached {
    modified: SystemTime,
    definition: Arc<TransformDefinition>,
}

impl TransformerFactory {
    /// Load the initial definition.
    ///
    /// Fails if the artifact is missing or invalid; there is nothing to serve
    /// without it.
    pub fn load(source: impl Into<PathBuf>, default_window: usize) -> Result<Self, DefinitionError> {
        let source = source.into();
        let modified = modified_time(&source)?;
        let definition = TransformDefinition::load(&source, default_window)?.with_generation(1);

        info!(
            path = %source.display(),
            version = %definition.version(),
            rules = definition.rules().len(),
            "Transform definition loaded"
        );

        Ok(Self {
            source,
            default_window,
            cached: RwLock::new(Cached {
                modified,
                definition: Arc::new(definition),
            }),
            reloads: AtomicU64::new(0),
            reload_failures: AtomicU64::new(0),
        })
    }

    /// The cached definition, without checking the artifact.
    pub fn current(&self) -> Arc<TransformDefinition> {
        let cached = self.cached.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&cached.definition)
    }

    /// Check the artifact and reload it if it changed.
    ///
    /// Any failure keeps the previous definition.
    pub fn refresh(&self) -> Arc<TransformDefinition> {
        let modified = match modified_time(&self.source) {
            Ok(t) => t,
            Err(e) => {
                self.reload_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %e,
                    "Transform definition unavailable, keeping cached version"
                );
                return self.current();
            }
        };

        {
            let cached = self.cached.read().unwrap_or_else(PoisonError::into_inner);
            if cached.modified == modified {
                return Arc::clone(&cached.definition);
            }
        }

        let mut cached = self.cached.write().unwrap_or_else(PoisonError::into_inner);
        if cached.modified == modified {
            // reloaded while we waited for the lock
            return Arc::clone(&cached.definition);
        }

        // a broken artifact is not retried until it changes again
        cached.modified = modified;

        match TransformDefinition::load(&self.source, self.default_window) {
            Ok(definition) => {
                let generation = cached.definition.generation() + 1;
                cached.definition = Arc::new(definition.with_generation(generation));
                self.reloads.fetch_add(1, Ordering::Relaxed);
                info!(
                    path = %self.source.display(),
                    version = %cached.definition.version(),
                    generation,
                    "Transform definition reloaded"
                );
            }
            Err(e) => {
                self.reload_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    path = %self.source.display(),
                    error = %e,
                    kept_generation = cached.definition.generation(),
                    "Transform definition reload failed, keeping cached version"
                );
            }
        }

        Arc::clone(&cached.definition)
    }

    /// Refresh the definition and create a transformer for one transaction.
    ///
    /// Returns the definition alongside so the caller can report which
    /// version it is running.
    pub fn make_transformer(
        &self,
        content_type: Option<&str>,
        max_body_size: usize,
    ) -> (Arc<TransformDefinition>, Box<dyn ContentTransformer>) {
        let definition = self.refresh();
        let transformer = definition.instantiate(content_type, max_body_size);
        debug!(
            content_type = content_type.unwrap_or("-"),
            transformer = transformer.name(),
            generation = definition.generation(),
            "Created content transformer"
        );
        (definition, transformer)
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }

    pub fn reload_failures(&self) -> u64 {
        self.reload_failures.load(Ordering::Relaxed)
    }
}

fn modified_time(path: &Path) -> Result<SystemTime, DefinitionError> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|source| DefinitionError::Io {
            path: path.to_path_buf(),
            source,
        })
}
