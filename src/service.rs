//! Adaptation service implementation.

use crate::config::{AdapterConfig, HeaderTransform, Settings};
use crate::definition::DefinitionError;
use crate::factory::TransformerFactory;
use crate::host::HostTransaction;
use crate::transaction::Transaction;
use crate::transformer::HeaderRewriter;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{error, info};

/// State shared by a service and every transaction it created.
pub(crate) struct ServiceCore {
    pub(crate) settings: Settings,
    pub(crate) factory: TransformerFactory,
    headers: RwLock<Arc<HeaderRewriter>>,
    pub(crate) stats: Counters,
}

impl ServiceCore {
    /// Header rewriter in effect for transactions starting now.
    pub(crate) fn headers(&self) -> Arc<HeaderRewriter> {
        let headers = self.headers.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&headers)
    }

    /// Changes with the crate version and the definition version.
    pub(crate) fn tag(&self) -> String {
        format!(
            "{}+def.{}",
            env!("CARGO_PKG_VERSION"),
            self.factory.current().version()
        )
    }
}

#[derive(Default)]
pub(crate) struct Counters {
    transactions_total: AtomicU64,
    transactions_completed: AtomicU64,
    transactions_aborted: AtomicU64,
    transform_failures: AtomicU64,
}

impl Counters {
    pub(crate) fn created(&self) {
        self.transactions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn completed(&self) {
        self.transactions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn aborted(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transform_failed(&self) {
        self.transform_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Service lifecycle as driven by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Constructed, not yet started
    Configured,
    /// Accepting `make_transaction` calls
    Started,
    /// Paused until started again
    Stopped,
    /// Permanently out of service
    Retired,
}

/// Content adaptation service.
///
/// Owns the transformer factory and creates one [`Transaction`] per message
/// handed over by the host.
pub struct AdapterService {
    core: Arc<ServiceCore>,
    lifecycle: Mutex<Lifecycle>,
    next_id: AtomicU64,
}

impl AdapterService {
    /// Create a service from configuration.
    ///
    /// Loads the transform definition; a missing or invalid artifact is an
    /// error since there would be nothing to serve.
    pub fn new(config: AdapterConfig) -> Result<Self, AdapterError> {
        let factory = TransformerFactory::load(
            &config.settings.definition_path,
            config.settings.default_window,
        )?;

        info!(
            uri = %config.settings.service_uri,
            definition = %factory.source().display(),
            max_body_size = config.settings.max_body_size,
            "Adaptation service initialized"
        );

        Ok(Self {
            core: Arc::new(ServiceCore {
                headers: RwLock::new(Arc::new(HeaderRewriter::new(&config.headers))),
                settings: config.settings,
                factory,
                stats: Counters::default(),
            }),
            lifecycle: Mutex::new(Lifecycle::Configured),
            next_id: AtomicU64::new(1),
        })
    }

    /// Create from a YAML configuration string.
    pub fn from_yaml(yaml: &str) -> Result<Self, AdapterError> {
        let config: AdapterConfig = serde_yaml::from_str(yaml)?;
        Self::new(config)
    }

    /// Create from a JSON configuration string.
    pub fn from_json(json: &str) -> Result<Self, AdapterError> {
        let config: AdapterConfig = serde_json::from_str(json)?;
        Self::new(config)
    }

    /// Unique service URI.
    pub fn uri(&self) -> &str {
        &self.core.settings.service_uri
    }

    /// Changes with the crate version and the definition version.
    pub fn tag(&self) -> String {
        self.core.tag()
    }

    /// Free-form description for diagnostics.
    pub fn describe(&self) -> String {
        format!(
            "A modifying adapter from {} v{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )
    }

    /// Whether messages for this URL should be adapted. Always true.
    pub fn wants_url(&self, _url: &str) -> bool {
        true
    }

    /// Start accepting transactions.
    pub fn start(&self) {
        self.transition(Lifecycle::Started);
    }

    /// Stop accepting transactions until started again.
    pub fn stop(&self) {
        self.transition(Lifecycle::Stopped);
    }

    /// Stop accepting transactions for good.
    pub fn retire(&self) {
        self.transition(Lifecycle::Retired);
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the header edits applied by transactions started from now on.
    pub fn reconfigure(&self, headers: &HeaderTransform) {
        let rewriter = Arc::new(HeaderRewriter::new(headers));
        *self
            .core
            .headers
            .write()
            .unwrap_or_else(PoisonError::into_inner) = rewriter;
        info!(uri = %self.uri(), "Header settings reconfigured");
    }

    /// Create a transaction for one host message.
    ///
    /// Only legal while the service is started.
    pub fn make_transaction<H: HostTransaction>(&self, host: H) -> Transaction<H> {
        let lifecycle = self.lifecycle();
        if lifecycle != Lifecycle::Started {
            error!(uri = %self.uri(), ?lifecycle, "Transaction requested from an idle service");
            panic!("adaptation protocol violation: make_transaction while service is {lifecycle:?}");
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.core.stats.created();
        Transaction::new(id, host, Arc::clone(&self.core))
    }

    /// Snapshot of service counters.
    pub fn stats(&self) -> ServiceStats {
        let stats = &self.core.stats;
        let factory = &self.core.factory;
        let definition = factory.current();

        ServiceStats {
            uri: self.uri().to_string(),
            tag: self.tag(),
            lifecycle: self.lifecycle(),
            transactions_total: stats.transactions_total.load(Ordering::Relaxed),
            transactions_completed: stats.transactions_completed.load(Ordering::Relaxed),
            transactions_aborted: stats.transactions_aborted.load(Ordering::Relaxed),
            transform_failures: stats.transform_failures.load(Ordering::Relaxed),
            definition_version: definition.version().to_string(),
            definition_generation: definition.generation(),
            definition_loaded_at: definition.loaded_at().to_rfc3339(),
            definition_reloads: factory.reloads(),
            definition_reload_failures: factory.reload_failures(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.core.settings
    }

    fn transition(&self, next: Lifecycle) {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        let current = *lifecycle;
        let allowed = match (current, next) {
            (Lifecycle::Retired, _) => false,
            (_, Lifecycle::Retired) => true,
            (Lifecycle::Started, Lifecycle::Started) => false,
            (Lifecycle::Configured, Lifecycle::Stopped) => false,
            _ => true,
        };
        if !allowed {
            error!(uri = %self.uri(), from = ?current, to = ?next, "Invalid service lifecycle change");
            panic!("adaptation protocol violation: service {current:?} cannot become {next:?}");
        }
        *lifecycle = next;
        info!(uri = %self.uri(), from = ?current, to = ?next, "Service lifecycle changed");
    }
}

/// Counters reported for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub uri: String,
    pub tag: String,
    pub lifecycle: Lifecycle,
    pub transactions_total: u64,
    pub transactions_completed: u64,
    pub transactions_aborted: u64,
    pub transform_failures: u64,
    pub definition_version: String,
    pub definition_generation: u64,
    pub definition_loaded_at: String,
    pub definition_reloads: u64,
    pub definition_reload_failures: u64,
}

/// Adaptation service errors.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),
}
