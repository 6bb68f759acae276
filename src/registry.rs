//! Explicit registry of adaptation services.
//!
//! Built once at startup and handed to whatever embeds the services; nothing
//! registers itself behind the caller's back.

use crate::service::{AdapterService, Lifecycle};
use std::sync::Arc;
use tracing::info;

/// Services available to the host, keyed by URI.
#[derive(Default)]
pub struct ServiceRegistry {
    services: Vec<Arc<AdapterService>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service. URIs must be unique.
    pub fn register(&mut self, service: Arc<AdapterService>) -> Result<(), RegistryError> {
        if self.get(service.uri()).is_some() {
            return Err(RegistryError::Duplicate(service.uri().to_string()));
        }
        info!(uri = %service.uri(), "Registered adaptation service");
        self.services.push(service);
        Ok(())
    }

    /// Look up a service by URI.
    pub fn get(&self, uri: &str) -> Option<Arc<AdapterService>> {
        self.services.iter().find(|s| s.uri() == uri).cloned()
    }

    pub fn services(&self) -> &[Arc<AdapterService>] {
        &self.services
    }

    /// Retire every registered service not retired yet.
    pub fn retire_all(&self) {
        for service in &self.services {
            if service.lifecycle() != Lifecycle::Retired {
                service.retire();
            }
        }
    }
}

/// Registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Service already registered: {0}")]
    Duplicate(String),
}
