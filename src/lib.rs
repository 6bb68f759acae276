//! Streaming content adaptation for Zentinel hosts.
//!
//! This crate reshapes message bodies while they stream through a relaying
//! host, without buffering whole messages and without blocking the host:
//!
//! - Per-message [`Transaction`] state machine coordinating the virgin and
//!   adapted body flows with the host
//! - Find/replace transforms (literal or regex) that survive arbitrary chunk
//!   boundaries
//! - Transform definitions hot-reloaded by modification time
//! - Content type scoping and adapted header rewriting
//!
//! ## Definition Example
//!
//! ```yaml
//! version: "1"
//! content_types:
//!   - pattern: "text/html"
//! rules:
//!   - name: "kristian"
//!     find: "Kristian"
//!     replace: "Christian"
//! ```

pub mod config;
pub mod context;
pub mod definition;
pub mod factory;
pub mod host;
pub mod local;
pub mod matcher;
pub mod message;
pub mod registry;
pub mod service;
pub mod transaction;
pub mod transformer;

pub use config::AdapterConfig;
pub use definition::{DefinitionError, TransformDefinition};
pub use factory::TransformerFactory;
pub use host::{HostLink, HostTransaction};
pub use message::{Header, Message};
pub use registry::{RegistryError, ServiceRegistry};
pub use service::{AdapterError, AdapterService, Lifecycle, ServiceStats};
pub use transaction::{BodyState, Transaction};
pub use transformer::{ContentTransformer, TransformError};
