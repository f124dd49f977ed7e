//! Module system for versioned, repository-managed code units
//!
//! This crate implements the definition/instance split of a dynamic module
//! system: immutable [`definition::ModuleDefinition`]s live in chained
//! [`repository::Repository`] stores, a [`resolver::Resolver`] picks a
//! concrete definition for every import edge, and an
//! [`instance::ModuleSystem`] session turns resolved definitions into live
//! module instances with memoized identity. Service-provider lookup
//! ([`service::ServiceLoader`]) ranks provider classes by what the
//! requesting module can actually see through its imports.
//!
//! ## Design Principles
//!
//! 1. **Definitions are immutable**: metadata is parsed once; instances
//!    reference definitions, never the other way around
//! 2. **Sessions are explicit**: all instantiation state lives in a
//!    [`ModuleSystem`] value, nothing is process-global
//! 3. **Resolution is per-edge**: every import edge negotiates its own
//!    version, no global version map is imposed
//! 4. **Byte code stays outside**: class loading is a collaborator seam,
//!    the system never interprets code itself

pub mod config;
pub mod definition;
pub mod error;
pub mod instance;
pub mod repository;
pub mod resolver;
pub mod service;
pub mod version;

// Re-export the types almost every embedder touches
pub use config::ModuleSystemConfig;
pub use definition::{ImportDependency, ModuleDefinition, ModuleDefinitionBuilder, ProviderEntry};
pub use error::{ModuleError, ServiceError};
pub use instance::{
    ClassLoader, LoaderFactory, Module, ModuleId, ModuleSystem, ModuleSystemEvent, ProviderObject,
};
pub use repository::{
    LocalRepository, MemoryRepository, Query, Repository, SearchMode, CLASSPATH_MODULE_NAME,
};
pub use resolver::{ResolvedGraph, Resolver};
pub use service::{ProviderInstance, ServiceLoader};
pub use version::{Version, VersionConstraint};
