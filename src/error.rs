//! Error types for the module system
//!
//! Two taxonomies: `ModuleError` for definition, repository, resolution and
//! instantiation failures, and `ServiceError` for service-provider lookup.

use thiserror::Error;

use crate::version::VersionError;

/// Module system errors
#[derive(Debug, Error)]
pub enum ModuleError {
    /// A required import has no matching candidate in the repository chain.
    #[error("Module dependency not found: {importer} requires {target} {constraint}")]
    DependencyNotFound {
        importer: String,
        target: String,
        constraint: String,
    },

    #[error("Module initialization failed: {0}")]
    Initialization(String),

    #[error("Module initialization failed for {module}: {reason}")]
    InitializationFailed { module: String, reason: String },

    /// A definition was handed to a module system whose repository chain
    /// does not own it. Programming error, never retried.
    #[error("Module {module} belongs to a foreign repository {repository}")]
    ForeignRepository { module: String, repository: String },

    #[error("Module name {0} uses a reserved platform prefix")]
    ReservedModuleName(String),

    #[error("Module {0} is not releasable")]
    NotReleasable(String),

    #[error("Module {0} belongs to the bootstrap repository and cannot be released")]
    BootstrapModule(String),

    #[error("Repository {0} has been shut down")]
    RepositoryShutDown(String),

    #[error("Unsupported repository operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("Invalid module manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid version: {0}")]
    Version(#[from] VersionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Service-provider lookup errors
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No module in the repository chain exports the requested service type.
    #[error("Unknown service type: {0}")]
    UnknownService(String),

    /// A provider class was rejected or failed to instantiate.
    #[error("Service provider {class} failed: {reason}")]
    ProviderFailed { class: String, reason: String },

    #[error(transparent)]
    Module(#[from] ModuleError),
}

impl From<VersionError> for ServiceError {
    fn from(e: VersionError) -> Self {
        ServiceError::Module(ModuleError::Version(e))
    }
}
