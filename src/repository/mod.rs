//! Repositories of module definitions
//!
//! A repository is a queryable store of [`ModuleDefinition`]s, optionally
//! chained to a parent (bootstrap, then system, then application). Lookups
//! consult only the receiving repository unless the caller passes
//! [`SearchMode::IncludeParents`]; parent searching is a per-call policy,
//! not repository state.

pub mod local;
pub mod memory;

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::definition::{DefinitionId, ModuleDefinition};
use crate::error::ModuleError;
use crate::resolver::PlatformContext;
use crate::version::VersionConstraint;

pub use local::LocalRepository;
pub use memory::MemoryRepository;

/// Name of the virtual module standing in for the legacy class path
pub const CLASSPATH_MODULE_NAME: &str = "classpath";

/// Unique repository identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RepositoryId(Uuid);

impl RepositoryId {
    pub(crate) fn new() -> Self {
        RepositoryId(Uuid::new_v4())
    }

    /// The id of a definition not yet installed anywhere
    pub fn nil() -> Self {
        RepositoryId(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a lookup consults only the receiver or walks the parent chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    LocalOnly,
    IncludeParents,
}

/// Composable predicate over module definitions
#[derive(Debug, Clone)]
pub enum Query {
    Any,
    Name(String),
    NameAndConstraint(String, VersionConstraint),
    Attribute { key: String, value: String },
    ExportsService(String),
    ProvidesService(String),
    And(Box<Query>, Box<Query>),
    Or(Box<Query>, Box<Query>),
}

impl Query {
    pub fn any() -> Self {
        Query::Any
    }

    pub fn name(name: impl Into<String>) -> Self {
        Query::Name(name.into())
    }

    pub fn name_and_constraint(name: impl Into<String>, constraint: VersionConstraint) -> Self {
        Query::NameAndConstraint(name.into(), constraint)
    }

    pub fn attribute(key: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Attribute {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn exports_service(service_type: impl Into<String>) -> Self {
        Query::ExportsService(service_type.into())
    }

    pub fn provides_service(service_type: impl Into<String>) -> Self {
        Query::ProvidesService(service_type.into())
    }

    pub fn and(self, other: Query) -> Self {
        Query::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Query) -> Self {
        Query::Or(Box::new(self), Box::new(other))
    }

    /// Test a definition against this query
    pub fn matches(&self, def: &ModuleDefinition) -> bool {
        match self {
            Query::Any => true,
            Query::Name(name) => def.name() == name,
            Query::NameAndConstraint(name, constraint) => {
                def.name() == name && constraint.contains(def.version())
            }
            Query::Attribute { key, value } => def.attribute(key) == Some(value.as_str()),
            Query::ExportsService(service_type) => def.exports_service(service_type),
            Query::ProvidesService(service_type) => def.provides_service(service_type),
            Query::And(a, b) => a.matches(def) && b.matches(def),
            Query::Or(a, b) => a.matches(def) || b.matches(def),
        }
    }
}

/// Repository change notifications, delivered synchronously to listeners
#[derive(Debug, Clone)]
pub enum RepositoryEvent {
    Installed(Arc<ModuleDefinition>),
    Uninstalled(Arc<ModuleDefinition>),
    Shutdown(RepositoryId),
}

/// Callback interface for repository events
pub trait RepositoryListener: Send + Sync {
    fn on_event(&self, event: &RepositoryEvent);
}

/// Queryable, possibly parent-chained store of module definitions
pub trait Repository: Send + Sync {
    fn id(&self) -> RepositoryId;

    fn name(&self) -> &str;

    fn parent(&self) -> Option<&Arc<dyn Repository>>;

    /// Bootstrap repositories host virtual platform modules; their module
    /// instances are never released.
    fn is_bootstrap(&self) -> bool {
        false
    }

    /// Find the best matching definition: highest version satisfying the
    /// constraint, running-platform tie-break among equals.
    fn find(
        &self,
        name: &str,
        constraint: &VersionConstraint,
        mode: SearchMode,
    ) -> Result<Option<Arc<ModuleDefinition>>, ModuleError> {
        let matches =
            self.find_query(&Query::name_and_constraint(name, constraint.clone()), mode)?;
        Ok(crate::resolver::select_candidate(
            &matches,
            &PlatformContext::detect(),
        ))
    }

    /// All definitions matching the query; under `IncludeParents` the
    /// receiver's matches come first, then the parents' in chain order.
    fn find_query(
        &self,
        query: &Query,
        mode: SearchMode,
    ) -> Result<Vec<Arc<ModuleDefinition>>, ModuleError>;

    fn find_all(&self, mode: SearchMode) -> Result<Vec<Arc<ModuleDefinition>>, ModuleError> {
        self.find_query(&Query::Any, mode)
    }

    /// Install a definition, binding it to this repository
    fn install(&self, def: ModuleDefinition) -> Result<Arc<ModuleDefinition>, ModuleError>;

    /// Remove a definition; `Ok(false)` when it was not present
    fn uninstall(&self, id: &DefinitionId) -> Result<bool, ModuleError>;

    /// Release all resources; every subsequent operation fails with
    /// [`ModuleError::RepositoryShutDown`]
    fn shutdown(&self) -> Result<(), ModuleError>;

    fn add_listener(&self, listener: Box<dyn RepositoryListener>);
}

/// The chain from a repository up to its root, receiver first
pub fn repository_chain(repository: &Arc<dyn Repository>) -> Vec<Arc<dyn Repository>> {
    let mut chain = vec![Arc::clone(repository)];
    let mut current = Arc::clone(repository);
    loop {
        let next = match current.parent() {
            Some(parent) => Arc::clone(parent),
            None => break,
        };
        chain.push(Arc::clone(&next));
        current = next;
    }
    chain
}
