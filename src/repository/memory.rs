//! In-memory repository
//!
//! Backs programmatic use, virtual modules and tests. The `bootstrap()`
//! variant is flagged as the chain root for platform modules and comes
//! pre-seeded with the `classpath` virtual module.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

use crate::definition::{DefinitionId, ModuleDefinition};
use crate::error::ModuleError;
use crate::repository::{
    Query, Repository, RepositoryEvent, RepositoryId, RepositoryListener, SearchMode,
    CLASSPATH_MODULE_NAME,
};
use crate::version::Version;

struct State {
    definitions: Vec<Arc<ModuleDefinition>>,
    shut_down: bool,
}

/// Install/uninstall-capable in-memory store of module definitions
pub struct MemoryRepository {
    id: RepositoryId,
    name: String,
    parent: Option<Arc<dyn Repository>>,
    bootstrap: bool,
    state: RwLock<State>,
    listeners: RwLock<Vec<Arc<dyn RepositoryListener>>>,
}

impl MemoryRepository {
    /// Create an empty repository with no parent
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), None, false)
    }

    /// Create a repository chained to a parent
    pub fn with_parent(name: impl Into<String>, parent: Arc<dyn Repository>) -> Self {
        Self::build(name.into(), Some(parent), false)
    }

    /// Create the bootstrap repository, pre-seeded with the `classpath`
    /// virtual module
    pub fn bootstrap() -> Self {
        let repo = Self::build("bootstrap".to_string(), None, true);
        let mut classpath =
            ModuleDefinition::builder(CLASSPATH_MODULE_NAME, Version::new(1, 0, 0))
                .virtual_module()
                .releasable(false)
                .build();
        classpath.attach(repo.id);
        repo.state.write().definitions.push(Arc::new(classpath));
        repo
    }

    fn build(name: String, parent: Option<Arc<dyn Repository>>, bootstrap: bool) -> Self {
        let id = RepositoryId::new();
        debug!("Creating repository {} ({})", name, id);
        Self {
            id,
            name,
            parent,
            bootstrap,
            state: RwLock::new(State {
                definitions: Vec::new(),
                shut_down: false,
            }),
            listeners: RwLock::new(Vec::new()),
        }
    }

    fn ensure_open(&self, state: &State) -> Result<(), ModuleError> {
        if state.shut_down {
            return Err(ModuleError::RepositoryShutDown(self.name.clone()));
        }
        Ok(())
    }

    fn notify(&self, event: RepositoryEvent) {
        // Callbacks may re-enter add_listener; never hold the lock while
        // notifying.
        let listeners: Vec<Arc<dyn RepositoryListener>> = self.listeners.read().clone();
        for listener in listeners {
            listener.on_event(&event);
        }
    }
}

impl Repository for MemoryRepository {
    fn id(&self) -> RepositoryId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parent(&self) -> Option<&Arc<dyn Repository>> {
        self.parent.as_ref()
    }

    fn is_bootstrap(&self) -> bool {
        self.bootstrap
    }

    fn find_query(
        &self,
        query: &Query,
        mode: SearchMode,
    ) -> Result<Vec<Arc<ModuleDefinition>>, ModuleError> {
        let mut matches = {
            let state = self.state.read();
            self.ensure_open(&state)?;
            state
                .definitions
                .iter()
                .filter(|def| query.matches(def))
                .cloned()
                .collect::<Vec<_>>()
        };

        if mode == SearchMode::IncludeParents {
            if let Some(parent) = &self.parent {
                matches.extend(parent.find_query(query, mode)?);
            }
        }
        Ok(matches)
    }

    fn install(&self, mut def: ModuleDefinition) -> Result<Arc<ModuleDefinition>, ModuleError> {
        def.attach(self.id);
        let def = Arc::new(def);
        {
            let mut state = self.state.write();
            self.ensure_open(&state)?;
            state.definitions.push(Arc::clone(&def));
        }
        info!("Installed {} into repository {}", def, self.name);
        self.notify(RepositoryEvent::Installed(Arc::clone(&def)));
        Ok(def)
    }

    fn uninstall(&self, id: &DefinitionId) -> Result<bool, ModuleError> {
        let removed = {
            let mut state = self.state.write();
            self.ensure_open(&state)?;
            match state.definitions.iter().position(|d| d.id() == *id) {
                Some(index) => Some(state.definitions.remove(index)),
                None => None,
            }
        };

        match removed {
            Some(def) => {
                info!("Uninstalled {} from repository {}", def, self.name);
                self.notify(RepositoryEvent::Uninstalled(def));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn shutdown(&self) -> Result<(), ModuleError> {
        {
            let mut state = self.state.write();
            self.ensure_open(&state)?;
            state.shut_down = true;
            state.definitions.clear();
        }
        info!("Repository {} shut down", self.name);
        self.notify(RepositoryEvent::Shutdown(self.id));
        Ok(())
    }

    fn add_listener(&self, listener: Box<dyn RepositoryListener>) {
        self.listeners.write().push(Arc::from(listener));
    }
}
