//! Directory-backed repository
//!
//! Scans `<root>/*/module.toml` on first query, parsing and validating each
//! manifest. Unparseable or invalid manifests are skipped with a warning so
//! one bad module cannot take the whole repository down. The store is
//! read-only at runtime; packaging tools own the directory contents.

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::definition::manifest::ModuleManifest;
use crate::definition::{DefinitionId, ModuleDefinition};
use crate::error::ModuleError;
use crate::repository::{
    Query, Repository, RepositoryEvent, RepositoryId, RepositoryListener, SearchMode,
};

struct State {
    definitions: Vec<Arc<ModuleDefinition>>,
    initialized: bool,
    shut_down: bool,
}

/// Repository backed by a directory of module manifests
pub struct LocalRepository {
    id: RepositoryId,
    name: String,
    root: PathBuf,
    parent: Option<Arc<dyn Repository>>,
    state: RwLock<State>,
    listeners: RwLock<Vec<Arc<dyn RepositoryListener>>>,
}

impl LocalRepository {
    /// Open a repository rooted at `root`; the directory is not scanned
    /// until the first query
    pub fn open(name: impl Into<String>, root: impl AsRef<Path>) -> Self {
        Self::build(name.into(), root.as_ref().to_path_buf(), None)
    }

    /// Open a repository chained to a parent
    pub fn with_parent(
        name: impl Into<String>,
        root: impl AsRef<Path>,
        parent: Arc<dyn Repository>,
    ) -> Self {
        Self::build(name.into(), root.as_ref().to_path_buf(), Some(parent))
    }

    fn build(name: String, root: PathBuf, parent: Option<Arc<dyn Repository>>) -> Self {
        Self {
            id: RepositoryId::new(),
            name,
            root,
            parent,
            state: RwLock::new(State {
                definitions: Vec::new(),
                initialized: false,
                shut_down: false,
            }),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drop the scanned definitions; the next query rescans the directory
    pub fn reload(&self) -> Result<(), ModuleError> {
        let mut state = self.state.write();
        self.ensure_open(&state)?;
        state.definitions.clear();
        state.initialized = false;
        info!("Repository {} marked for rescan of {:?}", self.name, self.root);
        Ok(())
    }

    fn ensure_open(&self, state: &State) -> Result<(), ModuleError> {
        if state.shut_down {
            return Err(ModuleError::RepositoryShutDown(self.name.clone()));
        }
        Ok(())
    }

    fn initialize(&self, state: &mut State) -> Result<(), ModuleError> {
        if state.initialized {
            return Ok(());
        }
        info!("Initializing repository {} from {:?}", self.name, self.root);

        if !self.root.exists() {
            debug!("Repository root {:?} does not exist, treating as empty", self.root);
            state.initialized = true;
            return Ok(());
        }

        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let manifest_path = path.join("module.toml");
            if !manifest_path.exists() {
                debug!("No module.toml in {:?}, skipping", path);
                continue;
            }

            let def = ModuleManifest::from_file(&manifest_path)
                .and_then(|manifest| manifest.to_definition());
            match def {
                Ok(mut def) => {
                    def.attach(self.id);
                    debug!("Discovered {} in {:?}", def, path);
                    state.definitions.push(Arc::new(def));
                }
                Err(e) => {
                    warn!("Skipping manifest in {:?}: {}", path, e);
                }
            }
        }

        info!(
            "Repository {} initialized with {} modules",
            self.name,
            state.definitions.len()
        );
        state.initialized = true;
        Ok(())
    }
}

impl Repository for LocalRepository {
    fn id(&self) -> RepositoryId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parent(&self) -> Option<&Arc<dyn Repository>> {
        self.parent.as_ref()
    }

    fn find_query(
        &self,
        query: &Query,
        mode: SearchMode,
    ) -> Result<Vec<Arc<ModuleDefinition>>, ModuleError> {
        let mut matches = {
            let mut state = self.state.write();
            self.ensure_open(&state)?;
            self.initialize(&mut state)?;
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

    fn install(&self, _def: ModuleDefinition) -> Result<Arc<ModuleDefinition>, ModuleError> {
        Err(ModuleError::UnsupportedOperation(
            "install into a directory-backed repository",
        ))
    }

    fn uninstall(&self, _id: &DefinitionId) -> Result<bool, ModuleError> {
        Err(ModuleError::UnsupportedOperation(
            "uninstall from a directory-backed repository",
        ))
    }

    fn shutdown(&self) -> Result<(), ModuleError> {
        {
            let mut state = self.state.write();
            self.ensure_open(&state)?;
            state.shut_down = true;
            state.definitions.clear();
        }
        info!("Repository {} shut down", self.name);
        // Callbacks may re-enter add_listener; never hold the lock while
        // notifying.
        let listeners: Vec<Arc<dyn RepositoryListener>> = self.listeners.read().clone();
        for listener in listeners {
            listener.on_event(&RepositoryEvent::Shutdown(self.id));
        }
        Ok(())
    }

    fn add_listener(&self, listener: Box<dyn RepositoryListener>) {
        self.listeners.write().push(Arc::from(listener));
    }
}
