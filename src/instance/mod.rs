//! Module instances and the module system session
//!
//! A `ModuleSystem` turns resolved definitions into live `Module` instances:
//! one arena slot per instantiated definition, a memo map keyed by
//! definition id, and lifecycle events for listeners. Instantiation is
//! cycle-safe; an arena slot is reserved and memoized before imports are
//! wired, so a definition cycle closes on the reserved id instead of
//! recursing forever.
//!
//! Sessions are single-threaded: every mutating operation takes `&mut self`.
//! Repositories stay internally synchronized, but two threads resolving
//! through one `ModuleSystem` is not a supported mode.

pub mod loader;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ModuleSystemConfig;
use crate::definition::{DefinitionId, ModuleDefinition};
use crate::error::ModuleError;
use crate::repository::{
    repository_chain, LocalRepository, MemoryRepository, Repository, SearchMode,
};
use crate::resolver::{PlatformContext, Resolution, ResolveOptions, ResolvedGraph, Resolver};

pub use loader::{
    ClassLoader, LoaderFactory, NullClassLoader, NullLoaderFactory, ProviderCtor, ProviderObject,
    RegistryClassLoader, SharedLoaderFactory,
};

/// Handle to a module instance, stable for the life of its `ModuleSystem`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(usize);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One wired import edge of a live module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleImport {
    pub module: ModuleId,
    pub reexport: bool,
}

/// A live module instance
pub struct Module {
    definition: Arc<ModuleDefinition>,
    imports: Vec<ModuleImport>,
    class_loader: Arc<dyn ClassLoader>,
}

impl Module {
    pub fn definition(&self) -> &Arc<ModuleDefinition> {
        &self.definition
    }

    /// Wired imports in declaration order; unsatisfied optional imports are
    /// not present
    pub fn imports(&self) -> &[ModuleImport] {
        &self.imports
    }

    pub fn imported_modules(&self) -> Vec<ModuleId> {
        self.imports.iter().map(|i| i.module).collect()
    }

    pub fn class_loader(&self) -> &Arc<dyn ClassLoader> {
        &self.class_loader
    }
}

enum ModuleSlot {
    /// Reserved while imports are being wired; what a definition cycle
    /// lands on instead of recursing
    InProgress(Arc<ModuleDefinition>),
    Ready(Module),
}

impl ModuleSlot {
    fn definition(&self) -> &Arc<ModuleDefinition> {
        match self {
            ModuleSlot::InProgress(def) => def,
            ModuleSlot::Ready(module) => module.definition(),
        }
    }
}

/// Lifecycle events dispatched synchronously after the state change
#[derive(Debug, Clone)]
pub enum ModuleSystemEvent {
    ModuleInitialized(Arc<ModuleDefinition>),
    ModuleReleased(Arc<ModuleDefinition>),
}

pub trait ModuleSystemListener: Send + Sync {
    fn on_event(&self, event: &ModuleSystemEvent);
}

/// Session object owning module instances for one repository chain
pub struct ModuleSystem {
    repository: Arc<dyn Repository>,
    chain: Vec<Arc<dyn Repository>>,
    config: ModuleSystemConfig,
    loader_factory: Arc<dyn LoaderFactory>,
    arena: Vec<ModuleSlot>,
    instances: HashMap<DefinitionId, ModuleId>,
    listeners: Vec<Box<dyn ModuleSystemListener>>,
}

impl ModuleSystem {
    /// Session over `repository` and its parent chain, default configuration
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self::with_config(repository, ModuleSystemConfig::default())
    }

    pub fn with_config(repository: Arc<dyn Repository>, config: ModuleSystemConfig) -> Self {
        let chain = repository_chain(&repository);
        Self {
            repository,
            chain,
            config,
            loader_factory: Arc::new(NullLoaderFactory),
            arena: Vec::new(),
            instances: HashMap::new(),
            listeners: Vec::new(),
        }
    }

    /// Build the standard chain from configuration: a bootstrap repository
    /// with the virtual platform modules, and an installed repository on
    /// top (directory-backed when `modules_dir` is set).
    pub fn from_config(config: ModuleSystemConfig) -> Self {
        let bootstrap: Arc<dyn Repository> = Arc::new(MemoryRepository::bootstrap());
        let repository: Arc<dyn Repository> = match &config.modules_dir {
            Some(dir) => Arc::new(LocalRepository::with_parent(
                "installed",
                dir,
                Arc::clone(&bootstrap),
            )),
            None => Arc::new(MemoryRepository::with_parent(
                "installed",
                Arc::clone(&bootstrap),
            )),
        };
        Self::with_config(repository, config)
    }

    pub fn with_loader_factory(mut self, factory: Arc<dyn LoaderFactory>) -> Self {
        self.loader_factory = factory;
        self
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    pub fn config(&self) -> &ModuleSystemConfig {
        &self.config
    }

    pub fn add_listener(&mut self, listener: Box<dyn ModuleSystemListener>) {
        self.listeners.push(listener);
    }

    /// Number of live (memoized) instances
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// The instance for `def`, instantiating it and its import graph on
    /// first request. Repeated calls return the same id.
    pub fn get_instance(
        &mut self,
        def: &Arc<ModuleDefinition>,
    ) -> Result<ModuleId, ModuleError> {
        if !self.owns(def) {
            return Err(ModuleError::ForeignRepository {
                module: def.name().to_string(),
                repository: def.repository().to_string(),
            });
        }
        if let Some(&existing) = self.instances.get(&def.id()) {
            return Ok(existing);
        }

        let graph = Resolver::with_options(&self.repository, self.resolve_options())
            .resolve(def)?;

        let first_new = self.arena.len();
        let mut initialized = Vec::new();
        match self.instantiate(def, &graph, &mut initialized) {
            Ok(id) => {
                for ready in initialized {
                    self.emit(&ModuleSystemEvent::ModuleInitialized(ready));
                }
                Ok(id)
            }
            Err(e) => {
                // Unwind everything this call created so the session stays
                // consistent; earlier instances keep their slots and ids.
                self.instances.retain(|_, id| id.0 < first_new);
                self.arena.truncate(first_new);
                Err(e)
            }
        }
    }

    /// The memoized instance id for `def`, if it has been instantiated
    pub fn instance_of(&self, def: &Arc<ModuleDefinition>) -> Option<ModuleId> {
        self.instances.get(&def.id()).copied()
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        match self.arena.get(id.0) {
            Some(ModuleSlot::Ready(module)) => Some(module),
            _ => None,
        }
    }

    /// Definition held by a slot, whether or not wiring completed
    pub fn definition(&self, id: ModuleId) -> Option<&Arc<ModuleDefinition>> {
        self.arena.get(id.0).map(ModuleSlot::definition)
    }

    pub fn imported_modules(&self, id: ModuleId) -> Vec<ModuleId> {
        self.module(id)
            .map(Module::imported_modules)
            .unwrap_or_default()
    }

    /// Live instances with their ids, in instantiation order
    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.arena.iter().enumerate().filter_map(|(i, slot)| match slot {
            ModuleSlot::Ready(module) => Some((ModuleId(i), module)),
            ModuleSlot::InProgress(_) => None,
        })
    }

    /// Drop the memoized instance for `def` so the next request
    /// re-instantiates it. The arena slot stays; existing ids remain valid
    /// and other modules' wired imports are untouched.
    pub fn release_module(&mut self, def: &Arc<ModuleDefinition>) -> Result<(), ModuleError> {
        for prefix in &self.config.reserved_prefixes {
            if def.name().starts_with(prefix.as_str()) {
                return Err(ModuleError::ReservedModuleName(def.name().to_string()));
            }
        }
        if self
            .chain
            .iter()
            .any(|repo| repo.is_bootstrap() && repo.id() == def.repository())
        {
            return Err(ModuleError::BootstrapModule(def.name().to_string()));
        }
        if !self.owns(def) {
            return Err(ModuleError::ForeignRepository {
                module: def.name().to_string(),
                repository: def.repository().to_string(),
            });
        }
        if !def.is_releasable() {
            return Err(ModuleError::NotReleasable(def.name().to_string()));
        }

        if let Some(id) = self.instances.remove(&def.id()) {
            debug!("Dropped instance {} of {}", id, def);
        }
        info!("Module {} released", def);
        self.emit(&ModuleSystemEvent::ModuleReleased(Arc::clone(def)));
        Ok(())
    }

    /// Modules visible to `origin` through its imports: direct imports, and
    /// transitively whatever reexport edges expose.
    ///
    /// All direct imports enter the closure. From a deeper module, reexport
    /// edges are always followed; plain edges are followed only when that
    /// module was itself entered through a reexport edge. A module first
    /// entered through a plain edge is expanded again if a reexport edge
    /// later reaches it.
    pub fn reexport_closure(&self, origin: ModuleId) -> HashSet<ModuleId> {
        let mut closure = HashSet::new();
        let mut expanded: HashSet<(ModuleId, bool)> = HashSet::new();
        let mut queue: VecDeque<(ModuleId, bool)> = VecDeque::new();

        expanded.insert((origin, false));
        queue.push_back((origin, false));

        while let Some((current, via_reexport)) = queue.pop_front() {
            let module = match self.module(current) {
                Some(module) => module,
                None => continue,
            };
            for import in module.imports() {
                if current != origin && !via_reexport && !import.reexport {
                    continue;
                }
                closure.insert(import.module);
                let state = (import.module, import.reexport);
                if expanded.insert(state) {
                    queue.push_back(state);
                }
            }
        }
        debug!(
            "Reexport closure of {}: {} modules",
            origin,
            closure.len()
        );
        closure
    }

    fn owns(&self, def: &Arc<ModuleDefinition>) -> bool {
        self.chain.iter().any(|repo| repo.id() == def.repository())
    }

    fn resolve_options(&self) -> ResolveOptions {
        let detected = PlatformContext::detect();
        let platform = self
            .config
            .platform
            .clone()
            .unwrap_or_else(|| detected.platform.clone());
        let arch = self
            .config
            .arch
            .clone()
            .unwrap_or_else(|| detected.arch.clone());
        ResolveOptions {
            search_mode: if self.config.search_parents {
                SearchMode::IncludeParents
            } else {
                SearchMode::LocalOnly
            },
            platform: PlatformContext::new(platform, arch),
        }
    }

    fn instantiate(
        &mut self,
        def: &Arc<ModuleDefinition>,
        graph: &ResolvedGraph,
        initialized: &mut Vec<Arc<ModuleDefinition>>,
    ) -> Result<ModuleId, ModuleError> {
        if let Some(&existing) = self.instances.get(&def.id()) {
            return Ok(existing);
        }

        // Reserve the slot and memoize before touching imports; a cyclic
        // import re-entering here resolves to this id.
        let id = ModuleId(self.arena.len());
        self.arena.push(ModuleSlot::InProgress(Arc::clone(def)));
        self.instances.insert(def.id(), id);

        let mut imports = Vec::new();
        for (index, dependency) in def.import_dependencies().iter().enumerate() {
            match graph.resolution(def.id(), index) {
                Some(Resolution::Selected(target)) => {
                    let target = Arc::clone(target);
                    let imported = self.instantiate(&target, graph, initialized)?;
                    imports.push(ModuleImport {
                        module: imported,
                        reexport: dependency.is_reexport(),
                    });
                }
                Some(Resolution::Absent) => {
                    debug!(
                        "{}: optional import {} unsatisfied, not wired",
                        def.name(),
                        dependency.target()
                    );
                }
                None => {
                    return Err(ModuleError::InitializationFailed {
                        module: def.name().to_string(),
                        reason: format!("no resolution for import {}", dependency.target()),
                    });
                }
            }
        }

        let class_loader = self.loader_factory.create(def);
        self.arena[id.0] = ModuleSlot::Ready(Module {
            definition: Arc::clone(def),
            imports,
            class_loader,
        });
        info!("Module {} initialized as {}", def, id);
        initialized.push(Arc::clone(def));
        Ok(id)
    }

    fn emit(&self, event: &ModuleSystemEvent) {
        for listener in &self.listeners {
            listener.on_event(event);
        }
    }
}
