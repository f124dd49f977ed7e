//! Import-graph resolution
//!
//! Expands the import graph from a root definition: for every import edge
//! the repository is queried for candidates satisfying the edge's version
//! constraint, the best candidate is selected (highest version, with a
//! running-platform tie-break among equals), and newly discovered targets
//! are expanded in turn. Each edge is negotiated independently: there is no
//! global version map per module name, so diamond imports may legally
//! select two versions of the same name for different importers.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

use crate::definition::{DefinitionId, ModuleDefinition};
use crate::error::ModuleError;
use crate::repository::{Query, Repository, SearchMode};

/// The platform/architecture pair resolution binds candidates against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformContext {
    pub platform: String,
    pub arch: String,
}

impl PlatformContext {
    /// The running platform, from the compile-time target
    pub fn detect() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    pub fn new(platform: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            arch: arch.into(),
        }
    }

    /// A definition bound to a different platform or arch is not eligible;
    /// unbound (neutral) definitions always are.
    fn eligible(&self, def: &ModuleDefinition) -> bool {
        def.platform().map_or(true, |p| p == self.platform)
            && def.arch().map_or(true, |a| a == self.arch)
    }

    /// How specifically a definition is bound to this context
    fn specificity(&self, def: &ModuleDefinition) -> u8 {
        u8::from(def.platform().is_some()) + u8::from(def.arch().is_some())
    }
}

impl Default for PlatformContext {
    fn default() -> Self {
        Self::detect()
    }
}

/// Per-resolve policy knobs
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Whether repository lookups walk the parent chain
    pub search_mode: SearchMode,
    /// Platform/arch to bind platform-specific candidates against
    pub platform: PlatformContext,
}

/// Outcome of one import edge
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The concrete definition selected for the edge
    Selected(Arc<ModuleDefinition>),
    /// Optional import with no matching candidate
    Absent,
}

impl Resolution {
    pub fn selected(&self) -> Option<&Arc<ModuleDefinition>> {
        match self {
            Resolution::Selected(def) => Some(def),
            Resolution::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Resolution::Absent)
    }
}

/// A fully resolved import graph: one [`Resolution`] per
/// `(definition, import index)` edge of every participating definition
#[derive(Debug)]
pub struct ResolvedGraph {
    root: DefinitionId,
    edges: HashMap<(DefinitionId, usize), Resolution>,
    modules: HashMap<DefinitionId, Arc<ModuleDefinition>>,
}

impl ResolvedGraph {
    fn new(root: &Arc<ModuleDefinition>) -> Self {
        let mut modules = HashMap::new();
        modules.insert(root.id(), Arc::clone(root));
        Self {
            root: root.id(),
            edges: HashMap::new(),
            modules,
        }
    }

    fn record(&mut self, importer: DefinitionId, index: usize, resolution: Resolution) {
        if let Resolution::Selected(target) = &resolution {
            self.modules
                .entry(target.id())
                .or_insert_with(|| Arc::clone(target));
        }
        self.edges.insert((importer, index), resolution);
    }

    pub fn root(&self) -> DefinitionId {
        self.root
    }

    /// Resolution of one import edge, by importer and declaration index
    pub fn resolution(&self, importer: DefinitionId, index: usize) -> Option<&Resolution> {
        self.edges.get(&(importer, index))
    }

    /// The definition selected for an edge, `None` for absent edges
    pub fn selected(&self, importer: DefinitionId, index: usize) -> Option<&Arc<ModuleDefinition>> {
        self.resolution(importer, index).and_then(Resolution::selected)
    }

    /// All edge resolutions of one definition, in declaration order
    pub fn imports_of(&self, def: &ModuleDefinition) -> Vec<&Resolution> {
        (0..def.import_dependencies().len())
            .filter_map(|index| self.resolution(def.id(), index))
            .collect()
    }

    /// Every definition that participated in the resolution
    pub fn modules(&self) -> impl Iterator<Item = &Arc<ModuleDefinition>> {
        self.modules.values()
    }

    pub fn contains(&self, id: DefinitionId) -> bool {
        self.modules.contains_key(&id)
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

/// Select the best candidate: highest eligible version; among identical
/// versions, prefer the definition bound most specifically to the running
/// platform/arch over a platform-neutral one.
pub fn select_candidate(
    candidates: &[Arc<ModuleDefinition>],
    platform: &PlatformContext,
) -> Option<Arc<ModuleDefinition>> {
    let mut best: Option<&Arc<ModuleDefinition>> = None;
    for candidate in candidates {
        if !platform.eligible(candidate) {
            continue;
        }
        let replace = match &best {
            None => true,
            Some(current) => match candidate.version().cmp(current.version()) {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => {
                    platform.specificity(candidate) > platform.specificity(current)
                }
            },
        };
        if replace {
            best = Some(candidate);
        }
    }
    best.cloned()
}

/// Import-graph resolver over one repository chain
pub struct Resolver<'a> {
    repository: &'a Arc<dyn Repository>,
    options: ResolveOptions,
}

impl<'a> Resolver<'a> {
    pub fn new(repository: &'a Arc<dyn Repository>) -> Self {
        Self {
            repository,
            options: ResolveOptions::default(),
        }
    }

    pub fn with_options(repository: &'a Arc<dyn Repository>, options: ResolveOptions) -> Self {
        Self {
            repository,
            options,
        }
    }

    /// Resolve the full import graph reachable from `root`.
    ///
    /// Cycles between definitions are legal: a definition is expanded once
    /// and re-encounters are treated as already satisfied. A required edge
    /// with no candidate fails the whole resolve immediately; an optional
    /// one is recorded absent.
    pub fn resolve(&self, root: &Arc<ModuleDefinition>) -> Result<ResolvedGraph, ModuleError> {
        debug!("Resolving import graph for {}", root);
        let mut graph = ResolvedGraph::new(root);
        let mut visited: HashSet<DefinitionId> = HashSet::new();
        let mut queue: VecDeque<Arc<ModuleDefinition>> = VecDeque::new();

        visited.insert(root.id());
        queue.push_back(Arc::clone(root));

        while let Some(def) = queue.pop_front() {
            for (index, dependency) in def.import_dependencies().iter().enumerate() {
                let query = Query::name_and_constraint(
                    dependency.target(),
                    dependency.constraint().clone(),
                );
                let candidates = self
                    .repository
                    .find_query(&query, self.options.search_mode)?;

                match select_candidate(&candidates, &self.options.platform) {
                    Some(target) => {
                        debug!(
                            "{}: import {} {} -> {}",
                            def.name(),
                            dependency.target(),
                            dependency.constraint(),
                            target
                        );
                        if visited.insert(target.id()) {
                            queue.push_back(Arc::clone(&target));
                        }
                        graph.record(def.id(), index, Resolution::Selected(target));
                    }
                    None if dependency.is_optional() => {
                        debug!(
                            "{}: optional import {} {} unsatisfied, recording absent",
                            def.name(),
                            dependency.target(),
                            dependency.constraint()
                        );
                        graph.record(def.id(), index, Resolution::Absent);
                    }
                    None => {
                        return Err(ModuleError::DependencyNotFound {
                            importer: def.name().to_string(),
                            target: dependency.target().to_string(),
                            constraint: dependency.constraint().to_string(),
                        });
                    }
                }
            }
        }

        Ok(graph)
    }
}

/// Resolve `root` against `repository` with default options
pub fn resolve(
    root: &Arc<ModuleDefinition>,
    repository: &Arc<dyn Repository>,
) -> Result<ResolvedGraph, ModuleError> {
    Resolver::new(repository).resolve(root)
}
