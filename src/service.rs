//! Service-provider lookup
//!
//! A `ServiceLoader` finds provider classes for a service type on behalf of
//! a requesting module. Candidate modules come from the repository chain in
//! two stages (bootstrap definitions first, installed ones second) and are
//! filtered by what the requester can actually see through its imports:
//! default providers must share the requester's own service module
//! instance, external providers must have that instance in their reexport
//! closure. Surviving candidates are ordered default providers first, then
//! external providers by module name.
//!
//! Provider instantiation failures do not abort iteration; the first one is
//! remembered and surfaced only if nothing at all could be produced.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::definition::{DefinitionId, ModuleDefinition, ProviderEntry};
use crate::error::{ModuleError, ServiceError};
use crate::instance::{ModuleId, ModuleSystem, ProviderObject};
use crate::repository::{repository_chain, Query, Repository, SearchMode, CLASSPATH_MODULE_NAME};

/// A qualified provider candidate: one declared entry of one module
#[derive(Debug, Clone)]
pub struct ModuleProvider {
    pub definition: Arc<ModuleDefinition>,
    pub entry: ProviderEntry,
}

/// An instantiated provider, ready for the caller to downcast
#[derive(Clone)]
pub struct ProviderInstance {
    pub class_name: String,
    pub module: ModuleId,
    pub object: ProviderObject,
}

/// Compares module instances by identity, instantiating on demand.
///
/// Each definition gets at most one instantiation attempt; the outcome is
/// cached for the checker's lifetime, and a failed attempt is recorded as
/// never-equal rather than retried.
pub struct ModuleEqualityChecker {
    cache: HashMap<DefinitionId, Option<ModuleId>>,
}

impl ModuleEqualityChecker {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Whether `def`'s instance is exactly `expected`
    pub fn check(
        &mut self,
        system: &mut ModuleSystem,
        def: &Arc<ModuleDefinition>,
        expected: ModuleId,
    ) -> bool {
        let outcome = match self.cache.get(&def.id()) {
            Some(cached) => *cached,
            None => {
                let outcome = match system.get_instance(def) {
                    Ok(id) => Some(id),
                    Err(e) => {
                        warn!("Could not instantiate {} for instance comparison: {}", def, e);
                        None
                    }
                };
                self.cache.insert(def.id(), outcome);
                outcome
            }
        };
        outcome == Some(expected)
    }
}

impl Default for ModuleEqualityChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Finds and instantiates providers of one service type for one requester
pub struct ServiceLoader {
    service_type: String,
    requester: ModuleId,
    repository: Arc<dyn Repository>,
    equality: ModuleEqualityChecker,
}

impl ServiceLoader {
    /// Create a loader for `service_type` on behalf of `requester`.
    ///
    /// Fails with [`ServiceError::UnknownService`] when no definition in
    /// the repository chain exports the type at all.
    pub fn load(
        system: &ModuleSystem,
        service_type: impl Into<String>,
        requester: ModuleId,
        repository: Arc<dyn Repository>,
    ) -> Result<Self, ServiceError> {
        let service_type = service_type.into();
        if system.module(requester).is_none() {
            return Err(ServiceError::Module(ModuleError::Initialization(format!(
                "service requester {} is not a live module instance",
                requester
            ))));
        }
        let exporters = repository.find_query(
            &Query::exports_service(&service_type),
            SearchMode::IncludeParents,
        )?;
        if exporters.is_empty() {
            return Err(ServiceError::UnknownService(service_type));
        }
        debug!(
            "Service loader for {}: {} exporting definitions",
            service_type,
            exporters.len()
        );
        Ok(Self {
            service_type,
            requester,
            repository,
            equality: ModuleEqualityChecker::new(),
        })
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn requester(&self) -> ModuleId {
        self.requester
    }

    /// Iterate provider instances, best candidate first.
    ///
    /// Discovery re-runs on every call, so definitions installed since the
    /// previous iteration are picked up. Instantiation is lazy; a candidate
    /// costs nothing until the iterator reaches it.
    pub fn iter<'a>(&'a mut self, system: &'a mut ModuleSystem) -> ServiceIter<'a> {
        let (providers, deferred) = self.discover(system);
        ServiceIter {
            system,
            service_type: self.service_type.clone(),
            providers: providers.into_iter(),
            attempted: HashSet::new(),
            deferred,
            produced_any: false,
        }
    }

    /// The qualified candidates one discovery pass yields, in iteration
    /// order, without instantiating any provider class
    pub fn candidates(&mut self, system: &mut ModuleSystem) -> Vec<ModuleProvider> {
        self.discover(system).0
    }

    fn discover(
        &mut self,
        system: &mut ModuleSystem,
    ) -> (Vec<ModuleProvider>, Option<ServiceError>) {
        let mut deferred: Option<ServiceError> = None;
        let stages = discovery_stages(&self.repository);

        let service_def = match self.find_service_definition(&stages) {
            Some(def) => def,
            None => {
                debug!("No definition exports service {}", self.service_type);
                return (Vec::new(), deferred);
            }
        };

        let requester_def = match system.module(self.requester) {
            Some(module) => Arc::clone(module.definition()),
            None => return (Vec::new(), deferred),
        };
        // The legacy class path sees everything; visibility filtering is
        // waived for it.
        let classpath_requester =
            requester_def.is_virtual() && requester_def.name() == CLASSPATH_MODULE_NAME;

        let requester_view = self.requester_service_instance(system);
        if requester_view.is_none() && !classpath_requester {
            debug!(
                "{} does not see service {} through its imports",
                requester_def, self.service_type
            );
            return (Vec::new(), deferred);
        }

        let mut provider_defs: Vec<Arc<ModuleDefinition>> = Vec::new();
        for repo in &stages {
            match repo.find_query(
                &Query::provides_service(&self.service_type),
                SearchMode::LocalOnly,
            ) {
                Ok(defs) => provider_defs.extend(defs),
                Err(e) => warn!(
                    "Skipping repository {} during provider discovery: {}",
                    repo.name(),
                    e
                ),
            }
        }

        let mut defaults: Vec<Arc<ModuleDefinition>> = Vec::new();
        let mut externals_by_name: HashMap<String, Arc<ModuleDefinition>> = HashMap::new();

        for candidate in provider_defs {
            let is_default = candidate.name() == service_def.name();
            let qualifies = if classpath_requester {
                true
            } else if is_default {
                match requester_view {
                    Some(view) => self.equality.check(system, &candidate, view),
                    None => false,
                }
            } else {
                match system.get_instance(&candidate) {
                    Ok(candidate_id) => match requester_view {
                        Some(view) => system.reexport_closure(candidate_id).contains(&view),
                        None => false,
                    },
                    Err(e) => {
                        warn!("Provider module {} failed to instantiate: {}", candidate, e);
                        if deferred.is_none() {
                            deferred = Some(ServiceError::ProviderFailed {
                                class: candidate.name().to_string(),
                                reason: e.to_string(),
                            });
                        }
                        false
                    }
                }
            };
            if !qualifies {
                debug!(
                    "Provider module {} does not qualify for {}",
                    candidate, self.service_type
                );
                continue;
            }
            if is_default {
                defaults.push(candidate);
            } else {
                // Same-name candidates collapse to the highest version
                match externals_by_name.get(candidate.name()) {
                    Some(existing) if existing.version() >= candidate.version() => {}
                    _ => {
                        externals_by_name.insert(candidate.name().to_string(), candidate);
                    }
                }
            }
        }

        let mut externals: Vec<Arc<ModuleDefinition>> = externals_by_name.into_values().collect();
        externals.sort_by(|a, b| a.name().cmp(b.name()));

        let mut providers = Vec::new();
        for def in defaults.into_iter().chain(externals) {
            for entry in def.providers_for(&self.service_type) {
                providers.push(ModuleProvider {
                    definition: Arc::clone(&def),
                    entry: entry.clone(),
                });
            }
        }
        debug!(
            "Discovered {} provider entries for {}",
            providers.len(),
            self.service_type
        );
        (providers, deferred)
    }

    /// Stage-ordered definition exporting the service type; within the
    /// first stage repository that has one, the highest version wins
    fn find_service_definition(
        &self,
        stages: &[Arc<dyn Repository>],
    ) -> Option<Arc<ModuleDefinition>> {
        for repo in stages {
            let exporters = match repo.find_query(
                &Query::exports_service(&self.service_type),
                SearchMode::LocalOnly,
            ) {
                Ok(defs) => defs,
                Err(e) => {
                    warn!(
                        "Skipping repository {} during service lookup: {}",
                        repo.name(),
                        e
                    );
                    continue;
                }
            };
            let mut best: Option<Arc<ModuleDefinition>> = None;
            for def in exporters {
                match &best {
                    Some(current) if current.version() >= def.version() => {}
                    _ => best = Some(def),
                }
            }
            if best.is_some() {
                return best;
            }
        }
        None
    }

    /// First instance among the requester and its reexport closure whose
    /// definition exports the service type; the requester itself is checked
    /// first, the rest in ascending instance order
    fn requester_service_instance(&self, system: &ModuleSystem) -> Option<ModuleId> {
        let mut visible: Vec<ModuleId> = system
            .reexport_closure(self.requester)
            .into_iter()
            .collect();
        visible.sort();
        for id in std::iter::once(self.requester).chain(visible) {
            if let Some(module) = system.module(id) {
                if module.definition().exports_service(&self.service_type) {
                    return Some(id);
                }
            }
        }
        None
    }
}

/// Provider discovery order: bootstrap repositories root-first, then the
/// rest of the chain receiver-first, each searched without parents
fn discovery_stages(repository: &Arc<dyn Repository>) -> Vec<Arc<dyn Repository>> {
    let chain = repository_chain(repository);
    let mut stages: Vec<Arc<dyn Repository>> = Vec::new();
    for repo in chain.iter().rev() {
        if repo.is_bootstrap() {
            stages.push(Arc::clone(repo));
        }
    }
    for repo in &chain {
        if !repo.is_bootstrap() {
            stages.push(Arc::clone(repo));
        }
    }
    stages
}

/// Lazy provider instantiation over one discovery pass
pub struct ServiceIter<'a> {
    system: &'a mut ModuleSystem,
    service_type: String,
    providers: std::vec::IntoIter<ModuleProvider>,
    attempted: HashSet<String>,
    deferred: Option<ServiceError>,
    produced_any: bool,
}

impl ServiceIter<'_> {
    fn instantiate(&mut self, provider: &ModuleProvider) -> Result<ProviderInstance, ServiceError> {
        if !provider.entry.is_compatible(&self.service_type) {
            return Err(ServiceError::ProviderFailed {
                class: provider.entry.class.clone(),
                reason: format!("provider does not implement {}", self.service_type),
            });
        }
        let module = self
            .system
            .get_instance(&provider.definition)
            .map_err(|e| ServiceError::ProviderFailed {
                class: provider.entry.class.clone(),
                reason: e.to_string(),
            })?;
        let loader = match self.system.module(module) {
            Some(live) => Arc::clone(live.class_loader()),
            None => {
                return Err(ServiceError::ProviderFailed {
                    class: provider.entry.class.clone(),
                    reason: "provider module has no live instance".to_string(),
                })
            }
        };
        let object = loader
            .instantiate(&provider.entry.class)
            .map_err(|e| ServiceError::ProviderFailed {
                class: provider.entry.class.clone(),
                reason: e.to_string(),
            })?;
        Ok(ProviderInstance {
            class_name: provider.entry.class.clone(),
            module,
            object,
        })
    }
}

impl Iterator for ServiceIter<'_> {
    type Item = Result<ProviderInstance, ServiceError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(provider) = self.providers.next() {
            // Each class name is attempted once per iteration, through the
            // best-ranked candidate that declares it
            if !self.attempted.insert(provider.entry.class.clone()) {
                continue;
            }
            match self.instantiate(&provider) {
                Ok(instance) => {
                    self.produced_any = true;
                    return Some(Ok(instance));
                }
                Err(e) => {
                    warn!("Service provider {} skipped: {}", provider.entry.class, e);
                    if self.deferred.is_none() {
                        self.deferred = Some(e);
                    }
                }
            }
        }
        if !self.produced_any {
            if let Some(e) = self.deferred.take() {
                return Some(Err(e));
            }
        }
        None
    }
}
